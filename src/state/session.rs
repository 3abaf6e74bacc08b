use crate::url::{normalize_url, NormalizedUrl};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One entry of the run's error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    /// What was being attempted, e.g. `fetch https://ex.org/a`
    pub context: String,
    pub message: String,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Run-scoped state shared by every worker
///
/// Owned by the scheduler for the lifetime of one crawl. Each field has its
/// own lock; no lock is held across an await point.
#[derive(Debug, Default)]
pub struct CrawlSession {
    visited: Mutex<HashSet<NormalizedUrl>>,
    errors: Mutex<Vec<ErrorEntry>>,
    datasets: Mutex<Vec<String>>,
    pages_visited: AtomicUsize,
    resources_downloaded: AtomicUsize,
    bytes_downloaded: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CrawlSession {
    /// Creates a session seeded with previously visited URLs
    pub fn new(visited: HashSet<NormalizedUrl>) -> Self {
        Self {
            visited: Mutex::new(visited),
            ..Self::default()
        }
    }

    /// Filters a frontier down to URLs never seen before, marking them visited
    ///
    /// Membership check and insertion happen under one lock acquisition, so a
    /// URL appearing twice in the frontier (or already in history) survives at
    /// most once. URLs that cannot be normalized are logged and dropped.
    pub fn claim_unvisited(&self, frontier: Vec<String>) -> Vec<(String, NormalizedUrl)> {
        let mut claimed = Vec::new();
        let mut rejected = Vec::new();

        {
            let mut visited = lock(&self.visited);
            for url in frontier {
                match normalize_url(&url) {
                    Ok(normalized) => {
                        if visited.insert(normalized.clone()) {
                            claimed.push((url, normalized));
                        }
                    }
                    Err(e) => rejected.push((url, e)),
                }
            }
        }

        for (url, e) in rejected {
            self.record_error(format!("normalize {}", url), e.to_string());
        }

        claimed
    }

    pub fn visited_count(&self) -> usize {
        lock(&self.visited).len()
    }

    /// Copy of the visited set, for persistence
    pub fn visited_snapshot(&self) -> HashSet<NormalizedUrl> {
        lock(&self.visited).clone()
    }

    /// Appends to the error log
    pub fn record_error(&self, context: impl Into<String>, message: impl Into<String>) {
        let entry = ErrorEntry {
            context: context.into(),
            message: message.into(),
        };
        tracing::warn!("{}", entry);
        lock(&self.errors).push(entry);
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        lock(&self.errors).clone()
    }

    /// Records a dataset registered with the index store
    pub fn record_dataset(&self, id: String) {
        lock(&self.datasets).push(id);
    }

    pub fn datasets(&self) -> Vec<String> {
        lock(&self.datasets).clone()
    }

    /// Counts a page dispatched in this run
    pub fn record_page(&self) {
        self.pages_visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited.load(Ordering::Relaxed)
    }

    /// Counts a resource persisted to disk with at least one file
    pub fn record_resource(&self, bytes: u64) {
        self.resources_downloaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn resources_downloaded(&self) -> usize {
        self.resources_downloaded.load(Ordering::Relaxed)
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }
}

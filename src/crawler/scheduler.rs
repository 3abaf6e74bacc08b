//! Level-synchronous breadth-first crawl scheduler
//!
//! This module handles:
//! - Loading and saving the crawl history around a run
//! - Claiming each level's frontier against the visited set
//! - Dispatching a level's pages to a bounded worker pool
//! - Collecting follow-links into the next level
//! - Cooperative cancellation with a guaranteed history flush

use crate::config::Config;
use crate::crawler::{CrawlTask, DownloadManager, Fetcher, LinkExtractor, PageWorker};
use crate::gateway::ClassifierGateway;
use crate::output::CrawlSummary;
use crate::state::CrawlSession;
use crate::storage::{HistoryStore, IndexStore};
use crate::url::NormalizedUrl;
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Where a crawl run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    Running { depth: u32 },
    Done,
    Interrupted,
}

/// Drives one crawl task from its root URL to completion
///
/// Every page of level `d` finishes (or fails) before any page of level
/// `d + 1` is dispatched. Within a level, pages run concurrently on a pool of
/// `min(max_concurrency, level size)` workers.
pub struct Scheduler {
    task: CrawlTask,
    worker: Arc<PageWorker>,
    history: HistoryStore,
    max_concurrency: usize,
    fresh: bool,
    state: CrawlState,
}

impl Scheduler {
    pub fn new(
        task: CrawlTask,
        config: &Config,
        fetcher: Arc<Fetcher>,
        gateway: Arc<dyn ClassifierGateway>,
        index: Arc<dyn IndexStore>,
    ) -> Self {
        let downloads = DownloadManager::new(Arc::clone(&fetcher), index);
        let worker = PageWorker::new(
            fetcher,
            LinkExtractor::from_config(&config.crawler),
            gateway,
            downloads,
            task.save_path().to_path_buf(),
            task.criteria().to_string(),
        );

        Self {
            task,
            worker: Arc::new(worker),
            history: HistoryStore::new(&config.output.history_path),
            max_concurrency: config.crawler.max_concurrency.max(1),
            fresh: false,
            state: CrawlState::Init,
        }
    }

    /// Ignores previously visited URLs for this run; history is still saved
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    /// Runs the crawl until the frontier empties, the depth limit is reached,
    /// or `cancel` fires
    ///
    /// The visited set is written to the history store on every exit path.
    /// After a cancellation the flush happens first and then
    /// [`HarvestError::Interrupted`] is returned.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<CrawlSummary, HarvestError> {
        let started = Instant::now();

        let visited = if self.fresh {
            tracing::info!("Fresh run, ignoring crawl history");
            HashSet::new()
        } else {
            self.history.load().await
        };
        tracing::info!(
            "Crawling {} (max depth {}, {} known URLs)",
            self.task.root_url(),
            self.task.max_depth(),
            visited.len()
        );

        if visited.contains(self.task.root_key()) {
            tracing::info!("{} is already in the crawl history", self.task.root_key());
        }

        let session = Arc::new(CrawlSession::new(visited));
        self.state = self.crawl(&session, &cancel).await;

        let flushed = self.history.save(&session.visited_snapshot()).await;

        if self.state == CrawlState::Interrupted {
            match flushed {
                Ok(()) => tracing::info!("Crawl interrupted, history saved"),
                Err(e) => tracing::error!("Crawl interrupted, failed to save history: {}", e),
            }
            return Err(HarvestError::Interrupted);
        }

        if let Err(e) = flushed {
            session.record_error(
                format!("save history {}", self.history.path().display()),
                e.to_string(),
            );
        }

        let summary = CrawlSummary {
            pages_visited: session.pages_visited(),
            known_urls: session.visited_count(),
            resources_downloaded: session.resources_downloaded(),
            bytes_downloaded: session.bytes_downloaded(),
            datasets_added: session.datasets(),
            save_path: self.task.save_path().to_path_buf(),
            duration: started.elapsed(),
            errors: session.errors(),
        };

        tracing::info!(
            "Crawl complete: {} pages, {} resources, {} errors in {:.1}s",
            summary.pages_visited,
            summary.resources_downloaded,
            summary.error_count(),
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    async fn crawl(&mut self, session: &Arc<CrawlSession>, cancel: &CancellationToken) -> CrawlState {
        let mut frontier = vec![self.task.root_url().to_string()];
        let mut depth = 0;

        loop {
            if cancel.is_cancelled() {
                return CrawlState::Interrupted;
            }

            // Dedup on the normalized key, dispatch the URL as found.
            let claimed: Vec<String> = session
                .claim_unvisited(frontier)
                .into_iter()
                .map(|(original, _)| original)
                .collect();

            if claimed.is_empty() {
                tracing::info!("Frontier empty at depth {}", depth);
                return CrawlState::Done;
            }

            self.state = CrawlState::Running { depth };
            tracing::info!("Depth {}: {} pages", depth, claimed.len());

            let next = self.run_level(session, claimed, depth, cancel).await;

            if cancel.is_cancelled() {
                return CrawlState::Interrupted;
            }

            if depth >= self.task.max_depth() {
                if !next.is_empty() {
                    tracing::debug!("Depth limit reached, dropping {} follow links", next.len());
                }
                return CrawlState::Done;
            }

            frontier = next.into_iter().map(NormalizedUrl::into_string).collect();
            depth += 1;
        }
    }

    /// Processes one level and returns the concatenated follow-links
    async fn run_level(
        &self,
        session: &Arc<CrawlSession>,
        urls: Vec<String>,
        depth: u32,
        cancel: &CancellationToken,
    ) -> Vec<NormalizedUrl> {
        let pool_size = self.max_concurrency.min(urls.len());
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut tasks = JoinSet::new();

        for url in urls {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::info!("Stopping dispatch at depth {}", depth);
                break;
            };

            session.record_page();
            let worker = Arc::clone(&self.worker);
            let session = Arc::clone(session);
            tasks.spawn(async move {
                let _permit = permit;
                let result = worker.process(&session, &url, depth).await;
                (url, result)
            });
        }

        let mut next = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(links))) => next.extend(links),
                Ok((url, Err(e))) => session.record_error(url, e.to_string()),
                Err(e) => session.record_error(format!("depth {}", depth), format!("worker task failed: {}", e)),
            }
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, OutputConfig};
    use crate::gateway::{GatewayAnalysis, GatewayError, PageContext};
    use crate::storage::SqliteIndex;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Follows every page link and downloads nothing
    #[derive(Default)]
    struct FollowAll {
        seen: Mutex<Vec<String>>,
        cancel_on_call: Option<CancellationToken>,
    }

    #[async_trait]
    impl ClassifierGateway for FollowAll {
        async fn analyze(&self, page: &PageContext<'_>) -> Result<GatewayAnalysis, GatewayError> {
            self.seen.lock().unwrap().push(page.page_url.to_string());
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            Ok(GatewayAnalysis {
                resources: Vec::new(),
                follow_indices: (0..page.page_links.len() as i64).collect(),
            })
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        Config {
            crawler: CrawlerConfig {
                politeness_delay_ms: 0,
                retry_base_delay_ms: 1,
                ..CrawlerConfig::default()
            },
            output: OutputConfig {
                history_path: dir.path().join("history.json"),
                index_path: dir.path().join("index.db"),
                datasets_root: dir.path().join("datasets"),
            },
            ..Config::default()
        }
    }

    fn scheduler(
        server: &MockServer,
        dir: &TempDir,
        max_depth: u32,
        gateway: Arc<FollowAll>,
    ) -> Scheduler {
        let config = test_config(dir);
        let task = CrawlTask::new(&server.uri(), dir.path().join("out"), "all datasets", max_depth)
            .unwrap();
        let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());
        let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
        Scheduler::new(task, &config, fetcher, gateway, index)
    }

    async fn mount_page(server: &MockServer, route: &str, body: &str, hits: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(body),
            )
            .expect(hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_shared_link_is_fetched_once() {
        let server = MockServer::start().await;
        mount_page(&server, "/", r#"<a href="/a">a</a><a href="/b">b</a>"#, 1).await;
        mount_page(&server, "/a", r#"<a href="/c">c</a>"#, 1).await;
        mount_page(&server, "/b", r#"<a href="/c/">c</a>"#, 1).await;
        mount_page(&server, "/c", "<p>leaf</p>", 1).await;

        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(FollowAll::default());
        let mut scheduler = scheduler(&server, &dir, 2, gateway.clone());

        let summary = scheduler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(summary.pages_visited, 4);
        assert_eq!(summary.known_urls, 4);
        assert_eq!(summary.error_count(), 0);
        assert_eq!(scheduler.state(), CrawlState::Done);
        assert_eq!(gateway.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_depth_limit_stops_traversal() {
        let server = MockServer::start().await;
        mount_page(&server, "/", r#"<a href="/a">a</a>"#, 1).await;
        mount_page(&server, "/a", r#"<a href="/b">b</a>"#, 0).await;

        let dir = TempDir::new().unwrap();
        let mut scheduler = scheduler(&server, &dir, 0, Arc::new(FollowAll::default()));

        let summary = scheduler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.known_urls, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_logged_not_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(FollowAll::default());
        let mut scheduler = scheduler(&server, &dir, 2, gateway.clone());

        let summary = scheduler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(summary.pages_visited, 1);
        assert_eq!(summary.error_count(), 1);
        assert!(summary.errors[0].message.contains("500"));
        assert!(gateway.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_skips_known_pages() {
        let server = MockServer::start().await;
        mount_page(&server, "/", r#"<a href="/a">a</a>"#, 1).await;
        mount_page(&server, "/a", "<p>leaf</p>", 1).await;

        let dir = TempDir::new().unwrap();

        let first = scheduler(&server, &dir, 1, Arc::new(FollowAll::default()))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.pages_visited, 2);

        let second = scheduler(&server, &dir, 1, Arc::new(FollowAll::default()))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.pages_visited, 0);
        assert_eq!(second.known_urls, 2);
    }

    #[tokio::test]
    async fn test_fresh_run_ignores_history() {
        let server = MockServer::start().await;
        mount_page(&server, "/", "<p>root</p>", 2).await;

        let dir = TempDir::new().unwrap();
        for _ in 0..2 {
            let summary = scheduler(&server, &dir, 1, Arc::new(FollowAll::default()))
                .fresh(true)
                .run(CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(summary.pages_visited, 1);
        }
    }

    #[tokio::test]
    async fn test_cancellation_flushes_history() {
        let server = MockServer::start().await;
        mount_page(&server, "/", r#"<a href="/a">a</a>"#, 1).await;
        mount_page(&server, "/a", "<p>never</p>", 0).await;

        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        let gateway = Arc::new(FollowAll {
            cancel_on_call: Some(token.clone()),
            ..FollowAll::default()
        });
        let mut scheduler = scheduler(&server, &dir, 3, gateway);

        let result = scheduler.run(token).await;

        assert!(matches!(result, Err(HarvestError::Interrupted)));
        assert_eq!(scheduler.state(), CrawlState::Interrupted);

        let saved = HistoryStore::new(dir.path().join("history.json")).load().await;
        assert_eq!(saved.len(), 1);
        assert!(saved.iter().any(|u| u.as_str() == server.uri()));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        mount_page(&server, "/", "<p>root</p>", 0).await;

        let dir = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = scheduler(&server, &dir, 1, Arc::new(FollowAll::default()))
            .run(token)
            .await;

        assert!(matches!(result, Err(HarvestError::Interrupted)));
        assert!(dir.path().join("history.json").exists());
    }
}

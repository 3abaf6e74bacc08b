//! End-of-run summary

use crate::state::ErrorEntry;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// What a crawl run did
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    /// Pages dispatched in this run
    pub pages_visited: usize,

    /// Size of the visited set, history included
    pub known_urls: usize,

    /// Resources persisted with at least one file
    pub resources_downloaded: usize,

    /// Bytes across the files of those resources
    pub bytes_downloaded: u64,

    /// Ids the index store assigned to registered datasets
    pub datasets_added: Vec<String>,

    pub save_path: PathBuf,

    pub duration: Duration,

    pub errors: Vec<ErrorEntry>,
}

impl CrawlSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Prints the summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Pages visited: {}", summary.pages_visited);
    println!("  Known URLs: {}", summary.known_urls);
    println!(
        "  Resources downloaded: {} ({})",
        summary.resources_downloaded,
        format_bytes(summary.bytes_downloaded)
    );
    println!("  Saved to: {}", summary.save_path.display());
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
    println!();

    if !summary.datasets_added.is_empty() {
        println!("Datasets ({}):", summary.datasets_added.len());
        for id in &summary.datasets_added {
            println!("  - {}", id);
        }
        println!();
    }

    if !summary.errors.is_empty() {
        println!("Errors ({}):", summary.errors.len());
        for error in &summary.errors {
            println!("  - {}", error);
        }
        println!();
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

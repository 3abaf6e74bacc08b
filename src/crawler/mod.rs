//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with politeness spacing and retry logic
//! - HTML cleaning and candidate-link extraction
//! - Resource downloads and dataset registration
//! - Level-synchronous BFS scheduling

mod downloader;
mod extractor;
mod fetcher;
mod scheduler;
mod task;
mod worker;

pub use downloader::{file_name_for, sanitize_name, DownloadManager};
pub use extractor::{classify_link, ExtractedPage, Link, LinkExtractor, LinkKind, DOWNLOAD_EXTENSIONS};
pub use fetcher::{backoff_delay, build_http_client, decode_body, Fetcher};
pub use scheduler::{CrawlState, Scheduler};
pub use task::{default_save_path, CrawlTask, DEFAULT_CRITERIA, DEFAULT_MAX_DEPTH};
pub use worker::{PageError, PageWorker};

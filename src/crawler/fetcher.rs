//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - GET requests for pages, decoded to text
//! - Streaming GET requests for files, written straight to disk
//! - Politeness spacing and retry with exponential backoff for both

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::state::PolitenessGate;
use crate::FetchError;
use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Size of the pieces a download is written in
const CHUNK_SIZE: usize = 8192;

/// Interval between debug progress events for a single download
const PROGRESS_LOG_STEP: u64 = 1024 * 1024;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use dataset_harvester::config::UserAgentConfig;
/// use dataset_harvester::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent_string())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Delay before the retry that follows failed attempt `attempt` (0-based)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Decodes a response body to text
///
/// A declared charset is trusted unless it is missing or `iso-8859-1`, which
/// servers commonly send as a default; in those cases the encoding is
/// detected from the bytes.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(charset_label)
        .filter(|label| !label.eq_ignore_ascii_case("iso-8859-1"))
        .and_then(|label| Encoding::for_label(label.as_bytes()));

    let encoding = match declared {
        Some(encoding) => encoding,
        None => {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        }
    };

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn charset_label(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Politeness-limited, retrying HTTP client for pages and files
///
/// Every attempt, retries included, first waits on the shared
/// [`PolitenessGate`]. Timeouts, transport errors, 5xx, 408 and 429 are
/// retried up to `max_retries` total attempts; the delay after failed
/// attempt `n` is `retry_base_delay * 2^n`.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    gate: PolitenessGate,
    page_timeout: Duration,
    download_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl Fetcher {
    pub fn new(crawler: &CrawlerConfig, user_agent: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent)?;
        Ok(Self::with_client(client, crawler))
    }

    pub fn with_client(client: Client, crawler: &CrawlerConfig) -> Self {
        Self {
            client,
            gate: PolitenessGate::new(crawler.politeness_delay()),
            page_timeout: crawler.page_timeout(),
            download_timeout: crawler.download_timeout(),
            max_retries: crawler.max_retries.max(1),
            retry_base_delay: crawler.retry_base_delay(),
        }
    }

    /// Fetches a page and returns its decoded text
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            self.gate.wait().await;
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => match self.retry_delay(attempt, &e) {
                    Some(delay) => {
                        tracing::debug!("Fetch of {} failed ({}), retrying in {:?}", url, e, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Streams a file to `dest`, returning the number of bytes written
    ///
    /// `on_progress` receives `(downloaded, total)` after every piece, with
    /// `total` 0 when the server sends no length. A partially written file is
    /// removed when an attempt fails.
    pub async fn download<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> Result<u64, FetchError>
    where
        F: FnMut(u64, u64) + Send,
    {
        let mut attempt = 0;
        loop {
            self.gate.wait().await;
            match self.download_once(url, dest, &mut on_progress).await {
                Ok(size) => return Ok(size),
                Err(e) => {
                    if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                        if remove_err.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!("Failed to remove partial file {}: {}", dest.display(), remove_err);
                        }
                    }
                    match self.retry_delay(attempt, &e) {
                        Some(delay) => {
                            tracing::debug!("Download of {} failed ({}), retrying in {:?}", url, e, delay);
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    fn retry_delay(&self, attempt: u32, error: &FetchError) -> Option<Duration> {
        if error.is_retryable() && attempt + 1 < self.max_retries {
            Some(backoff_delay(self.retry_base_delay, attempt))
        } else {
            None
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        Ok(decode_body(&bytes, content_type.as_deref()))
    }

    async fn download_once<F>(&self, url: &str, dest: &Path, on_progress: &mut F) -> Result<u64, FetchError>
    where
        F: FnMut(u64, u64) + Send,
    {
        let io_error = |source| FetchError::Io {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;

        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;
        let mut next_log = PROGRESS_LOG_STEP;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece).await.map_err(io_error)?;
                downloaded += piece.len() as u64;
                on_progress(downloaded, total);
            }
            if downloaded >= next_log {
                tracing::debug!("{}: {} / {} bytes", url, downloaded, total);
                next_log = downloaded + PROGRESS_LOG_STEP;
            }
        }

        file.flush().await.map_err(io_error)?;
        Ok(downloaded)
    }
}

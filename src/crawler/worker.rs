//! Per-page pipeline: fetch, extract, classify, materialize

use crate::crawler::{DownloadManager, ExtractedPage, Fetcher, LinkExtractor};
use crate::gateway::{resolve_analysis, ClassifierGateway, GatewayError, PageContext};
use crate::state::CrawlSession;
use crate::url::NormalizedUrl;
use crate::FetchError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Why a page contributed nothing to the next level
#[derive(Debug, Error)]
pub enum PageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("classification failed: {0}")]
    Classification(#[from] GatewayError),

    #[error("invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Runs the page pipeline for every page of a crawl
///
/// Shared across a level's tasks behind an `Arc`; holds no per-page state.
pub struct PageWorker {
    fetcher: Arc<Fetcher>,
    extractor: LinkExtractor,
    gateway: Arc<dyn ClassifierGateway>,
    downloads: DownloadManager,
    save_path: PathBuf,
    criteria: String,
}

impl PageWorker {
    pub fn new(
        fetcher: Arc<Fetcher>,
        extractor: LinkExtractor,
        gateway: Arc<dyn ClassifierGateway>,
        downloads: DownloadManager,
        save_path: PathBuf,
        criteria: String,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            gateway,
            downloads,
            save_path,
            criteria,
        }
    }

    /// Processes one page and returns the links chosen for the next level
    ///
    /// `url` is requested exactly as given, query string included.
    pub async fn process(
        &self,
        session: &CrawlSession,
        url: &str,
        depth: u32,
    ) -> Result<Vec<NormalizedUrl>, PageError> {
        tracing::info!("[depth {}] {}", depth, url);

        let html = self.fetcher.fetch(url).await?;
        let base = Url::parse(url)?;
        let page = self.extract(&html, &base);

        let (download_links, page_links) = page.split_links();
        tracing::debug!(
            "{}: {} download links, {} page links",
            url,
            download_links.len(),
            page_links.len()
        );

        let context = PageContext {
            page_url: url,
            text: &page.text,
            download_links: &download_links,
            page_links: &page_links,
            criteria: &self.criteria,
        };
        let raw = self.gateway.analyze(&context).await?;
        let analysis = resolve_analysis(raw, &download_links, &page_links);

        for resource in &analysis.resources {
            self.downloads
                .materialize(resource, &self.save_path, url, session)
                .await;
        }

        Ok(analysis.follow_links)
    }

    // The parsed document is not Send, so it must not live across an await.
    fn extract(&self, html: &str, base: &Url) -> ExtractedPage {
        self.extractor.extract(html, base)
    }
}

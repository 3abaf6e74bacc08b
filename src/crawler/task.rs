use crate::gateway::ResolvedIntent;
use crate::url::{extract_domain, normalize_url, NormalizedUrl};
use crate::{HarvestError, UrlError};
use std::path::{Path, PathBuf};

/// Criterion used when the caller gives none
pub const DEFAULT_CRITERIA: &str = "all datasets";

/// Depth used when the caller gives none
pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Immutable description of one crawl invocation
///
/// The root is fetched exactly as given; its normalized form is only the
/// key it occupies in the visited set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    root_url: String,
    root_key: NormalizedUrl,
    save_path: PathBuf,
    criteria: String,
    max_depth: u32,
}

impl CrawlTask {
    pub fn new(
        root_url: &str,
        save_path: impl Into<PathBuf>,
        criteria: impl Into<String>,
        max_depth: u32,
    ) -> Result<Self, UrlError> {
        let root_url = root_url.trim();
        Ok(Self {
            root_key: normalize_url(root_url)?,
            root_url: root_url.to_string(),
            save_path: save_path.into(),
            criteria: criteria.into(),
            max_depth,
        })
    }

    /// Builds a task from a resolved intent, filling in defaults
    ///
    /// A missing or unusable URL is fatal: nothing can be crawled without it.
    pub fn from_intent(intent: ResolvedIntent, datasets_root: &Path) -> Result<Self, HarvestError> {
        let url = intent
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| HarvestError::Intent("no root URL in instruction".to_string()))?;

        let root_key = normalize_url(&url)
            .map_err(|e| HarvestError::Intent(format!("unusable root URL {}: {}", url, e)))?;

        let save_path = match intent.save_path.filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_save_path(datasets_root, &root_key),
        };

        let criteria = intent
            .criteria
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CRITERIA.to_string());

        Ok(Self {
            root_url: url,
            root_key,
            save_path,
            criteria,
            max_depth: intent.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        })
    }

    /// The root URL as the caller gave it
    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Visited-set key of the root
    pub fn root_key(&self) -> &NormalizedUrl {
        &self.root_key
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn criteria(&self) -> &str {
        &self.criteria
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

/// `<datasets_root>/<host with '.' replaced by '_'>`
pub fn default_save_path(datasets_root: &Path, root_url: &NormalizedUrl) -> PathBuf {
    let host = url::Url::parse(root_url.as_str())
        .ok()
        .and_then(|u| extract_domain(&u))
        .map(|h| h.replace('.', "_"))
        .unwrap_or_else(|| "unknown".to_string());
    datasets_root.join(host)
}

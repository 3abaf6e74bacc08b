use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Canonical string form of a URL: `scheme://host[:port]/path`
///
/// Query and fragment are dropped and trailing path separators are trimmed.
/// This is the dedup key for the visited set and for links within a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a URL for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP(S) or has no host
/// 3. Keep scheme, host (with explicit port) and path only
/// 4. Trim trailing `/` from the result
///
/// The host is lowercased by the parser. Trimming every trailing separator
/// (not just one) keeps the function idempotent for paths like `/a//`.
///
/// # Examples
///
/// ```
/// use dataset_harvester::url::normalize_url;
///
/// let url = normalize_url("https://Example.org/data/?page=2#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.org/data");
/// ```
pub fn normalize_url(url_str: &str) -> Result<NormalizedUrl, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(&url)
}

/// Normalizes an already parsed URL
pub fn normalize_parsed(url: &Url) -> Result<NormalizedUrl, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;
    let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();

    let normalized = format!("{}://{}{}{}", url.scheme(), host, port, url.path());
    Ok(NormalizedUrl(normalized.trim_end_matches('/').to_string()))
}

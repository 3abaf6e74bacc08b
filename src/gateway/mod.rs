//! Classifier gateway: the external decision-maker for each page
//!
//! Given a page's cleaned text and its indexed candidate links, the gateway
//! picks which download links form datasets and which page links to follow.
//! Responses are parsed into a strict schema ([`GatewayAnalysis`]) and then
//! validated against the page's own link lists by [`resolve_analysis`].

mod chat;

pub use chat::{extract_json_object, render_page_prompt, ChatGateway};

use crate::crawler::Link;
use crate::url::NormalizedUrl;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// A gateway call that produced no usable answer
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway transport error: {0}")]
    Transport(String),

    #[error("Gateway returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed gateway response: {0}")]
    Malformed(String),

    #[error("Missing API key (set {0})")]
    MissingApiKey(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Malformed(_) | Self::MissingApiKey(_) => false,
        }
    }
}

/// Everything the gateway sees about one page
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub page_url: &'a str,
    pub text: &'a str,
    pub download_links: &'a [Link],
    pub page_links: &'a [Link],
    pub criteria: &'a str,
}

/// Raw gateway answer for a page, before index validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GatewayAnalysis {
    #[serde(default)]
    pub resources: Vec<GatewayResource>,
    #[serde(default)]
    pub follow_indices: Vec<i64>,
}

/// One resource as described by the gateway
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GatewayResource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub download_indices: Vec<i64>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Intent payload: what to crawl, where to save it and what to look for
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResolvedIntent {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub save_path: Option<String>,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

/// A named, possibly multi-file unit of data selected for download
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub description: String,
    pub download_urls: Vec<String>,
    pub properties: Map<String, Value>,
}

/// Validated decision for one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnalysis {
    pub resources: Vec<Resource>,
    pub follow_links: Vec<NormalizedUrl>,
}

/// Decides what to download and follow on a page
#[async_trait]
pub trait ClassifierGateway: Send + Sync {
    async fn analyze(&self, page: &PageContext<'_>) -> Result<GatewayAnalysis, GatewayError>;
}

/// Turns a free-text instruction into crawl parameters
#[async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve_intent(&self, prompt: &str) -> Result<ResolvedIntent, GatewayError>;
}

/// Maps gateway indices back onto the page's link lists
///
/// Out-of-range indices are logged and dropped. A resource left without any
/// valid download URL is dropped entirely.
pub fn resolve_analysis(
    raw: GatewayAnalysis,
    download_links: &[Link],
    page_links: &[Link],
) -> PageAnalysis {
    let mut resources = Vec::new();

    for resource in raw.resources {
        let download_urls: Vec<String> = resource
            .download_indices
            .iter()
            .filter_map(|&idx| match lookup(download_links, idx) {
                Some(link) => Some(link.url.as_str().to_string()),
                None => {
                    tracing::warn!("Ignoring invalid download index: {}", idx);
                    None
                }
            })
            .collect();

        if download_urls.is_empty() {
            continue;
        }

        resources.push(Resource {
            name: resource
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            description: resource.description.unwrap_or_default(),
            download_urls,
            properties: resource.properties.unwrap_or_default(),
        });
    }

    let follow_links = raw
        .follow_indices
        .iter()
        .filter_map(|&idx| match lookup(page_links, idx) {
            Some(link) => Some(link.url.clone()),
            None => {
                tracing::warn!("Ignoring invalid page index: {}", idx);
                None
            }
        })
        .collect();

    PageAnalysis {
        resources,
        follow_links,
    }
}

fn lookup(links: &[Link], idx: i64) -> Option<&Link> {
    usize::try_from(idx).ok().and_then(|i| links.get(i))
}

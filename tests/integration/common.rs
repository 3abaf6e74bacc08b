//! Shared fixtures for the integration tests

use async_trait::async_trait;
use dataset_harvester::config::{Config, CrawlerConfig, OutputConfig};
use dataset_harvester::gateway::{ClassifierGateway, GatewayAnalysis, GatewayError, PageContext};
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration rooted in `dir`, with no politeness delay
pub fn create_test_config(dir: &TempDir) -> Config {
    Config {
        crawler: CrawlerConfig {
            max_concurrency: 8,
            politeness_delay_ms: 0,
            retry_base_delay_ms: 1,
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            history_path: dir.path().join("crawl_history.json"),
            index_path: dir.path().join("index.db"),
            datasets_root: dir.path().join("datasets"),
        },
        ..Config::default()
    }
}

/// Serves `body` as an HTML page at `route`
pub async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

/// Gateway answering from a fixed table keyed by page URL
///
/// Pages missing from the table get an empty analysis.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: HashMap<String, GatewayAnalysis>,
    calls: Mutex<Vec<String>>,
    cancel_after: Option<(String, CancellationToken)>,
}

impl ScriptedGateway {
    pub fn reply(mut self, page_url: impl Into<String>, analysis: GatewayAnalysis) -> Self {
        self.replies.insert(page_url.into(), analysis);
        self
    }

    /// Cancels `token` once `page_url` has been analyzed
    pub fn cancel_after(mut self, page_url: impl Into<String>, token: CancellationToken) -> Self {
        self.cancel_after = Some((page_url.into(), token));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClassifierGateway for ScriptedGateway {
    async fn analyze(&self, page: &PageContext<'_>) -> Result<GatewayAnalysis, GatewayError> {
        self.calls.lock().unwrap().push(page.page_url.to_string());
        if let Some((url, token)) = &self.cancel_after {
            if url == page.page_url {
                token.cancel();
            }
        }
        Ok(self.replies.get(page.page_url).cloned().unwrap_or_default())
    }
}

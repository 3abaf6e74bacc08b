//! OpenAI-compatible chat-completion client used as the classifier gateway

use super::{
    ClassifierGateway, GatewayAnalysis, GatewayError, IntentResolver, PageContext, ResolvedIntent,
};
use crate::config::GatewayConfig;
use crate::crawler::Link;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const LINK_TEXT_LIMIT: usize = 50;

const ANALYZE_PAGE_SYSTEM: &str = r#"You are a dataset analysis assistant. Select the links from the given lists that match the user's criteria.

Reply with JSON only:
{
  "resources": [
    {
      "name": "dataset name",
      "description": "dataset description",
      "download_indices": [0, 1, 2],
      "properties": {"nodes": number or null, "edges": number or null, "directed": true/false/null}
    }
  ],
  "follow_indices": [0, 1, 2]
}

Rules:
1. download_indices are indices into DOWNLOAD_LINKS
2. follow_indices are indices into PAGE_LINKS
3. Use integer indices only, never URLs
4. Only fill properties with values stated on the page, otherwise null
5. If nothing matches, return empty arrays"#;

const PARSE_INTENT_SYSTEM: &str = r#"You are a crawler assistant. Extract the crawl parameters from the user's instruction.

Reply with JSON only:
{
  "url": "root URL to crawl",
  "save_path": "where to save, null if not given",
  "criteria": "what kind of data to download",
  "max_depth": 2
}

Notes:
- url must be absolute (http:// or https://)
- leave save_path null unless the user names one
- max_depth defaults to 2"#;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completion gateway
pub struct ChatGateway {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ChatGateway {
    pub fn new(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// Builds a gateway with the key read from the configured env var
    pub fn from_env(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sends one conversation, retrying transient failures
    pub async fn chat(&self, system: &str, user: &str, json_mode: bool) -> Result<String, GatewayError> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": self.temperature,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let mut attempt = 0;
        loop {
            match self.send(&body).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt + 1 < self.max_retries => {
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        "Gateway attempt {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends a JSON-mode conversation and decodes the reply into `T`
    pub async fn chat_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, GatewayError> {
        let reply = self.chat(system, user, true).await?;
        let value = extract_json_object(&reply).ok_or_else(|| {
            let preview: String = reply.chars().take(200).collect();
            GatewayError::Malformed(format!("no JSON object in reply: {}", preview))
        })?;
        serde_json::from_value(value).map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    async fn send(&self, body: &Value) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Malformed("reply has no message content".to_string()))
    }
}

#[async_trait]
impl ClassifierGateway for ChatGateway {
    async fn analyze(&self, page: &PageContext<'_>) -> Result<GatewayAnalysis, GatewayError> {
        let prompt = render_page_prompt(page);
        self.chat_json(ANALYZE_PAGE_SYSTEM, &prompt).await
    }
}

#[async_trait]
impl IntentResolver for ChatGateway {
    async fn resolve_intent(&self, prompt: &str) -> Result<ResolvedIntent, GatewayError> {
        self.chat_json(PARSE_INTENT_SYSTEM, prompt).await
    }
}

/// Pulls a JSON object out of a model reply
///
/// Accepts a bare object, a fenced ```json block, or the span from the first
/// `{` to the last `}`.
pub fn extract_json_object(reply: &str) -> Option<Value> {
    let trimmed = reply.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + "```json".len()..];
        if let Some(end) = rest.find("```") {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str(rest[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Renders the user prompt for one page
pub fn render_page_prompt(page: &PageContext<'_>) -> String {
    format!(
        "Page URL: {}\n\nPage content:\n{}\n\n\
         === DOWNLOAD_LINKS (select by index) ===\n{}\n\n\
         === PAGE_LINKS (select by index) ===\n{}\n\n\
         Criteria: {}\n\n\
         Return the indices to select. download_indices come from DOWNLOAD_LINKS, \
         follow_indices come from PAGE_LINKS.",
        page.page_url,
        page.text,
        render_links(page.download_links),
        render_links(page.page_links),
        page.criteria,
    )
}

fn render_links(links: &[Link]) -> String {
    if links.is_empty() {
        return "  (none)".to_string();
    }
    links
        .iter()
        .enumerate()
        .map(|(i, link)| {
            let label: String = link.text.chars().take(LINK_TEXT_LIMIT).collect();
            format!("  [{}] {} (text: {})", i, link.url, label)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

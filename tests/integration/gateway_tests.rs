use crate::common::{create_test_config, mount_page};
use dataset_harvester::config::GatewayConfig;
use dataset_harvester::crawler::{CrawlTask, Fetcher, Scheduler};
use dataset_harvester::gateway::{ChatGateway, IntentResolver};
use dataset_harvester::storage::{SqliteIndex, META_FILE_NAME};
use dataset_harvester::HarvestError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
    }))
}

fn gateway_for(server: &MockServer) -> ChatGateway {
    let config = GatewayConfig {
        base_url: server.uri(),
        ..GatewayConfig::default()
    };
    ChatGateway::new(&config, "test-key")
        .unwrap()
        .with_retry_base_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_crawl_with_chat_gateway() {
    let server = MockServer::start().await;
    let root = format!("{}/data", server.uri());

    mount_page(
        &server,
        "/data",
        r#"<h1>ROOT-MARKER</h1><a href="/data/web.csv.gz">web graph</a><a href="/data/more">more</a>"#,
    )
    .await;
    mount_page(&server, "/data/more", "<p>LEAF-MARKER</p>").await;
    Mock::given(method("GET"))
        .and(path("/data/web.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 1024]))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("ROOT-MARKER"))
        .respond_with(chat_reply(json!({
            "resources": [{
                "name": "Web Graph",
                "description": "web crawl",
                "download_indices": [0, 5],
                "properties": {"nodes": 875713, "edges": null, "directed": true}
            }],
            "follow_indices": [0]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("LEAF-MARKER"))
        .respond_with(chat_reply(json!({"resources": [], "follow_indices": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let save_path = dir.path().join("out");
    let task = CrawlTask::new(&root, &save_path, "graph datasets", 3).unwrap();

    let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());
    let gateway = Arc::new(gateway_for(&server));

    let summary = Scheduler::new(task, &config, fetcher, gateway, index.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.resources_downloaded, 1);
    assert_eq!(summary.bytes_downloaded, 1024);
    assert_eq!(summary.error_count(), 0, "errors: {:?}", summary.errors);

    let entry = index.get("127_0_0_1/web_graph").unwrap().unwrap();
    assert_eq!(entry.record.files[0].name, "web.csv.gz");
    assert_eq!(entry.record.files[0].size_bytes, 1024);
    assert_eq!(entry.record.properties["nodes"], 875713);
    assert!(save_path.join("Web_Graph").join(META_FILE_NAME).exists());
}

#[tokio::test]
async fn test_gateway_failure_is_page_local() {
    let server = MockServer::start().await;
    let root = format!("{}/data", server.uri());

    mount_page(&server, "/data", r#"<a href="/data/more">more</a>"#).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!("not an analysis")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let task = CrawlTask::new(&root, dir.path().join("out"), "graph datasets", 2).unwrap();

    let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());
    let gateway = Arc::new(gateway_for(&server));

    let summary = Scheduler::new(task, &config, fetcher, gateway, index)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.known_urls, 1);
    assert_eq!(summary.error_count(), 1);
    assert!(summary.errors[0].message.contains("classification"));
}

#[tokio::test]
async fn test_intent_resolution_builds_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!({
            "url": "https://snap.stanford.edu/data/",
            "save_path": null,
            "criteria": "social networks",
            "max_depth": 1
        })))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let intent = gateway
        .resolve_intent("get the social graphs from snap, one level deep")
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let task = CrawlTask::from_intent(intent, dir.path()).unwrap();

    assert_eq!(task.root_url(), "https://snap.stanford.edu/data/");
    assert_eq!(task.root_key().as_str(), "https://snap.stanford.edu/data");
    assert_eq!(task.save_path(), dir.path().join("snap_stanford_edu"));
    assert_eq!(task.criteria(), "social networks");
    assert_eq!(task.max_depth(), 1);
}

#[tokio::test]
async fn test_intent_without_url_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(json!({"url": null, "criteria": "anything"})))
        .mount(&server)
        .await;

    let intent = gateway_for(&server)
        .resolve_intent("download something")
        .await
        .unwrap();

    let result = CrawlTask::from_intent(intent, std::path::Path::new("data/datasets"));
    assert!(matches!(result, Err(HarvestError::Intent(_))));
}

use crate::common::{create_test_config, mount_page, ScriptedGateway};
use dataset_harvester::crawler::{CrawlTask, Fetcher, Scheduler};
use dataset_harvester::gateway::{GatewayAnalysis, GatewayResource};
use dataset_harvester::storage::{DatasetRecord, HistoryStore, SqliteIndex, META_FILE_NAME};
use dataset_harvester::HarvestError;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT_PAGE: &str = r#"
<html>
  <head><script>var tracking = 1;</script></head>
  <body>
    <nav><a href="/about">About</a></nav>
    <h1>Graph datasets</h1>
    <table><tr><td>Nodes</td><td>34</td></tr></table>
    <a href="/d/b">More datasets</a>
    <a href="/d/karate.csv">Karate club edges</a>
  </body>
</html>
"#;

fn select_download_and_follow() -> GatewayAnalysis {
    GatewayAnalysis {
        resources: vec![GatewayResource {
            name: Some("karate".to_string()),
            description: Some("Zachary's karate club".to_string()),
            download_indices: vec![0],
            properties: None,
        }],
        follow_indices: vec![0],
    }
}

#[tokio::test]
async fn test_full_crawl_downloads_and_follows() {
    let server = MockServer::start().await;
    let root = format!("{}/d", server.uri());

    mount_page(&server, "/d", ROOT_PAGE).await;
    mount_page(&server, "/d/b", "<p>Nothing to see</p>").await;
    Mock::given(method("GET"))
        .and(path("/d/karate.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1,2\n1,3\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let save_path = dir.path().join("datasets").join("ex");
    let task = CrawlTask::new(&root, &save_path, "graph datasets", 1).unwrap();

    let gateway = Arc::new(ScriptedGateway::default().reply(root.clone(), select_download_and_follow()));
    let index = Arc::new(SqliteIndex::new(&config.output.index_path).unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());

    let mut scheduler = Scheduler::new(task, &config, fetcher, gateway.clone(), index.clone());
    let summary = scheduler.run(CancellationToken::new()).await.unwrap();

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.resources_downloaded, 1);
    assert_eq!(summary.bytes_downloaded, 8);
    assert_eq!(summary.error_count(), 0, "errors: {:?}", summary.errors);
    assert_eq!(summary.datasets_added, vec!["127_0_0_1/karate".to_string()]);

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.contains(&format!("{}/d/b", server.uri())));

    let dataset_dir = save_path.join("karate");
    assert_eq!(
        std::fs::read_to_string(dataset_dir.join("karate.csv")).unwrap(),
        "1,2\n1,3\n"
    );
    let meta: DatasetRecord =
        serde_json::from_slice(&std::fs::read(dataset_dir.join(META_FILE_NAME)).unwrap()).unwrap();
    assert_eq!(meta.source_url, root);
    assert_eq!(meta.files[0].size_bytes, 8);

    assert_eq!(index.count().unwrap(), 1);
    let entry = index.get("127_0_0_1/karate").unwrap().unwrap();
    assert_eq!(entry.local_path, dataset_dir);

    let history = HistoryStore::new(&config.output.history_path).load().await;
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_second_run_skips_visited_pages() {
    let server = MockServer::start().await;
    let root = format!("{}/d", server.uri());

    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROOT_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/d/b", "<p>leaf</p>").await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);

    for run in 0..2 {
        let task = CrawlTask::new(&root, dir.path().join("out"), "graph datasets", 1).unwrap();
        let gateway = Arc::new(ScriptedGateway::default().reply(
            root.clone(),
            GatewayAnalysis {
                resources: Vec::new(),
                follow_indices: vec![0],
            },
        ));
        let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
        let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());

        let summary = Scheduler::new(task, &config, fetcher, gateway, index)
            .run(CancellationToken::new())
            .await
            .unwrap();

        let expected = if run == 0 { 2 } else { 0 };
        assert_eq!(summary.pages_visited, expected);
        assert_eq!(summary.known_urls, 2);
    }
}

#[tokio::test]
async fn test_interrupt_flushes_history_then_propagates() {
    let server = MockServer::start().await;
    let root = format!("{}/d", server.uri());

    mount_page(&server, "/d", ROOT_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/d/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let task = CrawlTask::new(&root, dir.path().join("out"), "graph datasets", 2).unwrap();

    let token = CancellationToken::new();
    let gateway = Arc::new(
        ScriptedGateway::default()
            .reply(
                root.clone(),
                GatewayAnalysis {
                    resources: Vec::new(),
                    follow_indices: vec![0],
                },
            )
            .cancel_after(root.clone(), token.clone()),
    );
    let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());

    let result = Scheduler::new(task, &config, fetcher, gateway, index)
        .run(token)
        .await;

    assert!(matches!(result, Err(HarvestError::Interrupted)));

    let history = HistoryStore::new(&config.output.history_path).load().await;
    assert_eq!(history.len(), 1);
    assert!(history.iter().any(|u| u.as_str() == root));
}

#[tokio::test]
async fn test_download_failure_is_isolated() {
    let server = MockServer::start().await;
    let root = format!("{}/d", server.uri());

    mount_page(
        &server,
        "/d",
        r#"<a href="/d/missing.zip">old</a><a href="/d/edges.txt">edges</a>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/d/missing.zip"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/edges.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0 1\n"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let task = CrawlTask::new(&root, dir.path().join("out"), "graph datasets", 0).unwrap();

    let gateway = Arc::new(ScriptedGateway::default().reply(
        root.clone(),
        GatewayAnalysis {
            resources: vec![GatewayResource {
                name: Some("edges".to_string()),
                download_indices: vec![0, 1, 9],
                ..GatewayResource::default()
            }],
            follow_indices: Vec::new(),
        },
    ));
    let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());

    let summary = Scheduler::new(task, &config, fetcher, gateway, index.clone())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.resources_downloaded, 1);
    assert_eq!(summary.error_count(), 1);
    assert!(summary.errors[0].context.contains("missing.zip"));
    assert_eq!(index.count().unwrap(), 1);
}

#[tokio::test]
async fn test_root_is_fetched_with_its_query() {
    let server = MockServer::start().await;
    let root = format!("{}/list?page=2", server.uri());

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<p>page two</p>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let task = CrawlTask::new(&root, dir.path().join("out"), "graph datasets", 0).unwrap();

    let gateway = Arc::new(ScriptedGateway::default());
    let index = Arc::new(SqliteIndex::new_in_memory().unwrap());
    let fetcher = Arc::new(Fetcher::new(&config.crawler, &config.user_agent).unwrap());

    let summary = Scheduler::new(task, &config, fetcher, gateway.clone(), index)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.error_count(), 0, "errors: {:?}", summary.errors);
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(gateway.calls(), vec![root]);

    let history = HistoryStore::new(&config.output.history_path).load().await;
    assert!(history
        .iter()
        .any(|u| u.as_str() == format!("{}/list", server.uri())));
}

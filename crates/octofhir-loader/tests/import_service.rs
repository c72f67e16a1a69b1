use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use octofhir_db_memory::InMemoryDedupStore;
use octofhir_loader::{FhirClient, ImportService, LoaderConfig, Observability, PollSummary};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{any, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bundle(id: &str) -> String {
    json!({
        "resourceType": "Bundle",
        "type": "batch",
        "entry": [{
            "fullUrl": format!("urn:uuid:{id}"),
            "resource": {"resourceType": "Patient", "id": id}
        }]
    })
    .to_string()
}

fn service(root: &Path, server: &MockServer) -> ImportService {
    let mut cfg = LoaderConfig::default();
    cfg.publisher.fhir_server_url = server.uri();
    cfg.publisher.max_retry_count = 0;
    cfg.publisher.output_directory = root.join("output");
    cfg.import_service.import_directory = root.join("import");
    cfg.import_service.rejected_directory = root.join("rejected");
    cfg.import_service.polling_interval_ms = 20;

    let client = FhirClient::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
    ImportService::new(
        cfg,
        Arc::new(Observability::with_run_id("import", false)),
        Arc::new(client),
        Arc::new(InMemoryDedupStore::new()),
    )
}

async fn drop_file(root: &Path, name: &str, body: &str) {
    let dir = root.join("import");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(name), body).await.unwrap();
}

#[tokio::test]
async fn poll_routes_each_file_by_outcome() {
    let server = MockServer::start().await;
    Mock::given(path("/Patient/broken"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    drop_file(root.path(), "ok.json", &bundle("fine")).await;
    drop_file(root.path(), "upstream.json", &bundle("broken")).await;
    drop_file(root.path(), "garbage.json", "not a bundle").await;
    drop_file(root.path(), "ignored.txt", "whatever").await;

    let summary = service(root.path(), &server).process_once().await.unwrap();
    assert_eq!(
        summary,
        PollSummary {
            imported: 1,
            rejected: 1,
            retained: 1,
        }
    );

    let import = root.path().join("import");
    assert!(!import.join("ok.json").exists());
    assert!(import.join("upstream.json").exists());
    assert!(import.join("ignored.txt").exists());
    assert!(root.path().join("rejected").join("garbage.json").exists());
}

#[tokio::test]
async fn retained_file_is_redelivered_on_next_poll() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    drop_file(root.path(), "retry.json", &bundle("again")).await;
    let service = service(root.path(), &server);

    let first = service.process_once().await.unwrap();
    assert_eq!(first.retained, 1);

    let second = service.process_once().await.unwrap();
    assert_eq!(second.imported, 1);
    assert!(!root.path().join("import").join("retry.json").exists());
}

#[tokio::test]
async fn run_stops_on_shutdown_signal() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    drop_file(root.path(), "first.json", &bundle("one")).await;
    let service = Arc::new(service(root.path(), &server));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn({
        let service = service.clone();
        async move { service.run(rx).await }
    });

    let target = root.path().join("import").join("first.json");
    for _ in 0..100 {
        if !target.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!target.exists());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("service stopped")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn undecodable_file_is_rejected_without_blocking_others() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    drop_file(root.path(), "b.json", &bundle("valid")).await;
    tokio::fs::write(root.path().join("import").join("a.json"), b"{\"x\":\"\xff\"}")
        .await
        .unwrap();

    let summary = service(root.path(), &server).process_once().await.unwrap();
    assert_eq!(
        summary,
        PollSummary {
            imported: 1,
            rejected: 1,
            retained: 0,
        }
    );
    assert!(root.path().join("rejected").join("a.json").exists());
    assert!(!root.path().join("import").join("a.json").exists());
    assert!(!root.path().join("import").join("b.json").exists());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

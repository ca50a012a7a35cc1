//! End-to-end flow: HTTP ingestion through rule evaluation, aggregation,
//! and webhook delivery.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tower::util::ServiceExt;

use faultline_server::{ServerConfig, app::build_app, build_router};

/// Accept-loop mock webhook receiver collecting request bodies.
struct MockReceiver {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockReceiver {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock receiver");
        let port = listener.local_addr().unwrap().port();
        let requests: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let collected = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let collected = Arc::clone(&collected);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 65536];
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    buf.truncate(n);
                    collected
                        .lock()
                        .await
                        .push(String::from_utf8_lossy(&buf).into_owned());

                    let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}";
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }
}

fn write_config(webhook_url: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    write!(
        file,
        r#"
[[projects]]
id = "p1"
name = "Checkout"
apiKey = "test-key"
retentionDays = 30

[[rules]]
id = "r1"
projectId = "p1"
name = "API errors"
type = "threshold"
threshold = 2
windowMinutes = 5.0
cooldownMinutes = 0

[[rules.channels]]
type = "webhook"
target = "{webhook_url}"
"#
    )
    .expect("write config");
    file
}

fn ingest_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/errors")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer test-key")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn two_occurrences_trigger_one_webhook_dispatch() {
    let receiver = MockReceiver::start().await;
    let config_file = write_config(&receiver.base_url);

    let config = ServerConfig {
        aggregation_window: Duration::from_millis(50),
        cooldown_minutes: 0,
        config_path: Some(config_file.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let (state, tasks) = build_app(&config).await.expect("bootstrap");
    let router = build_router(state.clone());

    let body = r#"{
        "message": "payment gateway timeout",
        "environment": "production",
        "stackTrace": [{"file": "src/pay.js", "line": 42, "function": "charge"}]
    }"#;

    for expected_count in 1..=2 {
        let response = router
            .clone()
            .oneshot(ingest_request(body))
            .await
            .expect("ingest");
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["count"], expected_count);
    }

    // The trigger pass runs on a background task and the bucket flushes
    // after the aggregation window.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let requests = receiver.requests.lock().await;
    assert!(
        !requests.is_empty(),
        "the threshold rule should have dispatched a webhook"
    );
    let delivered = requests.join("\n");
    assert!(delivered.contains("threshold_exceeded"));
    assert!(delivered.contains("payment gateway timeout"));
    drop(requests);

    tasks.stop();
    state.engine.stop();
}

#[tokio::test]
async fn below_threshold_stays_silent() {
    let receiver = MockReceiver::start().await;
    let config_file = write_config(&receiver.base_url);

    let config = ServerConfig {
        aggregation_window: Duration::from_millis(50),
        cooldown_minutes: 0,
        config_path: Some(config_file.path().to_path_buf()),
        ..ServerConfig::default()
    };
    let (state, tasks) = build_app(&config).await.expect("bootstrap");
    let router = build_router(state.clone());

    let response = router
        .oneshot(ingest_request(
            r#"{"message": "lone error", "environment": "production"}"#,
        ))
        .await
        .expect("ingest");
    assert_eq!(response.status(), StatusCode::CREATED);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        receiver.requests.lock().await.is_empty(),
        "one occurrence is below the threshold of two"
    );

    tasks.stop();
    state.engine.stop();
}

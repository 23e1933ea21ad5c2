//! Telegram delivery tests against a mock Bot API.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scanwatch::notification::{
    ChartNotifier, Destination, Notifier, NotifyError, NotifyOutcome, PlaceholderChartRenderer,
    TelegramTransport,
};
use scanwatch_common::config::NotifierConfig;

const SEND_PHOTO: &str = "/bot123:abc/sendPhoto";
const BOT_TOKEN: &str = "123:abc";

fn notifier_with(
    api_base: String,
    timeout_secs: u64,
    chart_dir: &std::path::Path,
) -> ChartNotifier<PlaceholderChartRenderer, TelegramTransport> {
    let config = NotifierConfig {
        api_base,
        timeout_secs,
        ..Default::default()
    };
    ChartNotifier::new(
        PlaceholderChartRenderer::in_dir(chart_dir),
        TelegramTransport::new(&config).unwrap(),
        config.caption_prefix.clone(),
    )
}

fn notifier_for(
    server: &MockServer,
    chart_dir: &std::path::Path,
) -> ChartNotifier<PlaceholderChartRenderer, TelegramTransport> {
    notifier_with(server.uri(), 5, chart_dir)
}

fn destination() -> Destination {
    Destination::new(BOT_TOKEN, "-100200300")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn closed_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_send_photo_delivers_png_and_caption() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PHOTO))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 7 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let charts = tempfile::tempdir().unwrap();
    let notifier = notifier_for(&server, charts.path());

    let outcome = notifier.notify(&destination(), "TCS").await;

    assert_eq!(outcome, NotifyOutcome::Delivered);
    assert_eq!(std::fs::read_dir(charts.path()).unwrap().count(), 0);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = &requests[0].body;
    assert!(contains(body, b"name=\"photo\""));
    assert!(contains(body, b"filename=\"TCS.png\""));
    assert!(contains(body, b"\x89PNG"));
    assert!(contains(body, b"-100200300"));
    assert!(contains(body, b"TradingView: TCS"));
}

#[tokio::test]
async fn test_http_rejection_carries_status_and_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PHOTO))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let charts = tempfile::tempdir().unwrap();
    let notifier = notifier_for(&server, charts.path());

    let outcome = notifier.notify(&destination(), "INFY").await;

    assert_eq!(
        outcome,
        NotifyOutcome::Failed(NotifyError::Rejected {
            status: Some(400),
            description: "Bad Request: chat not found".to_string(),
        })
    );
    assert_eq!(std::fs::read_dir(charts.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_ok_false_envelope_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PHOTO))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let charts = tempfile::tempdir().unwrap();
    let notifier = notifier_for(&server, charts.path());

    let outcome = notifier.notify(&destination(), "WIPRO").await;

    assert_eq!(
        outcome,
        NotifyOutcome::Failed(NotifyError::Rejected {
            status: None,
            description: "Forbidden: bot was blocked by the user".to_string(),
        })
    );
}

#[tokio::test]
async fn test_unreachable_api_is_transport_failure() {
    let charts = tempfile::tempdir().unwrap();
    let notifier = notifier_with(
        format!("http://127.0.0.1:{}", closed_port()),
        5,
        charts.path(),
    );

    let outcome = notifier.notify(&destination(), "SBIN").await;

    match outcome {
        NotifyOutcome::Failed(NotifyError::Transport(message)) => {
            assert!(!message.contains(BOT_TOKEN), "token leaked: {}", message);
        }
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert_eq!(std::fs::read_dir(charts.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_configured_timeout_is_enforced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SEND_PHOTO))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "ok": true }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let charts = tempfile::tempdir().unwrap();
    let notifier = notifier_with(server.uri(), 1, charts.path());

    let outcome = notifier.notify(&destination(), "TCS").await;

    match outcome {
        NotifyOutcome::Failed(NotifyError::Transport(message)) => {
            assert!(message.starts_with("request timed out"), "{}", message);
            assert!(!message.contains(BOT_TOKEN), "token leaked: {}", message);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

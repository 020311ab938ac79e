//! Integration tests: start the gateway on a free port and drive the full
//! webhook -> ack -> worker -> callback cycle against mock backend and callback
//! servers. The server tasks are left running when each test ends.

use promptrelay::config::{BackendKind, Config, ResponseType, RouteConfig, SecretProviderKind};
use promptrelay::gateway;
use promptrelay::secrets;
use promptrelay::signing;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

const TEXT_SECRET: &str = "text-signing-secret";
const IMAGE_SECRET: &str = "image-signing-secret";

/// Config with a text and an image route, inline secrets, and backends pointed at `backend_url`.
fn test_config(port: u16, backend_url: &str) -> Config {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.backends.text_base_url = Some(backend_url.to_string());
    config.backends.image_base_url = Some(backend_url.to_string());
    config.delivery.retry_delay_ms = 10;
    config.secrets.provider = SecretProviderKind::Inline;
    config.routes.insert(
        "claude_sonnet".to_string(),
        RouteConfig {
            kind: BackendKind::Text,
            model_id: "claude-sonnet-4".to_string(),
            response_type: ResponseType::InChannel,
        },
    );
    config.routes.insert(
        "stable_image_ultra".to_string(),
        RouteConfig {
            kind: BackendKind::Image,
            model_id: "stable-image-ultra-v1".to_string(),
            response_type: ResponseType::InChannel,
        },
    );
    for (command, secret, key) in [
        ("CLAUDE_SONNET", TEXT_SECRET, "text-api-key"),
        ("STABLE_IMAGE_ULTRA", IMAGE_SECRET, "image-api-key"),
    ] {
        config.secrets.inline.insert(
            format!("/promptrelay/dev/{}/SIGNING_SECRET", command),
            secret.to_string(),
        );
        config.secrets.inline.insert(
            format!("/promptrelay/dev/{}/API_KEY", command),
            key.to_string(),
        );
    }
    config
}

/// Spawn the gateway and wait for the health endpoint to answer.
async fn start_gateway(config: Config) -> String {
    let port = config.gateway.port;
    let provider = secrets::provider_from_config(&config);
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, provider).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&base).send().await {
            if resp.status().is_success() {
                return base;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway did not become healthy on {}", base);
}

/// POST a signed webhook for `command` with the given body bytes.
async fn post_signed(
    base: &str,
    command: &str,
    secret: &str,
    body: &str,
    timestamp: i64,
) -> reqwest::Response {
    let ts = timestamp.to_string();
    let sig = signing::sign_payload(secret, &ts, body.as_bytes());
    reqwest::Client::new()
        .post(format!("{}/webhook/{}", base, command))
        .header("X-Webhook-Timestamp", ts)
        .header("X-Webhook-Signature", sig)
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .expect("send webhook")
}

/// Wait until the mock callback server has received `n` requests (or time out).
async fn wait_for_callbacks(server: &MockServer, n: usize) -> Vec<wiremock::Request> {
    for _ in 0..100 {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= n {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("callback server did not receive {} request(s) in time", n);
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn health_responds_with_running() {
    let backend = MockServer::start().await;
    let base = start_gateway(test_config(free_port(), &backend.uri())).await;

    let json: serde_json::Value = reqwest::get(&base)
        .await
        .expect("health request")
        .json()
        .await
        .expect("parse JSON");
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("routes").and_then(|v| v.as_u64()), Some(2));
}

#[tokio::test]
async fn text_command_acks_and_delivers_reply() {
    let backend = MockServer::start().await;
    let callback = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": "generated reply" }]
        })))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback)
        .await;

    let base = start_gateway(test_config(free_port(), &backend.uri())).await;
    let body = format!(
        r#"{{"text":"hello","responseUrl":"{}/callback"}}"#,
        callback.uri()
    );

    let resp = post_signed(&base, "claude_sonnet", TEXT_SECRET, &body, now()).await;
    assert_eq!(resp.status(), 200);
    let ack: serde_json::Value = resp.json().await.expect("ack JSON");
    assert!(ack.get("requestId").and_then(|v| v.as_str()).is_some());

    let received = wait_for_callbacks(&callback, 1).await;
    let delivered: serde_json::Value =
        serde_json::from_slice(&received[0].body).expect("callback JSON");
    assert_eq!(
        delivered.get("responseType").and_then(|v| v.as_str()),
        Some("in_channel")
    );
    assert_eq!(
        delivered.get("text").and_then(|v| v.as_str()),
        Some("generated reply")
    );
}

#[tokio::test]
async fn image_command_delivers_attachment() {
    let backend = MockServer::start().await;
    let callback = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/images"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "images": [{ "url": "https://cdn.example.com/img/42.png" }]
        })))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback)
        .await;

    let base = start_gateway(test_config(free_port(), &backend.uri())).await;
    let body = format!(
        r#"{{"text":"a lighthouse at dusk","responseUrl":"{}/callback"}}"#,
        callback.uri()
    );

    let resp = post_signed(&base, "stable_image_ultra", IMAGE_SECRET, &body, now()).await;
    assert_eq!(resp.status(), 200);

    let received = wait_for_callbacks(&callback, 1).await;
    let delivered: serde_json::Value =
        serde_json::from_slice(&received[0].body).expect("callback JSON");
    let attachment = &delivered["attachments"][0];
    assert_eq!(
        attachment.get("imageUrl").and_then(|v| v.as_str()),
        Some("https://cdn.example.com/img/42.png")
    );
    assert!(attachment.get("title").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn stale_timestamp_is_unauthorized_and_nothing_runs() {
    let backend = MockServer::start().await;
    let callback = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callback)
        .await;

    let base = start_gateway(test_config(free_port(), &backend.uri())).await;
    let body = format!(
        r#"{{"text":"hello","responseUrl":"{}/callback"}}"#,
        callback.uri()
    );

    // Signed 10 minutes ago; the freshness window is 5 minutes.
    let resp = post_signed(&base, "claude_sonnet", TEXT_SECRET, &body, now() - 600).await;
    assert_eq!(resp.status(), 401);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(callback
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
    assert!(backend
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let backend = MockServer::start().await;
    let base = start_gateway(test_config(free_port(), &backend.uri())).await;
    let body = r#"{"text":"hello","responseUrl":"https://hooks.example.com/cb"}"#;

    // Signed with the wrong secret.
    let resp = post_signed(&base, "claude_sonnet", "wrong-secret", body, now()).await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn unknown_command_is_not_found() {
    let backend = MockServer::start().await;
    let base = start_gateway(test_config(free_port(), &backend.uri())).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/webhook/no_such_command", base))
        .body("{}")
        .send()
        .await
        .expect("send webhook");
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn invalid_body_is_a_client_error() {
    let backend = MockServer::start().await;
    let base = start_gateway(test_config(free_port(), &backend.uri())).await;

    // Valid signature over a body with no callback URL.
    let body = r#"{"text":"hello"}"#;
    let resp = post_signed(&base, "claude_sonnet", TEXT_SECRET, body, now()).await;
    assert_eq!(resp.status(), 400);

    // Valid signature, well-formed JSON, but a non-http callback URL.
    let body = r#"{"text":"hello","responseUrl":"ftp://example.com/cb"}"#;
    let resp = post_signed(&base, "claude_sonnet", TEXT_SECRET, body, now()).await;
    assert_eq!(resp.status(), 422);
}

// Integration tests for `KeaClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use atlas_console::config::KeaConfig;
use atlas_console::kea::{KeaClient, KeaCommand, KeaResultCode};

// ── Helpers ─────────────────────────────────────────────────────────

fn client_for(url: &str, timeout_secs: u64) -> KeaClient {
    KeaClient::from_config(&KeaConfig {
        url: Some(url.to_string()),
        timeout_secs,
        ..Default::default()
    })
    .unwrap()
}

async fn setup() -> (MockServer, KeaClient) {
    let server = MockServer::start().await;
    let client = client_for(&server.uri(), 5);
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_config_get_sends_envelope() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_json(json!({ "command": "config-get", "service": ["dhcp4"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "result": 0, "arguments": { "Dhcp4": { "valid-lifetime": 4000 } } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let responses = client.config_get("dhcp4").await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].code(), KeaResultCode::Success);
    assert_eq!(
        responses[0].arguments.as_ref().unwrap()["Dhcp4"]["valid-lifetime"],
        json!(4000)
    );
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "result": 3, "text": "0 IPv4 lease(s) found." }
        ])))
        .mount(&server)
        .await;

    let responses = client.leases4(Some(7)).await.unwrap();
    assert_eq!(responses[0].code(), KeaResultCode::Empty);
}

#[tokio::test]
async fn test_bare_object_response() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": 0, "text": "2.4.1"
        })))
        .mount(&server)
        .await;

    let responses = client.version().await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].text.as_deref(), Some("2.4.1"));
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    let client = KeaClient::from_config(&KeaConfig {
        url: Some(server.uri()),
        username: Some("kea".to_string()),
        password: Some("secret".to_string()),
        ..Default::default()
    })
    .unwrap();

    Mock::given(method("POST"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "result": 0 }])))
        .expect(1)
        .mount(&server)
        .await;

    client.status("dhcp4").await.unwrap();
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_error_result_carries_text() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "result": 1, "text": "unable to forward command to the dhcp6 service" }
        ])))
        .mount(&server)
        .await;

    let err = client
        .execute(&KeaCommand::new("config-get").for_service("dhcp6"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "upstream_error");
    assert!(err.to_string().contains("dhcp6 service"));
}

#[tokio::test]
async fn test_http_error_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = client.version().await.unwrap_err();
    assert_eq!(err.kind(), "upstream_error");
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let server = MockServer::start().await;
    let client = client_for(&server.uri(), 1);

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "result": 0 }]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = client.version().await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
}

#[tokio::test]
async fn test_unreachable_agent() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client_for(&url, 2).version().await.unwrap_err();
    assert_eq!(err.kind(), "setup_required");
}

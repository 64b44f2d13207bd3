//! HTTP gateway over a real listener on localhost

use std::net::TcpListener;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::oneshot;

use atlas_console::app;
use atlas_console::config::ConsoleConfig;
use atlas_console::store::MemoryStore;
use atlas_console::web::{self, AppState};

struct Gateway {
    base: String,
    http: reqwest::Client,
    state: AppState,
    _stop: oneshot::Sender<()>,
    _root: TempDir,
}

impl Gateway {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn as_tenant(&self, builder: reqwest::RequestBuilder, tenant: &str) -> reqwest::RequestBuilder {
        builder.header("x-tenant-id", tenant).header("x-user-id", "alice")
    }
}

async fn start() -> Gateway {
    let root = TempDir::new().unwrap();
    let mut config = ConsoleConfig::default();
    config.backup.directory = root.path().join("backups");
    config.dns.config_files = Vec::new();

    let state = app::build_state(&config, Arc::new(MemoryStore::new())).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let (stop, stopped) = oneshot::channel::<()>();
    let serving = state.clone();
    tokio::spawn(async move {
        let _ = web::serve_listener(listener, serving, async {
            let _ = stopped.await;
        })
        .await;
    });

    Gateway {
        base,
        http: reqwest::Client::new(),
        state,
        _stop: stop,
        _root: root,
    }
}

async fn create_example_zone(gw: &Gateway, tenant: &str) {
    let response = gw
        .as_tenant(gw.http.post(gw.url("/api/zones")), tenant)
        .json(&json!({
            "name": "example.com",
            "primaryNs": "ns1.example.com",
            "adminEmail": "admin@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_zone_and_record_lifecycle() {
    let gw = start().await;
    create_example_zone(&gw, "acme").await;

    let created = gw
        .as_tenant(gw.http.post(gw.url("/api/zones/example.com/records")), "acme")
        .json(&json!({ "name": "www", "type": "A", "value": "192.168.1.1", "ttl": 300 }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await.unwrap();
    assert_eq!(body["data"]["value"], "192.168.1.1");
    assert_eq!(body["warnings"], json!([]));
    assert_eq!(body["sync"]["state"], "skipped");

    let listed: Value = gw
        .as_tenant(gw.http.get(gw.url("/api/zones/example.com/records")), "acme")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let updated = gw
        .as_tenant(gw.http.patch(gw.url("/api/zones/example.com/records")), "acme")
        .json(&json!({
            "key": { "name": "www", "type": "A" },
            "update": { "ttl": 600 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["data"]["ttl"], 600);

    let export = gw
        .as_tenant(gw.http.get(gw.url("/api/zones/example.com/export")), "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(export.status(), StatusCode::OK);
    let text = export.text().await.unwrap();
    assert!(text.contains("$ORIGIN example.com."));
    assert!(text.contains("192.168.1.1"));

    let deleted = gw
        .as_tenant(gw.http.delete(gw.url("/api/zones/example.com/records")), "acme")
        .json(&json!({ "name": "www", "type": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let audit: Value = gw
        .as_tenant(gw.http.get(gw.url("/api/audit?limit=10")), "acme")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = audit.as_array().unwrap();
    assert!(entries.len() >= 4);
    assert!(entries.iter().all(|e| e["userId"] == "alice"));
}

#[tokio::test]
async fn test_validation_errors_are_structured() {
    let gw = start().await;
    create_example_zone(&gw, "acme").await;

    let response = gw
        .as_tenant(gw.http.post(gw.url("/api/zones/example.com/records")), "acme")
        .json(&json!({ "name": "www", "type": "A", "value": "999.1.1.1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
    assert!(body["errors"].as_array().unwrap().iter().any(|e| e.as_str().unwrap().contains("out of range")));

    let report: Value = gw
        .http
        .post(gw.url("/api/records/validate"))
        .json(&json!({ "name": "@", "type": "MX", "value": "mail.example.com." }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["isValid"], false);
}

#[tokio::test]
async fn test_tenant_header_scopes_every_read() {
    let gw = start().await;
    create_example_zone(&gw, "tenant-a").await;

    let other = gw
        .as_tenant(gw.http.get(gw.url("/api/zones/example.com/records")), "tenant-b")
        .send()
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::NOT_FOUND);

    let zones: Value = gw
        .as_tenant(gw.http.get(gw.url("/api/zones")), "tenant-b")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(zones, json!([]));

    let duplicate = gw
        .as_tenant(gw.http.post(gw.url("/api/zones")), "tenant-a")
        .json(&json!({
            "name": "example.com",
            "primaryNs": "ns1.example.com",
            "adminEmail": "admin@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unconfigured_upstreams() {
    let gw = start().await;

    let status: Value = gw
        .http
        .get(gw.url("/api/dns/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["source"], "example");
    assert!(status["message"].as_str().unwrap().contains("example data"));

    let kea = gw
        .http
        .post(gw.url("/api/kea/command"))
        .json(&json!({ "command": "version-get" }))
        .send()
        .await
        .unwrap();
    assert_eq!(kea.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = kea.json().await.unwrap();
    assert_eq!(body["error"], "setup_required");
}

#[tokio::test]
async fn test_monitoring_endpoints() {
    let gw = start().await;

    let health = gw.http.get(gw.url("/api/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let unknown = gw
        .http
        .post(gw.url(&format!("/api/alerts/{}/acknowledge", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let metrics = gw.http.get(gw.url("/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), StatusCode::OK);
    let text = metrics.text().await.unwrap();
    assert!(text.contains("atlas_console_requests_total"));

    assert!(gw.state.monitor.metrics().queries() >= 2);
    assert_eq!(gw.state.monitor.metrics().errors(), 0);
}

#[tokio::test]
async fn test_backup_and_restore_over_http() {
    let gw = start().await;
    create_example_zone(&gw, "acme").await;
    gw.as_tenant(gw.http.post(gw.url("/api/zones/example.com/records")), "acme")
        .json(&json!({ "name": "www", "type": "A", "value": "93.184.216.34" }))
        .send()
        .await
        .unwrap();

    let backup = gw
        .as_tenant(gw.http.post(gw.url("/api/backups")), "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(backup.status(), StatusCode::CREATED);
    let manifest: Value = backup.json().await.unwrap();
    let id = manifest["id"].as_str().unwrap().to_string();
    assert_eq!(manifest["tenantId"], "acme");

    let listed: Value = gw.http.get(gw.url("/api/backups")).send().await.unwrap().json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let foreign = gw
        .as_tenant(gw.http.post(gw.url(&format!("/api/backups/{}/restore", id))), "intruder")
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    gw.as_tenant(gw.http.delete(gw.url("/api/zones/example.com")), "acme")
        .send()
        .await
        .unwrap();
    let restored = gw
        .as_tenant(gw.http.post(gw.url(&format!("/api/backups/{}/restore", id))), "acme")
        .send()
        .await
        .unwrap();
    assert_eq!(restored.status(), StatusCode::OK);
    let report: Value = restored.json().await.unwrap();
    assert_eq!(report["zonesCreated"], 1);
    assert_eq!(report["recordsRestored"], 1);
}

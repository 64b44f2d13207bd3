//! HTTP gateway
//!
//! Exposes the DNS service, backups, monitoring and the Kea passthrough as a
//! JSON API, plus a WebSocket stream of monitoring events.
//!
//! # Features
//!
//! * Tenant and actor taken from headers set by the upstream auth layer
//! * Uniform `{error, message}` bodies for every failure
//! * Per-request latency and 5xx accounting feeding the monitor
//! * Prometheus exposition at `/metrics`

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::backup::BackupManager;
use crate::dns::record::TenantId;
use crate::dns::DnsService;
use crate::errors::{ConsoleError, Result};
use crate::kea::KeaClient;
use crate::monitoring::Monitor;

pub mod context;
pub mod handlers;
pub mod response;
pub mod websocket;

/// Shared handles every handler sees
#[derive(Clone)]
pub struct AppState {
    pub dns: Arc<DnsService>,
    pub backups: Arc<BackupManager>,
    pub monitor: Arc<Monitor>,
    pub kea: Option<Arc<KeaClient>>,
    pub default_tenant: TenantId,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/zones", get(handlers::list_zones).post(handlers::create_zone))
        .route(
            "/api/zones/:zone",
            get(handlers::get_zone)
                .patch(handlers::update_zone)
                .delete(handlers::delete_zone),
        )
        .route("/api/zones/:zone/export", get(handlers::export_zone))
        .route(
            "/api/zones/:zone/records",
            get(handlers::list_records)
                .post(handlers::create_record)
                .patch(handlers::update_record)
                .delete(handlers::delete_record),
        )
        .route("/api/zones/:zone/records/bulk", post(handlers::bulk_create_records))
        .route("/api/zones/:zone/records/bulk-delete", post(handlers::bulk_delete_records))
        .route("/api/records/validate", post(handlers::validate_record))
        .route("/api/tsig-keys", get(handlers::list_tsig_keys).post(handlers::create_tsig_key))
        .route("/api/tsig-keys/:name", axum::routing::delete(handlers::delete_tsig_key))
        .route("/api/dns/status", get(handlers::dns_status))
        .route("/api/dns/ddns", get(handlers::ddns_status))
        .route("/api/dns/live-zones", get(handlers::live_zones))
        .route("/api/dns/live-zones/:zone/records", get(handlers::live_records))
        .route("/api/backups", get(handlers::list_backups).post(handlers::create_backup))
        .route("/api/backups/cleanup", post(handlers::cleanup_backups))
        .route("/api/backups/:id/restore", post(handlers::restore_backup))
        .route("/api/health", get(handlers::health))
        .route("/api/health/check", post(handlers::run_health_checks))
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/:id/acknowledge", post(handlers::acknowledge_alert))
        .route("/api/audit", get(handlers::audit_log))
        .route("/api/kea/command", post(handlers::kea_command))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/ws", get(websocket::handle_events_ws))
        .layer(middleware::from_fn_with_state(state.clone(), context::track_requests))
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    listener.set_nonblocking(true)?;
    let local = listener.local_addr()?;
    info!(address = %local, "Console gateway listening");

    axum::Server::from_tcp(listener)
        .map_err(|e| ConsoleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ConsoleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;

    info!("Console gateway stopped");
    Ok(())
}

/// Bind `addr` and serve until Ctrl+C
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)?;
    serve_listener(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown requested");
    })
    .await
}

//! Request identity and request accounting
//!
//! Authentication happens upstream; this layer only reads the tenant and
//! actor it forwards.

use std::time::Instant;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use crate::dns::record::TenantId;
use crate::dns::service::RequestContext;
use crate::errors::ConsoleError;

use super::AppState;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const ANONYMOUS_ACTOR: &str = "anonymous";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extracted caller identity
pub struct Caller(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ConsoleError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let tenant = header(&parts.headers, TENANT_HEADER).unwrap_or_else(|| state.default_tenant.to_string());
        if tenant.len() > 128 || tenant.chars().any(|c| c.is_control()) {
            return Err(ConsoleError::InvalidRequest("Invalid tenant id".to_string()));
        }
        let actor = header(&parts.headers, USER_HEADER).unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());
        let source_ip = header(&parts.headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()));
        let user_agent = header(&parts.headers, USER_AGENT.as_str());

        Ok(Caller(
            RequestContext::new(TenantId::new(tenant), &actor).with_client(source_ip, user_agent),
        ))
    }
}

/// Count every request and every server-side failure
pub async fn track_requests<B>(State(state): State<AppState>, request: Request<B>, next: Next<B>) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let metrics = state.monitor.metrics();
    metrics.record_query(elapsed);
    if response.status().is_server_error() {
        metrics.record_error();
    }
    debug!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Request handled"
    );
    response
}

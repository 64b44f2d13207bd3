//! HTTP handlers
//!
//! Thin adapters: extract, call the service, serialize.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::backup::{BackupManifest, BackupSummary};
use crate::dns::provider::{DdnsStatus, LiveRecord, LiveView, LiveZone, ProviderStatus};
use crate::dns::record::{
    NewZone, Record, RecordCandidate, RecordFilter, RecordKey, RecordUpdate, TsigKeyMetadata, Zone, ZoneFilter,
    ZoneUpdate,
};
use crate::dns::service::{CreatedTsigKey, RestoreReport, WriteOutcome};
use crate::dns::validation::{self, ValidationReport};
use crate::errors::{ConsoleError, Result};
use crate::kea::{KeaCommand, KeaResponse};
use crate::monitoring::{Alert, HealthStatus};
use crate::store::AuditLogEntry;

use super::context::Caller;
use super::AppState;

type Created<T> = (StatusCode, Json<T>);

fn created<T>(value: T) -> Created<T> {
    (StatusCode::CREATED, Json(value))
}

// ---- zones ----

pub async fn list_zones(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(filter): Query<ZoneFilter>,
) -> Result<Json<Vec<Zone>>> {
    Ok(Json(state.dns.list_zones(&ctx, &filter).await?))
}

pub async fn create_zone(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(zone): Json<NewZone>,
) -> Result<Created<WriteOutcome<Zone>>> {
    Ok(created(state.dns.create_zone(&ctx, zone).await?))
}

pub async fn get_zone(State(state): State<AppState>, Caller(ctx): Caller, Path(zone): Path<String>) -> Result<Json<Zone>> {
    Ok(Json(state.dns.get_zone(&ctx, &zone).await?))
}

pub async fn update_zone(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(update): Json<ZoneUpdate>,
) -> Result<Json<Zone>> {
    Ok(Json(state.dns.update_zone(&ctx, &zone, &update).await?))
}

pub async fn delete_zone(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
) -> Result<StatusCode> {
    state.dns.delete_zone(&ctx, &zone).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn export_zone(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
) -> Result<impl IntoResponse> {
    let text = state.dns.export_zone(&ctx, &zone).await?;
    Ok(([(header::CONTENT_TYPE, "text/dns; charset=utf-8")], text))
}

// ---- records ----

pub async fn list_records(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Query(filter): Query<RecordFilter>,
) -> Result<Json<Vec<Record>>> {
    Ok(Json(state.dns.list_records(&ctx, &zone, &filter).await?))
}

pub async fn create_record(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(candidate): Json<RecordCandidate>,
) -> Result<Created<WriteOutcome<Record>>> {
    Ok(created(state.dns.create_record(&ctx, &zone, &candidate).await?))
}

#[derive(Debug, Deserialize)]
pub struct RecordPatch {
    pub key: RecordKey,
    pub update: RecordUpdate,
}

pub async fn update_record(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<WriteOutcome<Record>>> {
    Ok(Json(state.dns.update_record(&ctx, &zone, &patch.key, &patch.update).await?))
}

pub async fn delete_record(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(key): Json<RecordKey>,
) -> Result<Json<WriteOutcome<Vec<Record>>>> {
    Ok(Json(state.dns.delete_record(&ctx, &zone, &key).await?))
}

#[derive(Debug, Deserialize)]
pub struct BulkCreate {
    pub records: Vec<RecordCandidate>,
}

pub async fn bulk_create_records(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(body): Json<BulkCreate>,
) -> Result<Created<WriteOutcome<Vec<Record>>>> {
    Ok(created(state.dns.bulk_create_records(&ctx, &zone, &body.records).await?))
}

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    pub keys: Vec<RecordKey>,
}

pub async fn bulk_delete_records(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(zone): Path<String>,
    Json(body): Json<BulkDelete>,
) -> Result<Json<WriteOutcome<Vec<Record>>>> {
    Ok(Json(state.dns.bulk_delete_records(&ctx, &zone, &body.keys).await?))
}

/// Validate one record without writing anything
pub async fn validate_record(Json(candidate): Json<RecordCandidate>) -> Json<ValidationReport> {
    Json(validation::validate_record(&candidate))
}

// ---- TSIG keys ----

pub async fn list_tsig_keys(State(state): State<AppState>, Caller(ctx): Caller) -> Result<Json<Vec<TsigKeyMetadata>>> {
    Ok(Json(state.dns.list_tsig_keys(&ctx).await?))
}

#[derive(Debug, Deserialize)]
pub struct NewKeyRequest {
    pub name: String,
    pub algorithm: Option<String>,
    pub secret: Option<String>,
}

pub async fn create_tsig_key(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(request): Json<NewKeyRequest>,
) -> Result<Created<CreatedTsigKey>> {
    let key = state
        .dns
        .create_tsig_key(&ctx, &request.name, request.algorithm.as_deref(), request.secret.as_deref())
        .await?;
    Ok(created(key))
}

pub async fn delete_tsig_key(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    state.dns.delete_tsig_key(&ctx, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- live nameserver views ----

pub async fn dns_status(State(state): State<AppState>) -> Result<Json<LiveView<ProviderStatus>>> {
    Ok(Json(state.dns.provider().status_view().await?))
}

pub async fn ddns_status(State(state): State<AppState>) -> Result<Json<LiveView<DdnsStatus>>> {
    Ok(Json(state.dns.provider().ddns_view().await?))
}

pub async fn live_zones(State(state): State<AppState>) -> Result<Json<LiveView<Vec<LiveZone>>>> {
    Ok(Json(state.dns.provider().zones_view().await?))
}

pub async fn live_records(
    State(state): State<AppState>,
    Path(zone): Path<String>,
) -> Result<Json<LiveView<Vec<LiveRecord>>>> {
    Ok(Json(state.dns.provider().records_view(&zone).await?))
}

// ---- backups ----

pub async fn list_backups(State(state): State<AppState>) -> Result<Json<Vec<BackupSummary>>> {
    Ok(Json(state.backups.list_backups().await?))
}

/// Tenant-scoped backup of the caller's zones
pub async fn create_backup(State(state): State<AppState>, Caller(ctx): Caller) -> Result<Created<BackupManifest>> {
    Ok(created(state.backups.perform_full_backup(Some(&ctx.tenant)).await?))
}

pub async fn cleanup_backups(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let deleted = state.backups.cleanup_old_backups().await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// Restore the caller's zones from a backup
pub async fn restore_backup(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<RestoreReport>> {
    let snapshots: Vec<_> = state
        .backups
        .load_zone_snapshots(&id)
        .await?
        .into_iter()
        .filter(|s| s.zone.tenant_id == ctx.tenant)
        .collect();
    if snapshots.is_empty() {
        return Err(ConsoleError::not_found(format!("zones of tenant {} in backup {}", ctx.tenant, id)));
    }
    Ok(Json(state.dns.restore_zones(&ctx, &snapshots).await?))
}

// ---- monitoring ----

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.monitor.get_health_status())
}

pub async fn run_health_checks(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.monitor.run_health_checks().await)
}

pub async fn list_alerts(State(state): State<AppState>) -> Json<Vec<Alert>> {
    Json(state.monitor.alerts())
}

pub async fn acknowledge_alert(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Alert>> {
    Ok(Json(state.monitor.acknowledge_alert(id)?))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let text = state.monitor.metrics().render_prometheus()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

pub async fn audit_log(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>> {
    Ok(Json(state.dns.audit_log(&ctx, query.limit.unwrap_or(100)).await?))
}

// ---- DHCP ----

pub async fn kea_command(State(state): State<AppState>, Json(command): Json<KeaCommand>) -> Result<Json<Vec<KeaResponse>>> {
    let kea = state
        .kea
        .as_ref()
        .ok_or_else(|| ConsoleError::UpstreamUnavailable("Kea control agent is not configured".to_string()))?;
    Ok(Json(kea.execute(&command).await?))
}

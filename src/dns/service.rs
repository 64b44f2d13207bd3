//! DNS write orchestration
//!
//! Every mutation takes the same path: validate, persist, then push to the
//! live nameserver. The store is the system of record; a failed push is
//! surfaced as a warning on an otherwise successful write, and every
//! outcome lands in the audit log.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::dns::provider::ProviderHandle;
use crate::dns::record::{
    NewZone, Record, RecordCandidate, RecordFilter, RecordKey, RecordUpdate, TenantId, TsigKeyMetadata, Zone,
    ZoneFilter, ZoneUpdate,
};
use crate::dns::tsig;
use crate::dns::validation::{self, ValidationReport};
use crate::dns::zone_file;
use crate::errors::{ConsoleError, Result};
use crate::store::{check_bulk_size, single_match, AuditLogEntry, AuditOperation, Store, ZoneSnapshot};

/// Who is asking, as forwarded by the upstream auth layer
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub actor: String,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(tenant: TenantId, actor: &str) -> Self {
        RequestContext {
            tenant,
            actor: actor.to_string(),
            source_ip: None,
            user_agent: None,
        }
    }

    pub fn with_client(mut self, source_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.source_ip = source_ip;
        self.user_agent = user_agent;
        self
    }

    fn audit(&self, operation: AuditOperation, resource_type: &str) -> AuditLogEntry {
        AuditLogEntry::new(&self.tenant, &self.actor, operation, resource_type)
            .with_client(self.source_ip.clone(), self.user_agent.clone())
    }
}

/// What happened when a stored change was pushed to the nameserver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SyncOutcome {
    Synced,
    Skipped { reason: String },
    Failed { message: String },
}

/// A committed write with its non-blocking warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome<T> {
    pub data: T,
    pub warnings: Vec<String>,
    pub sync: SyncOutcome,
}

/// A freshly created key; the only time the secret is handed out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTsigKey {
    pub key: TsigKeyMetadata,
    pub secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub zones_created: usize,
    pub records_restored: usize,
    pub skipped: Vec<String>,
}

pub struct DnsService {
    store: Arc<dyn Store>,
    provider: ProviderHandle,
    key_file: Option<PathBuf>,
}

/// Canonical zone name: trimmed, lower case, no trailing dot
pub fn normalize_zone_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn rejected(report: ValidationReport) -> ConsoleError {
    ConsoleError::Validation(report.errors)
}

impl DnsService {
    pub fn new(store: Arc<dyn Store>, provider: ProviderHandle) -> Self {
        DnsService {
            store,
            provider,
            key_file: None,
        }
    }

    /// Regenerate this include file whenever TSIG keys change
    pub fn with_key_file(mut self, path: Option<PathBuf>) -> Self {
        self.key_file = path;
        self
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    async fn audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.store.append_audit(&entry).await {
            warn!(operation = %entry.operation, error = %e, "Failed to append audit log entry");
        }
    }

    /// Record the outcome of `result` and hand it back unchanged
    async fn audited<T>(&self, entry: AuditLogEntry, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.audit(entry).await;
                Ok(value)
            }
            Err(e) => {
                self.audit(entry.failed(&e)).await;
                Err(e)
            }
        }
    }

    async fn note_key_usage(&self, ctx: &RequestContext) {
        let key_name = match &self.provider {
            ProviderHandle::Available(provider) => provider.key_name(),
            ProviderHandle::Unavailable { .. } => None,
        };
        if let Some(name) = key_name {
            match self.store.record_tsig_usage(&ctx.tenant, &name).await {
                Ok(()) | Err(ConsoleError::NotFound(_)) => {}
                Err(e) => debug!(key = %name, error = %e, "Failed to record TSIG key usage"),
            }
        }
    }

    async fn push_upsert(&self, ctx: &RequestContext, zone: &str, records: &[Record]) -> SyncOutcome {
        let provider = match &self.provider {
            ProviderHandle::Available(provider) => provider,
            ProviderHandle::Unavailable { reason } => return SyncOutcome::Skipped { reason: reason.clone() },
        };
        let mut failures = Vec::new();
        for record in records {
            if let Err(e) = provider.upsert_record(zone, record).await {
                failures.push(format!("{} {}: {}", record.name, record.record_type, e));
            }
        }
        self.sync_result(ctx, zone, failures).await
    }

    async fn push_delete(&self, ctx: &RequestContext, zone: &str, key: &RecordKey, removed: &[Record]) -> SyncOutcome {
        let provider = match &self.provider {
            ProviderHandle::Available(provider) => provider,
            ProviderHandle::Unavailable { reason } => return SyncOutcome::Skipped { reason: reason.clone() },
        };
        let mut failures = Vec::new();
        if key.value.is_some() {
            for record in removed {
                if let Err(e) = provider.delete_record_data(zone, record).await {
                    failures.push(format!("{}: {}", key, e));
                }
            }
        } else if let Err(e) = provider.delete_record(zone, &key.name, key.record_type).await {
            failures.push(format!("{}: {}", key, e));
        }
        self.sync_result(ctx, zone, failures).await
    }

    async fn sync_result(&self, ctx: &RequestContext, zone: &str, failures: Vec<String>) -> SyncOutcome {
        if failures.is_empty() {
            self.note_key_usage(ctx).await;
            SyncOutcome::Synced
        } else {
            warn!(zone = %zone, failures = failures.len(), "Nameserver sync failed; database change kept");
            SyncOutcome::Failed {
                message: failures.join("; "),
            }
        }
    }

    fn outcome<T>(data: T, mut warnings: Vec<String>, sync: SyncOutcome) -> WriteOutcome<T> {
        if let SyncOutcome::Failed { ref message } = sync {
            warnings.push(format!("Saved, but the nameserver was not updated: {}", message));
        }
        WriteOutcome { data, warnings, sync }
    }

    // ---- zones ----

    pub async fn list_zones(&self, ctx: &RequestContext, filter: &ZoneFilter) -> Result<Vec<Zone>> {
        self.store.get_zones(&ctx.tenant, filter).await
    }

    pub async fn get_zone(&self, ctx: &RequestContext, name: &str) -> Result<Zone> {
        self.store.get_zone(&ctx.tenant, &normalize_zone_name(name)).await
    }

    pub async fn create_zone(&self, ctx: &RequestContext, zone: NewZone) -> Result<WriteOutcome<Zone>> {
        let mut zone = zone;
        zone.name = normalize_zone_name(&zone.name);
        let entry = ctx
            .audit(AuditOperation::ZoneCreated, "zone")
            .with_resource_id(zone.name.as_str())
            .with_details(json!({ "type": zone.zone_type.to_string(), "primaryNs": zone.primary_ns }));

        let report = validation::validate_zone(&zone);
        let result = if report.is_valid {
            self.store.create_zone(&ctx.tenant, &zone, &ctx.actor).await
        } else {
            Err(rejected(report.clone()))
        };
        let created = self.audited(entry, result).await?;
        info!(tenant = %ctx.tenant, zone = %created.name, "Zone created");
        Ok(WriteOutcome {
            data: created,
            warnings: report.warnings,
            sync: SyncOutcome::Skipped {
                reason: "Zone definitions are managed in the nameserver configuration".to_string(),
            },
        })
    }

    pub async fn update_zone(&self, ctx: &RequestContext, name: &str, update: &ZoneUpdate) -> Result<Zone> {
        let name = normalize_zone_name(name);
        let entry = ctx
            .audit(AuditOperation::ZoneUpdated, "zone")
            .with_resource_id(name.as_str())
            .with_details(serde_json::to_value(update)?);

        let result: Result<Zone> = async {
            let mut merged = self.store.get_zone(&ctx.tenant, &name).await?;
            update.apply(&mut merged);
            let report = validation::validate_zone(&NewZone::from(&merged));
            if !report.is_valid {
                return Err(rejected(report));
            }
            self.store.update_zone(&ctx.tenant, &name, update).await
        }
        .await;
        self.audited(entry, result).await
    }

    pub async fn delete_zone(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        let name = normalize_zone_name(name);
        let entry = ctx.audit(AuditOperation::ZoneDeleted, "zone").with_resource_id(name.as_str());
        let result = self.store.delete_zone(&ctx.tenant, &name).await;
        self.audited(entry, result).await?;
        info!(tenant = %ctx.tenant, zone = %name, "Zone deleted");
        Ok(())
    }

    /// Zone rendered as a master file
    pub async fn export_zone(&self, ctx: &RequestContext, name: &str) -> Result<String> {
        let name = normalize_zone_name(name);
        let zone = self.store.get_zone(&ctx.tenant, &name).await?;
        let records = self.all_records(&ctx.tenant, &name).await?;
        Ok(zone_file::encode(&zone, &records))
    }

    async fn all_records(&self, tenant: &TenantId, zone: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let filter = RecordFilter {
                limit: Some(crate::dns::record::MAX_PAGE_SIZE),
                offset: Some(offset),
                ..Default::default()
            };
            let page = self.store.get_records(tenant, zone, &filter).await?;
            let count = page.len() as i64;
            records.extend(page);
            if count < crate::dns::record::MAX_PAGE_SIZE {
                return Ok(records);
            }
            offset += count;
        }
    }

    // ---- records ----

    pub async fn list_records(&self, ctx: &RequestContext, zone: &str, filter: &RecordFilter) -> Result<Vec<Record>> {
        self.store.get_records(&ctx.tenant, &normalize_zone_name(zone), filter).await
    }

    /// Validate without writing
    pub fn validate_record(&self, candidate: &RecordCandidate) -> ValidationReport {
        validation::validate_record(candidate)
    }

    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        zone: &str,
        candidate: &RecordCandidate,
    ) -> Result<WriteOutcome<Record>> {
        let zone = normalize_zone_name(zone);
        let entry = ctx
            .audit(AuditOperation::RecordCreated, "record")
            .with_resource_id(format!("{}/{}/{}", zone, candidate.name, candidate.record_type))
            .with_details(serde_json::to_value(candidate)?);

        let report = validation::validate_record(candidate);
        let result = if report.is_valid {
            self.store.create_record(&ctx.tenant, &zone, candidate, &ctx.actor).await
        } else {
            Err(rejected(report.clone()))
        };
        let record = self.audited(entry, result).await?;

        let sync = self.push_upsert(ctx, &zone, std::slice::from_ref(&record)).await;
        Ok(Self::outcome(record, report.warnings, sync))
    }

    pub async fn update_record(
        &self,
        ctx: &RequestContext,
        zone: &str,
        key: &RecordKey,
        update: &RecordUpdate,
    ) -> Result<WriteOutcome<Record>> {
        let zone = normalize_zone_name(zone);
        let entry = ctx
            .audit(AuditOperation::RecordUpdated, "record")
            .with_resource_id(format!("{}/{}/{}", zone, key.name, key.record_type))
            .with_details(json!({ "key": key, "update": update }));

        let result: Result<(Record, Record, ValidationReport)> = async {
            if update.is_empty() {
                return Err(ConsoleError::InvalidRequest("No fields to update".to_string()));
            }
            let filter = RecordFilter {
                record_type: Some(key.record_type),
                name: Some(key.name.clone()),
                limit: Some(crate::dns::record::MAX_PAGE_SIZE),
                offset: None,
            };
            let rrset = self.store.get_records(&ctx.tenant, &zone, &filter).await?;
            let current = single_match(&zone, key, rrset.iter().filter(|r| key.matches(r)).collect())?.clone();

            let report = validation::validate_record(&update.merged_candidate(&current));
            if !report.is_valid {
                return Err(rejected(report));
            }
            let updated = self.store.update_record(&ctx.tenant, &zone, key, update).await?;
            Ok((current, updated, report))
        }
        .await;
        let (previous, updated, report) = self.audited(entry, result).await?;

        let mut sync = SyncOutcome::Synced;
        // the nameserver keys records by full rdata, so any change leaves the old RR behind
        if previous.presentation_value() != updated.presentation_value() || previous.ttl != updated.ttl {
            let old_key = RecordKey::new(&previous.name, previous.record_type).with_value(&previous.value);
            sync = self.push_delete(ctx, &zone, &old_key, std::slice::from_ref(&previous)).await;
        }
        if !matches!(sync, SyncOutcome::Failed { .. }) {
            sync = self.push_upsert(ctx, &zone, std::slice::from_ref(&updated)).await;
        }
        Ok(Self::outcome(updated, report.warnings, sync))
    }

    /// Soft delete; without a value the whole RRset goes
    pub async fn delete_record(&self, ctx: &RequestContext, zone: &str, key: &RecordKey) -> Result<WriteOutcome<Vec<Record>>> {
        let zone = normalize_zone_name(zone);
        let entry = ctx
            .audit(AuditOperation::RecordDeleted, "record")
            .with_resource_id(format!("{}/{}/{}", zone, key.name, key.record_type))
            .with_details(json!({ "key": key }));

        let result = self.store.delete_record(&ctx.tenant, &zone, key).await;
        let removed = self.audited(entry, result).await?;
        let sync = self.push_delete(ctx, &zone, key, &removed).await;
        Ok(Self::outcome(removed, Vec::new(), sync))
    }

    pub async fn bulk_create_records(
        &self,
        ctx: &RequestContext,
        zone: &str,
        candidates: &[RecordCandidate],
    ) -> Result<WriteOutcome<Vec<Record>>> {
        let zone = normalize_zone_name(zone);
        let entry = ctx
            .audit(AuditOperation::BulkCreate, "record")
            .with_resource_id(zone.as_str())
            .with_details(json!({ "count": candidates.len() }));

        let (combined, _) = validation::validate_batch(candidates);
        let result = match check_bulk_size(candidates.len()) {
            Err(e) => Err(e),
            Ok(()) if !combined.is_valid => Err(rejected(combined.clone())),
            Ok(()) => self.store.bulk_create_records(&ctx.tenant, &zone, candidates, &ctx.actor).await,
        };
        let records = self.audited(entry, result).await?;
        info!(tenant = %ctx.tenant, zone = %zone, count = records.len(), "Bulk record creation committed");

        let sync = self.push_upsert(ctx, &zone, &records).await;
        Ok(Self::outcome(records, combined.warnings, sync))
    }

    pub async fn bulk_delete_records(
        &self,
        ctx: &RequestContext,
        zone: &str,
        keys: &[RecordKey],
    ) -> Result<WriteOutcome<Vec<Record>>> {
        let zone = normalize_zone_name(zone);
        let entry = ctx
            .audit(AuditOperation::BulkDelete, "record")
            .with_resource_id(zone.as_str())
            .with_details(json!({ "count": keys.len() }));

        let result = match check_bulk_size(keys.len()) {
            Err(e) => Err(e),
            Ok(()) => self.store.bulk_delete_records(&ctx.tenant, &zone, keys).await,
        };
        let removed = self.audited(entry, result).await?;

        let mut sync = SyncOutcome::Synced;
        for key in keys {
            let matching: Vec<Record> = removed.iter().filter(|r| key.matches(r)).cloned().collect();
            let outcome = self.push_delete(ctx, &zone, key, &matching).await;
            if outcome != SyncOutcome::Synced {
                sync = outcome;
            }
        }
        Ok(Self::outcome(removed, Vec::new(), sync))
    }

    /// Recreate zones and records captured in a backup
    ///
    /// Missing zones are created; records are revalidated and written one by
    /// one so that records already present are skipped instead of aborting
    /// the zone.
    pub async fn restore_zones(&self, ctx: &RequestContext, snapshots: &[ZoneSnapshot]) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();

        for snapshot in snapshots {
            let name = normalize_zone_name(&snapshot.zone.name);
            match self.store.get_zone(&ctx.tenant, &name).await {
                Ok(_) => {}
                Err(ConsoleError::NotFound(_)) => {
                    let zone = NewZone {
                        name: name.clone(),
                        ..NewZone::from(&snapshot.zone)
                    };
                    let zone_report = validation::validate_zone(&zone);
                    if !zone_report.is_valid {
                        report.skipped.push(format!("zone {}: {}", name, zone_report.errors.join("; ")));
                        continue;
                    }
                    self.store.create_zone(&ctx.tenant, &zone, &ctx.actor).await?;
                    report.zones_created += 1;
                }
                Err(e) => return Err(e),
            }

            let mut restored = Vec::new();
            for record in snapshot.records.iter().filter(|r| r.is_active()) {
                let candidate = RecordCandidate::from(record);
                let check = validation::validate_record(&candidate);
                if !check.is_valid {
                    report.skipped.push(format!("{} {} {}: {}", name, record.name, record.record_type, check.errors.join("; ")));
                    continue;
                }
                match self.store.create_record(&ctx.tenant, &name, &candidate, &ctx.actor).await {
                    Ok(created) => restored.push(created),
                    Err(ConsoleError::Conflict(message)) => report.skipped.push(format!("{}: {}", name, message)),
                    Err(e) => return Err(e),
                }
            }

            report.records_restored += restored.len();
            if let SyncOutcome::Failed { message } = self.push_upsert(ctx, &name, &restored).await {
                report.skipped.push(format!("{}: nameserver not updated: {}", name, message));
            }
            let entry = ctx
                .audit(AuditOperation::ZoneRestored, "zone")
                .with_resource_id(name.as_str())
                .with_details(json!({ "records": restored.len() }));
            self.audit(entry).await;
        }

        info!(
            tenant = %ctx.tenant,
            zones = report.zones_created,
            records = report.records_restored,
            skipped = report.skipped.len(),
            "Zone restore finished"
        );
        Ok(report)
    }

    // ---- TSIG keys ----

    pub async fn create_tsig_key(
        &self,
        ctx: &RequestContext,
        name: &str,
        algorithm: Option<&str>,
        secret: Option<&str>,
    ) -> Result<CreatedTsigKey> {
        let entry = ctx
            .audit(AuditOperation::TsigKeyCreated, "tsig_key")
            .with_resource_id(name)
            .with_details(json!({ "algorithm": algorithm.unwrap_or(tsig::DEFAULT_ALGORITHM) }));

        let result = async {
            let key = tsig::prepare_key(name, algorithm, secret)?;
            let metadata = self.store.create_tsig_key(&ctx.tenant, &key).await?;
            Ok(CreatedTsigKey {
                key: metadata,
                secret: key.secret,
            })
        }
        .await;
        let created = self.audited(entry, result).await?;
        self.regenerate_key_file().await;
        Ok(created)
    }

    pub async fn list_tsig_keys(&self, ctx: &RequestContext) -> Result<Vec<TsigKeyMetadata>> {
        self.store.list_tsig_keys(&ctx.tenant).await
    }

    pub async fn delete_tsig_key(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        let entry = ctx.audit(AuditOperation::TsigKeyDeleted, "tsig_key").with_resource_id(name);
        let result = self.store.delete_tsig_key(&ctx.tenant, name).await;
        self.audited(entry, result).await?;
        self.regenerate_key_file().await;
        Ok(())
    }

    async fn regenerate_key_file(&self) {
        let path = match self.key_file {
            Some(ref path) => path,
            None => return,
        };
        let written = match self.store.list_tsig_keys_with_secrets(None).await {
            Ok(keys) => tsig::write_key_file(path, &keys).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "Failed to regenerate TSIG key file");
        }
    }

    pub async fn audit_log(&self, ctx: &RequestContext, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.store.list_audit(&ctx.tenant, limit.clamp(1, 1000)).await
    }
}

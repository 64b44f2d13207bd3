//! Relational store for zones, records, TSIG keys and the audit log
//!
//! Every operation is scoped to a tenant. The Postgres implementation binds
//! the tenant to a session variable that row-level security policies read;
//! the in-memory implementation filters on the same key and backs tests and
//! the development mode of the binary.

pub mod audit;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dns::record::{
    NewTsigKey, NewZone, Record, RecordCandidate, RecordFilter, RecordKey, RecordType, RecordUpdate, TenantId,
    TsigKey, TsigKeyMetadata, Zone, ZoneFilter, ZoneUpdate,
};
use crate::errors::{ConsoleError, Result};

pub use audit::{AuditLogEntry, AuditOperation};
pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Maximum number of items accepted by one bulk call
pub const MAX_BULK_OPERATIONS: usize = 100;

/// A zone with its active records, as captured for backups and exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub zone: Zone,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub zones: i64,
    pub active_records: i64,
    pub tsig_keys: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Zones of a tenant ordered by name
    async fn get_zones(&self, tenant: &TenantId, filter: &ZoneFilter) -> Result<Vec<Zone>>;

    async fn get_zone(&self, tenant: &TenantId, name: &str) -> Result<Zone>;

    async fn create_zone(&self, tenant: &TenantId, zone: &NewZone, actor: &str) -> Result<Zone>;

    /// Partial merge; an empty update is rejected
    async fn update_zone(&self, tenant: &TenantId, name: &str, update: &ZoneUpdate) -> Result<Zone>;

    /// Hard delete; records go with the zone
    async fn delete_zone(&self, tenant: &TenantId, name: &str) -> Result<()>;

    /// Active records of a zone ordered by (name, type)
    async fn get_records(&self, tenant: &TenantId, zone: &str, filter: &RecordFilter) -> Result<Vec<Record>>;

    /// Insert a record and bump the zone serial in one transaction
    async fn create_record(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidate: &RecordCandidate,
        actor: &str,
    ) -> Result<Record>;

    async fn update_record(
        &self,
        tenant: &TenantId,
        zone: &str,
        key: &RecordKey,
        update: &RecordUpdate,
    ) -> Result<Record>;

    /// Soft delete every active record matching `key`
    async fn delete_record(&self, tenant: &TenantId, zone: &str, key: &RecordKey) -> Result<Vec<Record>>;

    /// All-or-nothing creation of up to [`MAX_BULK_OPERATIONS`] records
    async fn bulk_create_records(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidates: &[RecordCandidate],
        actor: &str,
    ) -> Result<Vec<Record>>;

    /// All-or-nothing soft deletion of up to [`MAX_BULK_OPERATIONS`] keys
    async fn bulk_delete_records(&self, tenant: &TenantId, zone: &str, keys: &[RecordKey]) -> Result<Vec<Record>>;

    async fn create_tsig_key(&self, tenant: &TenantId, key: &NewTsigKey) -> Result<TsigKeyMetadata>;

    async fn list_tsig_keys(&self, tenant: &TenantId) -> Result<Vec<TsigKeyMetadata>>;

    /// Keys including secrets; only for rendering the nameserver key file
    async fn list_tsig_keys_with_secrets(&self, tenant: Option<&TenantId>) -> Result<Vec<TsigKey>>;

    async fn delete_tsig_key(&self, tenant: &TenantId, name: &str) -> Result<()>;

    async fn record_tsig_usage(&self, tenant: &TenantId, name: &str) -> Result<()>;

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Newest first
    async fn list_audit(&self, tenant: &TenantId, limit: i64) -> Result<Vec<AuditLogEntry>>;

    async fn stats(&self, tenant: Option<&TenantId>) -> Result<StoreStats>;

    /// Connectivity probe
    async fn ping(&self) -> Result<()>;

    /// Zones with their active records; `None` reads across tenants
    async fn snapshot(&self, tenant: Option<&TenantId>) -> Result<Vec<ZoneSnapshot>>;
}

/// Reject a record that would clash with the active records sharing its owner name
pub(crate) fn check_conflicts(zone: &str, existing: &[Record], candidate: &RecordCandidate) -> Result<()> {
    let same_owner: Vec<&Record> = existing
        .iter()
        .filter(|r| r.is_active() && r.name == candidate.name)
        .collect();

    if candidate.record_type == RecordType::SOA && existing.iter().any(|r| r.is_active() && r.record_type == RecordType::SOA) {
        return Err(ConsoleError::Conflict(format!("Zone {} already has an SOA record", zone)));
    }

    if candidate.record_type == RecordType::CNAME && !same_owner.is_empty() {
        return Err(ConsoleError::Conflict(format!(
            "CNAME {} cannot coexist with other records of the same name in {}",
            candidate.name, zone
        )));
    }

    if same_owner.iter().any(|r| r.record_type == RecordType::CNAME) {
        return Err(ConsoleError::Conflict(format!(
            "{} already has a CNAME record in {}",
            candidate.name, zone
        )));
    }

    let duplicate = same_owner.iter().any(|r| {
        r.record_type == candidate.record_type
            && r.value == candidate.value
            && r.priority == candidate.priority
            && r.weight == candidate.weight
            && r.port == candidate.port
    });
    if duplicate {
        return Err(ConsoleError::Conflict(format!(
            "Record {} {} {} already exists in {}",
            candidate.name, candidate.record_type, candidate.value, zone
        )));
    }

    Ok(())
}

pub(crate) fn check_bulk_size(len: usize) -> Result<()> {
    if len == 0 {
        return Err(ConsoleError::InvalidRequest("Bulk operation requires at least one item".to_string()));
    }
    if len > MAX_BULK_OPERATIONS {
        return Err(ConsoleError::InvalidRequest(format!(
            "Too many operations: {} (max {})",
            len, MAX_BULK_OPERATIONS
        )));
    }
    Ok(())
}

/// Pick the single record an update targets
pub(crate) fn single_match<'a>(zone: &str, key: &RecordKey, matches: Vec<&'a Record>) -> Result<&'a Record> {
    match matches.len() {
        0 => Err(ConsoleError::not_found(format!("record {} in zone {}", key, zone))),
        1 => Ok(matches[0]),
        n => Err(ConsoleError::Conflict(format!(
            "{} matches {} records in zone {}; specify the current value",
            key, n, zone
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::RecordStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn existing(name: &str, record_type: RecordType, value: &str) -> Record {
        let now = Utc::now();
        Record {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            zone_id: Uuid::nil(),
            name: name.into(),
            record_type,
            value: value.into(),
            ttl: 300,
            priority: None,
            weight: None,
            port: None,
            status: RecordStatus::Active,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cname_exclusivity() {
        let records = vec![existing("www", RecordType::A, "192.0.2.1")];
        let cname = RecordCandidate::new("www", RecordType::CNAME, "other.example.com.");
        assert!(matches!(check_conflicts("example.com", &records, &cname), Err(ConsoleError::Conflict(_))));

        let records = vec![existing("www", RecordType::CNAME, "other.example.com.")];
        let a = RecordCandidate::new("www", RecordType::A, "192.0.2.1");
        assert!(check_conflicts("example.com", &records, &a).is_err());

        let other = RecordCandidate::new("api", RecordType::A, "192.0.2.1");
        assert!(check_conflicts("example.com", &records, &other).is_ok());
    }

    #[test]
    fn test_single_soa() {
        let records = vec![existing("@", RecordType::SOA, "ns1. admin. 1 2 3 4 5")];
        let soa = RecordCandidate::new("@", RecordType::SOA, "ns1. admin. 2 2 3 4 5");
        assert!(check_conflicts("example.com", &records, &soa).is_err());
    }

    #[test]
    fn test_deleted_records_do_not_conflict() {
        let mut gone = existing("www", RecordType::A, "192.0.2.1");
        gone.status = RecordStatus::Deleted;
        let cname = RecordCandidate::new("www", RecordType::CNAME, "other.example.com.");
        assert!(check_conflicts("example.com", &[gone], &cname).is_ok());
    }

    #[test]
    fn test_bulk_size_cap() {
        assert!(check_bulk_size(1).is_ok());
        assert!(check_bulk_size(MAX_BULK_OPERATIONS).is_ok());
        assert!(check_bulk_size(MAX_BULK_OPERATIONS + 1).is_err());
        assert!(check_bulk_size(0).is_err());
    }
}

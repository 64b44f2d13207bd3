//! In-process store with the same tenant and transaction semantics as Postgres
//!
//! Bulk calls run against a copy of the state that only replaces the live
//! state when every item succeeded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::dns::record::{
    next_serial, page_bounds, NewTsigKey, NewZone, Record, RecordCandidate, RecordFilter, RecordKey, RecordStatus,
    RecordUpdate, TenantId, TsigKey, TsigKeyMetadata, Zone, ZoneFilter, ZoneStatus, ZoneUpdate,
};
use crate::errors::{BatchItemError, ConsoleError, Result};
use crate::store::{
    check_bulk_size, check_conflicts, single_match, AuditLogEntry, Store, StoreStats, ZoneSnapshot,
};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    zones: Vec<Zone>,
    records: Vec<Record>,
    tsig_keys: Vec<TsigKey>,
    audit: Vec<AuditLogEntry>,
}

impl MemoryState {
    fn zone_index(&self, tenant: &TenantId, name: &str) -> Result<usize> {
        self.zones
            .iter()
            .position(|z| &z.tenant_id == tenant && z.name == name)
            .ok_or_else(|| ConsoleError::not_found(format!("zone {}", name)))
    }

    fn bump_serial(&mut self, idx: usize, now: DateTime<Utc>) {
        let zone = &mut self.zones[idx];
        zone.serial = next_serial(zone.serial, now);
        zone.updated_at = now;
    }

    fn active_records(&self, zone_id: Uuid) -> Vec<Record> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.zone_id == zone_id && r.is_active())
            .cloned()
            .collect();
        records.sort_by(|a, b| (&a.name, a.record_type.as_str()).cmp(&(&b.name, b.record_type.as_str())));
        records
    }

    fn insert_record(
        &mut self,
        tenant: &TenantId,
        zone: &str,
        candidate: &RecordCandidate,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Record> {
        let idx = self.zone_index(tenant, zone)?;
        let zone_id = self.zones[idx].id;
        let existing = self.active_records(zone_id);
        check_conflicts(zone, &existing, candidate)?;

        let record = Record {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            zone_id,
            name: candidate.name.clone(),
            record_type: candidate.record_type,
            value: candidate.value.clone(),
            ttl: candidate.effective_ttl(),
            priority: candidate.priority,
            weight: candidate.weight,
            port: candidate.port,
            status: RecordStatus::Active,
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.records.push(record.clone());
        self.bump_serial(idx, now);
        Ok(record)
    }

    fn soft_delete(&mut self, tenant: &TenantId, zone: &str, key: &RecordKey, now: DateTime<Utc>) -> Result<Vec<Record>> {
        let idx = self.zone_index(tenant, zone)?;
        let zone_id = self.zones[idx].id;

        let mut deleted = Vec::new();
        for record in self
            .records
            .iter_mut()
            .filter(|r| r.zone_id == zone_id && r.is_active() && key.matches(r))
        {
            record.status = RecordStatus::Deleted;
            record.updated_at = now;
            deleted.push(record.clone());
        }

        if deleted.is_empty() {
            return Err(ConsoleError::not_found(format!("record {} in zone {}", key, zone)));
        }
        self.bump_serial(idx, now);
        Ok(deleted)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of audit rows across all tenants
    pub fn audit_len(&self) -> usize {
        self.state.read().audit.len()
    }

    /// Every record row of a tenant, including soft-deleted ones
    pub fn all_record_rows(&self, tenant: &TenantId) -> Vec<Record> {
        self.state
            .read()
            .records
            .iter()
            .filter(|r| &r.tenant_id == tenant)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_zones(&self, tenant: &TenantId, filter: &ZoneFilter) -> Result<Vec<Zone>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let state = self.state.read();
        let mut zones: Vec<Zone> = state
            .zones
            .iter()
            .filter(|z| &z.tenant_id == tenant)
            .filter(|z| filter.zone_type.map_or(true, |t| z.zone_type == t))
            .filter(|z| filter.status.map_or(true, |s| z.status == s))
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(zones.into_iter().skip(offset as usize).take(limit as usize).collect())
    }

    async fn get_zone(&self, tenant: &TenantId, name: &str) -> Result<Zone> {
        let state = self.state.read();
        let idx = state.zone_index(tenant, name)?;
        Ok(state.zones[idx].clone())
    }

    async fn create_zone(&self, tenant: &TenantId, zone: &NewZone, actor: &str) -> Result<Zone> {
        let mut state = self.state.write();
        if state.zone_index(tenant, &zone.name).is_ok() {
            return Err(ConsoleError::Conflict(format!("Zone {} already exists", zone.name)));
        }

        let now = Utc::now();
        let created = Zone {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: zone.name.clone(),
            zone_type: zone.zone_type,
            status: ZoneStatus::Active,
            primary_ns: zone.primary_ns.clone(),
            admin_email: zone.admin_email.clone(),
            refresh_interval: zone.refresh_interval,
            retry_interval: zone.retry_interval,
            expire_interval: zone.expire_interval,
            minimum_ttl: zone.minimum_ttl,
            serial: next_serial(0, now),
            created_by: actor.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.zones.push(created.clone());
        Ok(created)
    }

    async fn update_zone(&self, tenant: &TenantId, name: &str, update: &ZoneUpdate) -> Result<Zone> {
        if update.is_empty() {
            return Err(ConsoleError::InvalidRequest("No fields to update".to_string()));
        }
        let mut state = self.state.write();
        let idx = state.zone_index(tenant, name)?;
        update.apply(&mut state.zones[idx]);
        state.bump_serial(idx, Utc::now());
        Ok(state.zones[idx].clone())
    }

    async fn delete_zone(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let idx = state.zone_index(tenant, name)?;
        let zone = state.zones.remove(idx);
        state.records.retain(|r| r.zone_id != zone.id);
        Ok(())
    }

    async fn get_records(&self, tenant: &TenantId, zone: &str, filter: &RecordFilter) -> Result<Vec<Record>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let state = self.state.read();
        let idx = state.zone_index(tenant, zone)?;
        let records = state
            .active_records(state.zones[idx].id)
            .into_iter()
            .filter(|r| filter.record_type.map_or(true, |t| r.record_type == t))
            .filter(|r| filter.name.as_ref().map_or(true, |n| &r.name == n))
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(records)
    }

    async fn create_record(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidate: &RecordCandidate,
        actor: &str,
    ) -> Result<Record> {
        self.state.write().insert_record(tenant, zone, candidate, actor, Utc::now())
    }

    async fn update_record(
        &self,
        tenant: &TenantId,
        zone: &str,
        key: &RecordKey,
        update: &RecordUpdate,
    ) -> Result<Record> {
        if update.is_empty() {
            return Err(ConsoleError::InvalidRequest("No fields to update".to_string()));
        }
        let now = Utc::now();
        let mut state = self.state.write();
        let idx = state.zone_index(tenant, zone)?;
        let zone_id = state.zones[idx].id;

        let target_id = {
            let matches: Vec<&Record> = state
                .records
                .iter()
                .filter(|r| r.zone_id == zone_id && r.is_active() && key.matches(r))
                .collect();
            single_match(zone, key, matches)?.id
        };

        {
            let (current, others): (Vec<&Record>, Vec<&Record>) = state
                .records
                .iter()
                .filter(|r| r.zone_id == zone_id && r.is_active())
                .partition(|r| r.id == target_id);
            if let Some(current) = current.first() {
                let others: Vec<Record> = others.into_iter().cloned().collect();
                check_conflicts(zone, &others, &update.merged_candidate(current))?;
            }
        }

        let updated = match state.records.iter_mut().find(|r| r.id == target_id) {
            Some(record) => {
                let merged = update.merged_candidate(record);
                record.ttl = merged.effective_ttl();
                record.value = merged.value;
                record.priority = merged.priority;
                record.weight = merged.weight;
                record.port = merged.port;
                record.updated_at = now;
                record.clone()
            }
            None => return Err(ConsoleError::not_found(format!("record {} in zone {}", key, zone))),
        };
        state.bump_serial(idx, now);
        Ok(updated)
    }

    async fn delete_record(&self, tenant: &TenantId, zone: &str, key: &RecordKey) -> Result<Vec<Record>> {
        self.state.write().soft_delete(tenant, zone, key, Utc::now())
    }

    async fn bulk_create_records(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidates: &[RecordCandidate],
        actor: &str,
    ) -> Result<Vec<Record>> {
        check_bulk_size(candidates.len())?;
        let now = Utc::now();
        let mut state = self.state.write();
        let mut working = state.clone();

        let mut created = Vec::with_capacity(candidates.len());
        let mut errors = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            match working.insert_record(tenant, zone, candidate, actor, now) {
                Ok(record) => created.push(record),
                Err(e) => errors.push(BatchItemError {
                    index,
                    name: candidate.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            return Err(ConsoleError::Transaction {
                message: format!("Bulk create failed for {} of {} records", errors.len(), candidates.len()),
                errors,
            });
        }
        *state = working;
        Ok(created)
    }

    async fn bulk_delete_records(&self, tenant: &TenantId, zone: &str, keys: &[RecordKey]) -> Result<Vec<Record>> {
        check_bulk_size(keys.len())?;
        let now = Utc::now();
        let mut state = self.state.write();
        let mut working = state.clone();

        let mut deleted = Vec::new();
        let mut errors = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            match working.soft_delete(tenant, zone, key, now) {
                Ok(records) => deleted.extend(records),
                Err(e) => errors.push(BatchItemError {
                    index,
                    name: key.name.clone(),
                    message: e.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            return Err(ConsoleError::Transaction {
                message: format!("Bulk delete failed for {} of {} records", errors.len(), keys.len()),
                errors,
            });
        }
        *state = working;
        Ok(deleted)
    }

    async fn create_tsig_key(&self, tenant: &TenantId, key: &NewTsigKey) -> Result<TsigKeyMetadata> {
        let mut state = self.state.write();
        if state.tsig_keys.iter().any(|k| &k.tenant_id == tenant && k.name == key.name) {
            return Err(ConsoleError::Conflict(format!("TSIG key {} already exists", key.name)));
        }
        let stored = TsigKey {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: key.name.clone(),
            algorithm: key.algorithm.clone(),
            secret: key.secret.clone(),
            created_at: Utc::now(),
            last_used: None,
            usage_count: 0,
        };
        let metadata = TsigKeyMetadata::from(&stored);
        state.tsig_keys.push(stored);
        Ok(metadata)
    }

    async fn list_tsig_keys(&self, tenant: &TenantId) -> Result<Vec<TsigKeyMetadata>> {
        let state = self.state.read();
        let mut keys: Vec<TsigKeyMetadata> = state
            .tsig_keys
            .iter()
            .filter(|k| &k.tenant_id == tenant)
            .map(TsigKeyMetadata::from)
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    async fn list_tsig_keys_with_secrets(&self, tenant: Option<&TenantId>) -> Result<Vec<TsigKey>> {
        let state = self.state.read();
        let mut keys: Vec<TsigKey> = state
            .tsig_keys
            .iter()
            .filter(|k| tenant.map_or(true, |t| &k.tenant_id == t))
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    async fn delete_tsig_key(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut state = self.state.write();
        let before = state.tsig_keys.len();
        state.tsig_keys.retain(|k| !(&k.tenant_id == tenant && k.name == name));
        if state.tsig_keys.len() == before {
            return Err(ConsoleError::not_found(format!("TSIG key {}", name)));
        }
        Ok(())
    }

    async fn record_tsig_usage(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut state = self.state.write();
        match state.tsig_keys.iter_mut().find(|k| &k.tenant_id == tenant && k.name == name) {
            Some(key) => {
                key.usage_count += 1;
                key.last_used = Some(Utc::now());
                Ok(())
            }
            None => Err(ConsoleError::not_found(format!("TSIG key {}", name))),
        }
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.state.write().audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, tenant: &TenantId, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let (limit, _) = page_bounds(Some(limit), None);
        let state = self.state.read();
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| &e.tenant_id == tenant)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stats(&self, tenant: Option<&TenantId>) -> Result<StoreStats> {
        let state = self.state.read();
        let in_scope = |t: &TenantId| tenant.map_or(true, |wanted| t == wanted);
        Ok(StoreStats {
            zones: state.zones.iter().filter(|z| in_scope(&z.tenant_id)).count() as i64,
            active_records: state
                .records
                .iter()
                .filter(|r| r.is_active() && in_scope(&r.tenant_id))
                .count() as i64,
            tsig_keys: state.tsig_keys.iter().filter(|k| in_scope(&k.tenant_id)).count() as i64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn snapshot(&self, tenant: Option<&TenantId>) -> Result<Vec<ZoneSnapshot>> {
        let state = self.state.read();
        let mut zones: Vec<&Zone> = state
            .zones
            .iter()
            .filter(|z| tenant.map_or(true, |t| &z.tenant_id == t))
            .collect();
        zones.sort_by(|a, b| (&a.tenant_id, &a.name).cmp(&(&b.tenant_id, &b.name)));
        Ok(zones
            .into_iter()
            .map(|zone| ZoneSnapshot {
                zone: zone.clone(),
                records: state.active_records(zone.id),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::RecordType;

    async fn store_with_zone(tenant: &TenantId) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_zone(tenant, &NewZone::new("example.com", "ns1.example.com", "hostmaster@example.com"), "admin")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_record_bumps_serial() {
        let tenant = TenantId::new("t1");
        let store = store_with_zone(&tenant).await;
        let before = store.get_zone(&tenant, "example.com").await.unwrap().serial;

        let candidate = RecordCandidate::new("www", RecordType::A, "192.0.2.1").with_ttl(300);
        store.create_record(&tenant, "example.com", &candidate, "admin").await.unwrap();

        let after = store.get_zone(&tenant, "example.com").await.unwrap().serial;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_create_record_requires_zone() {
        let tenant = TenantId::new("t1");
        let store = MemoryStore::new();
        let candidate = RecordCandidate::new("www", RecordType::A, "192.0.2.1");
        let err = store.create_record(&tenant, "missing.com", &candidate, "admin").await.unwrap_err();
        assert!(matches!(err, ConsoleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_record_but_keeps_row() {
        let tenant = TenantId::new("t1");
        let store = store_with_zone(&tenant).await;
        let candidate = RecordCandidate::new("www", RecordType::A, "192.0.2.1");
        store.create_record(&tenant, "example.com", &candidate, "admin").await.unwrap();

        let deleted = store
            .delete_record(&tenant, "example.com", &RecordKey::new("www", RecordType::A))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);

        let visible = store.get_records(&tenant, "example.com", &RecordFilter::default()).await.unwrap();
        assert!(visible.is_empty());

        let rows = store.all_record_rows(&tenant);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, RecordStatus::Deleted);
    }

    #[tokio::test]
    async fn test_update_needs_value_for_rrset() {
        let tenant = TenantId::new("t1");
        let store = store_with_zone(&tenant).await;
        for ip in ["192.0.2.1", "192.0.2.2"] {
            let candidate = RecordCandidate::new("www", RecordType::A, ip);
            store.create_record(&tenant, "example.com", &candidate, "admin").await.unwrap();
        }

        let update = RecordUpdate {
            ttl: Some(60),
            ..Default::default()
        };
        let ambiguous = store
            .update_record(&tenant, "example.com", &RecordKey::new("www", RecordType::A), &update)
            .await;
        assert!(matches!(ambiguous, Err(ConsoleError::Conflict(_))));

        let key = RecordKey::new("www", RecordType::A).with_value("192.0.2.2");
        let updated = store.update_record(&tenant, "example.com", &key, &update).await.unwrap();
        assert_eq!(updated.ttl, 60);
        assert_eq!(updated.value, "192.0.2.2");
    }

    #[tokio::test]
    async fn test_update_cannot_duplicate_existing_record() {
        let tenant = TenantId::new("t1");
        let store = store_with_zone(&tenant).await;
        for ip in ["192.0.2.1", "192.0.2.2"] {
            let candidate = RecordCandidate::new("www", RecordType::A, ip);
            store.create_record(&tenant, "example.com", &candidate, "admin").await.unwrap();
        }
        let serial = store.get_zone(&tenant, "example.com").await.unwrap().serial;

        let key = RecordKey::new("www", RecordType::A).with_value("192.0.2.2");
        let update = RecordUpdate {
            value: Some("192.0.2.1".into()),
            ..Default::default()
        };
        let err = store.update_record(&tenant, "example.com", &key, &update).await.unwrap_err();
        assert!(matches!(err, ConsoleError::Conflict(_)));

        let mut values: Vec<String> = store
            .get_records(&tenant, "example.com", &RecordFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.value)
            .collect();
        values.sort();
        assert_eq!(values, vec!["192.0.2.1", "192.0.2.2"]);
        assert_eq!(store.get_zone(&tenant, "example.com").await.unwrap().serial, serial);

        // rewriting a record onto its own value is not a collision
        let same = RecordUpdate {
            value: Some("192.0.2.2".into()),
            ttl: Some(120),
            ..Default::default()
        };
        assert_eq!(store.update_record(&tenant, "example.com", &key, &same).await.unwrap().ttl, 120);
    }

    #[tokio::test]
    async fn test_bulk_create_is_all_or_nothing() {
        let tenant = TenantId::new("t1");
        let store = store_with_zone(&tenant).await;
        let candidates = vec![
            RecordCandidate::new("www", RecordType::A, "192.0.2.1"),
            RecordCandidate::new("api", RecordType::A, "192.0.2.2"),
            RecordCandidate::new("www", RecordType::CNAME, "api.example.com."),
        ];

        let err = store
            .bulk_create_records(&tenant, "example.com", &candidates, "admin")
            .await
            .unwrap_err();
        match err {
            ConsoleError::Transaction { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].index, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let records = store.get_records(&tenant, "example.com", &RecordFilter::default()).await.unwrap();
        assert!(records.is_empty());

        let created = store
            .bulk_create_records(&tenant, "example.com", &candidates[..2], "admin")
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let a = TenantId::new("tenant-a");
        let b = TenantId::new("tenant-b");
        let store = store_with_zone(&a).await;
        store
            .create_zone(&b, &NewZone::new("example.com", "ns1.example.com", "hostmaster@example.com"), "bob")
            .await
            .unwrap();

        let ra = RecordCandidate::new("www", RecordType::A, "192.0.2.1");
        let rb = RecordCandidate::new("www", RecordType::A, "198.51.100.1");
        store.create_record(&a, "example.com", &ra, "alice").await.unwrap();
        store.create_record(&b, "example.com", &rb, "bob").await.unwrap();

        let seen = store.get_records(&a, "example.com", &RecordFilter::default()).await.unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.iter().all(|r| r.tenant_id == a));

        assert_eq!(store.snapshot(None).await.unwrap().len(), 2);
        assert_eq!(store.snapshot(Some(&b)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tsig_listing_has_no_secret() {
        let tenant = TenantId::new("t1");
        let store = MemoryStore::new();
        let key = NewTsigKey {
            name: "ddns-key".into(),
            algorithm: "hmac-sha256".into(),
            secret: "c2VjcmV0".into(),
        };
        store.create_tsig_key(&tenant, &key).await.unwrap();
        store.record_tsig_usage(&tenant, "ddns-key").await.unwrap();

        let listed = store.list_tsig_keys(&tenant).await.unwrap();
        assert_eq!(listed[0].usage_count, 1);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("c2VjcmV0"));

        assert!(matches!(store.create_tsig_key(&tenant, &key).await, Err(ConsoleError::Conflict(_))));
    }
}

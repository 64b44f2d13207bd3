//! Postgres-backed store
//!
//! Pooled connections bind `app.current_tenant` before their statements and
//! clear it before going back to the pool; a connection whose reset fails is
//! detached instead of being reused. Transactions bind the tenant with
//! transaction-local scope and roll back explicitly on any error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::dns::record::{
    next_serial, page_bounds, NewTsigKey, NewZone, Record, RecordCandidate, RecordFilter, RecordKey, RecordUpdate,
    TenantId, TsigKey, TsigKeyMetadata, Zone, ZoneFilter, ZoneStatus, ZoneUpdate,
};
use crate::errors::{BatchItemError, ConsoleError, Result};
use crate::store::{
    check_bulk_size, check_conflicts, single_match, AuditLogEntry, Store, StoreStats, ZoneSnapshot,
};

const ZONE_COLUMNS: &str = "id, tenant_id, name, zone_type, status, primary_ns, admin_email, \
     refresh_interval, retry_interval, expire_interval, minimum_ttl, serial, created_by, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, tenant_id, zone_id, name, type, value, ttl, priority, weight, port, \
     status, created_by, created_at, updated_at";

const TSIG_COLUMNS: &str = "id, tenant_id, name, algorithm, secret, created_at, last_used, usage_count";

/// Which rows a pooled connection may see
#[derive(Debug, Clone, Copy)]
enum Scope<'a> {
    Tenant(&'a TenantId),
    /// Backup and key-file generation read across tenants
    AllTenants,
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| ConsoleError::Config("database.url is not set".to_string()))?;
        info!(max_connections = config.max_connections, "DB Pool: connecting to Postgres");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        Ok(PgStore { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("DB migration: applying bundled migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn acquire(&self, scope: Scope<'_>) -> Result<PoolConnection<Postgres>> {
        let mut conn = self.pool.acquire().await?;
        let bound = match scope {
            Scope::Tenant(tenant) => {
                sqlx::query("SELECT set_config('app.current_tenant', $1, false), set_config('app.bypass_rls', 'off', false)")
                    .bind(tenant.as_str())
                    .execute(&mut *conn)
                    .await
            }
            Scope::AllTenants => {
                sqlx::query("SELECT set_config('app.bypass_rls', 'on', false)")
                    .execute(&mut *conn)
                    .await
            }
        };
        if let Err(e) = bound {
            release(conn).await;
            return Err(e.into());
        }
        Ok(conn)
    }

    async fn begin(&self, tenant: &TenantId) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        let bound = sqlx::query("SELECT set_config('app.current_tenant', $1, true), set_config('app.bypass_rls', 'off', true)")
            .bind(tenant.as_str())
            .execute(&mut *tx)
            .await;
        match bound {
            Ok(_) => Ok(tx),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback after failed tenant binding failed");
                }
                Err(e.into())
            }
        }
    }
}

/// Clear session variables and hand the connection back to the pool
async fn release(mut conn: PoolConnection<Postgres>) {
    let reset = sqlx::query("SELECT set_config('app.current_tenant', '', false), set_config('app.bypass_rls', 'off', false)")
        .execute(&mut *conn)
        .await;
    if let Err(e) = reset {
        warn!(error = %e, "Failed to reset tenant binding; discarding connection");
        drop(conn.detach());
    }
}

/// Commit on success, roll back explicitly on failure
async fn finish<T>(tx: Transaction<'static, Postgres>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Transaction rollback failed");
            }
            debug!(error = %e, "Transaction rolled back");
            Err(e)
        }
    }
}

fn conflict_on_unique(err: sqlx::Error, message: String) -> ConsoleError {
    if let sqlx::Error::Database(ref db) = err {
        if db.code().as_deref() == Some("23505") {
            return ConsoleError::Conflict(message);
        }
    }
    ConsoleError::from(err)
}

fn zone_from_row(row: &PgRow) -> Result<Zone> {
    Ok(Zone {
        id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        zone_type: row.try_get::<String, _>("zone_type")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        primary_ns: row.try_get("primary_ns")?,
        admin_email: row.try_get("admin_email")?,
        refresh_interval: row.try_get("refresh_interval")?,
        retry_interval: row.try_get("retry_interval")?,
        expire_interval: row.try_get("expire_interval")?,
        minimum_ttl: row.try_get("minimum_ttl")?,
        serial: row.try_get("serial")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<Record> {
    Ok(Record {
        id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        zone_id: row.try_get("zone_id")?,
        name: row.try_get("name")?,
        record_type: row.try_get::<String, _>("type")?.parse()?,
        value: row.try_get("value")?,
        ttl: row.try_get("ttl")?,
        priority: row.try_get("priority")?,
        weight: row.try_get("weight")?,
        port: row.try_get("port")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tsig_from_row(row: &PgRow) -> Result<TsigKey> {
    Ok(TsigKey {
        id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        algorithm: row.try_get("algorithm")?,
        secret: row.try_get("secret")?,
        created_at: row.try_get("created_at")?,
        last_used: row.try_get("last_used")?,
        usage_count: row.try_get("usage_count")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        user_id: row.try_get("user_id")?,
        operation: row.try_get::<String, _>("operation")?.parse()?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        details: row.try_get("details")?,
        source_ip: row.try_get("source_ip")?,
        user_agent: row.try_get("user_agent")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn find_zone(conn: &mut PgConnection, tenant: &TenantId, name: &str, for_update: bool) -> Result<Zone> {
    let sql = format!(
        "SELECT {} FROM dns_zones WHERE tenant_id = $1 AND name = $2{}",
        ZONE_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(tenant.as_str())
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ConsoleError::not_found(format!("zone {}", name)))?;
    zone_from_row(&row)
}

async fn bump_serial(conn: &mut PgConnection, zone: &Zone) -> Result<i64> {
    let serial = next_serial(zone.serial, Utc::now());
    sqlx::query("UPDATE dns_zones SET serial = $2, updated_at = now() WHERE id = $1")
        .bind(zone.id)
        .bind(serial)
        .execute(&mut *conn)
        .await?;
    Ok(serial)
}

/// Active records that could clash with a record owned by `name`
async fn conflict_candidates(conn: &mut PgConnection, zone_id: Uuid, name: &str) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {} FROM dns_records WHERE zone_id = $1 AND status = 'active' AND (name = $2 OR type = 'SOA')",
        RECORD_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(zone_id)
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(record_from_row).collect()
}

async fn insert_record(
    conn: &mut PgConnection,
    zone: &Zone,
    candidate: &RecordCandidate,
    actor: &str,
) -> Result<Record> {
    let existing = conflict_candidates(conn, zone.id, &candidate.name).await?;
    check_conflicts(&zone.name, &existing, candidate)?;

    let sql = format!(
        "INSERT INTO dns_records (id, tenant_id, zone_id, name, type, value, ttl, priority, weight, port, status, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active', $11) RETURNING {}",
        RECORD_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(zone.tenant_id.as_str())
        .bind(zone.id)
        .bind(&candidate.name)
        .bind(candidate.record_type.as_str())
        .bind(&candidate.value)
        .bind(candidate.effective_ttl())
        .bind(candidate.priority)
        .bind(candidate.weight)
        .bind(candidate.port)
        .bind(actor)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Zone {} already has an SOA record", zone.name)))?;
    record_from_row(&row)
}

async fn soft_delete(conn: &mut PgConnection, zone: &Zone, key: &RecordKey) -> Result<Vec<Record>> {
    let sql = format!(
        "UPDATE dns_records SET status = 'deleted', updated_at = now() \
         WHERE zone_id = $1 AND status = 'active' AND name = $2 AND type = $3 AND ($4::text IS NULL OR value = $4) \
         RETURNING {}",
        RECORD_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(zone.id)
        .bind(&key.name)
        .bind(key.record_type.as_str())
        .bind(key.value.as_deref())
        .fetch_all(&mut *conn)
        .await?;
    if rows.is_empty() {
        return Err(ConsoleError::not_found(format!("record {} in zone {}", key, zone.name)));
    }
    rows.iter().map(record_from_row).collect()
}

async fn update_one(
    conn: &mut PgConnection,
    tenant: &TenantId,
    zone_name: &str,
    key: &RecordKey,
    update: &RecordUpdate,
) -> Result<Record> {
    let zone = find_zone(conn, tenant, zone_name, true).await?;
    let sql = format!(
        "SELECT {} FROM dns_records \
         WHERE zone_id = $1 AND status = 'active' AND name = $2 AND type = $3 AND ($4::text IS NULL OR value = $4) \
         FOR UPDATE",
        RECORD_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(zone.id)
        .bind(&key.name)
        .bind(key.record_type.as_str())
        .bind(key.value.as_deref())
        .fetch_all(&mut *conn)
        .await?;
    let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;
    let target = single_match(zone_name, key, records.iter().collect())?;
    let merged = update.merged_candidate(target);

    let others: Vec<Record> = conflict_candidates(conn, zone.id, &target.name)
        .await?
        .into_iter()
        .filter(|r| r.id != target.id)
        .collect();
    check_conflicts(zone_name, &others, &merged)?;

    let sql = format!(
        "UPDATE dns_records SET value = $2, ttl = $3, priority = $4, weight = $5, port = $6, updated_at = now() \
         WHERE id = $1 RETURNING {}",
        RECORD_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(target.id)
        .bind(&merged.value)
        .bind(merged.effective_ttl())
        .bind(merged.priority)
        .bind(merged.weight)
        .bind(merged.port)
        .fetch_one(&mut *conn)
        .await?;
    bump_serial(conn, &zone).await?;
    record_from_row(&row)
}

#[async_trait]
impl Store for PgStore {
    async fn get_zones(&self, tenant: &TenantId, filter: &ZoneFilter) -> Result<Vec<Zone>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let sql = format!(
            "SELECT {} FROM dns_zones \
             WHERE tenant_id = $1 AND ($2::text IS NULL OR zone_type = $2) AND ($3::text IS NULL OR status = $3) \
             ORDER BY name LIMIT $4 OFFSET $5",
            ZONE_COLUMNS
        );

        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let rows = sqlx::query(&sql)
            .bind(tenant.as_str())
            .bind(filter.zone_type.map(|t| t.to_string()))
            .bind(filter.status.map(|s| s.to_string()))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await;
        release(conn).await;

        rows?.iter().map(zone_from_row).collect()
    }

    async fn get_zone(&self, tenant: &TenantId, name: &str) -> Result<Zone> {
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let zone = find_zone(&mut conn, tenant, name, false).await;
        release(conn).await;
        zone
    }

    async fn create_zone(&self, tenant: &TenantId, zone: &NewZone, actor: &str) -> Result<Zone> {
        let sql = format!(
            "INSERT INTO dns_zones (id, tenant_id, name, zone_type, status, primary_ns, admin_email, \
             refresh_interval, retry_interval, expire_interval, minimum_ttl, serial, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING {}",
            ZONE_COLUMNS
        );

        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant.as_str())
            .bind(&zone.name)
            .bind(zone.zone_type.to_string())
            .bind(ZoneStatus::Active.to_string())
            .bind(&zone.primary_ns)
            .bind(&zone.admin_email)
            .bind(zone.refresh_interval)
            .bind(zone.retry_interval)
            .bind(zone.expire_interval)
            .bind(zone.minimum_ttl)
            .bind(next_serial(0, Utc::now()))
            .bind(actor)
            .fetch_one(&mut *conn)
            .await;
        release(conn).await;

        let row = row.map_err(|e| conflict_on_unique(e, format!("Zone {} already exists", zone.name)))?;
        zone_from_row(&row)
    }

    async fn update_zone(&self, tenant: &TenantId, name: &str, update: &ZoneUpdate) -> Result<Zone> {
        if update.is_empty() {
            return Err(ConsoleError::InvalidRequest("No fields to update".to_string()));
        }

        let mut tx = self.begin(tenant).await?;
        let result: Result<Zone> = async {
            let mut zone = find_zone(&mut tx, tenant, name, true).await?;
            update.apply(&mut zone);
            let sql = format!(
                "UPDATE dns_zones SET zone_type = $2, status = $3, primary_ns = $4, admin_email = $5, \
                 refresh_interval = $6, retry_interval = $7, expire_interval = $8, minimum_ttl = $9, \
                 serial = $10, updated_at = now() WHERE id = $1 RETURNING {}",
                ZONE_COLUMNS
            );
            let row = sqlx::query(&sql)
                .bind(zone.id)
                .bind(zone.zone_type.to_string())
                .bind(zone.status.to_string())
                .bind(&zone.primary_ns)
                .bind(&zone.admin_email)
                .bind(zone.refresh_interval)
                .bind(zone.retry_interval)
                .bind(zone.expire_interval)
                .bind(zone.minimum_ttl)
                .bind(next_serial(zone.serial, Utc::now()))
                .fetch_one(&mut *tx)
                .await?;
            zone_from_row(&row)
        }
        .await;
        finish(tx, result).await
    }

    async fn delete_zone(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let result = sqlx::query("DELETE FROM dns_zones WHERE tenant_id = $1 AND name = $2")
            .bind(tenant.as_str())
            .bind(name)
            .execute(&mut *conn)
            .await;
        release(conn).await;

        if result?.rows_affected() == 0 {
            return Err(ConsoleError::not_found(format!("zone {}", name)));
        }
        Ok(())
    }

    async fn get_records(&self, tenant: &TenantId, zone: &str, filter: &RecordFilter) -> Result<Vec<Record>> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let sql = format!(
            "SELECT {} FROM dns_records \
             WHERE zone_id = $1 AND tenant_id = $2 AND status = 'active' \
             AND ($3::text IS NULL OR type = $3) AND ($4::text IS NULL OR name = $4) \
             ORDER BY name, type, created_at LIMIT $5 OFFSET $6",
            RECORD_COLUMNS
        );

        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let result: Result<Vec<Record>> = async {
            let zone = find_zone(&mut conn, tenant, zone, false).await?;
            let rows = sqlx::query(&sql)
                .bind(zone.id)
                .bind(tenant.as_str())
                .bind(filter.record_type.map(|t| t.as_str()))
                .bind(filter.name.as_deref())
                .bind(limit)
                .bind(offset)
                .fetch_all(&mut *conn)
                .await?;
            rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()
        }
        .await;
        release(conn).await;
        result
    }

    async fn create_record(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidate: &RecordCandidate,
        actor: &str,
    ) -> Result<Record> {
        let mut tx = self.begin(tenant).await?;
        let result: Result<Record> = async {
            let locked = find_zone(&mut tx, tenant, zone, true).await?;
            let record = insert_record(&mut tx, &locked, candidate, actor).await?;
            bump_serial(&mut tx, &locked).await?;
            Ok(record)
        }
        .await;
        finish(tx, result).await
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
        let mut tx = self.begin(tenant).await?;
        let result = update_one(&mut tx, tenant, zone, key, update).await;
        finish(tx, result).await
    }

    async fn delete_record(&self, tenant: &TenantId, zone: &str, key: &RecordKey) -> Result<Vec<Record>> {
        let mut tx = self.begin(tenant).await?;
        let result: Result<Vec<Record>> = async {
            let locked = find_zone(&mut tx, tenant, zone, true).await?;
            let deleted = soft_delete(&mut tx, &locked, key).await?;
            bump_serial(&mut tx, &locked).await?;
            Ok(deleted)
        }
        .await;
        finish(tx, result).await
    }

    async fn bulk_create_records(
        &self,
        tenant: &TenantId,
        zone: &str,
        candidates: &[RecordCandidate],
        actor: &str,
    ) -> Result<Vec<Record>> {
        check_bulk_size(candidates.len())?;
        let mut tx = self.begin(tenant).await?;
        let result: Result<Vec<Record>> = async {
            let locked = find_zone(&mut tx, tenant, zone, true).await?;
            let mut created = Vec::with_capacity(candidates.len());
            let mut errors = Vec::new();
            for (index, candidate) in candidates.iter().enumerate() {
                match insert_record(&mut tx, &locked, candidate, actor).await {
                    Ok(record) => created.push(record),
                    // the transaction is aborted after a statement error
                    Err(e @ ConsoleError::Database(_)) => return Err(e),
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
            bump_serial(&mut tx, &locked).await?;
            Ok(created)
        }
        .await;
        finish(tx, result).await
    }

    async fn bulk_delete_records(&self, tenant: &TenantId, zone: &str, keys: &[RecordKey]) -> Result<Vec<Record>> {
        check_bulk_size(keys.len())?;
        let mut tx = self.begin(tenant).await?;
        let result: Result<Vec<Record>> = async {
            let locked = find_zone(&mut tx, tenant, zone, true).await?;
            let mut deleted = Vec::new();
            let mut errors = Vec::new();
            for (index, key) in keys.iter().enumerate() {
                match soft_delete(&mut tx, &locked, key).await {
                    Ok(records) => deleted.extend(records),
                    Err(e @ ConsoleError::Database(_)) => return Err(e),
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
            bump_serial(&mut tx, &locked).await?;
            Ok(deleted)
        }
        .await;
        finish(tx, result).await
    }

    async fn create_tsig_key(&self, tenant: &TenantId, key: &NewTsigKey) -> Result<TsigKeyMetadata> {
        let sql = format!(
            "INSERT INTO tsig_keys (id, tenant_id, name, algorithm, secret) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            TSIG_COLUMNS
        );
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant.as_str())
            .bind(&key.name)
            .bind(&key.algorithm)
            .bind(&key.secret)
            .fetch_one(&mut *conn)
            .await;
        release(conn).await;

        let row = row.map_err(|e| conflict_on_unique(e, format!("TSIG key {} already exists", key.name)))?;
        Ok(TsigKeyMetadata::from(&tsig_from_row(&row)?))
    }

    async fn list_tsig_keys(&self, tenant: &TenantId) -> Result<Vec<TsigKeyMetadata>> {
        let keys = self.list_tsig_keys_with_secrets(Some(tenant)).await?;
        Ok(keys.iter().map(TsigKeyMetadata::from).collect())
    }

    async fn list_tsig_keys_with_secrets(&self, tenant: Option<&TenantId>) -> Result<Vec<TsigKey>> {
        let sql = format!(
            "SELECT {} FROM tsig_keys WHERE ($1::text IS NULL OR tenant_id = $1) ORDER BY name",
            TSIG_COLUMNS
        );
        let scope = tenant.map_or(Scope::AllTenants, Scope::Tenant);
        let mut conn = self.acquire(scope).await?;
        let rows = sqlx::query(&sql)
            .bind(tenant.map(|t| t.as_str()))
            .fetch_all(&mut *conn)
            .await;
        release(conn).await;

        rows?.iter().map(tsig_from_row).collect()
    }

    async fn delete_tsig_key(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let result = sqlx::query("DELETE FROM tsig_keys WHERE tenant_id = $1 AND name = $2")
            .bind(tenant.as_str())
            .bind(name)
            .execute(&mut *conn)
            .await;
        release(conn).await;

        if result?.rows_affected() == 0 {
            return Err(ConsoleError::not_found(format!("TSIG key {}", name)));
        }
        Ok(())
    }

    async fn record_tsig_usage(&self, tenant: &TenantId, name: &str) -> Result<()> {
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let result = sqlx::query(
            "UPDATE tsig_keys SET usage_count = usage_count + 1, last_used = now() WHERE tenant_id = $1 AND name = $2",
        )
        .bind(tenant.as_str())
        .bind(name)
        .execute(&mut *conn)
        .await;
        release(conn).await;

        if result?.rows_affected() == 0 {
            return Err(ConsoleError::not_found(format!("TSIG key {}", name)));
        }
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut conn = self.acquire(Scope::Tenant(&entry.tenant_id)).await?;
        let result = sqlx::query(
            "INSERT INTO audit_logs (id, tenant_id, user_id, operation, resource_type, resource_id, details, \
             source_ip, user_agent, success, error_message, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(entry.id)
        .bind(entry.tenant_id.as_str())
        .bind(&entry.user_id)
        .bind(entry.operation.to_string())
        .bind(&entry.resource_type)
        .bind(entry.resource_id.as_deref())
        .bind(&entry.details)
        .bind(entry.source_ip.as_deref())
        .bind(entry.user_agent.as_deref())
        .bind(entry.success)
        .bind(entry.error_message.as_deref())
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await;
        release(conn).await;

        result?;
        Ok(())
    }

    async fn list_audit(&self, tenant: &TenantId, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let (limit, _) = page_bounds(Some(limit), None);
        let mut conn = self.acquire(Scope::Tenant(tenant)).await?;
        let rows = sqlx::query(
            "SELECT id, tenant_id, user_id, operation, resource_type, resource_id, details, source_ip, user_agent, \
             success, error_message, created_at FROM audit_logs WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(tenant.as_str())
        .bind(limit)
        .fetch_all(&mut *conn)
        .await;
        release(conn).await;

        rows?.iter().map(audit_from_row).collect()
    }

    async fn stats(&self, tenant: Option<&TenantId>) -> Result<StoreStats> {
        let scope = tenant.map_or(Scope::AllTenants, Scope::Tenant);
        let mut conn = self.acquire(scope).await?;
        let row = sqlx::query(
            "SELECT \
               (SELECT count(*) FROM dns_zones WHERE $1::text IS NULL OR tenant_id = $1) AS zones, \
               (SELECT count(*) FROM dns_records WHERE status = 'active' AND ($1::text IS NULL OR tenant_id = $1)) AS records, \
               (SELECT count(*) FROM tsig_keys WHERE $1::text IS NULL OR tenant_id = $1) AS keys",
        )
        .bind(tenant.map(|t| t.as_str()))
        .fetch_one(&mut *conn)
        .await;
        release(conn).await;

        let row = row?;
        Ok(StoreStats {
            zones: row.try_get("zones")?,
            active_records: row.try_get("records")?,
            tsig_keys: row.try_get("keys")?,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn snapshot(&self, tenant: Option<&TenantId>) -> Result<Vec<ZoneSnapshot>> {
        let zone_sql = format!(
            "SELECT {} FROM dns_zones WHERE $1::text IS NULL OR tenant_id = $1 ORDER BY tenant_id, name",
            ZONE_COLUMNS
        );
        let record_sql = format!(
            "SELECT {} FROM dns_records WHERE zone_id = ANY($1) AND status = 'active' ORDER BY name, type, created_at",
            RECORD_COLUMNS
        );

        let scope = tenant.map_or(Scope::AllTenants, Scope::Tenant);
        let mut conn = self.acquire(scope).await?;
        let result: Result<Vec<ZoneSnapshot>> = async {
            let zone_rows = sqlx::query(&zone_sql)
                .bind(tenant.map(|t| t.as_str()))
                .fetch_all(&mut *conn)
                .await?;
            let zones = zone_rows.iter().map(zone_from_row).collect::<Result<Vec<_>>>()?;
            let ids: Vec<Uuid> = zones.iter().map(|z| z.id).collect();

            let record_rows = sqlx::query(&record_sql).bind(&ids[..]).fetch_all(&mut *conn).await?;
            let mut by_zone: HashMap<Uuid, Vec<Record>> = HashMap::new();
            for row in record_rows.iter() {
                let record = record_from_row(row)?;
                by_zone.entry(record.zone_id).or_default().push(record);
            }

            Ok(zones
                .into_iter()
                .map(|zone| {
                    let records = by_zone.remove(&zone.id).unwrap_or_default();
                    ZoneSnapshot { zone, records }
                })
                .collect())
        }
        .await;
        release(conn).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Needs `DATABASE_URL`; run with `cargo test -- --ignored`
    async fn single_connection_store() -> PgStore {
        let config = DatabaseConfig {
            url: std::env::var("DATABASE_URL").ok(),
            max_connections: 1,
            ..Default::default()
        };
        PgStore::connect(&config).await.unwrap()
    }

    #[tokio::test]
    #[ignore]
    async fn test_tenant_scope_clears_leftover_bypass() {
        let store = single_connection_store().await;

        // a connection returned without release keeps its session settings
        let mut conn = store.pool().acquire().await.unwrap();
        sqlx::query("SELECT set_config('app.bypass_rls', 'on', false)")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let tenant = TenantId::new("scope-check");
        let mut conn = store.acquire(Scope::Tenant(&tenant)).await.unwrap();
        let row = sqlx::query(
            "SELECT current_setting('app.bypass_rls', true) AS bypass, current_setting('app.current_tenant', true) AS tenant",
        )
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        let bypass: String = row.get("bypass");
        let bound: String = row.get("tenant");
        assert_eq!(bypass, "off");
        assert_eq!(bound, "scope-check");
        release(conn).await;
    }
}

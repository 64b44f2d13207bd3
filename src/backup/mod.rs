//! Point-in-time backups
//!
//! # Features
//!
//! * **Full Backups** - zones (JSON and master file), database dump, nameserver
//!   configuration and TSIG key metadata in one timestamped bundle
//! * **Compression** - optional `.tar.gz` with a SHA-256 checksum
//! * **Retention** - age-based pruning of directories and archives
//! * **Scheduling** - fixed-interval runs that survive individual failures
//! * **Restore Source** - zone snapshots can be read back out of any bundle
//!
//! Runs against the same backup root never overlap.

pub mod archive;
pub mod manifest;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BackupConfig, DatabaseConfig};
use crate::dns::record::{TenantId, TsigKeyMetadata};
use crate::dns::zone_file;
use crate::errors::{ConsoleError, Result};
use crate::store::{Store, ZoneSnapshot};

pub use manifest::{
    BackupManifest, BackupState, BackupSummary, ComponentKind, ComponentResult, ComponentStatus, MANIFEST_FILE,
};

use archive::ARCHIVE_EXTENSION;

const BACKUP_PREFIX: &str = "backup-";
const CHECKSUM_EXTENSION: &str = ".sha256";
/// Always passed to the dump utility; key secrets never land in a backup
pub const DUMP_SECRET_EXCLUSION: &str = "--exclude-table-data=tsig_keys";

lazy_static! {
    /// One run lock per backup root, shared by every manager in the process
    static ref ROOT_LOCKS: parking_lot::Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>> =
        parking_lot::Mutex::new(HashMap::new());
}

fn root_lock(root: &Path) -> Arc<tokio::sync::Mutex<()>> {
    let key = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    ROOT_LOCKS.lock().entry(key).or_default().clone()
}

fn component_failure<E: std::fmt::Display>(component: ComponentKind, error: E) -> ConsoleError {
    ConsoleError::BackupComponent {
        component: component.to_string(),
        message: error.to_string(),
    }
}

/// Backup ids become path components; reject anything else
fn check_backup_id(id: &str) -> Result<()> {
    if !id.starts_with(BACKUP_PREFIX) || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(ConsoleError::InvalidRequest(format!("Invalid backup id: {}", id)));
    }
    Ok(())
}

/// Configured dump arguments plus the mandatory secret exclusion
fn dump_args(configured: &[String]) -> Vec<String> {
    let mut args = configured.to_vec();
    if !args.iter().any(|a| a == DUMP_SECRET_EXCLUSION) {
        args.push(DUMP_SECRET_EXCLUSION.to_string());
    }
    args
}

/// Zone names are tenant input; keep them to one path component
fn file_stem(zone: &str) -> String {
    zone.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    tokio::fs::write(path, serde_json::to_vec_pretty(value)?).await?;
    Ok(())
}

/// Write next to `path` and rename over it, so readers never see a torn file
async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    write_json(&tmp, value).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Handle of the scheduled backup task
pub struct BackupSchedule {
    handle: JoinHandle<()>,
}

impl BackupSchedule {
    /// Stop future runs; a run in progress is aborted at its next await point
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct BackupManager {
    store: Arc<dyn Store>,
    config: BackupConfig,
    database: DatabaseConfig,
    config_files: Vec<PathBuf>,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn Store>,
        config: BackupConfig,
        database: DatabaseConfig,
        config_files: Vec<PathBuf>,
    ) -> Self {
        BackupManager {
            store,
            config,
            database,
            config_files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.config.directory
    }

    fn new_backup_dir(&self, now: DateTime<Utc>) -> (String, PathBuf) {
        let base = format!("{}{}", BACKUP_PREFIX, now.format("%Y%m%dT%H%M%S%.3fZ"));
        let mut id = base.clone();
        let mut n = 1;
        while self.root().join(&id).exists() || self.root().join(format!("{}{}", id, ARCHIVE_EXTENSION)).exists() {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        let dir = self.root().join(&id);
        (id, dir)
    }

    /// Capture every component into a new bundle
    ///
    /// Zone, database and TSIG failures abort the run before the manifest is
    /// written; the partial directory stays on disk for inspection.
    pub async fn perform_full_backup(&self, tenant: Option<&TenantId>) -> Result<BackupManifest> {
        let lock = root_lock(self.root());
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(self.root()).await?;
        let now = Utc::now();
        let (id, dir) = self.new_backup_dir(now);
        tokio::fs::create_dir_all(&dir).await?;

        let mut state = BackupState::Pending;
        info!(backup = %id, state = %state, tenant = ?tenant.map(|t| t.as_str()), "Backup started");

        let mut manifest = BackupManifest::new(&id, now, tenant);
        for kind in [
            ComponentKind::Zones,
            ComponentKind::Database,
            ComponentKind::Config,
            ComponentKind::Tsig,
        ] {
            state = BackupState::Capturing(kind);
            debug!(backup = %id, state = %state, "Capturing component");

            let captured = match kind {
                ComponentKind::Zones => self.capture_zones(&dir, tenant).await,
                ComponentKind::Database => self.capture_database(&dir, tenant).await,
                ComponentKind::Config => Ok(self.capture_config(&dir).await),
                ComponentKind::Tsig => self.capture_tsig(&dir, tenant).await,
            };
            match captured {
                Ok(result) => {
                    for warning in &result.warnings {
                        warn!(backup = %id, component = %kind, "{}", warning);
                    }
                    manifest.components.push(result);
                }
                Err(e) => {
                    state = BackupState::Failed;
                    error!(backup = %id, component = %kind, state = %state, error = %e, "Backup aborted");
                    return Err(e);
                }
            }
        }

        let archive_name = format!("{}{}", id, ARCHIVE_EXTENSION);
        if self.config.compress {
            manifest.compressed = true;
            manifest.archive = Some(archive_name.clone());
        }
        write_json_atomic(&dir.join(MANIFEST_FILE), &manifest).await?;
        state = BackupState::ManifestWritten;
        debug!(backup = %id, state = %state, "Manifest written");

        if self.config.compress {
            state = BackupState::Compressing;
            debug!(backup = %id, state = %state, "Compressing backup");
            let archive_path = self.root().join(&archive_name);
            let checksum = {
                let dir = dir.clone();
                let id = id.clone();
                let archive_path = archive_path.clone();
                tokio::task::spawn_blocking(move || -> Result<String> {
                    archive::compress_dir(&dir, &id, &archive_path)?;
                    archive::sha256_file(&archive_path)
                })
                .await
                .map_err(|e| ConsoleError::BackupComponent {
                    component: "compression".to_string(),
                    message: e.to_string(),
                })??
            };
            tokio::fs::write(self.root().join(format!("{}{}", archive_name, CHECKSUM_EXTENSION)), &checksum).await?;
            tokio::fs::remove_dir_all(&dir).await?;
            manifest.checksum = Some(checksum);
        }

        state = BackupState::Complete;
        info!(
            backup = %id,
            state = %state,
            compressed = manifest.compressed,
            components = manifest.components.len(),
            "Backup complete"
        );
        Ok(manifest)
    }

    async fn capture_zones(&self, dir: &Path, tenant: Option<&TenantId>) -> Result<ComponentResult> {
        let zones_dir = dir.join("zones");
        tokio::fs::create_dir_all(&zones_dir).await.map_err(|e| component_failure(ComponentKind::Zones, e))?;

        let snapshots = self.store.snapshot(tenant).await.map_err(|e| component_failure(ComponentKind::Zones, e))?;
        let mut summary = Vec::with_capacity(snapshots.len());
        let mut total_records = 0u64;

        for snapshot in &snapshots {
            // zones of different tenants may share a name
            let stem = match tenant {
                Some(_) => file_stem(&snapshot.zone.name),
                None => format!("{}__{}", file_stem(snapshot.zone.tenant_id.as_str()), file_stem(&snapshot.zone.name)),
            };
            write_json(&zones_dir.join(format!("{}.json", stem)), snapshot)
                .await
                .map_err(|e| component_failure(ComponentKind::Zones, e))?;
            tokio::fs::write(
                zones_dir.join(format!("{}.zone", stem)),
                zone_file::encode(&snapshot.zone, &snapshot.records),
            )
            .await
            .map_err(|e| component_failure(ComponentKind::Zones, e))?;

            total_records += snapshot.records.len() as u64;
            summary.push(json!({
                "tenantId": snapshot.zone.tenant_id,
                "name": snapshot.zone.name,
                "serial": snapshot.zone.serial,
                "records": snapshot.records.len(),
            }));
        }

        write_json(
            &zones_dir.join("zones-summary.json"),
            &json!({
                "totalZones": snapshots.len(),
                "totalRecords": total_records,
                "zones": summary,
            }),
        )
        .await
        .map_err(|e| component_failure(ComponentKind::Zones, e))?;

        Ok(ComponentResult::success(ComponentKind::Zones, "zones")
            .with_count("zones", snapshots.len() as u64)
            .with_count("records", total_records))
    }

    async fn capture_database(&self, dir: &Path, tenant: Option<&TenantId>) -> Result<ComponentResult> {
        let db_dir = dir.join("database");
        tokio::fs::create_dir_all(&db_dir).await.map_err(|e| component_failure(ComponentKind::Database, e))?;

        let mut result = ComponentResult::success(ComponentKind::Database, "database");
        match (&self.database.url, tenant) {
            (Some(_), Some(tenant)) => {
                result.status = ComponentStatus::Skipped;
                result.warnings.push(format!(
                    "Database dump covers every tenant; skipped for the backup of tenant {}",
                    tenant
                ));
            }
            (Some(url), None) => {
                let output = tokio::process::Command::new(&self.database.dump_command)
                    .args(dump_args(&self.database.dump_args))
                    .arg(url)
                    .output()
                    .await
                    .map_err(|e| ConsoleError::BackupComponent {
                        component: ComponentKind::Database.to_string(),
                        message: format!("Failed to run {}: {}", self.database.dump_command, e),
                    })?;
                if !output.status.success() {
                    return Err(ConsoleError::BackupComponent {
                        component: ComponentKind::Database.to_string(),
                        message: format!(
                            "{} exited with {}: {}",
                            self.database.dump_command,
                            output.status,
                            String::from_utf8_lossy(&output.stderr).trim()
                        ),
                    });
                }
                tokio::fs::write(db_dir.join("database.sql"), &output.stdout)
                    .await
                    .map_err(|e| component_failure(ComponentKind::Database, e))?;
                result = result.with_count("dumpBytes", output.stdout.len() as u64);
            }
            (None, _) => {
                result.status = ComponentStatus::Skipped;
                result.warnings.push("No database URL configured; dump skipped".to_string());
            }
        }

        let stats = self.store.stats(tenant).await.map_err(|e| component_failure(ComponentKind::Database, e))?;
        write_json(&db_dir.join("database-stats.json"), &stats)
            .await
            .map_err(|e| component_failure(ComponentKind::Database, e))?;

        Ok(result
            .with_count("zones", stats.zones as u64)
            .with_count("records", stats.active_records as u64)
            .with_count("tsigKeys", stats.tsig_keys as u64))
    }

    /// Best effort: problems become warnings, never errors
    async fn capture_config(&self, dir: &Path) -> ComponentResult {
        let config_dir = dir.join("config");
        let mut result = ComponentResult::success(ComponentKind::Config, "config");
        if let Err(e) = tokio::fs::create_dir_all(&config_dir).await {
            result.warn(format!("Cannot create config directory: {}", e));
            return result.with_count("files", 0);
        }

        let mut copied = 0u64;
        for source in &self.config_files {
            let name = match source.file_name() {
                Some(name) => name,
                None => {
                    result.warn(format!("Skipping {}: not a file path", source.display()));
                    continue;
                }
            };
            match tokio::fs::copy(source, config_dir.join(name)).await {
                Ok(_) => copied += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    result.warn(format!("{} not found, skipped", source.display()));
                }
                Err(e) => result.warn(format!("Failed to copy {}: {}", source.display(), e)),
            }
        }
        result.with_count("files", copied)
    }

    async fn capture_tsig(&self, dir: &Path, tenant: Option<&TenantId>) -> Result<ComponentResult> {
        let keys = self.store.list_tsig_keys_with_secrets(tenant).await.map_err(|e| component_failure(ComponentKind::Tsig, e))?;
        let metadata: Vec<serde_json::Value> = keys
            .iter()
            .map(|key| {
                json!({
                    "tenantId": key.tenant_id,
                    "key": TsigKeyMetadata::from(key),
                })
            })
            .collect();
        write_json(&dir.join("tsig-keys.json"), &metadata)
            .await
            .map_err(|e| component_failure(ComponentKind::Tsig, e))?;
        Ok(ComponentResult::success(ComponentKind::Tsig, "tsig-keys.json").with_count("keys", keys.len() as u64))
    }

    /// Backups under the root, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupSummary>> {
        let mut backups = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(backups),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_PREFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());

            let summary = if metadata.is_dir() {
                let manifest = match tokio::fs::read(path.join(MANIFEST_FILE)).await {
                    Ok(bytes) => match serde_json::from_slice::<BackupManifest>(&bytes) {
                        Ok(manifest) => Some(manifest),
                        Err(e) => {
                            warn!(backup = %name, error = %e, "Unreadable manifest; listing backup as incomplete");
                            None
                        }
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => {
                        warn!(backup = %name, error = %e, "Cannot read manifest; listing backup as incomplete");
                        None
                    }
                };
                let dir = path.clone();
                let size = tokio::task::spawn_blocking(move || archive::disk_usage(&dir))
                    .await
                    .map_err(|e| ConsoleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
                BackupSummary {
                    id: name.clone(),
                    path,
                    compressed: false,
                    size_bytes: size,
                    timestamp: manifest.as_ref().map(|m| m.timestamp).unwrap_or(modified),
                    manifest,
                }
            } else if let Some(id) = name.strip_suffix(ARCHIVE_EXTENSION) {
                let manifest = self.archived_manifest(&path, id).await;
                BackupSummary {
                    id: id.to_string(),
                    compressed: true,
                    size_bytes: metadata.len(),
                    timestamp: manifest.as_ref().map(|m| m.timestamp).unwrap_or(modified),
                    path,
                    manifest,
                }
            } else {
                continue;
            };
            backups.push(summary);
        }

        backups.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(backups)
    }

    async fn archived_manifest(&self, path: &Path, id: &str) -> Option<BackupManifest> {
        let archive_path = path.to_path_buf();
        let entry = format!("{}/{}", id, MANIFEST_FILE);
        let read = tokio::task::spawn_blocking(move || archive::read_entry(&archive_path, &entry)).await;
        let mut manifest = match read {
            Ok(Ok(Some(bytes))) => match serde_json::from_slice::<BackupManifest>(&bytes) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(archive = %path.display(), error = %e, "Unreadable manifest in archive");
                    return None;
                }
            },
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(archive = %path.display(), error = %e, "Unreadable backup archive");
                return None;
            }
            Err(e) => {
                warn!(archive = %path.display(), error = %e, "Archive read task failed");
                return None;
            }
        };

        let sidecar = format!("{}{}", path.display(), CHECKSUM_EXTENSION);
        if let Ok(checksum) = tokio::fs::read_to_string(&sidecar).await {
            manifest.checksum = Some(checksum.trim().to_string());
        }
        Some(manifest)
    }

    /// Delete backups older than the retention window; returns how many went
    pub async fn cleanup_old_backups(&self) -> Result<usize> {
        let lock = root_lock(self.root());
        let _guard = lock.lock().await;

        let retention = Duration::from_secs(u64::from(self.config.retention_days) * 24 * 3600);
        let cutoff = SystemTime::now().checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = match tokio::fs::read_dir(self.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_PREFIX) || name.ends_with(CHECKSUM_EXTENSION) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified = metadata.modified()?;
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
                let sidecar = self.root().join(format!("{}{}", name, CHECKSUM_EXTENSION));
                if let Err(e) = tokio::fs::remove_file(&sidecar).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %sidecar.display(), error = %e, "Failed to remove checksum file");
                    }
                }
            }
            debug!(backup = %name, "Deleted expired backup");
            deleted += 1;
        }

        info!(deleted, retention_days = self.config.retention_days, "Backup cleanup finished");
        Ok(deleted)
    }

    /// Zone snapshots stored in a backup, from its directory or archive
    pub async fn load_zone_snapshots(&self, backup_id: &str) -> Result<Vec<ZoneSnapshot>> {
        check_backup_id(backup_id)?;
        let dir = self.root().join(backup_id);
        let archive_path = self.root().join(format!("{}{}", backup_id, ARCHIVE_EXTENSION));

        let mut files: Vec<(String, Vec<u8>)> = Vec::new();
        if dir.is_dir() {
            let mut entries = tokio::fs::read_dir(dir.join("zones")).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                files.push((name, tokio::fs::read(entry.path()).await?));
            }
        } else if archive_path.is_file() {
            let prefix = format!("{}/zones/", backup_id);
            files = tokio::task::spawn_blocking(move || {
                archive::read_entries(&archive_path, |path| path.starts_with(&prefix))
            })
            .await
            .map_err(|e| ConsoleError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        } else {
            return Err(ConsoleError::not_found(format!("backup {}", backup_id)));
        }

        let mut snapshots = Vec::new();
        for (name, contents) in files {
            if !name.ends_with(".json") || name.ends_with("zones-summary.json") {
                continue;
            }
            snapshots.push(serde_json::from_slice::<ZoneSnapshot>(&contents)?);
        }
        snapshots.sort_by(|a, b| a.zone.name.cmp(&b.zone.name));
        Ok(snapshots)
    }

    /// Run backup then cleanup every `interval`, starting one interval from now
    pub fn schedule_backups(self: Arc<Self>, interval: Duration) -> BackupSchedule {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                match self.perform_full_backup(None).await {
                    Ok(manifest) => info!(backup = %manifest.id, "Scheduled backup finished"),
                    Err(e) => error!(error = %e, "Scheduled backup failed"),
                }
                if let Err(e) = self.cleanup_old_backups().await {
                    error!(error = %e, "Scheduled backup cleanup failed");
                }
            }
        });
        info!(interval_secs = interval.as_secs(), "Backup schedule started");
        BackupSchedule { handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_id_checks() {
        assert!(check_backup_id("backup-20240101T000000.000Z").is_ok());
        assert!(check_backup_id("../etc").is_err());
        assert!(check_backup_id("backup-../../etc").is_err());
        assert!(check_backup_id("other").is_err());
    }

    #[test]
    fn test_dump_always_excludes_key_secrets() {
        assert_eq!(dump_args(&[]), vec![DUMP_SECRET_EXCLUSION.to_string()]);

        let configured = vec!["--no-owner".to_string()];
        assert_eq!(dump_args(&configured), vec!["--no-owner".to_string(), DUMP_SECRET_EXCLUSION.to_string()]);

        let explicit = vec![DUMP_SECRET_EXCLUSION.to_string()];
        assert_eq!(dump_args(&explicit).len(), 1);
    }

    #[tokio::test]
    async fn test_manifest_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        write_json_atomic(&path, &json!({ "id": "backup-x" })).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![MANIFEST_FILE.to_string()]);
    }

    fn manager_in(root: &Path) -> BackupManager {
        let backup = BackupConfig {
            directory: root.to_path_buf(),
            retention_days: 30,
            compress: false,
            interval_hours: 0,
        };
        BackupManager::new(
            Arc::new(crate::store::MemoryStore::new()),
            backup,
            DatabaseConfig::default(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_corrupt_manifest_does_not_hide_other_backups() {
        let dir = tempfile::TempDir::new().unwrap();
        let manager = manager_in(dir.path());
        let good = manager.perform_full_backup(None).await.unwrap();

        let crashed = dir.path().join("backup-crashed");
        std::fs::create_dir_all(&crashed).unwrap();
        std::fs::write(crashed.join(MANIFEST_FILE), "{\"id\": \"backup-cr").unwrap();

        let backups = manager.list_backups().await.unwrap();
        assert_eq!(backups.len(), 2);
        let listed_good = backups.iter().find(|b| b.id == good.id).unwrap();
        assert!(listed_good.is_complete());
        let listed_crashed = backups.iter().find(|b| b.id == "backup-crashed").unwrap();
        assert!(!listed_crashed.is_complete());
    }

    #[test]
    fn test_file_stem_is_one_component() {
        assert_eq!(file_stem("example.com"), "example.com");
        assert_eq!(file_stem("a/b"), "a_b");
    }

    #[test]
    fn test_root_lock_is_shared() {
        let a = root_lock(Path::new("/tmp/atlas-console-lock-test"));
        let b = root_lock(Path::new("/tmp/atlas-console-lock-test"));
        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! Health probes
//!
//! Each probe is an async function returning a message or an error; the
//! runner times it and turns either into a [`HealthCheckResult`], so one
//! probe failing never disturbs the others.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sysinfo::{DiskExt, System, SystemExt};

use crate::dns::provider::ProviderHandle;
use crate::errors::{ConsoleError, Result};
use crate::store::{Store, StoreStats};

pub const DNS_CHECK: &str = "dns";
pub const DATABASE_CHECK: &str = "database";
pub const DISK_CHECK: &str = "disk";
pub const MEMORY_CHECK: &str = "memory";
pub const ZONES_CHECK: &str = "zones";

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[display(fmt = "healthy")]
    Healthy,
    #[display(fmt = "failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub check_name: String,
    pub status: CheckStatus,
    pub response_time_ms: Option<u64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy<S: Into<String>>(check_name: &str, message: S) -> Self {
        HealthCheckResult {
            check_name: check_name.to_string(),
            status: CheckStatus::Healthy,
            response_time_ms: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed<S: Into<String>>(check_name: &str, message: S) -> Self {
        HealthCheckResult {
            status: CheckStatus::Failed,
            ..HealthCheckResult::healthy(check_name, message)
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Healthy
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    #[display(fmt = "healthy")]
    Healthy,
    #[display(fmt = "unhealthy")]
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub overall: OverallHealth,
    pub failed_checks: usize,
    pub checks: BTreeMap<String, HealthCheckResult>,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    pub fn from_checks(checks: BTreeMap<String, HealthCheckResult>) -> Self {
        let failed_checks = checks.values().filter(|c| !c.is_healthy()).count();
        HealthStatus {
            overall: if failed_checks == 0 {
                OverallHealth::Healthy
            } else {
                OverallHealth::Unhealthy
            },
            failed_checks,
            checks,
            timestamp: Utc::now(),
        }
    }
}

/// Run one probe, converting its error into a failed result
pub async fn run_probe<F>(name: &str, probe: F) -> HealthCheckResult
where
    F: Future<Output = Result<String>>,
{
    let started = Instant::now();
    let outcome = probe.await;
    let elapsed = started.elapsed().as_millis() as u64;
    let mut result = match outcome {
        Ok(message) => HealthCheckResult::healthy(name, message),
        Err(ConsoleError::Probe { message, .. }) => HealthCheckResult::failed(name, message),
        Err(e) => HealthCheckResult::failed(name, e.to_string()),
    };
    result.response_time_ms = Some(elapsed);
    result
}

fn probe_error<S: Into<String>>(check: &str, message: S) -> ConsoleError {
    ConsoleError::Probe {
        check: check.to_string(),
        message: message.into(),
    }
}

pub async fn check_dns(provider: &ProviderHandle) -> Result<String> {
    let provider = match provider {
        ProviderHandle::Available(provider) => provider,
        ProviderHandle::Unavailable { reason } => return Ok(format!("Not checked: {}", reason)),
    };
    let status = provider.get_status().await?;
    if status.reachable {
        Ok(format!("{} responding ({})", status.server, status.message))
    } else {
        Err(probe_error(DNS_CHECK, format!("{} not responding: {}", status.server, status.message)))
    }
}

pub async fn check_database(store: &dyn Store) -> Result<String> {
    store.ping().await?;
    Ok("Database connection OK".to_string())
}

/// Used-memory percentage above `threshold` is a failure
pub async fn check_memory(threshold_percent: f64) -> Result<String> {
    let (used, total) = tokio::task::spawn_blocking(|| {
        let mut system = System::new();
        system.refresh_memory();
        (system.used_memory(), system.total_memory())
    })
    .await
    .map_err(|e| probe_error(MEMORY_CHECK, e.to_string()))?;

    if total == 0 {
        return Ok("Memory information unavailable".to_string());
    }
    let percent = used as f64 / total as f64 * 100.0;
    if percent > threshold_percent {
        return Err(probe_error(
            MEMORY_CHECK,
            format!("Memory usage {:.1}% exceeds {:.0}%", percent, threshold_percent),
        ));
    }
    Ok(format!("Memory usage {:.1}% ({} MiB of {} MiB)", percent, used / 1_048_576, total / 1_048_576))
}

/// Disk usage of the filesystem holding `path`, reported inline
pub async fn check_disk(path: &Path) -> Result<String> {
    let path: PathBuf = path.to_path_buf();
    let usage = tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        system.refresh_disks_list();
        system
            .disks()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| (disk.mount_point().to_path_buf(), disk.total_space(), disk.available_space()))
    })
    .await
    .map_err(|e| probe_error(DISK_CHECK, e.to_string()))?;

    let (mount, total, available) = match usage {
        Some((mount, total, available)) if total > 0 => (mount, total, available),
        _ => return Ok("Disk information unavailable".to_string()),
    };
    let percent = (total - available.min(total)) as f64 / total as f64 * 100.0;
    Ok(format!("Disk usage {:.1}% on {}", percent, mount.display()))
}

/// Zone and record totals across tenants
pub async fn check_zones(store: &dyn Store) -> Result<StoreStats> {
    store.stats(None).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_probe_error_becomes_failed_result() {
        let result = run_probe("custom", async { Err(probe_error("custom", "boom")) }).await;
        assert_eq!(result.status, CheckStatus::Failed);
        assert_eq!(result.message, "boom");
        assert!(result.response_time_ms.is_some());

        let ok = run_probe("custom", async { Ok("fine".to_string()) }).await;
        assert!(ok.is_healthy());
    }

    #[tokio::test]
    async fn test_memory_threshold() {
        assert!(check_memory(100.0).await.is_ok());
        assert!(check_memory(0.0).await.is_err());
    }

    #[tokio::test]
    async fn test_disk_usage_is_reported_not_judged() {
        let message = check_disk(Path::new("/")).await.unwrap();
        assert!(message.starts_with("Disk usage") || message == "Disk information unavailable");

        let result = run_probe(DISK_CHECK, check_disk(Path::new("/"))).await;
        assert!(result.is_healthy());
    }

    #[tokio::test]
    async fn test_unconfigured_dns_is_not_a_failure() {
        let message = check_dns(&ProviderHandle::unavailable("not configured")).await.unwrap();
        assert!(message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_database_probe() {
        let store = MemoryStore::new();
        assert!(check_database(&store).await.is_ok());
    }

    #[test]
    fn test_overall_status() {
        let mut checks = BTreeMap::new();
        checks.insert("a".to_string(), HealthCheckResult::healthy("a", "ok"));
        assert_eq!(HealthStatus::from_checks(checks.clone()).overall, OverallHealth::Healthy);

        checks.insert("b".to_string(), HealthCheckResult::failed("b", "down"));
        let status = HealthStatus::from_checks(checks);
        assert_eq!(status.overall, OverallHealth::Unhealthy);
        assert_eq!(status.failed_checks, 1);
        assert_eq!(status.checks.len(), 2);
    }
}

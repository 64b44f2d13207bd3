//! Wiring of stores, services and timers from one configuration

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backup::{BackupManager, BackupSchedule};
use crate::config::ConsoleConfig;
use crate::dns::record::TenantId;
use crate::dns::{provider_from_config, DnsService};
use crate::errors::Result;
use crate::kea::KeaClient;
use crate::monitoring::{ConsoleMetrics, Monitor};
use crate::store::{MemoryStore, PgStore, Store};
use crate::web::AppState;

/// Postgres when a URL is configured, otherwise the in-memory store
pub async fn open_store(config: &ConsoleConfig, in_memory: bool) -> Result<Arc<dyn Store>> {
    if in_memory || config.database.url.is_none() {
        warn!("Using the in-memory store; data is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PgStore::connect(&config.database).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

/// Build the gateway state around an opened store
pub fn build_state(config: &ConsoleConfig, store: Arc<dyn Store>) -> Result<AppState> {
    let provider = provider_from_config(&config.dns);
    if !provider.is_available() {
        warn!("Nameserver sync disabled; writes are stored only");
    }

    let dns = DnsService::new(store.clone(), provider.clone()).with_key_file(config.dns.key_file.clone());
    let backups = BackupManager::new(
        store.clone(),
        config.backup.clone(),
        config.database.clone(),
        config.dns.config_files.clone(),
    );
    let metrics = Arc::new(ConsoleMetrics::new()?);
    let monitor = Monitor::new(store, provider, metrics, config.monitoring.clone());

    let kea = match KeaClient::from_config(&config.kea) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            info!(reason = %e, "Kea passthrough disabled");
            None
        }
    };

    Ok(AppState {
        dns: Arc::new(dns),
        backups: Arc::new(backups),
        monitor: Arc::new(monitor),
        kea,
        default_tenant: TenantId::new(config.web.default_tenant.clone()),
    })
}

/// Background timers owned by a running console
pub struct Timers {
    pub health: JoinHandle<()>,
    pub backups: Option<BackupSchedule>,
}

impl Timers {
    pub fn stop(self) {
        self.health.abort();
        if let Some(schedule) = self.backups {
            schedule.stop();
        }
    }
}

pub fn start_timers(config: &ConsoleConfig, state: &AppState) -> Timers {
    let health = state
        .monitor
        .clone()
        .start_health_timer(Duration::from_secs(config.monitoring.health_interval_secs));
    let backups = (config.backup.interval_hours > 0).then(|| {
        state
            .backups
            .clone()
            .schedule_backups(Duration::from_secs(config.backup.interval_hours * 3600))
    });
    Timers { health, backups }
}

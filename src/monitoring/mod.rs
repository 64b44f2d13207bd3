//! Monitoring and alerting
//!
//! # Features
//!
//! * **Health Probes** - nameserver, database, disk, memory and zone totals,
//!   run concurrently on a timer
//! * **Metrics** - request and error counters with a rolling response-time
//!   window and Prometheus rendering
//! * **Threshold Alerts** - error-rate warnings and critical alerts in a
//!   bounded ring with acknowledgement
//! * **Events** - every result and alert is broadcast to subscribers

pub mod alerts;
pub mod events;
pub mod health;
pub mod metrics;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MonitoringConfig;
use crate::dns::provider::ProviderHandle;
use crate::errors::Result;
use crate::store::Store;

pub use alerts::{Alert, AlertSeverity, AlertStore};
pub use events::{EventBus, MonitorEvent};
pub use health::{CheckStatus, HealthCheckResult, HealthStatus, OverallHealth};
pub use metrics::{ConsoleMetrics, MetricsSnapshot};

/// Error rate above which a warning alert is raised
pub const ERROR_RATE_WARNING: f64 = 0.10;
/// Error rate above which a critical alert is raised
pub const ERROR_RATE_CRITICAL: f64 = 0.25;

pub struct Monitor {
    metrics: Arc<ConsoleMetrics>,
    alerts: AlertStore,
    events: EventBus,
    checks: RwLock<BTreeMap<String, HealthCheckResult>>,
    store: Arc<dyn Store>,
    provider: ProviderHandle,
    config: MonitoringConfig,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn Store>,
        provider: ProviderHandle,
        metrics: Arc<ConsoleMetrics>,
        config: MonitoringConfig,
    ) -> Self {
        Monitor {
            metrics,
            alerts: AlertStore::default(),
            events: EventBus::default(),
            checks: RwLock::new(BTreeMap::new()),
            store,
            provider,
            config,
        }
    }

    pub fn metrics(&self) -> &Arc<ConsoleMetrics> {
        &self.metrics
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Merge a result into the check map; the latest result per check wins
    pub fn record_check(&self, result: HealthCheckResult) {
        let previous = self.checks.write().insert(result.check_name.clone(), result.clone());
        let was_healthy = previous.map_or(true, |p| p.is_healthy());
        if was_healthy && !result.is_healthy() {
            warn!(check = %result.check_name, message = %result.message, "Health check failed");
            self.raise(Alert::new(
                "health_check",
                AlertSeverity::Warning,
                format!("Health check '{}' failed: {}", result.check_name, result.message),
            ));
        } else if !was_healthy && result.is_healthy() {
            info!(check = %result.check_name, "Health check recovered");
        }
        self.events.publish(MonitorEvent::HealthCheck { result });
    }

    /// Run every probe concurrently and merge the results
    pub async fn run_health_checks(&self) -> HealthStatus {
        let memory_threshold = self.config.memory_threshold_percent;
        let store = self.store.as_ref();

        let (dns, database, disk, memory, zones) = futures::join!(
            health::run_probe(health::DNS_CHECK, health::check_dns(&self.provider)),
            health::run_probe(health::DATABASE_CHECK, health::check_database(store)),
            health::run_probe(health::DISK_CHECK, health::check_disk(&self.config.disk_path)),
            health::run_probe(health::MEMORY_CHECK, health::check_memory(memory_threshold)),
            health::run_probe(health::ZONES_CHECK, self.zone_health()),
        );

        for result in [dns, database, disk, memory, zones] {
            self.record_check(result);
        }
        let status = self.get_health_status();
        debug!(overall = %status.overall, failed = status.failed_checks, "Health checks finished");
        status
    }

    async fn zone_health(&self) -> Result<String> {
        let stats = health::check_zones(self.store.as_ref()).await?;
        self.metrics.set_zone_totals(stats.zones, stats.active_records);
        Ok(format!("{} zones, {} active records", stats.zones, stats.active_records))
    }

    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::from_checks(self.checks.read().clone())
    }

    fn raise(&self, alert: Alert) {
        self.alerts.push(alert.clone());
        self.events.publish(MonitorEvent::AlertCreated { alert });
    }

    /// Raise at most one alert for the current error rate
    pub fn check_error_threshold(&self) -> Option<Alert> {
        let rate = self.metrics.error_rate();
        let severity = if rate > ERROR_RATE_CRITICAL {
            AlertSeverity::Critical
        } else if rate > ERROR_RATE_WARNING {
            AlertSeverity::Warning
        } else {
            return None;
        };

        let alert = Alert::new(
            "error_rate",
            severity,
            format!(
                "Error rate {:.1}% ({} errors in {} requests)",
                rate * 100.0,
                self.metrics.errors(),
                self.metrics.queries()
            ),
        );
        warn!(severity = %severity, rate, "Error rate threshold exceeded");
        self.raise(alert.clone());
        Some(alert)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.list()
    }

    pub fn acknowledge_alert(&self, id: Uuid) -> Result<Alert> {
        let alert = self.alerts.acknowledge(id)?;
        self.events.publish(MonitorEvent::AlertAcknowledged { alert: alert.clone() });
        Ok(alert)
    }

    pub fn clear_old_alerts(&self, max_age: chrono::Duration) -> usize {
        let removed = self.alerts.clear_older_than(max_age);
        if removed > 0 {
            debug!(removed, "Old alerts cleared");
        }
        removed
    }

    /// Health probes, threshold check and alert pruning every `interval`
    pub fn start_health_timer(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Health check timer started");
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                self.run_health_checks().await;
                self.check_error_threshold();
                self.clear_old_alerts(chrono::Duration::hours(self.config.alert_max_age_hours));
                self.events.publish(MonitorEvent::Metrics {
                    metrics: self.metrics.snapshot(),
                });
            }
        })
    }
}

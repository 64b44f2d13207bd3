//! Bounded in-memory alert ring

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ConsoleError, Result};

/// Alerts kept before the oldest is dropped
pub const MAX_ALERTS: usize = 100;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    #[display(fmt = "info")]
    Info,
    #[display(fmt = "warning")]
    Warning,
    #[display(fmt = "critical")]
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new<S: Into<String>>(alert_type: &str, severity: AlertSeverity, message: S) -> Self {
        Alert {
            id: Uuid::new_v4(),
            alert_type: alert_type.to_string(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        }
    }
}

#[derive(Debug)]
pub struct AlertStore {
    alerts: RwLock<VecDeque<Alert>>,
    capacity: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        AlertStore::with_capacity(MAX_ALERTS)
    }
}

impl AlertStore {
    pub fn with_capacity(capacity: usize) -> Self {
        AlertStore {
            alerts: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, alert: Alert) {
        let mut alerts = self.alerts.write();
        while alerts.len() >= self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    /// Newest first
    pub fn list(&self) -> Vec<Alert> {
        self.alerts.read().iter().rev().cloned().collect()
    }

    pub fn unacknowledged(&self) -> usize {
        self.alerts.read().iter().filter(|a| !a.acknowledged).count()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }

    /// Flag an alert as seen; it stays in the ring
    pub fn acknowledge(&self, id: Uuid) -> Result<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ConsoleError::not_found(format!("alert {}", id)))?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
        }
        Ok(alert.clone())
    }

    /// Drop alerts older than `max_age`; returns how many went
    pub fn clear_older_than(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|a| a.timestamp >= cutoff);
        before - alerts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_newest() {
        let store = AlertStore::default();
        for i in 0..(MAX_ALERTS + 5) {
            store.push(Alert::new("test", AlertSeverity::Info, format!("alert {}", i)));
        }
        assert_eq!(store.len(), MAX_ALERTS);
        let alerts = store.list();
        assert_eq!(alerts[0].message, format!("alert {}", MAX_ALERTS + 4));
        assert_eq!(alerts.last().unwrap().message, "alert 5");
    }

    #[test]
    fn test_acknowledge_keeps_alert() {
        let store = AlertStore::default();
        let alert = Alert::new("error_rate", AlertSeverity::Warning, "Error rate 11%");
        let id = alert.id;
        store.push(alert);

        let acked = store.acknowledge(id).unwrap();
        assert!(acked.acknowledged);
        assert!(acked.acknowledged_at.is_some());
        assert_eq!(store.len(), 1);
        assert_eq!(store.unacknowledged(), 0);
        assert!(matches!(store.acknowledge(Uuid::new_v4()), Err(ConsoleError::NotFound(_))));
    }

    #[test]
    fn test_clear_old_alerts() {
        let store = AlertStore::default();
        let mut old = Alert::new("test", AlertSeverity::Info, "old");
        old.timestamp = Utc::now() - Duration::hours(48);
        store.push(old);
        store.push(Alert::new("test", AlertSeverity::Info, "new"));

        assert_eq!(store.clear_older_than(Duration::hours(24)), 1);
        assert_eq!(store.list()[0].message, "new");
    }
}

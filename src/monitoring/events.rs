//! Monitoring event channel
//!
//! A broadcast channel: publishing never waits on subscribers, and a slow
//! subscriber only loses its own backlog.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use super::alerts::Alert;
use super::health::HealthCheckResult;
use super::metrics::MetricsSnapshot;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    HealthCheck { result: HealthCheckResult },
    AlertCreated { alert: Alert },
    AlertAcknowledged { alert: Alert },
    Metrics { metrics: MetricsSnapshot },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        EventBus { sender }
    }
}

impl EventBus {
    pub fn publish(&self, event: MonitorEvent) {
        // no subscribers is not an error
        if self.sender.send(event).is_err() {
            trace!("Monitoring event dropped; no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::AlertSeverity;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(MonitorEvent::AlertCreated {
            alert: Alert::new("test", AlertSeverity::Info, "nobody listens"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_affect_others() {
        let bus = EventBus::default();
        let mut slow = bus.subscribe();
        for i in 0..(EVENT_CAPACITY + 10) {
            bus.publish(MonitorEvent::AlertCreated {
                alert: Alert::new("test", AlertSeverity::Info, format!("{}", i)),
            });
        }

        let mut fresh = bus.subscribe();
        bus.publish(MonitorEvent::AlertCreated {
            alert: Alert::new("test", AlertSeverity::Info, "latest"),
        });
        match fresh.recv().await.unwrap() {
            MonitorEvent::AlertCreated { alert } => assert_eq!(alert.message, "latest"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(slow.recv().await, Err(broadcast::error::RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = MonitorEvent::AlertCreated {
            alert: Alert::new("error_rate", AlertSeverity::Critical, "Error rate 30%"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alert_created");
        assert_eq!(json["alert"]["severity"], "critical");
    }
}

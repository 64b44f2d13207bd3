//! DNS provider capability
//!
//! The console keeps working without a live nameserver: the provider is a
//! sum type, and read views of an unavailable provider are served from a
//! static example payload that is flagged as such.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::dns::record::{Record, RecordType};
use crate::errors::{ConsoleError, Result};

/// A zone as the nameserver reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveZone {
    pub name: String,
    pub serial: Option<u32>,
    pub reachable: bool,
}

/// A record as served by the nameserver, in presentation form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub server: String,
    pub reachable: bool,
    pub response_time_ms: Option<u64>,
    pub zones: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdnsStatus {
    pub enabled: bool,
    pub key_name: Option<String>,
    pub algorithm: Option<String>,
    pub updates_sent: u64,
    pub updates_failed: u64,
    pub last_update: Option<DateTime<Utc>>,
}

/// Live access to the authoritative nameserver
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn get_zones(&self) -> Result<Vec<LiveZone>>;

    async fn get_records(&self, zone: &str) -> Result<Vec<LiveRecord>>;

    /// Add the record to its RRset, creating the RRset if needed
    async fn upsert_record(&self, zone: &str, record: &Record) -> Result<()>;

    /// Remove a whole RRset
    async fn delete_record(&self, zone: &str, name: &str, record_type: RecordType) -> Result<()>;

    /// Remove one member of an RRset
    async fn delete_record_data(&self, zone: &str, record: &Record) -> Result<()>;

    async fn get_status(&self) -> Result<ProviderStatus>;

    async fn get_ddns_status(&self) -> Result<DdnsStatus>;

    /// Name of the TSIG key signing updates, if any
    fn key_name(&self) -> Option<String> {
        None
    }
}

/// Where a read view's data came from
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    #[display(fmt = "live")]
    Live,
    #[display(fmt = "example")]
    Example,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveView<T> {
    pub source: ViewSource,
    pub data: T,
    pub message: Option<String>,
}

impl<T> LiveView<T> {
    fn live(data: T) -> Self {
        LiveView {
            source: ViewSource::Live,
            data,
            message: None,
        }
    }

    fn example(data: T, reason: &str) -> Self {
        LiveView {
            source: ViewSource::Example,
            data,
            message: Some(format!("{}; showing example data", reason)),
        }
    }
}

#[derive(Clone)]
pub enum ProviderHandle {
    Available(Arc<dyn DnsProvider>),
    Unavailable { reason: String },
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderHandle::Available(_) => f.write_str("ProviderHandle::Available"),
            ProviderHandle::Unavailable { reason } => write!(f, "ProviderHandle::Unavailable({})", reason),
        }
    }
}

impl ProviderHandle {
    pub fn available<P: DnsProvider + 'static>(provider: P) -> Self {
        ProviderHandle::Available(Arc::new(provider))
    }

    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        ProviderHandle::Unavailable { reason: reason.into() }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, ProviderHandle::Available(_))
    }

    /// Adapter for write paths; errors with "setup required" when absent
    pub fn require(&self) -> Result<&Arc<dyn DnsProvider>> {
        match self {
            ProviderHandle::Available(provider) => Ok(provider),
            ProviderHandle::Unavailable { reason } => Err(ConsoleError::UpstreamUnavailable(reason.clone())),
        }
    }

    pub async fn zones_view(&self) -> Result<LiveView<Vec<LiveZone>>> {
        match self {
            ProviderHandle::Available(provider) => Ok(LiveView::live(provider.get_zones().await?)),
            ProviderHandle::Unavailable { reason } => Ok(LiveView::example(example_zones(), reason)),
        }
    }

    pub async fn records_view(&self, zone: &str) -> Result<LiveView<Vec<LiveRecord>>> {
        match self {
            ProviderHandle::Available(provider) => Ok(LiveView::live(provider.get_records(zone).await?)),
            ProviderHandle::Unavailable { reason } => Ok(LiveView::example(example_records(zone), reason)),
        }
    }

    pub async fn status_view(&self) -> Result<LiveView<ProviderStatus>> {
        match self {
            ProviderHandle::Available(provider) => Ok(LiveView::live(provider.get_status().await?)),
            ProviderHandle::Unavailable { reason } => Ok(LiveView::example(example_status(), reason)),
        }
    }

    pub async fn ddns_view(&self) -> Result<LiveView<DdnsStatus>> {
        match self {
            ProviderHandle::Available(provider) => Ok(LiveView::live(provider.get_ddns_status().await?)),
            ProviderHandle::Unavailable { reason } => Ok(LiveView::example(example_ddns(), reason)),
        }
    }
}

fn example_zones() -> Vec<LiveZone> {
    vec![
        LiveZone {
            name: "example.com".to_string(),
            serial: Some(2024010101),
            reachable: true,
        },
        LiveZone {
            name: "example.org".to_string(),
            serial: Some(2024010101),
            reachable: true,
        },
    ]
}

fn example_records(zone: &str) -> Vec<LiveRecord> {
    let origin = format!("{}.", zone.trim_end_matches('.'));
    let record = |name: String, record_type: &str, ttl: u32, value: String| LiveRecord {
        name,
        record_type: record_type.to_string(),
        ttl,
        value,
    };
    vec![
        record(
            origin.clone(),
            "SOA",
            3600,
            format!("ns1.{} hostmaster.{} 2024010101 3600 1800 604800 86400", origin, origin),
        ),
        record(origin.clone(), "NS", 3600, format!("ns1.{}", origin)),
        record(origin.clone(), "A", 300, "192.0.2.10".to_string()),
        record(format!("www.{}", origin), "A", 300, "192.0.2.10".to_string()),
        record(origin.clone(), "MX", 3600, format!("10 mail.{}", origin)),
    ]
}

fn example_status() -> ProviderStatus {
    ProviderStatus {
        server: "127.0.0.1:53".to_string(),
        reachable: true,
        response_time_ms: Some(2),
        zones: 2,
        message: "BIND 9 example status".to_string(),
    }
}

fn example_ddns() -> DdnsStatus {
    DdnsStatus {
        enabled: true,
        key_name: Some("ddns-key".to_string()),
        algorithm: Some("hmac-sha256".to_string()),
        updates_sent: 0,
        updates_failed: 0,
        last_update: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_views_are_flagged_examples() {
        let handle = ProviderHandle::unavailable("DNS provider is not configured");
        assert!(!handle.is_available());

        let zones = handle.zones_view().await.unwrap();
        assert_eq!(zones.source, ViewSource::Example);
        assert!(!zones.data.is_empty());
        assert!(zones.message.unwrap().contains("example data"));

        let records = handle.records_view("test.local").await.unwrap();
        assert_eq!(records.source, ViewSource::Example);
        assert!(records.data.iter().all(|r| r.name.ends_with("test.local.")));

        assert_eq!(handle.status_view().await.unwrap().source, ViewSource::Example);
        assert_eq!(handle.ddns_view().await.unwrap().source, ViewSource::Example);
    }

    #[test]
    fn test_unavailable_write_requires_setup() {
        let handle = ProviderHandle::unavailable("DNS provider is not configured");
        let err = handle.require().err().unwrap();
        assert_eq!(err.kind(), "setup_required");
    }
}

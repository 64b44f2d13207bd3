//! TSIG-signed RFC 2136 dynamic update client
//!
//! hickory's client is synchronous, so every exchange runs on the blocking
//! pool and is bounded by the configured control-plane timeout. Zone
//! listings come from SOA lookups against the same server; record listings
//! from a signed AXFR.

use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::rdata;
use hickory_client::rr::{DNSClass, Name, RData, Record as DnsRecord, RecordType as DnsRecordType};
use hickory_client::tcp::TcpClientConnection;
use hickory_client::udp::UdpClientConnection;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::DnsConfig;
use crate::dns::provider::{DdnsStatus, DnsProvider, LiveRecord, LiveZone, ProviderHandle, ProviderStatus};
use crate::dns::record::{absolute_name, Record, RecordType};
use crate::dns::tsig;
use crate::errors::{ConsoleError, Result};

lazy_static! {
    static ref CAA_VALUE_REGEX: Regex = Regex::new(r#"^(\d+)\s+([a-zA-Z0-9]+)\s+"(.*)"$"#).expect("Failed to compile CAA regex");
}

/// Key material used to sign updates
#[derive(Debug, Clone)]
pub struct TsigCredentials {
    pub name: String,
    pub algorithm: String,
    pub secret: String,
}

#[derive(Debug, Default)]
struct UpdateCounters {
    sent: AtomicU64,
    failed: AtomicU64,
    last_update: Mutex<Option<DateTime<Utc>>>,
}

pub struct NsUpdateProvider {
    server: SocketAddr,
    key: TsigCredentials,
    zones: Vec<String>,
    timeout: Duration,
    counters: UpdateCounters,
}

impl NsUpdateProvider {
    pub fn new(server: SocketAddr, key: TsigCredentials, zones: Vec<String>, timeout: Duration) -> Result<Self> {
        // fail early on unusable key material
        tsig::signer(&key.name, &key.algorithm, &key.secret)?;
        Ok(NsUpdateProvider {
            server,
            key,
            zones,
            timeout,
            counters: UpdateCounters::default(),
        })
    }

    fn resolver(&self) -> TokioAsyncResolver {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig::new(self.server, Protocol::Udp));
        let mut opts = ResolverOpts::default();
        opts.timeout = self.timeout;
        opts.attempts = 1;
        TokioAsyncResolver::tokio(config, opts)
    }

    async fn soa_serial(&self, zone: &str) -> Result<Option<u32>> {
        let lookup = self
            .resolver()
            .soa_lookup(absolute_name("@", zone))
            .await
            .map_err(|e| ConsoleError::Upstream(format!("SOA lookup for {} failed: {}", zone, e)))?;
        Ok(lookup.iter().next().map(|soa| soa.serial()))
    }

    /// Run a blocking exchange with the timeout applied
    async fn bounded<T, F>(&self, operation: &str, task: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<Result<T>, tokio::task::JoinError>>,
    {
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(ConsoleError::Timeout {
                operation: operation.to_string(),
                duration: self.timeout,
            }),
            Ok(Err(join)) => Err(ConsoleError::Upstream(format!("{} task failed: {}", operation, join))),
            Ok(Ok(result)) => result,
        }
    }

    /// Send one signed update built by `build`
    async fn send_update<F>(&self, operation: String, build: F) -> Result<()>
    where
        F: FnOnce(&SyncClient<UdpClientConnection>) -> hickory_client::error::ClientResult<ResponseCode> + Send + 'static,
    {
        let server = self.server;
        let key = self.key.clone();
        let label = operation.clone();
        let task = tokio::task::spawn_blocking(move || -> Result<ResponseCode> {
            let conn = UdpClientConnection::new(server)
                .map_err(|e| ConsoleError::Upstream(format!("Failed to create UDP connection to {}: {}", server, e)))?;
            let signer = tsig::signer(&key.name, &key.algorithm, &key.secret)?;
            let client = SyncClient::with_tsigner(conn, signer);
            build(&client).map_err(|e| ConsoleError::Upstream(format!("{} failed: {}", label, e)))
        });

        let outcome = self.bounded(&operation, task).await;
        let outcome = match outcome {
            Ok(ResponseCode::NoError) => Ok(()),
            Ok(code) => Err(ConsoleError::Upstream(format!(
                "{} rejected by {} with response code {:?}",
                operation, self.server, code
            ))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                *self.counters.last_update.lock() = Some(Utc::now());
                info!(server = %self.server, "{} applied", operation);
                Ok(())
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(server = %self.server, error = %e, "{} failed", operation);
                Err(e)
            }
        }
    }
}

/// Build the provider from configuration, or explain why it is unavailable
pub fn provider_from_config(config: &DnsConfig) -> ProviderHandle {
    let server = match config.server.as_deref() {
        Some(server) => server,
        None => return ProviderHandle::unavailable("DNS provider is not configured (dns.server is unset)"),
    };
    let server: SocketAddr = match server.parse() {
        Ok(addr) => addr,
        Err(_) => {
            warn!(server = %server, "Invalid DNS server address; dynamic updates disabled");
            return ProviderHandle::unavailable(format!("Invalid DNS server address: {}", server));
        }
    };
    let key = match (config.tsig_key_name.as_ref(), config.tsig_secret.as_ref()) {
        (Some(name), Some(secret)) => TsigCredentials {
            name: name.clone(),
            algorithm: config.tsig_algorithm.clone(),
            secret: secret.clone(),
        },
        _ => return ProviderHandle::unavailable("DNS provider is not configured (no TSIG key)"),
    };

    match NsUpdateProvider::new(server, key, config.managed_zones.clone(), config.timeout()) {
        Ok(provider) => {
            info!(server = %server, zones = config.managed_zones.len(), "Dynamic DNS updates enabled");
            ProviderHandle::available(provider)
        }
        Err(e) => {
            warn!(error = %e, "TSIG key unusable; dynamic updates disabled");
            ProviderHandle::unavailable(e.to_string())
        }
    }
}

fn parse_name(name: &str) -> Result<Name> {
    Name::from_str(name).map_err(|e| ConsoleError::validation(format!("Invalid DNS name {}: {}", name, e)))
}

fn to_u16(field: &str, value: Option<i64>) -> Result<u16> {
    value
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| ConsoleError::validation(format!("{} must be between 0 and 65535", field)))
}

fn record_type_of(record_type: RecordType) -> DnsRecordType {
    match record_type {
        RecordType::A => DnsRecordType::A,
        RecordType::AAAA => DnsRecordType::AAAA,
        RecordType::CNAME => DnsRecordType::CNAME,
        RecordType::MX => DnsRecordType::MX,
        RecordType::NS => DnsRecordType::NS,
        RecordType::PTR => DnsRecordType::PTR,
        RecordType::SOA => DnsRecordType::SOA,
        RecordType::SRV => DnsRecordType::SRV,
        RecordType::TXT => DnsRecordType::TXT,
        RecordType::CAA => DnsRecordType::CAA,
    }
}

fn caa_rdata(value: &str) -> Result<rdata::CAA> {
    let caps = CAA_VALUE_REGEX
        .captures(value)
        .ok_or_else(|| ConsoleError::validation("CAA record must be in the form: flags tag \"value\""))?;
    let critical = caps[1].parse::<u8>().map(|f| f & 0x80 != 0).unwrap_or(false);
    let target = caps[3].to_string();

    match &caps[2] {
        "issue" | "issuewild" => {
            let ca = if target.is_empty() {
                None
            } else {
                Some(parse_name(&target)?)
            };
            if &caps[2] == "issue" {
                Ok(rdata::CAA::new_issue(critical, ca, Vec::new()))
            } else {
                Ok(rdata::CAA::new_issuewild(critical, ca, Vec::new()))
            }
        }
        "iodef" => {
            let url = reqwest::Url::parse(&target)
                .map_err(|e| ConsoleError::validation(format!("Invalid iodef URL {}: {}", target, e)))?;
            Ok(rdata::CAA::new_iodef(critical, url))
        }
        other => Err(ConsoleError::validation(format!("Unsupported CAA tag: {}", other))),
    }
}

/// Convert a stored record into the wire record sent in an update
pub fn to_dns_record(zone: &str, record: &Record) -> Result<DnsRecord> {
    let owner = parse_name(&absolute_name(&record.name, zone))?;
    let ttl = u32::try_from(record.ttl).map_err(|_| ConsoleError::validation("TTL out of range"))?;
    let value = record.value.trim();

    let data = match record.record_type {
        RecordType::A => {
            let addr = Ipv4Addr::from_str(value)
                .map_err(|_| ConsoleError::validation(format!("Invalid IPv4 address: {}", value)))?;
            RData::A(addr.into())
        }
        RecordType::AAAA => {
            let addr = Ipv6Addr::from_str(value)
                .map_err(|_| ConsoleError::validation(format!("Invalid IPv6 address: {}", value)))?;
            RData::AAAA(addr.into())
        }
        RecordType::CNAME => RData::CNAME(rdata::CNAME(parse_name(&absolute_name(value, zone))?)),
        RecordType::NS => RData::NS(rdata::NS(parse_name(&absolute_name(value, zone))?)),
        RecordType::PTR => RData::PTR(rdata::PTR(parse_name(&absolute_name(value, zone))?)),
        RecordType::MX => RData::MX(rdata::MX::new(
            to_u16("MX priority", record.priority)?,
            parse_name(&absolute_name(value, zone))?,
        )),
        RecordType::SRV => RData::SRV(rdata::SRV::new(
            to_u16("SRV priority", record.priority)?,
            to_u16("SRV weight", record.weight)?,
            to_u16("SRV port", record.port)?,
            parse_name(&absolute_name(value, zone))?,
        )),
        RecordType::TXT => {
            let text = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
            RData::TXT(rdata::TXT::new(vec![text.to_string()]))
        }
        RecordType::CAA => RData::CAA(caa_rdata(value)?),
        RecordType::SOA => {
            return Err(ConsoleError::InvalidRequest(
                "SOA records are maintained by the nameserver and cannot be sent as dynamic updates".to_string(),
            ))
        }
    };

    let mut dns_record = DnsRecord::from_rdata(owner, ttl, data);
    dns_record.set_dns_class(DNSClass::IN);
    Ok(dns_record)
}

fn live_record(record: &DnsRecord) -> LiveRecord {
    LiveRecord {
        name: record.name().to_string(),
        record_type: record.record_type().to_string(),
        ttl: record.ttl(),
        value: record.data().map(|d| d.to_string()).unwrap_or_default(),
    }
}

#[async_trait]
impl DnsProvider for NsUpdateProvider {
    async fn get_zones(&self) -> Result<Vec<LiveZone>> {
        let lookups = self.zones.iter().map(|zone| async move {
            match self.soa_serial(zone).await {
                Ok(serial) => LiveZone {
                    name: zone.clone(),
                    serial,
                    reachable: serial.is_some(),
                },
                Err(e) => {
                    debug!(zone = %zone, error = %e, "Zone SOA lookup failed");
                    LiveZone {
                        name: zone.clone(),
                        serial: None,
                        reachable: false,
                    }
                }
            }
        });
        Ok(futures::future::join_all(lookups).await)
    }

    async fn get_records(&self, zone: &str) -> Result<Vec<LiveRecord>> {
        let server = self.server;
        let key = self.key.clone();
        let origin = parse_name(&absolute_name("@", zone))?;
        let operation = format!("AXFR of {}", zone);
        let label = operation.clone();

        let task = tokio::task::spawn_blocking(move || -> Result<Vec<LiveRecord>> {
            let conn = TcpClientConnection::new(server)
                .map_err(|e| ConsoleError::Upstream(format!("Failed to connect to {}: {}", server, e)))?;
            let signer = tsig::signer(&key.name, &key.algorithm, &key.secret)?;
            let client = SyncClient::with_tsigner(conn, signer);
            let response = client
                .query(&origin, DNSClass::IN, DnsRecordType::AXFR)
                .map_err(|e| ConsoleError::Upstream(format!("{} failed: {}", label, e)))?;
            match response.response_code() {
                ResponseCode::NoError => Ok(response.answers().iter().map(live_record).collect()),
                code => Err(ConsoleError::Upstream(format!("{} refused with response code {:?}", label, code))),
            }
        });
        self.bounded(&operation, task).await
    }

    async fn upsert_record(&self, zone: &str, record: &Record) -> Result<()> {
        let dns_record = to_dns_record(zone, record)?;
        let origin = parse_name(&absolute_name("@", zone))?;
        let operation = format!("Update {} {} in {}", dns_record.name(), record.record_type, zone);
        self.send_update(operation, move |client| {
            client.append(dns_record, origin, false).map(|r| r.response_code())
        })
        .await
    }

    async fn delete_record(&self, zone: &str, name: &str, record_type: RecordType) -> Result<()> {
        let owner = parse_name(&absolute_name(name, zone))?;
        let origin = parse_name(&absolute_name("@", zone))?;
        let mut rrset = DnsRecord::with(owner.clone(), record_type_of(record_type), 0);
        rrset.set_dns_class(DNSClass::IN);
        let operation = format!("Delete {} {} from {}", owner, record_type, zone);
        self.send_update(operation, move |client| {
            client.delete_rrset(rrset, origin).map(|r| r.response_code())
        })
        .await
    }

    async fn delete_record_data(&self, zone: &str, record: &Record) -> Result<()> {
        let dns_record = to_dns_record(zone, record)?;
        let origin = parse_name(&absolute_name("@", zone))?;
        let operation = format!("Delete {} {} {} from {}", dns_record.name(), record.record_type, record.value, zone);
        self.send_update(operation, move |client| {
            client.delete_by_rdata(dns_record, origin).map(|r| r.response_code())
        })
        .await
    }

    async fn get_status(&self) -> Result<ProviderStatus> {
        let probe_zone = match self.zones.first() {
            Some(zone) => zone.clone(),
            None => {
                return Ok(ProviderStatus {
                    server: self.server.to_string(),
                    reachable: false,
                    response_time_ms: None,
                    zones: 0,
                    message: "No managed zones configured".to_string(),
                })
            }
        };

        let started = Instant::now();
        let result = self.soa_serial(&probe_zone).await;
        let elapsed = started.elapsed().as_millis() as u64;
        Ok(match result {
            Ok(serial) => ProviderStatus {
                server: self.server.to_string(),
                reachable: true,
                response_time_ms: Some(elapsed),
                zones: self.zones.len(),
                message: format!("{} answered SOA (serial {})", probe_zone, serial.unwrap_or(0)),
            },
            Err(e) => ProviderStatus {
                server: self.server.to_string(),
                reachable: false,
                response_time_ms: None,
                zones: self.zones.len(),
                message: e.to_string(),
            },
        })
    }

    async fn get_ddns_status(&self) -> Result<DdnsStatus> {
        Ok(DdnsStatus {
            enabled: true,
            key_name: Some(self.key.name.clone()),
            algorithm: Some(self.key.algorithm.clone()),
            updates_sent: self.counters.sent.load(Ordering::Relaxed),
            updates_failed: self.counters.failed.load(Ordering::Relaxed),
            last_update: *self.counters.last_update.lock(),
        })
    }

    fn key_name(&self) -> Option<String> {
        Some(self.key.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::{RecordStatus, TenantId};
    use uuid::Uuid;

    fn record(name: &str, record_type: RecordType, value: &str) -> Record {
        let now = Utc::now();
        Record {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            zone_id: Uuid::new_v4(),
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
    fn test_a_record_conversion() {
        let converted = to_dns_record("example.com", &record("www", RecordType::A, "192.0.2.1")).unwrap();
        assert_eq!(converted.name().to_string(), "www.example.com.");
        assert_eq!(converted.record_type(), DnsRecordType::A);
        assert_eq!(converted.ttl(), 300);
        assert_eq!(converted.dns_class(), DNSClass::IN);
    }

    #[test]
    fn test_relative_targets_are_qualified() {
        let mut mx = record("@", RecordType::MX, "mail");
        mx.priority = Some(10);
        let converted = to_dns_record("example.com", &mx).unwrap();
        assert_eq!(converted.name().to_string(), "example.com.");
        assert_eq!(converted.data().unwrap().to_string(), "10 mail.example.com.");

        let cname = to_dns_record("example.com", &record("www", RecordType::CNAME, "web.example.net.")).unwrap();
        assert_eq!(cname.data().unwrap().to_string(), "web.example.net.");
    }

    #[test]
    fn test_srv_needs_all_fields() {
        let mut srv = record("_sip._tcp", RecordType::SRV, "sip.example.com.");
        srv.priority = Some(10);
        srv.weight = Some(5);
        assert!(to_dns_record("example.com", &srv).is_err());
        srv.port = Some(5060);
        assert!(to_dns_record("example.com", &srv).is_ok());
    }

    #[test]
    fn test_soa_is_not_sent() {
        let soa = record("@", RecordType::SOA, "ns1.example.com. admin.example.com. 1 2 3 4 5");
        assert!(matches!(to_dns_record("example.com", &soa), Err(ConsoleError::InvalidRequest(_))));
    }

    #[test]
    fn test_caa_conversion() {
        let caa = record("@", RecordType::CAA, "0 issue \"letsencrypt.org\"");
        assert!(to_dns_record("example.com", &caa).is_ok());
        let iodef = record("@", RecordType::CAA, "0 iodef \"mailto:security@example.com\"");
        assert!(to_dns_record("example.com", &iodef).is_ok());
        let bad = record("@", RecordType::CAA, "0 policy \"x\"");
        assert!(to_dns_record("example.com", &bad).is_err());
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = DnsConfig::default();
        assert!(!provider_from_config(&config).is_available());

        config.server = Some("127.0.0.1:5353".into());
        assert!(!provider_from_config(&config).is_available());

        config.tsig_key_name = Some("ddns-key".into());
        config.tsig_secret = Some(tsig::generate_secret("hmac-sha256"));
        assert!(provider_from_config(&config).is_available());

        config.server = Some("not an address".into());
        assert!(!provider_from_config(&config).is_available());
    }

    #[tokio::test]
    async fn test_ddns_status_starts_empty() {
        let provider = NsUpdateProvider::new(
            "127.0.0.1:5353".parse().unwrap(),
            TsigCredentials {
                name: "ddns-key".into(),
                algorithm: "hmac-sha256".into(),
                secret: tsig::generate_secret("hmac-sha256"),
            },
            vec![],
            Duration::from_secs(1),
        )
        .unwrap();
        let status = provider.get_ddns_status().await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.updates_sent, 0);
        assert_eq!(status.key_name.as_deref(), Some("ddns-key"));

        let health = provider.get_status().await.unwrap();
        assert!(!health.reachable);
        assert_eq!(health.zones, 0);
    }
}

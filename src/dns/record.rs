//! Zone, record and TSIG key models shared by the store, the codec and the gateway

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ConsoleError;

pub const DEFAULT_TTL: i64 = 3600;
pub const DEFAULT_REFRESH: i64 = 3600;
pub const DEFAULT_RETRY: i64 = 1800;
pub const DEFAULT_EXPIRE: i64 = 604800;
pub const DEFAULT_MINIMUM_TTL: i64 = 86400;

/// Tenant isolation key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        TenantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource record types managed by the console
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    SOA,
    SRV,
    TXT,
    CAA,
}

impl RecordType {
    /// Order in which record groups are written to a zone file
    pub const ZONE_FILE_ORDER: [RecordType; 10] = [
        RecordType::SOA,
        RecordType::NS,
        RecordType::A,
        RecordType::AAAA,
        RecordType::CNAME,
        RecordType::MX,
        RecordType::TXT,
        RecordType::SRV,
        RecordType::PTR,
        RecordType::CAA,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SOA => "SOA",
            RecordType::SRV => "SRV",
            RecordType::TXT => "TXT",
            RecordType::CAA => "CAA",
        }
    }

    /// Types that may exist at most once per owner name
    pub fn is_singleton(&self) -> bool {
        matches!(self, RecordType::SOA | RecordType::CNAME)
    }

    pub fn uses_priority(&self) -> bool {
        matches!(self, RecordType::MX | RecordType::SRV)
    }
}

impl FromStr for RecordType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "MX" => Ok(RecordType::MX),
            "NS" => Ok(RecordType::NS),
            "PTR" => Ok(RecordType::PTR),
            "SOA" => Ok(RecordType::SOA),
            "SRV" => Ok(RecordType::SRV),
            "TXT" => Ok(RecordType::TXT),
            "CAA" => Ok(RecordType::CAA),
            other => Err(ConsoleError::validation(format!("Unsupported record type: {}", other))),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    #[display(fmt = "master")]
    Master,
    #[display(fmt = "slave")]
    Slave,
    #[display(fmt = "forward")]
    Forward,
}

impl FromStr for ZoneType {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "master" | "primary" => Ok(ZoneType::Master),
            "slave" | "secondary" => Ok(ZoneType::Slave),
            "forward" => Ok(ZoneType::Forward),
            other => Err(ConsoleError::validation(format!("Unsupported zone type: {}", other))),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    #[display(fmt = "active")]
    Active,
    #[display(fmt = "disabled")]
    Disabled,
}

impl FromStr for ZoneStatus {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ZoneStatus::Active),
            "disabled" => Ok(ZoneStatus::Disabled),
            other => Err(ConsoleError::validation(format!("Unsupported zone status: {}", other))),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[display(fmt = "active")]
    Active,
    #[display(fmt = "deleted")]
    Deleted,
}

impl FromStr for RecordStatus {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "deleted" => Ok(RecordStatus::Deleted),
            other => Err(ConsoleError::validation(format!("Unsupported record status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub zone_type: ZoneType,
    pub status: ZoneStatus,
    pub primary_ns: String,
    pub admin_email: String,
    pub refresh_interval: i64,
    pub retry_interval: i64,
    pub expire_interval: i64,
    pub minimum_ttl: i64,
    pub serial: i64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Zone {
    /// Admin mailbox in SOA rname form (`hostmaster.example.com.`)
    pub fn rname(&self) -> String {
        let mailbox = self.admin_email.replacen('@', ".", 1);
        fqdn(&mailbox)
    }
}

/// Zone creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewZone {
    pub name: String,
    #[serde(default = "default_zone_type")]
    pub zone_type: ZoneType,
    pub primary_ns: String,
    pub admin_email: String,
    #[serde(default = "default_refresh")]
    pub refresh_interval: i64,
    #[serde(default = "default_retry")]
    pub retry_interval: i64,
    #[serde(default = "default_expire")]
    pub expire_interval: i64,
    #[serde(default = "default_minimum_ttl")]
    pub minimum_ttl: i64,
}

impl NewZone {
    pub fn new(name: &str, primary_ns: &str, admin_email: &str) -> Self {
        NewZone {
            name: name.to_string(),
            zone_type: ZoneType::Master,
            primary_ns: primary_ns.to_string(),
            admin_email: admin_email.to_string(),
            refresh_interval: DEFAULT_REFRESH,
            retry_interval: DEFAULT_RETRY,
            expire_interval: DEFAULT_EXPIRE,
            minimum_ttl: DEFAULT_MINIMUM_TTL,
        }
    }
}

impl From<&Zone> for NewZone {
    fn from(zone: &Zone) -> Self {
        NewZone {
            name: zone.name.clone(),
            zone_type: zone.zone_type,
            primary_ns: zone.primary_ns.clone(),
            admin_email: zone.admin_email.clone(),
            refresh_interval: zone.refresh_interval,
            retry_interval: zone.retry_interval,
            expire_interval: zone.expire_interval,
            minimum_ttl: zone.minimum_ttl,
        }
    }
}

fn default_zone_type() -> ZoneType {
    ZoneType::Master
}

fn default_refresh() -> i64 {
    DEFAULT_REFRESH
}

fn default_retry() -> i64 {
    DEFAULT_RETRY
}

fn default_expire() -> i64 {
    DEFAULT_EXPIRE
}

fn default_minimum_ttl() -> i64 {
    DEFAULT_MINIMUM_TTL
}

/// Partial zone update; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneUpdate {
    pub zone_type: Option<ZoneType>,
    pub status: Option<ZoneStatus>,
    pub primary_ns: Option<String>,
    pub admin_email: Option<String>,
    pub refresh_interval: Option<i64>,
    pub retry_interval: Option<i64>,
    pub expire_interval: Option<i64>,
    pub minimum_ttl: Option<i64>,
}

impl ZoneUpdate {
    pub fn is_empty(&self) -> bool {
        self.zone_type.is_none()
            && self.status.is_none()
            && self.primary_ns.is_none()
            && self.admin_email.is_none()
            && self.refresh_interval.is_none()
            && self.retry_interval.is_none()
            && self.expire_interval.is_none()
            && self.minimum_ttl.is_none()
    }

    pub fn apply(&self, zone: &mut Zone) {
        if let Some(zone_type) = self.zone_type {
            zone.zone_type = zone_type;
        }
        if let Some(status) = self.status {
            zone.status = status;
        }
        if let Some(ref ns) = self.primary_ns {
            zone.primary_ns = ns.clone();
        }
        if let Some(ref email) = self.admin_email {
            zone.admin_email = email.clone();
        }
        if let Some(v) = self.refresh_interval {
            zone.refresh_interval = v;
        }
        if let Some(v) = self.retry_interval {
            zone.retry_interval = v;
        }
        if let Some(v) = self.expire_interval {
            zone.expire_interval = v;
        }
        if let Some(v) = self.minimum_ttl {
            zone.minimum_ttl = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub zone_id: Uuid,
    pub name: String,
    pub record_type: RecordType,
    pub value: String,
    pub ttl: i64,
    pub priority: Option<i64>,
    pub weight: Option<i64>,
    pub port: Option<i64>,
    pub status: RecordStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Value as written in a zone file, with MX/SRV numeric fields prefixed
    pub fn presentation_value(&self) -> String {
        match self.record_type {
            RecordType::MX => format!("{} {}", self.priority.unwrap_or(0), self.value),
            RecordType::SRV => format!(
                "{} {} {} {}",
                self.priority.unwrap_or(0),
                self.weight.unwrap_or(0),
                self.port.unwrap_or(0),
                self.value
            ),
            _ => self.value.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// A record as submitted for validation and creation
///
/// Numeric fields are wide on purpose so that out-of-range input reaches
/// the validation engine instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCandidate {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub value: String,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub port: Option<i64>,
}

impl RecordCandidate {
    pub fn new(name: &str, record_type: RecordType, value: &str) -> Self {
        RecordCandidate {
            name: name.to_string(),
            record_type,
            value: value.to_string(),
            ttl: None,
            priority: None,
            weight: None,
            port: None,
        }
    }

    pub fn with_ttl(mut self, ttl: i64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_srv(mut self, priority: i64, weight: i64, port: i64) -> Self {
        self.priority = Some(priority);
        self.weight = Some(weight);
        self.port = Some(port);
        self
    }

    pub fn effective_ttl(&self) -> i64 {
        self.ttl.unwrap_or(DEFAULT_TTL)
    }
}

impl From<&Record> for RecordCandidate {
    fn from(record: &Record) -> Self {
        RecordCandidate {
            name: record.name.clone(),
            record_type: record.record_type,
            value: record.value.clone(),
            ttl: Some(record.ttl),
            priority: record.priority,
            weight: record.weight,
            port: record.port,
        }
    }
}

/// Natural key the UI addresses records by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Narrows the match to one member of an RRset
    #[serde(default)]
    pub value: Option<String>,
}

impl RecordKey {
    pub fn new(name: &str, record_type: RecordType) -> Self {
        RecordKey {
            name: name.to_string(),
            record_type,
            value: None,
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        record.name == self.name
            && record.record_type == self.record_type
            && self.value.as_ref().map_or(true, |v| *v == record.value)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type)?;
        if let Some(ref value) = self.value {
            write!(f, " {}", value)?;
        }
        Ok(())
    }
}

/// Partial record update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub value: Option<String>,
    pub ttl: Option<i64>,
    pub priority: Option<i64>,
    pub weight: Option<i64>,
    pub port: Option<i64>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.ttl.is_none()
            && self.priority.is_none()
            && self.weight.is_none()
            && self.port.is_none()
    }

    /// Candidate that results from applying this update to `record`
    pub fn merged_candidate(&self, record: &Record) -> RecordCandidate {
        let mut candidate = RecordCandidate::from(record);
        if let Some(ref value) = self.value {
            candidate.value = value.clone();
        }
        if self.ttl.is_some() {
            candidate.ttl = self.ttl;
        }
        if self.priority.is_some() {
            candidate.priority = self.priority;
        }
        if self.weight.is_some() {
            candidate.weight = self.weight;
        }
        if self.port.is_some() {
            candidate.port = self.port;
        }
        candidate
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneFilter {
    #[serde(rename = "type")]
    pub zone_type: Option<ZoneType>,
    pub status: Option<ZoneStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(rename = "type")]
    pub record_type: Option<RecordType>,
    pub name: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Clamp caller-supplied paging to sane bounds
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// TSIG key as stored; the secret never leaves the store through listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsigKey {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub algorithm: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: i64,
}

/// Listing and backup view of a TSIG key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TsigKeyMetadata {
    pub id: Uuid,
    pub name: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: i64,
}

impl From<&TsigKey> for TsigKeyMetadata {
    fn from(key: &TsigKey) -> Self {
        TsigKeyMetadata {
            id: key.id,
            name: key.name.clone(),
            algorithm: key.algorithm.clone(),
            created_at: key.created_at,
            last_used: key.last_used,
            usage_count: key.usage_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTsigKey {
    pub name: String,
    pub algorithm: String,
    pub secret: String,
}

/// Next SOA serial in `YYYYMMDDnn` form, greater than `current` below the 32-bit ceiling
pub fn next_serial(current: i64, now: DateTime<Utc>) -> i64 {
    let date_base = (now.year() as i64) * 1_000_000 + (now.month() as i64) * 10_000 + (now.day() as i64) * 100;
    let next = current.saturating_add(1);
    let serial = if date_base > next { date_base } else { next };
    // SOA serials are unsigned 32-bit; a wrap would read as older to secondaries
    serial.min(u32::MAX as i64)
}

/// Absolute form of a name, with exactly one trailing dot
pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Owner name of a zone-relative record name as an absolute name
pub fn absolute_name(name: &str, zone: &str) -> String {
    let zone = zone.trim_end_matches('.');
    if name == "@" || name.is_empty() {
        fqdn(zone)
    } else if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.{}.", name, zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_serial_uses_date_base() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        assert_eq!(next_serial(1, now), 2024030500);
        assert_eq!(next_serial(2024030500, now), 2024030501);
        assert_eq!(next_serial(2025010100, now), 2025010101);
    }

    #[test]
    fn test_serial_strictly_increases() {
        let now = Utc::now();
        let mut serial = 0;
        for _ in 0..50 {
            let next = next_serial(serial, now);
            assert!(next > serial);
            serial = next;
        }
    }

    #[test]
    fn test_serial_never_wraps() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        let top = u32::MAX as i64;
        assert_eq!(next_serial(top - 1, now), top);
        assert_eq!(next_serial(top, now), top);
    }

    #[test]
    fn test_record_type_parsing() {
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::AAAA);
        assert!("SPF".parse::<RecordType>().is_err());
        assert_eq!(RecordType::SRV.to_string(), "SRV");
    }

    #[test]
    fn test_absolute_name() {
        assert_eq!(absolute_name("@", "example.com"), "example.com.");
        assert_eq!(absolute_name("www", "example.com."), "www.example.com.");
        assert_eq!(absolute_name("host.other.org.", "example.com"), "host.other.org.");
    }

    #[test]
    fn test_record_key_matching() {
        let now = Utc::now();
        let record = Record {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            zone_id: Uuid::new_v4(),
            name: "www".into(),
            record_type: RecordType::A,
            value: "192.0.2.1".into(),
            ttl: 300,
            priority: None,
            weight: None,
            port: None,
            status: RecordStatus::Active,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        };
        assert!(RecordKey::new("www", RecordType::A).matches(&record));
        assert!(RecordKey::new("www", RecordType::A).with_value("192.0.2.1").matches(&record));
        assert!(!RecordKey::new("www", RecordType::A).with_value("192.0.2.2").matches(&record));
        assert!(!RecordKey::new("www", RecordType::AAAA).matches(&record));
    }

    #[test]
    fn test_zone_update_apply() {
        let update = ZoneUpdate {
            minimum_ttl: Some(300),
            ..Default::default()
        };
        assert!(!update.is_empty());
        assert!(ZoneUpdate::default().is_empty());
    }
}

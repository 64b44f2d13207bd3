/// Record and zone validation
///
/// Pure checks run before any write reaches the relational store or the
/// nameserver. Errors block the write; warnings are advisory and are returned
/// alongside a successful write so the UI can show them.

use std::net::Ipv6Addr;

use ipnetwork::Ipv4Network;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dns::record::{NewZone, RecordCandidate, RecordType};

lazy_static! {
    /// Characters allowed in a record owner name
    static ref RECORD_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9@._-]+$").expect("Failed to compile record name regex");

    /// Valid DNS label pattern (RFC 1035)
    static ref DNS_LABEL_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?$").expect("Failed to compile DNS label regex");

    /// Strict dotted quad; octet range is checked separately
    static ref IPV4_REGEX: Regex = Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$").expect("Failed to compile IPv4 regex");

    /// CAA presentation form: flags tag "value"
    static ref CAA_REGEX: Regex = Regex::new(r#"^(\d+)\s+([a-zA-Z0-9]+)\s+"(.*)"$"#).expect("Failed to compile CAA regex");

    /// Valid email pattern (basic RFC 5322)
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Failed to compile email regex");

    static ref URL_REGEX: Regex = Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").expect("Failed to compile URL regex");

    /// IPv4 ranges that are accepted with a warning
    static ref SPECIAL_V4_RANGES: Vec<(Ipv4Network, &'static str)> = [
        ("127.0.0.0/8", "Loopback address (127.0.0.0/8) will not be reachable by other hosts"),
        ("224.0.0.0/3", "Multicast or reserved address (224.0.0.0 and above)"),
    ]
    .iter()
    .filter_map(|(cidr, warning)| cidr.parse().ok().map(|net| (net, *warning)))
    .collect();
}

/// DNS validation constants
const MAX_RECORD_NAME_LENGTH: usize = 63;
const MAX_DNS_LABEL_LENGTH: usize = 63;
const MAX_DNS_NAME_LENGTH: usize = 253;
const MIN_TTL: i64 = 1;
const MAX_TTL: i64 = 2147483647; // RFC 2181 maximum TTL
const LOW_TTL_WARNING: i64 = 60;
const HIGH_TTL_WARNING: i64 = 86400;
const MAX_TXT_LENGTH: usize = 255;
const MAX_U16: i64 = 65535;

/// Outcome of validating one candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn new() -> Self {
        ValidationReport {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error<S: Into<String>>(&mut self, message: S) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    fn warn<S: Into<String>>(&mut self, message: S) {
        self.warnings.push(message.into());
    }

    fn merge(&mut self, other: ValidationReport) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Validate a record candidate against name, TTL and per-type value rules
pub fn validate_record(candidate: &RecordCandidate) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_record_name(&candidate.name, candidate.record_type, &mut report);
    validate_ttl(candidate.effective_ttl(), &mut report);

    let value = candidate.value.trim();
    if value.is_empty() {
        report.error("Record value is required");
        return report;
    }

    match candidate.record_type {
        RecordType::A => validate_a_value(value, &mut report),
        RecordType::AAAA => validate_aaaa_value(value, &mut report),
        RecordType::CNAME | RecordType::NS | RecordType::PTR => {
            if let Err(e) = validate_domain_name(value) {
                report.error(format!("Invalid {} target: {}", candidate.record_type, e));
            }
        }
        RecordType::MX => validate_mx(candidate, value, &mut report),
        RecordType::SRV => validate_srv(candidate, value, &mut report),
        RecordType::TXT => validate_txt_value(value, &mut report),
        RecordType::CAA => validate_caa_value(value, &mut report),
        RecordType::SOA => validate_soa_value(value, &mut report),
    }

    report
}

/// Validate a zone creation request
pub fn validate_zone(zone: &NewZone) -> ValidationReport {
    let mut report = ValidationReport::new();

    if let Err(e) = validate_domain_name(&zone.name) {
        report.error(format!("Invalid zone name: {}", e));
    }
    if let Err(e) = validate_domain_name(&zone.primary_ns) {
        report.error(format!("Invalid primary nameserver: {}", e));
    }

    let email = zone.admin_email.trim();
    if email.is_empty() {
        report.error("Admin email is required");
    } else if !EMAIL_REGEX.is_match(email) && validate_domain_name(email).is_err() {
        report.error(format!("Invalid admin email: {}", email));
    }

    let timers = [
        ("refresh", zone.refresh_interval),
        ("retry", zone.retry_interval),
        ("expire", zone.expire_interval),
        ("minimum TTL", zone.minimum_ttl),
    ];
    for (field, value) in timers.iter() {
        if *value < 1 || *value > u32::MAX as i64 {
            report.error(format!("Zone {} interval must be between 1 and {}", field, u32::MAX));
        }
    }
    if zone.retry_interval >= zone.refresh_interval {
        report.warn("Retry interval should be shorter than the refresh interval");
    }

    report
}

/// Record owner name rules
fn validate_record_name(name: &str, record_type: RecordType, report: &mut ValidationReport) {
    if name.is_empty() {
        report.error("Record name is required");
        return;
    }
    if name.len() > MAX_RECORD_NAME_LENGTH {
        report.error(format!("Record name must be at most {} characters", MAX_RECORD_NAME_LENGTH));
    }
    if !RECORD_NAME_REGEX.is_match(name) {
        report.error("Record name may only contain letters, digits, '@', '.', '_' and '-'");
    }
    if name.starts_with('-') || name.ends_with('-') {
        report.error("Record name cannot start or end with a hyphen");
    }
    if name.contains("..") {
        report.error("Record name cannot contain consecutive dots");
    }
    if record_type == RecordType::CNAME && name == "@" {
        report.error("CNAME records are not allowed at the zone apex (@)");
    }
    if record_type == RecordType::SRV && !name.starts_with('_') {
        report.warn("SRV record names conventionally start with '_' (e.g. _sip._tcp)");
    }
}

fn validate_ttl(ttl: i64, report: &mut ValidationReport) {
    if ttl < MIN_TTL || ttl > MAX_TTL {
        report.error(format!("TTL must be between {} and {}", MIN_TTL, MAX_TTL));
        return;
    }
    if ttl < LOW_TTL_WARNING {
        report.warn(format!("TTL below {} seconds may cause excessive query load", LOW_TTL_WARNING));
    } else if ttl > HIGH_TTL_WARNING {
        report.warn(format!("TTL above {} seconds slows propagation of changes", HIGH_TTL_WARNING));
    }
}

fn validate_a_value(value: &str, report: &mut ValidationReport) {
    let caps = match IPV4_REGEX.captures(value) {
        Some(caps) => caps,
        None => {
            report.error(format!("Invalid IPv4 address: {}", value));
            return;
        }
    };

    let mut octets = [0u8; 4];
    for i in 0..4 {
        // \d{1,3} always fits u16
        let octet: u16 = caps[i + 1].parse().unwrap_or(u16::MAX);
        if octet > 255 {
            report.error(format!("IPv4 octet {} is out of range (0-255)", &caps[i + 1]));
            return;
        }
        octets[i] = octet as u8;
    }

    if octets[0] == 0 {
        report.error("IPv4 address cannot start with 0");
        return;
    }

    // RFC 1918 space is the normal content of internal zones and passes clean
    let addr = std::net::Ipv4Addr::from(octets);
    if let Some((_, warning)) = SPECIAL_V4_RANGES.iter().find(|(net, _)| net.contains(addr)) {
        report.warn(*warning);
    }
}

fn validate_aaaa_value(value: &str, report: &mut ValidationReport) {
    let addr: Ipv6Addr = match value.parse() {
        Ok(addr) => addr,
        Err(_) => {
            report.error(format!("Invalid IPv6 address: {}", value));
            return;
        }
    };

    let first = addr.segments()[0];
    if addr.is_loopback() {
        report.warn("Loopback address (::1) will not be reachable by other hosts");
    } else if first & 0xffc0 == 0xfe80 {
        report.warn("Link-local address (fe80::/10) is only reachable on the local segment");
    } else if first & 0xfe00 == 0xfc00 {
        report.warn("Unique-local address (fc00::/7) is not globally routable");
    }
}

fn validate_mx(candidate: &RecordCandidate, value: &str, report: &mut ValidationReport) {
    match candidate.priority {
        None => report.error("MX records require a priority"),
        Some(p) if p < 0 || p > MAX_U16 => report.error(format!("MX priority must be between 0 and {}", MAX_U16)),
        Some(_) => {}
    }
    if let Err(e) = validate_domain_name(value) {
        report.error(format!("Invalid MX target: {}", e));
    }
}

fn validate_srv(candidate: &RecordCandidate, value: &str, report: &mut ValidationReport) {
    match candidate.priority {
        None => report.error("SRV records require a priority"),
        Some(p) if p < 0 || p > MAX_U16 => report.error(format!("SRV priority must be between 0 and {}", MAX_U16)),
        Some(_) => {}
    }
    match candidate.weight {
        None => report.error("SRV records require a weight"),
        Some(w) if w < 0 || w > MAX_U16 => report.error(format!("SRV weight must be between 0 and {}", MAX_U16)),
        Some(_) => {}
    }
    match candidate.port {
        None => report.error("SRV records require a port"),
        Some(p) if p < 1 || p > MAX_U16 => report.error(format!("SRV port must be between 1 and {}", MAX_U16)),
        Some(_) => {}
    }
    if let Err(e) = validate_domain_name(value) {
        report.error(format!("Invalid SRV target: {}", e));
    }
}

fn validate_txt_value(value: &str, report: &mut ValidationReport) {
    if value.chars().count() > MAX_TXT_LENGTH {
        report.error(format!("TXT record must be at most {} characters", MAX_TXT_LENGTH));
        return;
    }

    let unquoted = value.trim_matches('"');
    if unquoted.starts_with("v=spf1") {
        let ends_with_all = ["~all", "+all", "-all"].iter().any(|q| unquoted.trim_end().ends_with(q));
        if !ends_with_all {
            report.warn("SPF record should end with ~all, +all or -all");
        }
    } else if unquoted.starts_with("v=DKIM1") {
        if !unquoted.contains("k=") {
            report.warn("DKIM record should specify a key type (k=)");
        }
        if !unquoted.contains("p=") {
            report.warn("DKIM record should include a public key (p=)");
        }
    } else if unquoted.starts_with("v=DMARC1") && !unquoted.contains("p=") {
        report.warn("DMARC record should specify a policy (p=)");
    }
}

fn validate_caa_value(value: &str, report: &mut ValidationReport) {
    let caps = match CAA_REGEX.captures(value) {
        Some(caps) => caps,
        None => {
            report.error("CAA record must be in the form: flags tag \"value\"");
            return;
        }
    };

    match caps[1].parse::<u16>() {
        Ok(flags) if flags <= 255 => {}
        _ => report.error("CAA flags must be between 0 and 255"),
    }

    let tag = &caps[2];
    if !["issue", "issuewild", "iodef"].contains(&tag) {
        report.error(format!("Invalid CAA tag '{}' (expected issue, issuewild or iodef)", tag));
        return;
    }

    if tag == "iodef" {
        let target = &caps[3];
        let looks_valid = target.starts_with("mailto:") || URL_REGEX.is_match(target) || EMAIL_REGEX.is_match(target);
        if !looks_valid {
            report.warn("CAA iodef value should be a mailto: address or an http(s) URL");
        }
    }
}

fn validate_soa_value(value: &str, report: &mut ValidationReport) {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 7 {
        report.error("SOA record must have 7 fields: mname rname serial refresh retry expire minimum");
        return;
    }

    if let Err(e) = validate_domain_name(fields[0]) {
        report.error(format!("Invalid SOA mname: {}", e));
    }
    if let Err(e) = validate_domain_name(fields[1]) {
        report.error(format!("Invalid SOA rname: {}", e));
    }

    let labels = ["serial", "refresh", "retry", "expire", "minimum"];
    for (label, field) in labels.iter().zip(fields[2..].iter()) {
        if field.parse::<u32>().is_err() {
            report.error(format!("SOA {} must be an unsigned 32-bit integer, got '{}'", label, field));
        }
    }
}

/// Validate a domain name according to RFC 1035 label rules
pub fn validate_domain_name(name: &str) -> Result<(), String> {
    // Trailing dot marks an absolute name
    let name = name.strip_suffix('.').unwrap_or(name);

    if name.is_empty() || name.len() > MAX_DNS_NAME_LENGTH {
        return Err(format!("domain name must be 1-{} characters", MAX_DNS_NAME_LENGTH));
    }

    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_DNS_LABEL_LENGTH {
            return Err(format!("label '{}' must be 1-{} characters", label, MAX_DNS_LABEL_LENGTH));
        }
        if !DNS_LABEL_REGEX.is_match(label) {
            return Err(format!("label '{}' contains invalid characters or hyphen placement", label));
        }
    }

    Ok(())
}

/// Merge reports of several candidates, prefixing messages with their position
pub fn validate_batch(candidates: &[RecordCandidate]) -> (ValidationReport, Vec<ValidationReport>) {
    let mut combined = ValidationReport::new();
    let mut individual = Vec::with_capacity(candidates.len());

    for (idx, candidate) in candidates.iter().enumerate() {
        let report = validate_record(candidate);
        let mut prefixed = ValidationReport::new();
        for e in &report.errors {
            prefixed.error(format!("#{} {} {}: {}", idx, candidate.name, candidate.record_type, e));
        }
        for w in &report.warnings {
            prefixed.warn(format!("#{} {} {}: {}", idx, candidate.name, candidate.record_type, w));
        }
        combined.merge(prefixed);
        individual.push(report);
    }

    (combined, individual)
}

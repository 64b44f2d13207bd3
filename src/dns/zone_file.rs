//! BIND master-file rendering of a stored zone
//!
//! The output starts with a two-line `;` comment header (the only
//! time-dependent content), followed by `$TTL` and `$ORIGIN` directives and
//! the active records grouped by type.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::dns::record::{fqdn, Record, RecordType, Zone};

/// Number of leading comment lines that carry generation metadata
pub const HEADER_LINES: usize = 2;

/// Render `zone` and its records as master-file text stamped with the current time
pub fn encode(zone: &Zone, records: &[Record]) -> String {
    encode_at(zone, records, Utc::now())
}

/// Render with an explicit generation timestamp
pub fn encode_at(zone: &Zone, records: &[Record], generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    output.push_str(&format!("; Zone file for {}\n", zone.name));
    output.push_str(&format!(
        "; Generated {} by atlas-console\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    output.push_str(&format!("$TTL {}\n", zone.minimum_ttl));
    output.push_str(&format!("$ORIGIN {}\n", fqdn(&zone.name)));
    output.push('\n');

    let active: Vec<&Record> = records.iter().filter(|r| r.is_active()).collect();

    if !active.iter().any(|r| r.record_type == RecordType::SOA) {
        output.push_str(&synthesized_soa(zone));
        output.push('\n');
    }

    for record_type in RecordType::ZONE_FILE_ORDER.iter() {
        for record in active.iter().filter(|r| r.record_type == *record_type) {
            output.push_str(&record_line(record));
            output.push('\n');
        }
    }

    output
}

/// Strip the generation header so two renderings can be compared
pub fn without_header(text: &str) -> String {
    text.lines()
        .skip(HEADER_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

fn record_line(record: &Record) -> String {
    let value = match record.record_type {
        RecordType::TXT => quote_txt(&record.value),
        _ => record.presentation_value(),
    };
    format_line(&record.name, record.ttl, record.record_type, &value)
}

fn synthesized_soa(zone: &Zone) -> String {
    let value = format!(
        "{} {} {} {} {} {} {}",
        fqdn(&zone.primary_ns),
        zone.rname(),
        zone.serial,
        zone.refresh_interval,
        zone.retry_interval,
        zone.expire_interval,
        zone.minimum_ttl
    );
    format_line("@", zone.minimum_ttl, RecordType::SOA, &value)
}

fn format_line(name: &str, ttl: i64, record_type: RecordType, value: &str) -> String {
    format!("{:<20} {:<8} IN {:<6} {}", name, ttl, record_type.as_str(), value)
}

fn quote_txt(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::record::{RecordStatus, TenantId, ZoneStatus, ZoneType};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn zone() -> Zone {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Zone {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            name: "example.com".into(),
            zone_type: ZoneType::Master,
            status: ZoneStatus::Active,
            primary_ns: "ns1.example.com".into(),
            admin_email: "hostmaster@example.com".into(),
            refresh_interval: 3600,
            retry_interval: 1800,
            expire_interval: 604800,
            minimum_ttl: 86400,
            serial: 2024010101,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn record(zone: &Zone, name: &str, record_type: RecordType, value: &str) -> Record {
        Record {
            id: Uuid::new_v4(),
            tenant_id: zone.tenant_id.clone(),
            zone_id: zone.id,
            name: name.into(),
            record_type,
            value: value.into(),
            ttl: 300,
            priority: None,
            weight: None,
            port: None,
            status: RecordStatus::Active,
            created_by: "admin".into(),
            created_at: zone.created_at,
            updated_at: zone.created_at,
        }
    }

    #[test]
    fn test_header_and_directives() {
        let z = zone();
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let text = encode_at(&z, &[], at);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "; Zone file for example.com");
        assert!(lines[1].starts_with("; Generated 2024-06-01T12:00:00Z"));
        assert_eq!(lines[2], "$TTL 86400");
        assert_eq!(lines[3], "$ORIGIN example.com.");
    }

    #[test]
    fn test_synthesized_soa() {
        let z = zone();
        let text = encode(&z, &[]);
        let soa = text.lines().find(|l| l.contains(" SOA ")).unwrap();
        assert!(soa.starts_with("@"));
        assert!(soa.ends_with("ns1.example.com. hostmaster.example.com. 2024010101 3600 1800 604800 86400"));
    }

    #[test]
    fn test_type_order_and_padding() {
        let z = zone();
        let mut mx = record(&z, "@", RecordType::MX, "mail.example.com.");
        mx.priority = Some(10);
        let mut srv = record(&z, "_sip._tcp", RecordType::SRV, "sip.example.com.");
        srv.priority = Some(10);
        srv.weight = Some(5);
        srv.port = Some(5060);
        let records = vec![
            srv,
            record(&z, "www", RecordType::A, "192.0.2.1"),
            mx,
            record(&z, "@", RecordType::NS, "ns1.example.com."),
            record(&z, "@", RecordType::TXT, "v=spf1 -all"),
        ];

        let text = encode(&z, &records);
        let body: Vec<&str> = text.lines().filter(|l| l.contains(" IN ")).collect();
        let types: Vec<&str> = body.iter().map(|l| l.split_whitespace().nth(3).unwrap()).collect();
        assert_eq!(types, vec!["SOA", "NS", "A", "MX", "TXT", "SRV"]);

        assert_eq!(body[2], format!("{:<20} {:<8} IN {:<6} {}", "www", 300, "A", "192.0.2.1"));
        assert!(body[3].ends_with("IN MX     10 mail.example.com."));
        assert!(body[4].ends_with("\"v=spf1 -all\""));
        assert!(body[5].ends_with("10 5 5060 sip.example.com."));
    }

    #[test]
    fn test_input_order_kept_within_type() {
        let z = zone();
        let records = vec![
            record(&z, "b", RecordType::A, "192.0.2.2"),
            record(&z, "a", RecordType::A, "192.0.2.1"),
        ];
        let text = encode(&z, &records);
        let b = text.find("192.0.2.2").unwrap();
        let a = text.find("192.0.2.1").unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_deleted_records_skipped() {
        let z = zone();
        let mut gone = record(&z, "old", RecordType::A, "192.0.2.9");
        gone.status = RecordStatus::Deleted;
        let text = encode(&z, &[gone]);
        assert!(!text.contains("192.0.2.9"));
    }

    #[test]
    fn test_encoding_is_idempotent_without_header() {
        let z = zone();
        let records = vec![
            record(&z, "www", RecordType::A, "192.0.2.1"),
            record(&z, "@", RecordType::TXT, "\"already quoted\""),
        ];
        let first = encode_at(&z, &records, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let second = encode_at(&z, &records, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_ne!(first, second);
        assert_eq!(without_header(&first), without_header(&second));
        assert!(first.contains("\"already quoted\""));
        assert!(!first.contains("\"\"already"));
    }
}

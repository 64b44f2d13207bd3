//! DNS zone and record management
//!
//! This module covers everything between an operator form and the
//! authoritative nameserver:
//! * Record and zone model with natural-key addressing
//! * Validation of records and zones before anything is written
//! * BIND master-file rendering
//! * The nameserver capability and its TSIG dynamic-update implementation
//! * Orchestration of validate, persist, push and audit
//!
//! # Module Structure
//!
//! * `record` - zones, records, TSIG keys and serial arithmetic
//! * `validation` - pure record and zone validation
//! * `zone_file` - master-file encoder
//! * `provider` - nameserver capability, available or not
//! * `nsupdate` - RFC 2136 client signed with TSIG
//! * `tsig` - key material and key-file rendering
//! * `service` - the write path used by the gateway

/// Zone, record and key model
pub mod record;

/// Record and zone validation
pub mod validation;

/// BIND master-file encoding
pub mod zone_file;

/// Nameserver capability
pub mod provider;

/// TSIG-signed dynamic updates
pub mod nsupdate;

/// TSIG key material
pub mod tsig;

/// Validate, persist, push, audit
pub mod service;

pub use nsupdate::provider_from_config;
pub use provider::{DnsProvider, ProviderHandle};
pub use service::{DnsService, RequestContext, SyncOutcome, WriteOutcome};

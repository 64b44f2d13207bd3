//! Atlas Console
//!
//! Operations console gateway for Kea DHCP and BIND DNS.
//!
//! # Features
//!
//! * Validated, tenant-scoped zone and record management with an audit trail
//! * Best-effort sync to the nameserver through TSIG-signed dynamic updates
//! * RFC 1035 zone file export
//! * Full backups with manifest, checksum and retention cleanup
//! * Health probes, error-rate alerting and a WebSocket event stream
//! * Kea control-agent passthrough
//!
//! # Architecture
//!
//! * `dns` - record model, validation, zone files and the nameserver adapter
//! * `store` - Postgres and in-memory persistence behind one trait
//! * `backup` - backup runs, listing, retention and restore input
//! * `monitoring` - metrics, health checks, alerts and events
//! * `kea` - DHCP control-agent client
//! * `web` - HTTP and WebSocket gateway

pub mod app;
pub mod backup;
pub mod config;
pub mod dns;
pub mod errors;
pub mod kea;
pub mod logging;
pub mod monitoring;
pub mod store;
pub mod web;

pub use errors::{ConsoleError, Result};

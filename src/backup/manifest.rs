//! Backup manifest
//!
//! `manifest.json` is written after every component was captured; a backup
//! directory without one is incomplete and must not be restored from.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::dns::record::TenantId;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    #[display(fmt = "full")]
    Full,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    #[display(fmt = "zones")]
    Zones,
    #[display(fmt = "database")]
    Database,
    #[display(fmt = "config")]
    Config,
    #[display(fmt = "tsig")]
    Tsig,
}

impl ComponentKind {
    /// Config capture is best effort; the others abort the run
    pub fn is_load_bearing(&self) -> bool {
        !matches!(self, ComponentKind::Config)
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    #[display(fmt = "success")]
    Success,
    /// Captured, with warnings recorded alongside
    #[display(fmt = "partial")]
    Partial,
    /// Not applicable in this deployment, e.g. no database URL
    #[display(fmt = "skipped")]
    Skipped,
    #[display(fmt = "failed")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub component: ComponentKind,
    pub status: ComponentStatus,
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    pub path: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl ComponentResult {
    pub fn success(component: ComponentKind, path: &str) -> Self {
        ComponentResult {
            component,
            status: ComponentStatus::Success,
            counts: BTreeMap::new(),
            path: Some(path.to_string()),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn with_count(mut self, name: &str, count: u64) -> Self {
        self.counts.insert(name.to_string(), count);
        self
    }

    pub fn warn<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
        if self.status == ComponentStatus::Success {
            self.status = ComponentStatus::Partial;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub version: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<TenantId>,
    pub components: Vec<ComponentResult>,
    pub compressed: bool,
    /// Archive file name relative to the backup root
    pub archive: Option<String>,
    /// Hex SHA-256 of the archive; only known after compression
    #[serde(default)]
    pub checksum: Option<String>,
}

impl BackupManifest {
    pub fn new(id: &str, timestamp: DateTime<Utc>, tenant: Option<&TenantId>) -> Self {
        BackupManifest {
            version: MANIFEST_VERSION,
            id: id.to_string(),
            backup_type: BackupType::Full,
            timestamp,
            tenant_id: tenant.cloned(),
            components: Vec::new(),
            compressed: false,
            archive: None,
            checksum: None,
        }
    }

    pub fn component(&self, kind: ComponentKind) -> Option<&ComponentResult> {
        self.components.iter().find(|c| c.component == kind)
    }

    pub fn all_succeeded(&self) -> bool {
        !self.components.is_empty() && self.components.iter().all(|c| c.status == ComponentStatus::Success)
    }
}

/// Lifecycle of one backup run
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    #[display(fmt = "pending")]
    Pending,
    #[display(fmt = "capturing {}", _0)]
    Capturing(ComponentKind),
    #[display(fmt = "manifest-written")]
    ManifestWritten,
    #[display(fmt = "compressing")]
    Compressing,
    #[display(fmt = "complete")]
    Complete,
    #[display(fmt = "failed")]
    Failed,
}

/// One entry of the backup listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub id: String,
    pub path: PathBuf,
    pub compressed: bool,
    pub size_bytes: u64,
    pub timestamp: DateTime<Utc>,
    /// `None` for a directory that never got a manifest
    pub manifest: Option<BackupManifest>,
}

impl BackupSummary {
    pub fn is_complete(&self) -> bool {
        self.manifest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_downgrades_success() {
        let mut result = ComponentResult::success(ComponentKind::Config, "config");
        result.warn("named.conf.options not found");
        assert_eq!(result.status, ComponentStatus::Partial);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut manifest = BackupManifest::new("backup-1", Utc::now(), None);
        manifest
            .components
            .push(ComponentResult::success(ComponentKind::Zones, "zones").with_count("zones", 2));
        assert!(manifest.all_succeeded());

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["type"], "full");
        assert_eq!(json["components"][0]["component"], "zones");
        assert_eq!(json["components"][0]["status"], "success");
        assert_eq!(json["components"][0]["counts"]["zones"], 2);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BackupState::Capturing(ComponentKind::Tsig).to_string(), "capturing tsig");
        assert!(!ComponentKind::Config.is_load_bearing());
        assert!(ComponentKind::Database.is_load_bearing());
    }
}

//! Audit trail entries
//!
//! One row per mutating operation, successful or not. Rows are appended and
//! never updated or deleted by the application.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dns::record::TenantId;
use crate::errors::ConsoleError;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    #[display(fmt = "zone_created")]
    ZoneCreated,
    #[display(fmt = "zone_updated")]
    ZoneUpdated,
    #[display(fmt = "zone_deleted")]
    ZoneDeleted,
    #[display(fmt = "record_created")]
    RecordCreated,
    #[display(fmt = "record_updated")]
    RecordUpdated,
    #[display(fmt = "record_deleted")]
    RecordDeleted,
    #[display(fmt = "bulk_create")]
    BulkCreate,
    #[display(fmt = "bulk_delete")]
    BulkDelete,
    #[display(fmt = "zone_restored")]
    ZoneRestored,
    #[display(fmt = "tsig_key_created")]
    TsigKeyCreated,
    #[display(fmt = "tsig_key_deleted")]
    TsigKeyDeleted,
}

impl FromStr for AuditOperation {
    type Err = ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "zone_created" => AuditOperation::ZoneCreated,
            "zone_updated" => AuditOperation::ZoneUpdated,
            "zone_deleted" => AuditOperation::ZoneDeleted,
            "record_created" => AuditOperation::RecordCreated,
            "record_updated" => AuditOperation::RecordUpdated,
            "record_deleted" => AuditOperation::RecordDeleted,
            "bulk_create" => AuditOperation::BulkCreate,
            "bulk_delete" => AuditOperation::BulkDelete,
            "zone_restored" => AuditOperation::ZoneRestored,
            "tsig_key_created" => AuditOperation::TsigKeyCreated,
            "tsig_key_deleted" => AuditOperation::TsigKeyDeleted,
            other => return Err(ConsoleError::InvalidRequest(format!("Unknown audit operation: {}", other))),
        };
        Ok(op)
    }
}

/// Audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: String,
    pub operation: AuditOperation,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(tenant_id: &TenantId, user_id: &str, operation: AuditOperation, resource_type: &str) -> Self {
        AuditLogEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            user_id: user_id.to_string(),
            operation,
            resource_type: resource_type.to_string(),
            resource_id: None,
            details: serde_json::Value::Null,
            source_ip: None,
            user_agent: None,
            success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_resource_id<S: Into<String>>(mut self, id: S) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_client(mut self, source_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.source_ip = source_ip;
        self.user_agent = user_agent;
        self
    }

    /// Mark the entry as failed with the error that ended the operation
    pub fn failed(mut self, error: &ConsoleError) -> Self {
        self.success = false;
        self.error_message = Some(error.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trips_through_text() {
        for op in [AuditOperation::ZoneCreated, AuditOperation::BulkDelete, AuditOperation::TsigKeyDeleted] {
            assert_eq!(op.to_string().parse::<AuditOperation>().unwrap(), op);
        }
    }

    #[test]
    fn test_failed_entry_keeps_message() {
        let entry = AuditLogEntry::new(&TenantId::new("t1"), "alice", AuditOperation::RecordCreated, "record")
            .failed(&ConsoleError::validation("Invalid IPv4 address"));
        assert!(!entry.success);
        assert!(entry.error_message.unwrap().contains("Invalid IPv4"));
    }
}

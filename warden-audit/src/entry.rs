use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{OperationKind, TenantId, UserId};

use crate::path::ResourcePath;

/// Audit action, fixed per operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

impl From<OperationKind> for AuditAction {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => AuditAction::Create,
            OperationKind::Read => AuditAction::Read,
            OperationKind::Update => AuditAction::Update,
            OperationKind::Delete => AuditAction::Delete,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    /// The permission check refused the action; nothing ran.
    Denied,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
            AuditOutcome::Denied => "denied",
        }
    }
}

/// Before/after snapshot of the affected entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

impl ChangeSummary {
    pub fn created(after: serde_json::Value) -> Self {
        ChangeSummary {
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: serde_json::Value, after: serde_json::Value) -> Self {
        ChangeSummary {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn deleted(before: serde_json::Value) -> Self {
        ChangeSummary {
            before: Some(before),
            after: None,
        }
    }
}

/// Request context captured alongside an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub path: String,
    pub method: Option<String>,
    pub request_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMetadata {
    pub fn for_path(path: impl Into<String>) -> Self {
        RequestMetadata {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Immutable record of one action. Never updated or deleted once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub changes: Option<ChangeSummary>,
    pub metadata: RequestMetadata,
    pub outcome: AuditOutcome,
    /// Error code when the outcome is not a success.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build an entry for an action on `path`, deriving entity type and id
    /// from it. Unparseable paths are recorded under entity type `unknown`.
    pub fn for_path(tenant: TenantId, user: UserId, kind: OperationKind, path: &str) -> Self {
        let parsed = ResourcePath::parse(path);
        let (entity_type, entity_id) = match parsed {
            Some(p) => (p.entity_type, p.entity_id),
            None => ("unknown".to_string(), None),
        };
        AuditLogEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            user_id: user,
            action: kind.into(),
            entity_type,
            entity_id,
            changes: None,
            metadata: RequestMetadata::for_path(path),
            outcome: AuditOutcome::Success,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Override the id derived from the path, e.g. with the id of a created row.
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn with_changes(mut self, changes: ChangeSummary) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome, error: Option<String>) -> Self {
        self.outcome = outcome;
        self.error = error;
        self
    }
}

/// Mutations are always recorded; reads only when they target one entity.
pub fn should_record(kind: OperationKind, entity_id: Option<&str>) -> bool {
    kind.is_mutation() || entity_id.is_some()
}

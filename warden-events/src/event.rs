use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::{OperationKind, TenantId, UserId};

use crate::error::EventError;

/// A committed change to a tenant-scoped resource.
///
/// Published after the unit of work commits, never before, so consumers only
/// observe state that exists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub resource: String,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl MutationEvent {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        resource: impl Into<String>,
        kind: OperationKind,
    ) -> Self {
        MutationEvent {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            resource: resource.into(),
            kind,
            entity_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// JSON wire form.
    pub fn encode(&self) -> Result<Bytes, EventError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

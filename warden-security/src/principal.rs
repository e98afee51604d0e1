use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_core::{TenantId, UserId};

use crate::error::SecurityError;
use crate::roles::{default_role_extractor, RoleExtractor};

/// An authenticated identity acting on behalf of exactly one tenant.
///
/// Built from claims an external collaborator has already verified; nothing
/// here checks signatures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Principal {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: Option<String>,
    pub roles: Vec<String>,
    /// Other tenants this user is linked to and may switch into.
    pub linked_tenants: Vec<TenantId>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Principal {
    pub fn new(tenant_id: TenantId, user_id: impl Into<String>) -> Self {
        Principal {
            tenant_id,
            user_id: UserId::new(user_id),
            email: None,
            roles: Vec::new(),
            linked_tenants: Vec::new(),
            expires_at: None,
        }
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Build a principal from verified claims using the default role extractor.
    pub fn from_claims(claims: &serde_json::Value) -> Result<Self, SecurityError> {
        Self::from_claims_with(claims, &default_role_extractor())
    }

    /// Build a principal from verified claims with a custom role extractor.
    ///
    /// Requires `sub` and `tenant_id`; reads `email`, `exp` and the optional
    /// `tenants` array of linked tenant ids.
    pub fn from_claims_with(
        claims: &serde_json::Value,
        extractor: &impl RoleExtractor,
    ) -> Result<Self, SecurityError> {
        let sub = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or(SecurityError::MissingClaim("sub"))?;

        let tenant_id = parse_tenant(
            claims
                .get("tenant_id")
                .ok_or(SecurityError::MissingClaim("tenant_id"))?,
            "tenant_id",
        )?;

        let linked_tenants = match claims.get("tenants").and_then(|v| v.as_array()) {
            Some(items) => items
                .iter()
                .map(|v| parse_tenant(v, "tenants"))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let expires_at = match claims.get("exp") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => {
                let secs = v.as_i64().ok_or_else(|| SecurityError::InvalidClaim {
                    claim: "exp",
                    reason: "expected seconds since epoch".into(),
                })?;
                Some(DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                    SecurityError::InvalidClaim {
                        claim: "exp",
                        reason: "out of range".into(),
                    }
                })?)
            }
        };

        Ok(Principal {
            tenant_id,
            user_id: UserId::new(sub),
            email: claims.get("email").and_then(|v| v.as_str()).map(String::from),
            roles: extractor.extract_roles(claims),
            linked_tenants,
            expires_at,
        })
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// A principal stops being valid at the `expires_at` instant itself.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// Fail with [`SecurityError::Expired`] when the principal is no longer valid.
    pub fn ensure_active(&self, now: DateTime<Utc>) -> Result<(), SecurityError> {
        if self.is_expired_at(now) {
            tracing::debug!(user = %self.user_id, tenant = %self.tenant_id, "principal expired");
            return Err(SecurityError::Expired);
        }
        Ok(())
    }

    /// Re-target the principal at one of its linked tenants.
    pub fn acting_as(&self, tenant: TenantId) -> Result<Principal, SecurityError> {
        if tenant != self.tenant_id && !self.linked_tenants.contains(&tenant) {
            return Err(SecurityError::InvalidClaim {
                claim: "tenants",
                reason: format!("user is not linked to tenant {tenant}"),
            });
        }
        let mut switched = self.clone();
        switched.tenant_id = tenant;
        Ok(switched)
    }
}

fn parse_tenant(value: &serde_json::Value, claim: &'static str) -> Result<TenantId, SecurityError> {
    let raw = value.as_str().ok_or_else(|| SecurityError::InvalidClaim {
        claim,
        reason: "expected a string".into(),
    })?;
    raw.parse::<TenantId>()
        .map_err(|e| SecurityError::InvalidClaim {
            claim,
            reason: e.to_string(),
        })
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::{TenantId, WardenError};
use warden_data::DataError;

use crate::store::GrantStore;

/// Which grant allowed a permission check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantSource {
    Direct,
    Role { assignment: i64, role: i64 },
    Delegation { id: i64, from: TenantId },
}

/// Outcome of a permission check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// The first matching grant; `None` when denied.
    pub source: Option<GrantSource>,
}

impl Decision {
    pub fn allow(source: GrantSource) -> Self {
        Decision {
            allowed: true,
            source: Some(source),
        }
    }

    pub fn deny() -> Self {
        Decision {
            allowed: false,
            source: None,
        }
    }
}

/// A `(tenant, resource, action)` question evaluated at `as_of`.
#[derive(Clone, Debug)]
pub struct PermissionQuery {
    pub tenant: TenantId,
    pub resource: String,
    pub action: String,
    pub as_of: DateTime<Utc>,
    /// When set, role assignments scoped to a different related tenant are
    /// ignored.
    pub related_tenant: Option<TenantId>,
}

impl PermissionQuery {
    /// A query evaluated at the current instant.
    pub fn new(tenant: TenantId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        PermissionQuery {
            tenant,
            resource: resource.into(),
            action: action.into(),
            as_of: Utc::now(),
            related_tenant: None,
        }
    }

    pub fn at(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn related_to(mut self, tenant: TenantId) -> Self {
        self.related_tenant = Some(tenant);
        self
    }
}

/// Resolves permissions as the union of direct, role and delegated grants.
///
/// There is no deny grant: the first valid match allows. Expiry and validity
/// windows are checked against the query instant on every call. Any store
/// error denies.
pub struct PermissionResolver<S: GrantStore> {
    store: Arc<S>,
}

impl<S: GrantStore> Clone for PermissionResolver<S> {
    fn clone(&self) -> Self {
        PermissionResolver {
            store: self.store.clone(),
        }
    }
}

impl<S: GrantStore> PermissionResolver<S> {
    pub fn new(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    pub fn from_arc(store: Arc<S>) -> Self {
        PermissionResolver { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn has_permission(
        &self,
        tenant: TenantId,
        resource: &str,
        action: &str,
        as_of: DateTime<Utc>,
    ) -> bool {
        self.resolve(&PermissionQuery::new(tenant, resource, action).at(as_of))
            .await
            .allowed
    }

    pub async fn has_permission_now(&self, tenant: TenantId, resource: &str, action: &str) -> bool {
        self.has_permission(tenant, resource, action, Utc::now()).await
    }

    pub async fn resolve(&self, query: &PermissionQuery) -> Decision {
        let decision = match self.evaluate(query).await {
            Ok(decision) => decision,
            Err(err) => {
                let err = WardenError::GrantStoreUnavailable(err.to_string());
                tracing::warn!(
                    tenant = %query.tenant,
                    resource = %query.resource,
                    action = %query.action,
                    error = %err,
                    "permission check failed closed"
                );
                Decision::deny()
            }
        };
        tracing::debug!(
            tenant = %query.tenant,
            resource = %query.resource,
            action = %query.action,
            allowed = decision.allowed,
            source = ?decision.source,
            "permission resolved"
        );
        decision
    }

    /// Resolve and turn a denial into [`WardenError::PermissionDenied`].
    pub async fn require(&self, query: &PermissionQuery) -> Result<GrantSource, WardenError> {
        let decision = self.resolve(query).await;
        match decision.source {
            Some(source) if decision.allowed => Ok(source),
            _ => Err(WardenError::denied(
                query.tenant,
                query.resource.clone(),
                query.action.clone(),
            )),
        }
    }

    async fn evaluate(&self, q: &PermissionQuery) -> Result<Decision, DataError> {
        let direct = self
            .store
            .find_direct_grants(q.tenant, &q.resource, &q.action)
            .await?;
        if direct.iter().any(|g| g.is_valid_at(q.as_of)) {
            return Ok(Decision::allow(GrantSource::Direct));
        }

        let role_grants = self.store.find_role_grants(q.tenant).await?;
        for grant in role_grants
            .iter()
            .filter(|g| g.is_valid_at(q.as_of) && g.applies_to(q.related_tenant))
        {
            let permissions = self.store.find_role_permissions(grant.role_id).await?;
            if permissions.iter().any(|p| p.matches(&q.resource, &q.action)) {
                return Ok(Decision::allow(GrantSource::Role {
                    assignment: grant.id,
                    role: grant.role_id,
                }));
            }
        }

        let delegations = self.store.find_delegations_to(q.tenant).await?;
        for delegation in delegations.iter().filter(|d| d.is_valid_at(q.as_of)) {
            let permissions = self.store.find_delegated_permissions(delegation.id).await?;
            if permissions.iter().any(|p| p.matches(&q.resource, &q.action)) {
                return Ok(Decision::allow(GrantSource::Delegation {
                    id: delegation.id,
                    from: delegation.from,
                }));
            }
        }

        Ok(Decision::deny())
    }
}

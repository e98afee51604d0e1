use std::sync::Arc;

use warden_core::{OperationKind, TenantId, WardenError};

use crate::dependents::DependencyMap;
use crate::key::CacheKey;
use crate::store::CacheStore;

/// Clears tenant-scoped cache entries after a mutation.
///
/// Best-effort: every step is attempted even when an earlier one fails, and
/// failures are logged and summarized as [`WardenError::InvalidationFailed`].
/// A missed invalidation leaves a stale entry until its TTL runs out.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    store: Arc<dyn CacheStore>,
    dependents: Arc<DependencyMap>,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, dependents: DependencyMap) -> Self {
        InvalidationCoordinator {
            store,
            dependents: Arc::new(dependents),
        }
    }

    pub fn dependents(&self) -> &DependencyMap {
        &self.dependents
    }

    /// Invalidate after `kind` was applied to `resource` for `tenant`.
    ///
    /// - reads: nothing
    /// - every mutation: the resource's collection views
    /// - update/delete with an id: the entity's detail view
    /// - every mutation: all views of each dependent resource
    pub async fn on_mutation(
        &self,
        tenant: TenantId,
        resource: &str,
        kind: OperationKind,
        entity_id: Option<&str>,
    ) -> Result<(), WardenError> {
        if !kind.is_mutation() {
            return Ok(());
        }

        let mut failures = Vec::new();

        let lists = CacheKey::list_prefix(tenant, resource);
        if let Err(err) = self.store.remove_by_prefix(&lists).await {
            failures.push(format!("{lists}*: {err}"));
        }

        if matches!(kind, OperationKind::Update | OperationKind::Delete) {
            if let Some(id) = entity_id {
                let detail = CacheKey::detail(tenant, resource, id);
                if let Err(err) = self.store.remove(detail.as_str()).await {
                    failures.push(format!("{detail}: {err}"));
                }
            }
        }

        for dependent in self.dependents.dependents_of(resource) {
            let prefix = CacheKey::resource_prefix(tenant, &dependent);
            if let Err(err) = self.store.remove_by_prefix(&prefix).await {
                failures.push(format!("{prefix}*: {err}"));
            }
        }

        if failures.is_empty() {
            tracing::debug!(tenant = %tenant, resource, kind = kind.as_str(), "cache invalidated");
            return Ok(());
        }

        let err = WardenError::InvalidationFailed(failures.join("; "));
        tracing::warn!(
            tenant = %tenant,
            resource,
            kind = kind.as_str(),
            error = %err,
            "cache invalidation incomplete, stale entries expire with their TTL"
        );
        Err(err)
    }
}

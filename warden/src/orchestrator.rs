use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use warden_audit::{AuditOutcome, ChangeSummary, Dispatch};
use warden_authz::{GrantSource, GrantStore, PermissionQuery, PermissionResolver};
use warden_core::WardenError;
use warden_data::{TenantBackend, TenantContextManager, TenantScope};
use warden_security::Principal;

use crate::action::ProtectedAction;
use crate::hooks::{PostCommitHook, UnitReport};

/// Result of a unit of work plus what the post-commit hooks need to know
/// about it.
#[derive(Clone, Debug)]
pub struct Tracked<T> {
    pub value: T,
    /// Id of the affected entity when the path does not carry it, e.g. the
    /// id of a created row.
    pub entity_id: Option<String>,
    pub changes: Option<ChangeSummary>,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Tracked {
            value,
            entity_id: None,
            changes: None,
        }
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_changes(mut self, changes: ChangeSummary) -> Self {
        self.changes = Some(changes);
        self
    }
}

/// Runs protected units of work.
///
/// Order of operations for every call:
///
/// 1. the principal must still be valid, else [`WardenError::Unauthenticated`]
/// 2. the tenant must hold the action's permission, else
///    [`WardenError::PermissionDenied`] (mutating attempts are audited as denied)
/// 3. the closure runs in a tenant scope, committed on `Ok`
/// 4. post-commit hooks run with the outcome, inline or detached, each one
///    bounded by the hook timeout
///
/// Only steps 1 to 3 can fail the call.
pub struct Warden<B: TenantBackend, G: GrantStore> {
    contexts: TenantContextManager<B>,
    resolver: PermissionResolver<G>,
    hooks: Vec<Arc<dyn PostCommitHook>>,
    dispatch: Dispatch,
    hook_timeout: Option<Duration>,
    detached: TaskTracker,
}

impl<B: TenantBackend, G: GrantStore> Clone for Warden<B, G> {
    fn clone(&self) -> Self {
        Warden {
            contexts: self.contexts.clone(),
            resolver: self.resolver.clone(),
            hooks: self.hooks.clone(),
            dispatch: self.dispatch,
            hook_timeout: self.hook_timeout,
            detached: self.detached.clone(),
        }
    }
}

impl<B: TenantBackend, G: GrantStore> Warden<B, G> {
    pub fn new(contexts: TenantContextManager<B>, resolver: PermissionResolver<G>) -> Self {
        Warden {
            contexts,
            resolver,
            hooks: Vec::new(),
            dispatch: Dispatch::Inline,
            hook_timeout: Some(DEFAULT_HOOK_TIMEOUT),
            detached: TaskTracker::new(),
        }
    }

    /// Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl PostCommitHook) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Upper bound for a single hook. `None` lets hooks run unbounded.
    pub fn with_hook_timeout(mut self, limit: Option<Duration>) -> Self {
        self.hook_timeout = limit;
        self
    }

    pub fn contexts(&self) -> &TenantContextManager<B> {
        &self.contexts
    }

    pub fn resolver(&self) -> &PermissionResolver<G> {
        &self.resolver
    }

    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout
    }

    /// Check the principal and its permission without running anything.
    pub async fn authorize(
        &self,
        principal: &Principal,
        action: &ProtectedAction,
    ) -> Result<GrantSource, WardenError> {
        principal.ensure_active(Utc::now())?;
        let permission = action.permission();
        let query = PermissionQuery::new(principal.tenant_id, permission.resource, permission.action);
        self.resolver.require(&query).await
    }

    /// Run `f` as `action` on behalf of `principal`.
    ///
    /// ```ignore
    /// let action = ProtectedAction::new("/projects/42", OperationKind::Delete)?;
    /// warden
    ///     .execute(&principal, &action, |scope| {
    ///         Box::pin(async move {
    ///             scope.tx().delete("projects", 42)?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn execute<T, F>(
        &self,
        principal: &Principal,
        action: &ProtectedAction,
        f: F,
    ) -> Result<T, WardenError>
    where
        F: for<'s> FnOnce(&'s mut TenantScope<B>) -> BoxFuture<'s, Result<T, WardenError>> + Send,
        T: Send + 'static,
    {
        self.execute_tracked(principal, action, move |scope| {
            let unit = f(scope);
            Box::pin(async move { unit.await.map(Tracked::new) })
        })
        .await
    }

    /// Like [`execute`](Self::execute), with the closure reporting the
    /// affected entity and its changes for the audit trail.
    pub async fn execute_tracked<T, F>(
        &self,
        principal: &Principal,
        action: &ProtectedAction,
        f: F,
    ) -> Result<T, WardenError>
    where
        F: for<'s> FnOnce(&'s mut TenantScope<B>) -> BoxFuture<'s, Result<Tracked<T>, WardenError>>
            + Send,
        T: Send + 'static,
    {
        if let Err(err) = self.authorize(principal, action).await {
            tracing::info!(
                tenant = %principal.tenant_id,
                user = %principal.user_id,
                path = action.path(),
                kind = action.kind().as_str(),
                code = err.code(),
                "unit of work refused"
            );
            if matches!(err, WardenError::PermissionDenied { .. }) && action.kind().is_mutation() {
                let report = self.report(principal, action, AuditOutcome::Denied, Some(&err));
                self.after_unit(report).await;
            }
            return Err(err);
        }

        match self.contexts.run_in_tenant_scope(principal.tenant_id, f).await {
            Ok(tracked) => {
                let mut report = self.report(principal, action, AuditOutcome::Success, None);
                if tracked.entity_id.is_some() {
                    report.entity_id = tracked.entity_id;
                }
                report.changes = tracked.changes;
                self.after_unit(report).await;
                Ok(tracked.value)
            }
            Err(err) => {
                tracing::debug!(
                    tenant = %principal.tenant_id,
                    path = action.path(),
                    code = err.code(),
                    "unit of work rolled back"
                );
                let report = self.report(principal, action, AuditOutcome::Failure, Some(&err));
                self.after_unit(report).await;
                Err(err)
            }
        }
    }

    /// Wait for detached hooks started so far.
    pub async fn drain_detached(&self) {
        self.detached.close();
        self.detached.wait().await;
        self.detached.reopen();
    }

    fn report(
        &self,
        principal: &Principal,
        action: &ProtectedAction,
        outcome: AuditOutcome,
        error: Option<&WardenError>,
    ) -> UnitReport {
        UnitReport {
            tenant: principal.tenant_id,
            user: principal.user_id.clone(),
            action: action.clone(),
            entity_id: action.entity_id().map(str::to_string),
            changes: None,
            outcome,
            error: error.map(|e| e.code().to_string()),
        }
    }

    async fn after_unit(&self, report: UnitReport) {
        if self.hooks.is_empty() {
            return;
        }
        match self.dispatch {
            Dispatch::Inline => run_hooks(&self.hooks, &report, self.hook_timeout).await,
            Dispatch::Detached => {
                let hooks = self.hooks.clone();
                let limit = self.hook_timeout;
                self.detached.spawn(async move { run_hooks(&hooks, &report, limit).await });
            }
        }
    }
}

pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

async fn run_hooks(hooks: &[Arc<dyn PostCommitHook>], report: &UnitReport, limit: Option<Duration>) {
    for hook in hooks {
        let outcome = match limit {
            Some(limit) => match timeout(limit, hook.run(report)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(
                        hook = hook.name(),
                        tenant = %report.tenant,
                        path = report.action.path(),
                        timeout_ms = limit.as_millis() as u64,
                        "post-commit hook timed out"
                    );
                    continue;
                }
            },
            None => hook.run(report).await,
        };
        if let Err(err) = outcome {
            // The hook has already logged the details.
            tracing::debug!(hook = hook.name(), code = err.code(), "post-commit hook failed");
        }
    }
}

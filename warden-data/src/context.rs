use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::Instrument;
use warden_core::TenantId;

use crate::backend::{PrivilegedBackend, TenantBackend};
use crate::error::DataError;
use crate::scope::{ElevatedScope, ScopeGuard, ScopeState, TenantScope};

/// Runs units of work inside a transaction bound to one tenant.
///
/// Every call opens a fresh transaction, sets the tenant directive as its
/// first statement, runs the closure, then commits on `Ok` or rolls back on
/// `Err`, timeout or cancellation. The connection goes back to the pool only
/// after one of those terminal states.
///
/// ```ignore
/// let names = manager
///     .run_in_tenant_scope(tenant, |scope| {
///         Box::pin(async move {
///             let rows = scope.tx().select("projects")?;
///             Ok::<_, DataError>(rows.len())
///         })
///     })
///     .await?;
/// ```
pub struct TenantContextManager<B: TenantBackend> {
    backend: Arc<B>,
    unit_timeout: Option<Duration>,
}

impl<B: TenantBackend> Clone for TenantContextManager<B> {
    fn clone(&self) -> Self {
        TenantContextManager {
            backend: self.backend.clone(),
            unit_timeout: self.unit_timeout,
        }
    }
}

impl<B: TenantBackend> TenantContextManager<B> {
    pub fn new(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<B>) -> Self {
        TenantContextManager {
            backend,
            unit_timeout: None,
        }
    }

    /// Bound every unit of work; on expiry the transaction is rolled back and
    /// [`DataError::Timeout`] is returned.
    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn run_in_tenant_scope<T, E, F>(&self, tenant: TenantId, f: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut TenantScope<B>) -> BoxFuture<'s, Result<T, E>> + Send,
        T: Send,
        E: From<DataError> + Send,
    {
        let span = tracing::debug_span!("tenant_scope", tenant = %tenant);
        self.run_scoped(tenant, f).instrument(span).await
    }

    async fn run_scoped<T, E, F>(&self, tenant: TenantId, f: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut TenantScope<B>) -> BoxFuture<'s, Result<T, E>> + Send,
        T: Send,
        E: From<DataError> + Send,
    {
        let mut tx = match self.backend.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::error!(error = %err, "could not open tenant transaction");
                return Err(E::from(DataError::isolation("begin", err)));
            }
        };

        let bound = self.backend.bind_tenant(&mut tx, tenant).await;
        if let Err(err) = bound {
            tracing::error!(error = %err, "could not set tenant directive");
            if let Err(rollback) = self.backend.rollback(tx).await {
                tracing::warn!(error = %rollback, "rollback after failed directive also failed");
            }
            return Err(E::from(DataError::isolation("tenant directive", err)));
        }
        tracing::debug!("tenant scope open");

        let mut scope = TenantScope {
            tenant,
            tx,
            guard: ScopeGuard::open(tenant),
        };

        let outcome = match self.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, f(&mut scope)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(limit_ms = limit.as_millis() as u64, "unit of work timed out");
                    Err(E::from(DataError::Timeout(limit)))
                }
            },
            None => f(&mut scope).await,
        };

        let TenantScope { tx, mut guard, .. } = scope;
        match outcome {
            Ok(value) => {
                let committed = self.backend.commit(tx).await;
                match committed {
                    Ok(()) => {
                        guard.finish(ScopeState::Committed);
                        Ok(value)
                    }
                    Err(err) => {
                        guard.finish(ScopeState::RolledBack);
                        tracing::error!(error = %err, "commit failed");
                        Err(E::from(err))
                    }
                }
            }
            Err(err) => {
                let rolled_back = self.backend.rollback(tx).await;
                if let Err(rollback) = rolled_back {
                    tracing::warn!(error = %rollback, "explicit rollback failed");
                }
                guard.finish(ScopeState::RolledBack);
                Err(err)
            }
        }
    }
}

/// Runs administrative units of work over the privileged backend.
///
/// Built from a [`PrivilegedBackend`] only; there is no conversion from a
/// [`TenantContextManager`].
pub struct ElevatedContextManager<P: PrivilegedBackend> {
    backend: Arc<P>,
}

impl<P: PrivilegedBackend> Clone for ElevatedContextManager<P> {
    fn clone(&self) -> Self {
        ElevatedContextManager {
            backend: self.backend.clone(),
        }
    }
}

impl<P: PrivilegedBackend> ElevatedContextManager<P> {
    pub fn new(backend: P) -> Self {
        ElevatedContextManager {
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    /// Run `f` in a transaction that bypasses row security. `reason` is
    /// logged for every call.
    pub async fn run_with_elevated_scope<T, E, F>(&self, reason: &str, f: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut ElevatedScope<P::Tx>) -> BoxFuture<'s, Result<T, E>> + Send,
        T: Send,
        E: From<DataError> + Send,
    {
        tracing::info!(reason, "opening elevated scope");
        let tx = self
            .backend
            .begin_privileged()
            .await
            .map_err(|err| E::from(DataError::isolation("begin privileged", err)))?;

        let mut scope = ElevatedScope {
            reason: reason.to_string(),
            tx,
        };
        let outcome = f(&mut scope).await;

        match outcome {
            Ok(value) => {
                self.backend.commit(scope.tx).await.map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.backend.rollback(scope.tx).await {
                    tracing::warn!(error = %rollback, reason, "elevated rollback failed");
                }
                Err(err)
            }
        }
    }
}

use warden_core::TenantId;

use crate::backend::TenantBackend;

/// Lifecycle of a tenant scope. `Committed` and `RolledBack` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeState {
    Idle,
    Open,
    Committed,
    RolledBack,
}

impl ScopeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScopeState::Committed | ScopeState::RolledBack)
    }
}

/// Tracks the state of one scope and reports scopes that were dropped while
/// still open (the caller's future was cancelled before commit).
#[derive(Debug)]
pub(crate) struct ScopeGuard {
    tenant: TenantId,
    state: ScopeState,
}

impl ScopeGuard {
    pub(crate) fn open(tenant: TenantId) -> Self {
        ScopeGuard {
            tenant,
            state: ScopeState::Open,
        }
    }

    pub(crate) fn finish(&mut self, state: ScopeState) {
        debug_assert!(state.is_terminal());
        self.state = state;
        tracing::debug!(tenant = %self.tenant, state = ?state, "tenant scope closed");
    }

    pub(crate) fn state(&self) -> ScopeState {
        self.state
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if self.state == ScopeState::Open {
            // The transaction value is dropped alongside the guard; backends
            // roll back on drop.
            tracing::warn!(tenant = %self.tenant, "tenant scope cancelled before commit, rolling back");
        }
    }
}

/// A unit of work bound to exactly one tenant.
///
/// Handed to the closure of
/// [`TenantContextManager::run_in_tenant_scope`](crate::TenantContextManager::run_in_tenant_scope)
/// by mutable reference only; it cannot be moved out, stored or reused by
/// another scope.
pub struct TenantScope<B: TenantBackend> {
    pub(crate) tenant: TenantId,
    pub(crate) tx: B::Tx,
    pub(crate) guard: ScopeGuard,
}

impl<B: TenantBackend> TenantScope<B> {
    /// The tenant this scope is bound to.
    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// The backend transaction, already carrying the tenant directive.
    pub fn tx(&mut self) -> &mut B::Tx {
        &mut self.tx
    }

    pub fn state(&self) -> ScopeState {
        self.guard.state()
    }
}

/// A unit of work on the privileged path. Carries the reason it was opened.
pub struct ElevatedScope<Tx> {
    pub(crate) reason: String,
    pub(crate) tx: Tx,
}

impl<Tx> ElevatedScope<Tx> {
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn tx(&mut self) -> &mut Tx {
        &mut self.tx
    }
}

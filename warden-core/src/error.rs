use crate::config::ConfigError;
use crate::types::TenantId;

/// Error taxonomy of the tenant authorization and isolation core.
///
/// Of the isolation core's own failures, only
/// [`WardenError::PermissionDenied`], [`WardenError::IsolationSetupFailed`] and
/// [`WardenError::Unauthenticated`] reach the caller. Errors produced inside
/// the caller's own unit of work (`Storage`, `Handler`, `NotFound`) and
/// startup `Config` errors are returned unchanged as well. Audit,
/// invalidation, event and grant-store failures are operational: they are
/// logged where they happen and never surface.
pub enum WardenError {
    /// The resolver found no grant for the requested `(resource, action)`.
    PermissionDenied {
        tenant: TenantId,
        resource: String,
        action: String,
    },
    /// The transaction or tenant directive could not be established.
    IsolationSetupFailed(String),
    /// The audit sink rejected or timed out an append.
    AuditWriteFailed(String),
    /// A cache invalidation could not be applied.
    InvalidationFailed(String),
    /// A mutation event could not be handed to the message transport.
    EventPublishFailed(String),
    /// The grant store could not be queried; permission checks fail closed.
    GrantStoreUnavailable(String),
    /// The principal is missing, malformed or expired.
    Unauthenticated(String),
    NotFound(String),
    /// Storage failure inside an established scope (query error, policy
    /// violation, timeout). The transaction has been rolled back.
    Storage(String),
    /// Error raised by the unit of work itself.
    Handler(String),
    Config(ConfigError),
}

impl WardenError {
    pub fn denied(tenant: TenantId, resource: impl Into<String>, action: impl Into<String>) -> Self {
        WardenError::PermissionDenied {
            tenant,
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Whether this error translates into a response for the caller. False
    /// only for the operational failures listed on [`WardenError`].
    pub fn is_caller_visible(&self) -> bool {
        !matches!(
            self,
            WardenError::AuditWriteFailed(_)
                | WardenError::InvalidationFailed(_)
                | WardenError::EventPublishFailed(_)
                | WardenError::GrantStoreUnavailable(_)
        )
    }

    /// Stable machine-readable code, used in logs and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::PermissionDenied { .. } => "permission_denied",
            WardenError::IsolationSetupFailed(_) => "isolation_setup_failed",
            WardenError::AuditWriteFailed(_) => "audit_write_failed",
            WardenError::InvalidationFailed(_) => "invalidation_failed",
            WardenError::EventPublishFailed(_) => "event_publish_failed",
            WardenError::GrantStoreUnavailable(_) => "grant_store_unavailable",
            WardenError::Unauthenticated(_) => "unauthenticated",
            WardenError::NotFound(_) => "not_found",
            WardenError::Storage(_) => "storage_error",
            WardenError::Handler(_) => "handler_error",
            WardenError::Config(_) => "config_error",
        }
    }
}

impl std::fmt::Display for WardenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WardenError::PermissionDenied {
                tenant,
                resource,
                action,
            } => write!(f, "Permission denied: tenant {tenant} may not {action} {resource}"),
            WardenError::IsolationSetupFailed(msg) => write!(f, "Isolation setup failed: {msg}"),
            WardenError::AuditWriteFailed(msg) => write!(f, "Audit write failed: {msg}"),
            WardenError::InvalidationFailed(msg) => write!(f, "Cache invalidation failed: {msg}"),
            WardenError::EventPublishFailed(msg) => write!(f, "Event publish failed: {msg}"),
            WardenError::GrantStoreUnavailable(msg) => write!(f, "Grant store unavailable: {msg}"),
            WardenError::Unauthenticated(msg) => write!(f, "Unauthenticated: {msg}"),
            WardenError::NotFound(msg) => write!(f, "Not found: {msg}"),
            WardenError::Storage(msg) => write!(f, "Storage error: {msg}"),
            WardenError::Handler(msg) => write!(f, "{msg}"),
            WardenError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::fmt::Debug for WardenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WardenError({}: {})", self.code(), self)
    }
}

impl std::error::Error for WardenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WardenError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for WardenError {
    fn from(err: ConfigError) -> Self {
        WardenError::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_errors_pass_through_to_the_caller() {
        assert!(WardenError::Storage("policy violation".into()).is_caller_visible());
        assert!(WardenError::Handler("bad input".into()).is_caller_visible());
        assert!(WardenError::NotFound("/projects/9".into()).is_caller_visible());
    }

    #[test]
    fn only_denial_and_isolation_reach_the_caller() {
        let tenant = TenantId::random();
        assert!(WardenError::denied(tenant, "client", "delete").is_caller_visible());
        assert!(WardenError::IsolationSetupFailed("no tx".into()).is_caller_visible());
        assert!(!WardenError::AuditWriteFailed("down".into()).is_caller_visible());
        assert!(!WardenError::InvalidationFailed("down".into()).is_caller_visible());
        assert!(!WardenError::EventPublishFailed("down".into()).is_caller_visible());
        assert!(!WardenError::GrantStoreUnavailable("down".into()).is_caller_visible());
        assert!(WardenError::Unauthenticated("expired".into()).is_caller_visible());
    }
}

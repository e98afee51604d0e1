use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use warden_data::DataError;

use crate::entry::AuditLogEntry;

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync + 'static {
    fn append(&self, entry: &AuditLogEntry) -> impl Future<Output = Result<(), DataError>> + Send;
}

/// Keeps entries in memory. Can be told to fail or stall.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every append, to exercise write timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }
}

impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), DataError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataError::Other("audit table unavailable".into()));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(feature = "postgres")]
pub use self::pg::PgAuditSink;

#[cfg(feature = "postgres")]
mod pg {
    use warden_data::postgres::PgTenantBackend;
    use warden_data::{DataError, SqlxErrorExt, TenantContextManager};

    use super::AuditSink;
    use crate::entry::AuditLogEntry;

    /// Appends to `audit_logs` in its own tenant scope, so the row policy
    /// checks that the entry belongs to the tenant it is written for.
    #[derive(Clone)]
    pub struct PgAuditSink {
        manager: TenantContextManager<PgTenantBackend>,
    }

    impl PgAuditSink {
        pub fn new(manager: TenantContextManager<PgTenantBackend>) -> Self {
            PgAuditSink { manager }
        }
    }

    impl AuditSink for PgAuditSink {
        async fn append(&self, entry: &AuditLogEntry) -> Result<(), DataError> {
            let entry = entry.clone();
            let changes = entry
                .changes
                .as_ref()
                .map(serde_json::to_value)
                .transpose()
                .map_err(DataError::database)?;
            let metadata = serde_json::to_value(&entry.metadata).map_err(DataError::database)?;

            self.manager
                .run_in_tenant_scope(entry.tenant_id, move |scope| {
                    Box::pin(async move {
                        sqlx::query(
                            "INSERT INTO audit_logs \
                             (id, tenant_id, user_id, action, entity_type, entity_id, changes, metadata, outcome, error, created_at) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                        )
                        .bind(entry.id)
                        .bind(entry.tenant_id.as_uuid())
                        .bind(entry.user_id.as_str())
                        .bind(entry.action.as_str())
                        .bind(&entry.entity_type)
                        .bind(entry.entity_id.as_deref())
                        .bind(changes)
                        .bind(metadata)
                        .bind(entry.outcome.as_str())
                        .bind(entry.error.as_deref())
                        .bind(entry.timestamp)
                        .execute(PgTenantBackend::conn(scope))
                        .await
                        .map_err(|e| e.into_data_error())?;
                        Ok::<_, DataError>(())
                    })
                })
                .await
        }
    }
}

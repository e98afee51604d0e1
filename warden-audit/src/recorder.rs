use std::sync::Arc;
use std::time::Duration;

use warden_core::WardenError;
use warden_data::DataError;

use crate::entry::AuditLogEntry;
use crate::sink::AuditSink;

/// Appends entries to an [`AuditSink`], best-effort.
///
/// A failed or timed-out append is logged at `error` and reported as
/// [`WardenError::AuditWriteFailed`]; callers are expected to log and move on,
/// never to fail the business operation on it.
pub struct AuditRecorder<S: AuditSink> {
    sink: Arc<S>,
    write_timeout: Option<Duration>,
}

impl<S: AuditSink> Clone for AuditRecorder<S> {
    fn clone(&self) -> Self {
        AuditRecorder {
            sink: self.sink.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

impl<S: AuditSink> AuditRecorder<S> {
    pub fn new(sink: S) -> Self {
        Self::from_arc(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<S>) -> Self {
        AuditRecorder {
            sink,
            write_timeout: None,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn record(&self, entry: AuditLogEntry) -> Result<(), WardenError> {
        let result = match self.write_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.sink.append(&entry)).await {
                Ok(result) => result,
                Err(_) => Err(DataError::Timeout(limit)),
            },
            None => self.sink.append(&entry).await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    tenant = %entry.tenant_id,
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = ?entry.entity_id,
                    "audit entry recorded"
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    tenant = %entry.tenant_id,
                    user = %entry.user_id,
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = ?entry.entity_id,
                    outcome = entry.outcome.as_str(),
                    error = %err,
                    "audit write failed"
                );
                Err(WardenError::AuditWriteFailed(err.to_string()))
            }
        }
    }
}

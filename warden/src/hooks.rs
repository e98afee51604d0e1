//! Work that runs after a unit of work has settled.
//!
//! Every hook receives the same [`UnitReport`]. Hooks are best-effort: their
//! errors are logged and never reach the caller of the unit of work.

use futures_util::future::BoxFuture;
use warden_audit::{should_record, AuditLogEntry, AuditOutcome, AuditRecorder, AuditSink, ChangeSummary};
use warden_cache::InvalidationCoordinator;
use warden_core::{TenantId, UserId, WardenError};
use warden_events::{EventPublisher, MessageTransport, MutationEvent};

use crate::action::ProtectedAction;

/// How a unit of work ended, as seen by post-commit hooks.
#[derive(Clone, Debug)]
pub struct UnitReport {
    pub tenant: TenantId,
    pub user: UserId,
    pub action: ProtectedAction,
    /// Id of the affected entity: the one the unit reported, else the one
    /// in the path.
    pub entity_id: Option<String>,
    pub changes: Option<ChangeSummary>,
    pub outcome: AuditOutcome,
    /// Error code for denied and failed units.
    pub error: Option<String>,
}

impl UnitReport {
    /// The unit committed a change to its resource.
    pub fn committed_mutation(&self) -> bool {
        self.outcome == AuditOutcome::Success && self.action.kind().is_mutation()
    }
}

pub trait PostCommitHook: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn run<'a>(&'a self, report: &'a UnitReport) -> BoxFuture<'a, Result<(), WardenError>>;
}

/// Appends an audit entry for mutations, single-entity reads and denied
/// mutation attempts.
pub struct AuditHook<S: AuditSink> {
    recorder: AuditRecorder<S>,
}

impl<S: AuditSink> AuditHook<S> {
    pub fn new(recorder: AuditRecorder<S>) -> Self {
        AuditHook { recorder }
    }

    fn records(report: &UnitReport) -> bool {
        let kind = report.action.kind();
        match report.outcome {
            AuditOutcome::Denied => kind.is_mutation(),
            _ => should_record(kind, report.entity_id.as_deref()),
        }
    }
}

impl<S: AuditSink> PostCommitHook for AuditHook<S> {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn run<'a>(&'a self, report: &'a UnitReport) -> BoxFuture<'a, Result<(), WardenError>> {
        Box::pin(async move {
            if !Self::records(report) {
                return Ok(());
            }
            let mut entry = AuditLogEntry::for_path(
                report.tenant,
                report.user.clone(),
                report.action.kind(),
                report.action.path(),
            )
            .with_outcome(report.outcome, report.error.clone());
            if let Some(id) = &report.entity_id {
                entry = entry.with_entity_id(id.clone());
            }
            if let Some(changes) = &report.changes {
                entry = entry.with_changes(changes.clone());
            }
            self.recorder.record(entry).await
        })
    }
}

/// Clears cached views of the resource and its dependents after a committed
/// mutation.
pub struct InvalidationHook {
    coordinator: InvalidationCoordinator,
}

impl InvalidationHook {
    pub fn new(coordinator: InvalidationCoordinator) -> Self {
        InvalidationHook { coordinator }
    }
}

impl PostCommitHook for InvalidationHook {
    fn name(&self) -> &'static str {
        "invalidation"
    }

    fn run<'a>(&'a self, report: &'a UnitReport) -> BoxFuture<'a, Result<(), WardenError>> {
        Box::pin(async move {
            if !report.committed_mutation() {
                return Ok(());
            }
            self.coordinator
                .on_mutation(
                    report.tenant,
                    report.action.resource(),
                    report.action.kind(),
                    report.entity_id.as_deref(),
                )
                .await
        })
    }
}

/// Publishes a [`MutationEvent`] for every committed mutation.
pub struct EventHook<T: MessageTransport> {
    publisher: EventPublisher<T>,
}

impl<T: MessageTransport> EventHook<T> {
    pub fn new(publisher: EventPublisher<T>) -> Self {
        EventHook { publisher }
    }
}

impl<T: MessageTransport> PostCommitHook for EventHook<T> {
    fn name(&self) -> &'static str {
        "events"
    }

    fn run<'a>(&'a self, report: &'a UnitReport) -> BoxFuture<'a, Result<(), WardenError>> {
        Box::pin(async move {
            if !report.committed_mutation() {
                return Ok(());
            }
            let mut event = MutationEvent::new(
                report.tenant,
                report.user.clone(),
                report.action.resource(),
                report.action.kind(),
            );
            if let Some(id) = &report.entity_id {
                event = event.with_entity_id(id.clone());
            }
            self.publisher.publish(&event).await.map_err(|err| {
                tracing::warn!(
                    tenant = %report.tenant,
                    resource = report.action.resource(),
                    topic = self.publisher.topic(),
                    error = %err,
                    "mutation event not published"
                );
                WardenError::EventPublishFailed(err.to_string())
            })
        })
    }
}

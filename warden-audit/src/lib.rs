//! # warden-audit
//!
//! Immutable audit trail. One entry per mutating action, plus reads that
//! target a single entity. Writing an entry never decides the outcome of the
//! action it describes.

pub mod entry;
pub mod path;
pub mod recorder;
pub mod settings;
pub mod sink;

pub use entry::{should_record, AuditAction, AuditLogEntry, AuditOutcome, ChangeSummary, RequestMetadata};
pub use path::{singularize, ResourcePath};
pub use recorder::AuditRecorder;
pub use settings::{AuditSettings, Dispatch};
pub use sink::{AuditSink, MemoryAuditSink};

#[cfg(feature = "postgres")]
pub use sink::PgAuditSink;

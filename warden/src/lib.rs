//! # warden
//!
//! Tenant authorization and data isolation behind one orchestrator.
//! [`Warden`] checks the principal and its permission, runs the unit of work
//! in a tenant-bound transaction, then hands the outcome to post-commit hooks
//! (audit, cache invalidation, mutation events).
//!
//! The building blocks are re-exported as-is:
//!
//! | Crate             | Provides                                   |
//! |-------------------|--------------------------------------------|
//! | `warden-core`     | ids, permissions, errors, config, tracing  |
//! | `warden-security` | `Principal` from verified claims           |
//! | `warden-data`     | tenant scopes, backends, in-memory engine  |
//! | `warden-authz`    | grant store and permission resolver        |
//! | `warden-audit`    | audit entries, sinks, recorder             |
//! | `warden-cache`    | tenant cache and invalidation coordinator  |
//! | `warden-events`   | mutation events, transport, broker         |
//!
//! The `postgres` feature (default) adds [`postgres::connect`].

pub mod action;
pub mod hooks;
pub mod settings;
pub mod orchestrator;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use warden_audit;
pub use warden_authz;
pub use warden_cache;
pub use warden_core;
pub use warden_data;
pub use warden_events;
pub use warden_security;

pub use action::ProtectedAction;
pub use hooks::{AuditHook, EventHook, InvalidationHook, PostCommitHook, UnitReport};
pub use settings::{bootstrap, WardenSettings};
pub use orchestrator::{Tracked, Warden};

pub mod prelude {
    //! Re-exports of the most commonly used types across the workspace.
    pub use crate::{ProtectedAction, Tracked, Warden};
    pub use warden_core::prelude::*;
    pub use warden_data::{DataError, TenantScope};
    pub use warden_security::Principal;
}

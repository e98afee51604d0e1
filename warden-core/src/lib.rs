//! # warden-core
//!
//! Shared vocabulary of the Warden workspace: tenant and user identifiers,
//! `(resource, action)` permissions, operation kinds, the [`WardenError`]
//! taxonomy, layered [`WardenConfig`] and tracing setup.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{ConfigError, ConfigValue, FromConfig, FromConfigValue, WardenConfig};
pub use error::WardenError;
pub use telemetry::init_tracing;
pub use types::{OperationKind, Permission, TenantId, UserId};

pub mod prelude {
    //! Re-exports of the most commonly used core types.
    pub use crate::{OperationKind, Permission, TenantId, UserId, WardenConfig, WardenError};
}

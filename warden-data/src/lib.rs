//! # warden-data
//!
//! Tenant context manager: every unit of work runs inside one transaction
//! whose first statement sets a transaction-local tenant directive, which the
//! storage engine's row policies filter on.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TenantContextManager`] | `run_in_tenant_scope`: begin, bind, run, commit or roll back |
//! | [`ElevatedContextManager`] | `run_with_elevated_scope` over a separately credentialed backend |
//! | [`TenantBackend`] / [`PrivilegedBackend`] | Engine seams, one per credential set |
//! | [`postgres::PgTenantBackend`] | `set_config(..., true)` directive, least-privilege check |
//! | [`memory::MemoryDatabase`] | Pooled in-memory engine with row policies, for tests |
//! | [`DataSources`] / [`IsolationSettings`] | Typed configuration sections |
//!
//! # Feature flags
//!
//! | Feature    | Description |
//! |------------|-------------|
//! | `postgres` | PostgreSQL engine via `sqlx/postgres` (default) |

pub mod backend;
pub mod context;
pub mod error;
pub mod memory;
pub mod scope;
pub mod settings;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use backend::{PrivilegedBackend, TenantBackend};
pub use context::{ElevatedContextManager, TenantContextManager};
pub use error::{DataError, DataResult};
pub use scope::{ElevatedScope, ScopeState, TenantScope};
pub use settings::{DataSourceSettings, DataSources, IsolationSettings};

#[cfg(feature = "postgres")]
pub use error::SqlxErrorExt;

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{
        DataError, ElevatedContextManager, PrivilegedBackend, TenantBackend, TenantContextManager,
        TenantScope,
    };
}

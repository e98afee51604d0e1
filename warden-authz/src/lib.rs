//! # warden-authz
//!
//! Permission resolution over three grant sources: direct grants, grants
//! inherited through role assignments, and grants received through
//! delegations. Any valid source allows; expiry is evaluated per query.

pub mod model;
pub mod resolver;
pub mod store;

pub use model::{Delegation, DirectGrant, Role, RoleGrant};
pub use resolver::{Decision, GrantSource, PermissionQuery, PermissionResolver};
pub use store::{GrantStore, MemoryGrantStore};

#[cfg(feature = "postgres")]
pub use store::PgGrantStore;

pub mod prelude {
    //! Re-exports of the most commonly used authorization types.
    pub use crate::{Decision, GrantSource, GrantStore, PermissionQuery, PermissionResolver};
}

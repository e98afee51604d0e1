//! # warden-cache
//!
//! Tenant-scoped TTL cache with pluggable backends, and the invalidation
//! coordinator that clears a resource's views and those of its declared
//! dependents after a mutation.

pub mod coordinator;
pub mod dependents;
pub mod error;
pub mod key;
pub mod settings;
pub mod store;
pub mod tenant_cache;

pub use coordinator::InvalidationCoordinator;
pub use dependents::DependencyMap;
pub use error::CacheError;
pub use key::CacheKey;
pub use settings::CacheSettings;
pub use store::{CacheStore, InMemoryStore};
pub use tenant_cache::TenantCache;

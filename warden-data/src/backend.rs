//! Storage seams for the tenant context manager.
//!
//! [`TenantBackend`] and [`PrivilegedBackend`] are deliberately unrelated
//! traits: an engine exposes one type per credential set, and no type in this
//! workspace implements both. Ordinary traffic therefore cannot reach the
//! privileged path by flipping a flag.

use std::future::Future;

use warden_core::TenantId;

use crate::error::DataError;

/// A connection source for ordinary, least-privilege tenant traffic.
///
/// Dropping a `Tx` without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) must roll it back before the underlying
/// connection is reused.
pub trait TenantBackend: Send + Sync + 'static {
    type Tx: Send + 'static;

    /// Acquire a pooled connection and open a transaction on it.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, DataError>> + Send;

    /// Set the transaction-local tenant directive. Must be the first
    /// statement executed in `tx`.
    fn bind_tenant<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        tenant: TenantId,
    ) -> impl Future<Output = Result<(), DataError>> + Send + 'a;

    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), DataError>> + Send;

    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<(), DataError>> + Send;
}

/// A separately credentialed connection source whose transactions bypass
/// row-security policies. Reserved for administrative paths such as tenant
/// provisioning and migrations.
pub trait PrivilegedBackend: Send + Sync + 'static {
    type Tx: Send + 'static;

    fn begin_privileged(&self) -> impl Future<Output = Result<Self::Tx, DataError>> + Send;

    fn commit(&self, tx: Self::Tx) -> impl Future<Output = Result<(), DataError>> + Send;

    fn rollback(&self, tx: Self::Tx) -> impl Future<Output = Result<(), DataError>> + Send;
}

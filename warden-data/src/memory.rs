//! In-memory pooled storage engine.
//!
//! Emulates the parts of a relational engine the tenant context manager
//! relies on: a bounded pool of reusable connections, transactions with
//! staged writes, a transaction-local tenant directive, connection-level
//! (session) settings that outlive a transaction, and row policies that
//! filter every read and check every write against the effective tenant.
//!
//! Failure injection hooks on [`MemoryPool`] let tests break `begin`, the
//! directive and `commit`.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use warden_core::TenantId;

use crate::backend::{PrivilegedBackend, TenantBackend};
use crate::error::DataError;

#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: u64,
    pub tenant_id: TenantId,
    pub data: Value,
}

#[derive(Default)]
struct Store {
    tables: DashMap<String, Vec<Row>>,
    next_row_id: AtomicU64,
}

impl Store {
    fn next_id(&self) -> u64 {
        self.next_row_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Shared committed state. Clones refer to the same database.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    store: Arc<Store>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a committed row directly, as provisioning would.
    pub fn seed(&self, table: &str, tenant: TenantId, data: Value) -> u64 {
        let id = self.store.next_id();
        self.store.tables.entry(table.to_string()).or_default().push(Row {
            id,
            tenant_id: tenant,
            data,
        });
        id
    }

    /// Unfiltered snapshot of committed rows.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.store
            .tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    /// A pool for ordinary traffic; its transactions are filtered by policy.
    pub fn tenant_backend(&self, pool_size: usize) -> MemoryTenantBackend {
        MemoryTenantBackend {
            pool: MemoryPool::new(self.store.clone(), pool_size, false),
        }
    }

    /// A separately credentialed pool whose transactions bypass policies.
    pub fn elevated_backend(&self, pool_size: usize) -> MemoryElevatedBackend {
        MemoryElevatedBackend {
            pool: MemoryPool::new(self.store.clone(), pool_size, true),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    begun: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
    discarded: AtomicUsize,
    reused_across_tenants: AtomicUsize,
}

/// Snapshot of pool activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Physical connections created.
    pub opened: usize,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
    /// Connections closed at release because they carried a session setting.
    pub discarded: usize,
    /// Times a connection was bound to a tenant other than its previous one.
    pub reused_across_tenants: usize,
}

/// State of an idle connection, for inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionState {
    pub id: u64,
    pub in_transaction: bool,
    pub tx_tenant: Option<TenantId>,
    pub session_tenant: Option<TenantId>,
}

#[derive(Debug)]
struct MemoryConnection {
    id: u64,
    /// Connection-lifetime setting; survives commit and rollback.
    session_tenant: Option<TenantId>,
    /// Transaction-local setting; cleared when the transaction ends.
    tx_tenant: Option<TenantId>,
    in_transaction: bool,
    last_tenant: Option<TenantId>,
}

impl MemoryConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState {
            id: self.id,
            in_transaction: self.in_transaction,
            tx_tenant: self.tx_tenant,
            session_tenant: self.session_tenant,
        }
    }
}

struct PoolInner {
    store: Arc<Store>,
    bypass: bool,
    idle: Mutex<Vec<MemoryConnection>>,
    permits: Arc<Semaphore>,
    next_conn_id: AtomicU64,
    counters: Counters,
    discard_tainted: AtomicBool,
    fail_next_begins: AtomicUsize,
    fail_binding: AtomicBool,
    fail_next_commit: AtomicBool,
}

/// A bounded pool of reusable connections.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    fn new(store: Arc<Store>, size: usize, bypass: bool) -> Self {
        MemoryPool {
            inner: Arc::new(PoolInner {
                store,
                bypass,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(size.max(1))),
                next_conn_id: AtomicU64::new(0),
                counters: Counters::default(),
                discard_tainted: AtomicBool::new(true),
                fail_next_begins: AtomicUsize::new(0),
                fail_binding: AtomicBool::new(false),
                fail_next_commit: AtomicBool::new(false),
            }),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            opened: c.opened.load(Ordering::SeqCst),
            begun: c.begun.load(Ordering::SeqCst),
            committed: c.committed.load(Ordering::SeqCst),
            rolled_back: c.rolled_back.load(Ordering::SeqCst),
            discarded: c.discarded.load(Ordering::SeqCst),
            reused_across_tenants: c.reused_across_tenants.load(Ordering::SeqCst),
        }
    }

    pub fn idle_connections(&self) -> Vec<ConnectionState> {
        self.idle().iter().map(MemoryConnection::state).collect()
    }

    /// Whether connections carrying a session-level tenant are closed on
    /// release (the default) or put back into the pool.
    pub fn set_discard_tainted(&self, discard: bool) {
        self.inner.discard_tainted.store(discard, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `begin` fail.
    pub fn fail_next_begins(&self, n: usize) {
        self.inner.fail_next_begins.store(n, Ordering::SeqCst);
    }

    /// Make setting the tenant directive fail until turned off.
    pub fn fail_binding(&self, fail: bool) {
        self.inner.fail_binding.store(fail, Ordering::SeqCst);
    }

    /// Make the next commit fail; the transaction is rolled back.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<MemoryConnection>> {
        self.inner.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn begin(&self) -> Result<MemoryTx, DataError> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DataError::isolation("acquire connection", e))?;

        let injected = self
            .inner
            .fail_next_begins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DataError::Other("connection refused".into()));
        }

        let pooled = self.idle().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => {
                self.inner.counters.opened.fetch_add(1, Ordering::SeqCst);
                MemoryConnection {
                    id: self.inner.next_conn_id.fetch_add(1, Ordering::SeqCst) + 1,
                    session_tenant: None,
                    tx_tenant: None,
                    in_transaction: false,
                    last_tenant: None,
                }
            }
        };
        conn.in_transaction = true;
        self.inner.counters.begun.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryTx {
            pool: self.clone(),
            conn: Some(conn),
            staged: Vec::new(),
            statements: 0,
            _permit: permit,
        })
    }

    fn checkin(&self, conn: MemoryConnection) {
        if conn.session_tenant.is_some() && self.inner.discard_tainted.load(Ordering::SeqCst) {
            tracing::warn!(connection = conn.id, "connection carries a session-level tenant, closing it");
            self.inner.counters.discarded.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.idle().push(conn);
    }
}

enum Staged {
    Insert { table: String, row: Row },
    Delete { table: String, id: u64 },
}

/// An open transaction on a pooled connection.
///
/// Dropping it without commit rolls it back and returns the connection.
pub struct MemoryTx {
    pool: MemoryPool,
    conn: Option<MemoryConnection>,
    staged: Vec<Staged>,
    statements: usize,
    // Released after `Drop::drop` has returned the connection.
    _permit: OwnedSemaphorePermit,
}

impl MemoryTx {
    fn conn(&self) -> Result<&MemoryConnection, DataError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DataError::Other("transaction already closed".into()))
    }

    fn conn_mut(&mut self) -> Result<&mut MemoryConnection, DataError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DataError::Other("transaction already closed".into()))
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.conn.as_ref().map(|c| c.id)
    }

    /// Tenant the row policies currently filter on: the transaction-local
    /// directive when set, otherwise whatever the session carries.
    pub fn current_tenant(&self) -> Option<TenantId> {
        self.conn
            .as_ref()
            .and_then(|c| c.tx_tenant.or(c.session_tenant))
    }

    fn admits(&self, tenant: TenantId) -> bool {
        self.pool.inner.bypass || self.current_tenant() == Some(tenant)
    }

    fn bind(&mut self, tenant: TenantId) -> Result<(), DataError> {
        if self.statements > 0 {
            return Err(DataError::IsolationSetup(
                "tenant directive must be the first statement of the transaction".into(),
            ));
        }
        let counters = &self.pool.inner.counters;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DataError::Other("transaction already closed".into()))?;
        if conn.last_tenant.is_some_and(|prev| prev != tenant) {
            counters.reused_across_tenants.fetch_add(1, Ordering::SeqCst);
        }
        conn.tx_tenant = Some(tenant);
        conn.last_tenant = Some(tenant);
        self.statements += 1;
        Ok(())
    }

    /// Rows of `table` visible to this transaction, including its own
    /// uncommitted writes.
    pub fn select(&mut self, table: &str) -> Result<Vec<Row>, DataError> {
        self.conn()?;
        self.statements += 1;

        let mut rows = self
            .pool
            .inner
            .store
            .tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default();
        for staged in &self.staged {
            match staged {
                Staged::Insert { table: t, row } if t == table => rows.push(row.clone()),
                Staged::Delete { table: t, id } if t == table => rows.retain(|r| r.id != *id),
                _ => {}
            }
        }
        rows.retain(|row| self.admits(row.tenant_id));
        Ok(rows)
    }

    /// Insert a row owned by `tenant`. Rejected unless `tenant` is the one the
    /// policies currently admit.
    pub fn insert(&mut self, table: &str, tenant: TenantId, data: Value) -> Result<u64, DataError> {
        self.conn()?;
        self.statements += 1;
        if !self.admits(tenant) {
            return Err(DataError::PolicyViolation(format!(
                "new row in '{table}' for tenant {tenant} violates row-level security policy"
            )));
        }
        let id = self.pool.inner.store.next_id();
        self.staged.push(Staged::Insert {
            table: table.to_string(),
            row: Row {
                id,
                tenant_id: tenant,
                data,
            },
        });
        Ok(id)
    }

    /// Insert a row owned by the tenant of this transaction.
    pub fn insert_owned(&mut self, table: &str, data: Value) -> Result<u64, DataError> {
        let tenant = self.current_tenant().ok_or_else(|| {
            DataError::PolicyViolation(format!("no tenant bound for insert into '{table}'"))
        })?;
        self.insert(table, tenant, data)
    }

    /// Delete a visible row. Returns `false` when no such row is visible.
    pub fn delete(&mut self, table: &str, id: u64) -> Result<bool, DataError> {
        let visible = self.select(table)?.iter().any(|r| r.id == id);
        if visible {
            self.staged.push(Staged::Delete {
                table: table.to_string(),
                id,
            });
        }
        Ok(visible)
    }

    /// Set the tenant on the connection for its whole lifetime, the way a
    /// plain `SET` would. The value survives this transaction.
    pub fn set_session_tenant(&mut self, tenant: TenantId) -> Result<(), DataError> {
        self.statements += 1;
        self.conn_mut()?.session_tenant = Some(tenant);
        Ok(())
    }

    fn commit(mut self) {
        let staged = std::mem::take(&mut self.staged);
        let store = &self.pool.inner.store;
        for write in staged {
            match write {
                Staged::Insert { table, row } => store.tables.entry(table).or_default().push(row),
                Staged::Delete { table, id } => {
                    if let Some(mut rows) = store.tables.get_mut(&table) {
                        rows.retain(|r| r.id != id);
                    }
                }
            }
        }
        self.pool.inner.counters.committed.fetch_add(1, Ordering::SeqCst);
        self.end();
    }

    fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.staged.clear();
        self.pool.inner.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        self.end();
    }

    /// Clear transaction-local state and hand the connection back.
    fn end(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.tx_tenant = None;
            conn.in_transaction = false;
            self.pool.checkin(conn);
        }
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.conn.is_some() {
            self.abort();
        }
    }
}

/// Ordinary backend over a [`MemoryPool`].
#[derive(Clone)]
pub struct MemoryTenantBackend {
    pool: MemoryPool,
}

impl MemoryTenantBackend {
    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }
}

impl TenantBackend for MemoryTenantBackend {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DataError> {
        self.pool.begin().await
    }

    async fn bind_tenant<'a>(&'a self, tx: &'a mut MemoryTx, tenant: TenantId) -> Result<(), DataError> {
        if self.pool.inner.fail_binding.load(Ordering::SeqCst) {
            return Err(DataError::Other("set_config rejected".into()));
        }
        tx.bind(tenant)
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), DataError> {
        if self.pool.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            tx.rollback();
            return Err(DataError::Other("could not serialize access".into()));
        }
        tx.commit();
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), DataError> {
        tx.rollback();
        Ok(())
    }
}

/// Privileged backend over its own [`MemoryPool`].
#[derive(Clone)]
pub struct MemoryElevatedBackend {
    pool: MemoryPool,
}

impl MemoryElevatedBackend {
    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }
}

impl PrivilegedBackend for MemoryElevatedBackend {
    type Tx = MemoryTx;

    async fn begin_privileged(&self) -> Result<MemoryTx, DataError> {
        self.pool.begin().await
    }

    async fn commit(&self, tx: MemoryTx) -> Result<(), DataError> {
        tx.commit();
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<(), DataError> {
        tx.rollback();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn directive_must_come_first() {
        let db = MemoryDatabase::new();
        let backend = db.tenant_backend(1);
        let mut tx = backend.begin().await.unwrap();
        tx.select("projects").unwrap();
        let err = tx.bind(TenantId::random()).unwrap_err();
        assert!(matches!(err, DataError::IsolationSetup(_)));
    }

    #[tokio::test]
    async fn unbound_transaction_sees_nothing() {
        let db = MemoryDatabase::new();
        db.seed("projects", TenantId::random(), json!({"name": "p"}));
        let backend = db.tenant_backend(1);
        let mut tx = backend.begin().await.unwrap();
        assert!(tx.select("projects").unwrap().is_empty());
        assert!(tx.insert_owned("projects", json!({})).is_err());
    }

    #[tokio::test]
    async fn transaction_local_directive_is_cleared_on_release() {
        let db = MemoryDatabase::new();
        let backend = db.tenant_backend(1);
        let mut tx = backend.begin().await.unwrap();
        tx.bind(TenantId::random()).unwrap();
        drop(tx);

        let idle = backend.pool().idle_connections();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].tx_tenant, None);
        assert!(!idle[0].in_transaction);
        assert_eq!(backend.pool().stats().rolled_back, 1);
    }
}

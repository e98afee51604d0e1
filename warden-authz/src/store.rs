//! Read-only access to grant rows.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use warden_core::{Permission, TenantId};
use warden_data::DataError;

use crate::model::{Delegation, DirectGrant, Role, RoleGrant};

/// Queries the permission resolver issues. Implementations return flat rows
/// and leave every time-window decision to the resolver.
pub trait GrantStore: Send + Sync + 'static {
    /// Direct grants of `tenant` for exactly `(resource, action)`.
    fn find_direct_grants(
        &self,
        tenant: TenantId,
        resource: &str,
        action: &str,
    ) -> impl Future<Output = Result<Vec<DirectGrant>, DataError>> + Send;

    fn find_role_grants(
        &self,
        tenant: TenantId,
    ) -> impl Future<Output = Result<Vec<RoleGrant>, DataError>> + Send;

    fn find_role_permissions(
        &self,
        role_id: i64,
    ) -> impl Future<Output = Result<Vec<Permission>, DataError>> + Send;

    /// Delegations whose target is `tenant`.
    fn find_delegations_to(
        &self,
        tenant: TenantId,
    ) -> impl Future<Output = Result<Vec<Delegation>, DataError>> + Send;

    fn find_delegated_permissions(
        &self,
        delegation_id: i64,
    ) -> impl Future<Output = Result<Vec<Permission>, DataError>> + Send;
}

#[cfg(feature = "postgres")]
pub use self::pg::PgGrantStore;

#[cfg(feature = "postgres")]
mod pg {
    use chrono::{DateTime, Utc};
    use sqlx::PgPool;
    use uuid::Uuid;
    use warden_core::{Permission, TenantId};
    use warden_data::{DataError, SqlxErrorExt};

    use super::GrantStore;
    use crate::model::{Delegation, DirectGrant, RoleGrant};

    /// Grant store over the grant tables, read through its own pool.
    ///
    /// Grant tables are not tenant-scoped rows; the pool only needs `SELECT`
    /// on them.
    #[derive(Clone)]
    pub struct PgGrantStore {
        pool: PgPool,
    }

    impl PgGrantStore {
        pub fn new(pool: PgPool) -> Self {
            PgGrantStore { pool }
        }
    }

    fn permissions(rows: Vec<(String, String)>) -> Vec<Permission> {
        rows.into_iter()
            .map(|(resource, action)| Permission::new(resource, action))
            .collect()
    }

    impl GrantStore for PgGrantStore {
        async fn find_direct_grants(
            &self,
            tenant: TenantId,
            resource: &str,
            action: &str,
        ) -> Result<Vec<DirectGrant>, DataError> {
            let rows: Vec<(String, String, Option<DateTime<Utc>>)> = sqlx::query_as(
                "SELECT p.resource, p.action, ap.expires_at \
                 FROM account_permissions ap JOIN permissions p ON p.id = ap.permission_id \
                 WHERE ap.account_id = $1 AND p.resource = $2 AND p.action = $3",
            )
            .bind(tenant.as_uuid())
            .bind(resource)
            .bind(action)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_data_error())?;

            Ok(rows
                .into_iter()
                .map(|(resource, action, expires_at)| DirectGrant {
                    tenant,
                    permission: Permission::new(resource, action),
                    expires_at,
                })
                .collect())
        }

        async fn find_role_grants(&self, tenant: TenantId) -> Result<Vec<RoleGrant>, DataError> {
            type Row = (i64, i64, Option<Uuid>, Option<DateTime<Utc>>, Option<DateTime<Utc>>);
            let rows: Vec<Row> = sqlx::query_as(
                "SELECT id, role_id, related_account_id, valid_from, valid_until \
                 FROM account_role_assignments WHERE account_id = $1",
            )
            .bind(tenant.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_data_error())?;

            Ok(rows
                .into_iter()
                .map(|(id, role_id, related, valid_from, valid_until)| RoleGrant {
                    id,
                    tenant,
                    role_id,
                    related_tenant: related.map(TenantId::from),
                    valid_from,
                    valid_until,
                })
                .collect())
        }

        async fn find_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, DataError> {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT p.resource, p.action \
                 FROM role_permissions rp JOIN permissions p ON p.id = rp.permission_id \
                 WHERE rp.role_id = $1",
            )
            .bind(role_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_data_error())?;
            Ok(permissions(rows))
        }

        async fn find_delegations_to(&self, tenant: TenantId) -> Result<Vec<Delegation>, DataError> {
            let rows: Vec<(i64, Uuid, Option<DateTime<Utc>>)> = sqlx::query_as(
                "SELECT id, from_account_id, valid_until FROM delegations WHERE to_account_id = $1",
            )
            .bind(tenant.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_data_error())?;

            Ok(rows
                .into_iter()
                .map(|(id, from, valid_until)| Delegation {
                    id,
                    from: TenantId::from(from),
                    to: tenant,
                    valid_until,
                })
                .collect())
        }

        async fn find_delegated_permissions(
            &self,
            delegation_id: i64,
        ) -> Result<Vec<Permission>, DataError> {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT p.resource, p.action \
                 FROM delegated_permissions dp JOIN permissions p ON p.id = dp.permission_id \
                 WHERE dp.delegation_id = $1",
            )
            .bind(delegation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.into_data_error())?;
            Ok(permissions(rows))
        }
    }
}

#[derive(Default)]
struct Grants {
    direct: Vec<DirectGrant>,
    roles: HashMap<i64, (Role, Vec<Permission>)>,
    role_grants: Vec<RoleGrant>,
    delegations: Vec<(Delegation, Vec<Permission>)>,
}

/// In-memory grant store with failure injection.
#[derive(Default)]
pub struct MemoryGrantStore {
    grants: RwLock<Grants>,
    next_id: AtomicI64,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Grants> {
        self.grants.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Grants>, DataError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DataError::Other("grant store unreachable".into()));
        }
        Ok(self.grants.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn grant_direct(
        &self,
        tenant: TenantId,
        permission: Permission,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.write().direct.push(DirectGrant {
            tenant,
            permission,
            expires_at,
        });
    }

    /// Register a role with its permissions and return its id.
    pub fn define_role(&self, name: &str, permissions: Vec<Permission>) -> i64 {
        let id = self.next_id();
        let role = Role {
            id,
            name: name.to_string(),
            description: None,
        };
        self.write().roles.insert(id, (role, permissions));
        id
    }

    /// Store a role assignment; its `id` is replaced by a fresh one.
    pub fn assign_role(&self, mut grant: RoleGrant) -> i64 {
        grant.id = self.next_id();
        let id = grant.id;
        self.write().role_grants.push(grant);
        id
    }

    pub fn delegate(
        &self,
        from: TenantId,
        to: TenantId,
        valid_until: Option<DateTime<Utc>>,
        permissions: Vec<Permission>,
    ) -> i64 {
        let id = self.next_id();
        let delegation = Delegation {
            id,
            from,
            to,
            valid_until,
        };
        self.write().delegations.push((delegation, permissions));
        id
    }

    /// Make every query fail until turned off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl GrantStore for MemoryGrantStore {
    async fn find_direct_grants(
        &self,
        tenant: TenantId,
        resource: &str,
        action: &str,
    ) -> Result<Vec<DirectGrant>, DataError> {
        Ok(self
            .read()?
            .direct
            .iter()
            .filter(|g| g.tenant == tenant && g.permission.matches(resource, action))
            .cloned()
            .collect())
    }

    async fn find_role_grants(&self, tenant: TenantId) -> Result<Vec<RoleGrant>, DataError> {
        Ok(self
            .read()?
            .role_grants
            .iter()
            .filter(|g| g.tenant == tenant)
            .cloned()
            .collect())
    }

    async fn find_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, DataError> {
        Ok(self
            .read()?
            .roles
            .get(&role_id)
            .map(|(_, permissions)| permissions.clone())
            .unwrap_or_default())
    }

    async fn find_delegations_to(&self, tenant: TenantId) -> Result<Vec<Delegation>, DataError> {
        Ok(self
            .read()?
            .delegations
            .iter()
            .filter(|(d, _)| d.to == tenant)
            .map(|(d, _)| d.clone())
            .collect())
    }

    async fn find_delegated_permissions(
        &self,
        delegation_id: i64,
    ) -> Result<Vec<Permission>, DataError> {
        Ok(self
            .read()?
            .delegations
            .iter()
            .find(|(d, _)| d.id == delegation_id)
            .map(|(_, permissions)| permissions.clone())
            .unwrap_or_default())
    }
}

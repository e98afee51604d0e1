//! Postgres engine: row-level security keyed on a transaction-local setting.
//!
//! The ordinary pool connects with a least-privilege role that is subject to
//! `FORCE ROW LEVEL SECURITY` policies. The elevated pool uses a separate role
//! and is only reachable through [`ElevatedContextManager`](crate::ElevatedContextManager).

use std::time::Duration;

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use warden_core::TenantId;

use crate::backend::{PrivilegedBackend, TenantBackend};
use crate::error::{DataError, SqlxErrorExt};
use crate::scope::TenantScope;
use crate::settings::{DataSourceSettings, IsolationSettings};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Row-security flags of one table, as reported by `pg_class`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePolicy {
    pub table: String,
    pub row_security: bool,
    pub forced: bool,
}

impl TablePolicy {
    /// Policies apply to the table owner too only when both flags are set.
    pub fn is_enforced(&self) -> bool {
        self.row_security && self.forced
    }
}

/// Ordinary, least-privilege backend.
#[derive(Clone)]
pub struct PgTenantBackend {
    pool: PgPool,
    tenant_setting: String,
    statement_timeout: Option<Duration>,
}

impl PgTenantBackend {
    /// Connect the ordinary pool.
    ///
    /// Connections coming back from a unit of work are checked for a
    /// leftover tenant setting and closed instead of being reused when one is
    /// found. With `verify_least_privilege` set, connecting fails when the
    /// role can bypass row security.
    pub async fn connect(
        source: &DataSourceSettings,
        isolation: &IsolationSettings,
    ) -> Result<Self, DataError> {
        let setting = isolation.tenant_setting.clone();
        let pool = PgPoolOptions::new()
            .max_connections(source.max_connections)
            .acquire_timeout(source.acquire_timeout)
            .after_release(move |conn, _meta| {
                let setting = setting.clone();
                Box::pin(async move { leftover_setting(conn, &setting).await.map(|v| v.is_none()) })
            })
            .connect(&source.url)
            .await
            .map_err(|e| DataError::isolation("connect tenant pool", e))?;

        let backend = PgTenantBackend::from_pool(pool, isolation);
        if isolation.verify_least_privilege {
            backend.verify_least_privilege().await?;
        }
        backend.verify_policy_setting().await?;
        tracing::info!(
            max_connections = source.max_connections,
            setting = %backend.tenant_setting,
            "tenant pool ready"
        );
        Ok(backend)
    }

    pub fn from_pool(pool: PgPool, isolation: &IsolationSettings) -> Self {
        PgTenantBackend {
            pool,
            tenant_setting: isolation.tenant_setting.clone(),
            statement_timeout: isolation.statement_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fail when the connected role is a superuser or holds `BYPASSRLS`.
    pub async fn verify_least_privilege(&self) -> Result<(), DataError> {
        let (role, superuser, bypass): (String, bool, bool) = sqlx::query_as(
            "SELECT rolname::text, rolsuper, rolbypassrls FROM pg_roles WHERE rolname = current_user",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.into_data_error())?;

        if superuser || bypass {
            tracing::error!(role, superuser, bypass, "ordinary credential can bypass row security");
            return Err(DataError::IsolationSetup(format!(
                "role '{role}' can bypass row security (superuser={superuser}, bypassrls={bypass})"
            )));
        }
        Ok(())
    }

    /// Fail when a row policy in the current schema reads a tenant setting
    /// other than the configured one. Such policies would never match a
    /// bound scope.
    pub async fn verify_policy_setting(&self) -> Result<(), DataError> {
        let policies: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT tablename::text, policyname::text, \
                    concat_ws(' ', qual, with_check) \
             FROM pg_policies WHERE schemaname = current_schema()",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_data_error())?;

        let mismatched = policies_missing_setting(&self.tenant_setting, &policies);
        if mismatched.is_empty() {
            return Ok(());
        }
        tracing::error!(
            setting = %self.tenant_setting,
            policies = ?mismatched,
            "row policies read a different tenant setting"
        );
        Err(DataError::IsolationSetup(format!(
            "policies {} do not read tenant setting '{}'",
            mismatched.join(", "),
            self.tenant_setting
        )))
    }

    /// Row-security flags of the given tables.
    pub async fn policy_report(&self, tables: &[&str]) -> Result<Vec<TablePolicy>, DataError> {
        let names: Vec<String> = tables.iter().map(|t| t.to_string()).collect();
        let rows: Vec<(String, bool, bool)> = sqlx::query_as(
            "SELECT relname::text, relrowsecurity, relforcerowsecurity \
             FROM pg_class WHERE relkind = 'r' AND relname = ANY($1) ORDER BY relname",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.into_data_error())?;

        Ok(rows
            .into_iter()
            .map(|(table, row_security, forced)| TablePolicy {
                table,
                row_security,
                forced,
            })
            .collect())
    }

    /// The connection of an open scope, for issuing queries.
    pub fn conn(scope: &mut TenantScope<Self>) -> &mut PgConnection {
        &mut **scope.tx()
    }
}

impl TenantBackend for PgTenantBackend {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, DataError> {
        self.pool.begin().await.map_err(|e| e.into_data_error())
    }

    async fn bind_tenant<'a>(&'a self, tx: &'a mut Self::Tx, tenant: TenantId) -> Result<(), DataError> {
        // `is_local = true`: the value is discarded at COMMIT or ROLLBACK.
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(&self.tenant_setting)
            .bind(tenant.to_string())
            .execute(&mut **tx)
            .await
            .map_err(|e| e.into_data_error())?;

        if let Some(limit) = self.statement_timeout {
            sqlx::query("SELECT set_config('statement_timeout', $1, true)")
                .bind(limit.as_millis().to_string())
                .execute(&mut **tx)
                .await
                .map_err(|e| e.into_data_error())?;
        }
        Ok(())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), DataError> {
        tx.commit().await.map_err(|e| e.into_data_error())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), DataError> {
        tx.rollback().await.map_err(|e| e.into_data_error())
    }
}

/// Privileged backend, connected with the administrative credential.
#[derive(Clone)]
pub struct PgElevatedBackend {
    pool: PgPool,
}

impl PgElevatedBackend {
    pub async fn connect(source: &DataSourceSettings) -> Result<Self, DataError> {
        let pool = PgPoolOptions::new()
            .max_connections(source.max_connections)
            .acquire_timeout(source.acquire_timeout)
            .connect(&source.url)
            .await
            .map_err(|e| DataError::isolation("connect elevated pool", e))?;
        Ok(PgElevatedBackend { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgElevatedBackend { pool }
    }

    /// Apply the bundled migrations (grant, audit and sample tenant tables
    /// with their row policies).
    pub async fn migrate(&self) -> Result<(), DataError> {
        MIGRATOR.run(&self.pool).await.map_err(DataError::database)?;
        tracing::info!("migrations applied");
        Ok(())
    }
}

impl PrivilegedBackend for PgElevatedBackend {
    type Tx = Transaction<'static, Postgres>;

    async fn begin_privileged(&self) -> Result<Self::Tx, DataError> {
        self.pool.begin().await.map_err(|e| e.into_data_error())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), DataError> {
        tx.commit().await.map_err(|e| e.into_data_error())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), DataError> {
        tx.rollback().await.map_err(|e| e.into_data_error())
    }
}

/// Value of `setting` on a connection outside any transaction, if non-empty.
async fn leftover_setting(conn: &mut PgConnection, setting: &str) -> Result<Option<String>, sqlx::Error> {
    let value: Option<String> = sqlx::query_scalar("SELECT current_setting($1, true)")
        .bind(setting)
        .fetch_one(conn)
        .await?;
    let leftover = value.filter(|v| !v.is_empty());
    if let Some(value) = &leftover {
        tracing::warn!(setting, value = %value, "connection carries a session-level tenant setting, closing it");
    }
    Ok(leftover)
}

/// `table.policy` names of policies that call `current_setting` without
/// mentioning `setting`.
fn policies_missing_setting(setting: &str, policies: &[(String, String, String)]) -> Vec<String> {
    let quoted = format!("'{setting}'");
    policies
        .iter()
        .filter(|(_, _, expr)| expr.contains("current_setting(") && !expr.contains(&quoted))
        .map(|(table, policy, _)| format!("{table}.{policy}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(table: &str, name: &str, expr: &str) -> (String, String, String) {
        (table.into(), name.into(), expr.into())
    }

    #[test]
    fn policies_must_read_the_configured_setting() {
        let expr = "(tenant_id = (NULLIF(current_setting('app.current_tenant'::text, true), ''::text))::uuid)";
        let policies = vec![
            policy("projects", "projects_tenant", expr),
            policy("audit_log", "audit_insert", "true"),
        ];

        assert!(policies_missing_setting("app.current_tenant", &policies).is_empty());
        assert_eq!(
            policies_missing_setting("app.tenant", &policies),
            vec!["projects.projects_tenant".to_string()]
        );
    }

    #[test]
    fn setting_name_must_match_exactly() {
        let policies = vec![policy(
            "tasks",
            "tasks_tenant",
            "(tenant_id = (current_setting('app.current_tenant_id'::text, true))::uuid)",
        )];
        assert_eq!(policies_missing_setting("app.current_tenant", &policies).len(), 1);
    }
}

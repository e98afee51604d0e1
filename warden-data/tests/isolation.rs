use std::collections::HashSet;
use std::time::Duration;

use serde_json::json;
use warden_core::{TenantId, WardenError};
use warden_data::memory::{MemoryDatabase, MemoryTenantBackend};
use warden_data::{DataError, ElevatedContextManager, TenantContextManager};

fn seeded(tenants: &[TenantId], per_tenant: usize) -> MemoryDatabase {
    let db = MemoryDatabase::new();
    for tenant in tenants {
        for i in 0..per_tenant {
            db.seed("projects", *tenant, json!({ "name": format!("p{i}") }));
        }
    }
    db
}

fn manager(db: &MemoryDatabase, pool: usize) -> TenantContextManager<MemoryTenantBackend> {
    TenantContextManager::new(db.tenant_backend(pool))
}

#[tokio::test]
async fn scope_only_sees_its_own_tenant() {
    let (a, b) = (TenantId::random(), TenantId::random());
    let db = seeded(&[a, b], 3);
    let manager = manager(&db, 1);

    let rows = manager
        .run_in_tenant_scope(a, |scope| {
            Box::pin(async move { scope.tx().select("projects") })
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r.tenant_id == a));
}

#[tokio::test]
async fn same_connection_previously_serving_another_tenant_stays_isolated() {
    let (a, b) = (TenantId::random(), TenantId::random());
    let db = seeded(&[a, b], 2);
    let manager = manager(&db, 1);

    let first = manager
        .run_in_tenant_scope(b, |scope| {
            Box::pin(async move { Ok::<_, DataError>(scope.tx().connection_id()) })
        })
        .await
        .unwrap();
    let (second, rows) = manager
        .run_in_tenant_scope(a, |scope| {
            Box::pin(async move {
                let rows = scope.tx().select("projects")?;
                Ok::<_, DataError>((scope.tx().connection_id(), rows))
            })
        })
        .await
        .unwrap();

    assert_eq!(first, second, "pool of one must reuse the connection");
    assert!(rows.iter().all(|r| r.tenant_id == a));
    assert_eq!(manager.backend().pool().stats().reused_across_tenants, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_leakage_across_interleaved_scopes() {
    const POOL: usize = 8;
    const UNITS: usize = 1000;

    let tenants: Vec<TenantId> = (0..10).map(|_| TenantId::random()).collect();
    let db = seeded(&tenants, 5);
    let manager = manager(&db, POOL);

    let mut handles = Vec::with_capacity(UNITS);
    for i in 0..UNITS {
        let manager = manager.clone();
        let tenant = tenants[i % tenants.len()];
        handles.push(tokio::spawn(async move {
            manager
                .run_in_tenant_scope(tenant, move |scope| {
                    Box::pin(async move {
                        tokio::task::yield_now().await;
                        let before = scope.tx().select("projects")?;
                        let id = scope
                            .tx()
                            .insert_owned("projects", json!({ "name": format!("unit-{i}") }))?;
                        tokio::task::yield_now().await;
                        let after = scope.tx().select("projects")?;
                        Ok::<_, DataError>((tenant, id, before, after))
                    })
                })
                .await
        }));
    }

    for handle in handles {
        let (tenant, id, before, after) = handle.await.unwrap().unwrap();
        assert!(before.iter().all(|r| r.tenant_id == tenant), "cross-tenant row observed");
        assert!(after.iter().all(|r| r.tenant_id == tenant), "cross-tenant row observed");
        // Same-tenant units may commit in between, so only a lower bound holds.
        assert!(after.iter().any(|r| r.id == id), "own insert not visible");
        assert!(after.len() >= before.len() + 1);
    }

    let pool = manager.backend().pool();
    let stats = pool.stats();
    assert_eq!(stats.begun, UNITS);
    assert_eq!(stats.committed, UNITS);
    assert!(stats.opened <= POOL);
    assert!(stats.reused_across_tenants > 0);
    for conn in pool.idle_connections() {
        assert!(!conn.in_transaction);
        assert_eq!(conn.tx_tenant, None);
        assert_eq!(conn.session_tenant, None);
    }

    let ids: HashSet<u64> = db.rows("projects").iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), 10 * 5 + UNITS);
}

#[tokio::test]
async fn session_level_setting_does_not_override_the_scope() {
    let (a, b, c) = (TenantId::random(), TenantId::random(), TenantId::random());
    let db = seeded(&[a, b, c], 1);
    let manager = manager(&db, 1);
    manager.backend().pool().set_discard_tainted(false);

    let rows = manager
        .run_in_tenant_scope(a, move |scope| {
            Box::pin(async move {
                scope.tx().set_session_tenant(b)?;
                scope.tx().select("projects")
            })
        })
        .await
        .unwrap();
    assert!(rows.iter().all(|r| r.tenant_id == a));

    // The poisoned connection goes back into the pool and serves tenant C.
    let rows = manager
        .run_in_tenant_scope(c, |scope| {
            Box::pin(async move { scope.tx().select("projects") })
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows.iter().all(|r| r.tenant_id == c));
}

#[tokio::test]
async fn tainted_connections_are_closed_on_release() {
    let (a, b) = (TenantId::random(), TenantId::random());
    let db = seeded(&[a, b], 1);
    let manager = manager(&db, 2);

    manager
        .run_in_tenant_scope(a, move |scope| {
            Box::pin(async move { scope.tx().set_session_tenant(b) })
        })
        .await
        .unwrap();

    let pool = manager.backend().pool();
    assert_eq!(pool.stats().discarded, 1);
    assert!(pool.idle_connections().is_empty());
}

#[tokio::test]
async fn error_rolls_back_staged_writes() {
    let a = TenantId::random();
    let db = seeded(&[a], 1);
    let manager = manager(&db, 1);

    let result: Result<(), WardenError> = manager
        .run_in_tenant_scope(a, |scope| {
            Box::pin(async move {
                scope.tx().insert_owned("projects", json!({ "name": "half-done" }))?;
                Err::<(), _>(WardenError::Handler("validation failed".into()))
            })
        })
        .await;
    assert!(matches!(result, Err(WardenError::Handler(_))));

    assert_eq!(db.rows("projects").len(), 1);
    let stats = manager.backend().pool().stats();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(stats.committed, 0);
}

#[tokio::test]
async fn cross_tenant_insert_is_rejected_by_policy() {
    let (a, b) = (TenantId::random(), TenantId::random());
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1);

    let err = manager
        .run_in_tenant_scope(a, move |scope| {
            Box::pin(async move { scope.tx().insert("projects", b, json!({})) })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DataError::PolicyViolation(_)));
    assert!(db.rows("projects").is_empty());
}

#[tokio::test]
async fn timeout_rolls_back() {
    let a = TenantId::random();
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1).with_unit_timeout(Duration::from_millis(20));

    let err = manager
        .run_in_tenant_scope(a, |scope| {
            Box::pin(async move {
                scope.tx().insert_owned("projects", json!({}))?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DataError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DataError::Timeout(_)));
    assert!(db.rows("projects").is_empty());
    assert_eq!(manager.backend().pool().idle_connections().len(), 1);
}

#[tokio::test]
async fn cancelled_unit_of_work_rolls_back_and_frees_the_connection() {
    let a = TenantId::random();
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1);

    let unit = manager.run_in_tenant_scope(a, |scope| {
        Box::pin(async move {
            scope.tx().insert_owned("projects", json!({}))?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DataError>(())
        })
    });
    // Dropping the future mid-flight is what a client disconnect looks like.
    let _ = tokio::time::timeout(Duration::from_millis(20), unit).await;

    assert!(db.rows("projects").is_empty());
    let pool = manager.backend().pool();
    assert_eq!(pool.stats().rolled_back, 1);
    let idle = pool.idle_connections();
    assert_eq!(idle.len(), 1);
    assert!(!idle[0].in_transaction);

    // The single permit is free again.
    manager
        .run_in_tenant_scope(a, |scope| Box::pin(async move { scope.tx().select("projects") }))
        .await
        .unwrap();
}

#[tokio::test]
async fn begin_failure_fails_fast() {
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1);
    manager.backend().pool().fail_next_begins(1);

    let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = ran.clone();
    let err: WardenError = manager
        .run_in_tenant_scope(TenantId::random(), move |scope| {
            Box::pin(async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                scope.tx().select("projects")?;
                Ok::<_, WardenError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WardenError::IsolationSetupFailed(_)));
    assert!(err.is_caller_visible());
    assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn directive_failure_rolls_back_without_running() {
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1);
    manager.backend().pool().fail_binding(true);

    let err = manager
        .run_in_tenant_scope(TenantId::random(), |scope| {
            Box::pin(async move { scope.tx().select("projects") })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DataError::IsolationSetup(_)));
    let stats = manager.backend().pool().stats();
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(manager.backend().pool().idle_connections().len(), 1);
}

#[tokio::test]
async fn commit_failure_is_reported_and_nothing_is_written() {
    let a = TenantId::random();
    let db = MemoryDatabase::new();
    let manager = manager(&db, 1);
    manager.backend().pool().fail_next_commit();

    let err = manager
        .run_in_tenant_scope(a, |scope| {
            Box::pin(async move { scope.tx().insert_owned("projects", json!({})) })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DataError::Other(_)));
    assert!(db.rows("projects").is_empty());
}

#[tokio::test]
async fn elevated_scope_sees_every_tenant_on_its_own_pool() {
    let (a, b) = (TenantId::random(), TenantId::random());
    let db = seeded(&[a, b], 2);
    let ordinary = manager(&db, 1);
    let elevated = ElevatedContextManager::new(db.elevated_backend(1));

    let c = TenantId::random();
    let all = elevated
        .run_with_elevated_scope("provision tenant", move |scope| {
            Box::pin(async move {
                scope.tx().insert("projects", c, json!({ "name": "welcome" }))?;
                scope.tx().select("projects")
            })
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 5);

    let visible = ordinary
        .run_in_tenant_scope(c, |scope| Box::pin(async move { scope.tx().select("projects") }))
        .await
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(ordinary.backend().pool().stats().begun, 1);
    assert_eq!(elevated.backend().pool().stats().begun, 1);
}

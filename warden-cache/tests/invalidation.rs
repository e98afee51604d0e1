use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use warden_cache::{
    CacheKey, CacheStore, DependencyMap, InMemoryStore, InvalidationCoordinator, TenantCache,
};
use warden_core::{OperationKind, TenantId, WardenError};

const TTL: Duration = Duration::from_secs(60);

async fn put(store: &InMemoryStore, key: &CacheKey) {
    store.set(key.as_str(), Bytes::from_static(b"[]"), TTL).await.unwrap();
}

fn coordinator(store: &InMemoryStore) -> InvalidationCoordinator {
    InvalidationCoordinator::new(
        Arc::new(store.clone()),
        DependencyMap::new().with("projects", ["tasks"]),
    )
}

#[tokio::test]
async fn in_memory_store_expires_and_removes_by_prefix() {
    let store = InMemoryStore::new();
    store.set("users:1", Bytes::from("a"), TTL).await.unwrap();
    store.set("users:2", Bytes::from("b"), TTL).await.unwrap();
    store.set("groups:1", Bytes::from("c"), TTL).await.unwrap();
    store
        .set("short", Bytes::from("d"), Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(store.remove_by_prefix("users:").await.unwrap(), 2);
    assert_eq!(store.get("users:1").await.unwrap(), None);
    assert_eq!(store.get("groups:1").await.unwrap(), Some(Bytes::from("c")));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get("short").await.unwrap(), None);
}

#[tokio::test]
async fn project_mutation_clears_lists_detail_and_dependent_tasks_for_that_tenant_only() {
    let store = InMemoryStore::new();
    let (a, b) = (TenantId::random(), TenantId::random());

    let a_projects = CacheKey::list(a, "projects", "all");
    let a_projects_page2 = CacheKey::list(a, "projects", "page=2");
    let a_project_42 = CacheKey::detail(a, "projects", "42");
    let a_project_7 = CacheKey::detail(a, "projects", "7");
    let a_tasks = CacheKey::list(a, "tasks", "all");
    let a_task_1 = CacheKey::detail(a, "tasks", "1");
    let a_clients = CacheKey::list(a, "clients", "all");
    let b_projects = CacheKey::list(b, "projects", "all");
    let b_project_42 = CacheKey::detail(b, "projects", "42");
    let b_tasks = CacheKey::list(b, "tasks", "all");
    for key in [
        &a_projects,
        &a_projects_page2,
        &a_project_42,
        &a_project_7,
        &a_tasks,
        &a_task_1,
        &a_clients,
        &b_projects,
        &b_project_42,
        &b_tasks,
    ] {
        put(&store, key).await;
    }

    coordinator(&store)
        .on_mutation(a, "projects", OperationKind::Update, Some("42"))
        .await
        .unwrap();

    for gone in [&a_projects, &a_projects_page2, &a_project_42, &a_tasks, &a_task_1] {
        assert!(!store.contains(gone.as_str()), "{gone} should be invalidated");
    }
    for kept in [&a_project_7, &a_clients, &b_projects, &b_project_42, &b_tasks] {
        assert!(store.contains(kept.as_str()), "{kept} should survive");
    }
}

#[tokio::test]
async fn create_keeps_detail_entries_and_read_touches_nothing() {
    let store = InMemoryStore::new();
    let a = TenantId::random();
    let list = CacheKey::list(a, "projects", "all");
    let detail = CacheKey::detail(a, "projects", "1");
    put(&store, &list).await;
    put(&store, &detail).await;

    let coordinator = coordinator(&store);
    coordinator
        .on_mutation(a, "projects", OperationKind::Read, Some("1"))
        .await
        .unwrap();
    assert_eq!(store.keys().len(), 2);

    coordinator
        .on_mutation(a, "projects", OperationKind::Create, None)
        .await
        .unwrap();
    assert!(!store.contains(list.as_str()));
    assert!(store.contains(detail.as_str()));
}

#[tokio::test]
async fn store_outage_is_reported_not_raised() {
    let store = InMemoryStore::new();
    store.set_unavailable(true);

    let err = coordinator(&store)
        .on_mutation(TenantId::random(), "projects", OperationKind::Delete, Some("1"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::InvalidationFailed(_)));
    assert!(!err.is_caller_visible());
}

#[tokio::test]
async fn get_or_load_reads_through_and_serves_hits() {
    let store = InMemoryStore::new();
    let cache = TenantCache::new(Arc::new(store.clone()), TTL);
    let key = CacheKey::list(TenantId::random(), "projects", "all");
    let loads = AtomicUsize::new(0);

    for _ in 0..3 {
        let names: Vec<String> = cache
            .get_or_load(&key, None, || async {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WardenError>(vec!["alpha".to_string(), "beta".to_string()])
            })
            .await
            .unwrap();
        assert_eq!(names, ["alpha", "beta"]);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(store.contains(key.as_str()));
}

#[tokio::test]
async fn get_or_load_falls_back_to_loader_when_store_is_down() {
    let store = InMemoryStore::new();
    store.set_unavailable(true);
    let cache = TenantCache::new(Arc::new(store.clone()), TTL);
    let key = CacheKey::detail(TenantId::random(), "projects", "9");

    let value: u32 = cache
        .get_or_load(&key, None, || async { Ok::<_, WardenError>(9) })
        .await
        .unwrap();
    assert_eq!(value, 9);
}

#[tokio::test]
async fn loader_errors_are_not_cached() {
    let store = InMemoryStore::new();
    let cache = TenantCache::new(Arc::new(store.clone()), TTL);
    let key = CacheKey::detail(TenantId::random(), "projects", "404");

    let result: Result<u32, WardenError> = cache
        .get_or_load(&key, None, || async { Err(WardenError::NotFound("project 404".into())) })
        .await;
    assert!(result.is_err());
    assert!(store.keys().is_empty());
}

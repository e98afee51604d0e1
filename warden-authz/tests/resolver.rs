use chrono::{Duration, Utc};
use warden_authz::{GrantSource, MemoryGrantStore, PermissionQuery, PermissionResolver, RoleGrant};
use warden_core::{Permission, TenantId, WardenError};

fn resolver() -> PermissionResolver<MemoryGrantStore> {
    PermissionResolver::new(MemoryGrantStore::new())
}

#[tokio::test]
async fn no_grants_denies() {
    let resolver = resolver();
    assert!(!resolver.has_permission_now(TenantId::random(), "client", "read").await);
}

#[tokio::test]
async fn direct_grant_expiry_boundary() {
    let resolver = resolver();
    let a = TenantId::random();
    let t = Utc::now() + Duration::hours(1);
    resolver
        .store()
        .grant_direct(a, Permission::new("client", "delete"), Some(t));

    assert!(resolver.has_permission(a, "client", "delete", t - Duration::seconds(1)).await);
    assert!(resolver.has_permission(a, "client", "delete", t).await);
    assert!(!resolver.has_permission(a, "client", "delete", t + Duration::seconds(1)).await);
    // Different action on the same resource is not covered.
    assert!(!resolver.has_permission(a, "client", "update", t - Duration::seconds(1)).await);
}

#[tokio::test]
async fn delegation_alone_grants_until_it_lapses() {
    let resolver = resolver();
    let (a, b) = (TenantId::random(), TenantId::random());
    let t = Utc::now() + Duration::days(1);
    let id = resolver
        .store()
        .delegate(a, b, Some(t), vec![Permission::new("project", "read")]);

    let before = PermissionQuery::new(b, "project", "read").at(t - Duration::seconds(1));
    assert_eq!(
        resolver.require(&before).await.unwrap(),
        GrantSource::Delegation { id, from: a }
    );

    assert!(!resolver.has_permission(b, "project", "read", t + Duration::seconds(1)).await);
    // Delegations are directional.
    assert!(!resolver.has_permission(a, "project", "read", t - Duration::seconds(1)).await);
    // Only the delegated subset is usable.
    assert!(!resolver.has_permission(b, "project", "delete", t - Duration::seconds(1)).await);
}

#[tokio::test]
async fn role_grant_respects_its_window() {
    let resolver = resolver();
    let a = TenantId::random();
    let now = Utc::now();
    let role = resolver.store().define_role(
        "editor",
        vec![Permission::new("project", "update"), Permission::new("task", "update")],
    );
    let assignment = resolver.store().assign_role(
        RoleGrant::new(a, role)
            .valid_from(now)
            .valid_until(now + Duration::days(30)),
    );

    let decision = resolver
        .resolve(&PermissionQuery::new(a, "task", "update").at(now + Duration::days(1)))
        .await;
    assert!(decision.allowed);
    assert_eq!(decision.source, Some(GrantSource::Role { assignment, role }));

    assert!(!resolver.has_permission(a, "task", "update", now - Duration::seconds(1)).await);
    assert!(!resolver.has_permission(a, "task", "update", now + Duration::days(31)).await);
}

#[tokio::test]
async fn role_scoped_to_related_tenant() {
    let resolver = resolver();
    let (a, partner, other) = (TenantId::random(), TenantId::random(), TenantId::random());
    let role = resolver
        .store()
        .define_role("partner-viewer", vec![Permission::new("invoice", "read")]);
    resolver
        .store()
        .assign_role(RoleGrant::new(a, role).related_to(partner));

    let query = PermissionQuery::new(a, "invoice", "read");
    assert!(resolver.resolve(&query).await.allowed);
    assert!(resolver.resolve(&query.clone().related_to(partner)).await.allowed);
    assert!(!resolver.resolve(&query.related_to(other)).await.allowed);
}

#[tokio::test]
async fn union_of_sources_short_circuits_on_direct() {
    let resolver = resolver();
    let (a, b) = (TenantId::random(), TenantId::random());
    let role = resolver
        .store()
        .define_role("admin", vec![Permission::new("client", "delete")]);
    resolver.store().assign_role(RoleGrant::new(a, role));
    resolver
        .store()
        .delegate(b, a, None, vec![Permission::new("client", "delete")]);
    resolver
        .store()
        .grant_direct(a, Permission::new("client", "delete"), None);

    let decision = resolver
        .resolve(&PermissionQuery::new(a, "client", "delete"))
        .await;
    assert_eq!(decision.source, Some(GrantSource::Direct));
    assert_eq!(resolver.store().query_count(), 1);
}

#[tokio::test]
async fn expired_direct_grant_falls_through_to_role() {
    let resolver = resolver();
    let a = TenantId::random();
    let now = Utc::now();
    resolver.store().grant_direct(
        a,
        Permission::new("client", "read"),
        Some(now - Duration::minutes(5)),
    );
    let role = resolver
        .store()
        .define_role("reader", vec![Permission::new("client", "read")]);
    resolver.store().assign_role(RoleGrant::new(a, role));

    let decision = resolver
        .resolve(&PermissionQuery::new(a, "client", "read").at(now))
        .await;
    assert!(matches!(decision.source, Some(GrantSource::Role { .. })));
}

#[tokio::test]
async fn store_failure_fails_closed() {
    let resolver = resolver();
    let a = TenantId::random();
    resolver
        .store()
        .grant_direct(a, Permission::new("client", "read"), None);
    resolver.store().set_unavailable(true);

    assert!(!resolver.has_permission_now(a, "client", "read").await);
    let err = resolver
        .require(&PermissionQuery::new(a, "client", "read"))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::PermissionDenied { .. }));

    resolver.store().set_unavailable(false);
    assert!(resolver.has_permission_now(a, "client", "read").await);
}

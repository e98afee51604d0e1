//! Postgres wiring: both credential sets, the grant read pool, the audit
//! table and the standard hooks.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use warden_audit::{AuditRecorder, PgAuditSink};
use warden_authz::{PermissionResolver, PgGrantStore};
use warden_cache::{CacheStore, InvalidationCoordinator};
use warden_core::{WardenConfig, WardenError};
use warden_data::postgres::{PgElevatedBackend, PgTenantBackend};
use warden_data::{DataSources, ElevatedContextManager, TenantContextManager};
use warden_events::{EventPublisher, MessageTransport};

use crate::hooks::{AuditHook, EventHook, InvalidationHook};
use crate::orchestrator::Warden;
use crate::settings::WardenSettings;

pub type PgWarden = Warden<PgTenantBackend, PgGrantStore>;

/// Everything an application needs to run tenant traffic and the explicit
/// administrative path.
pub struct PgStack {
    pub warden: PgWarden,
    pub elevated: ElevatedContextManager<PgElevatedBackend>,
}

/// Connect both pools, apply migrations with the elevated credential and
/// register the audit, invalidation and event hooks.
pub async fn connect<T: MessageTransport>(
    config: &WardenConfig,
    settings: &WardenSettings,
    cache: Arc<dyn CacheStore>,
    transport: Arc<T>,
) -> Result<PgStack, WardenError> {
    let sources: DataSources = config.typed()?;

    let elevated = PgElevatedBackend::connect(&sources.elevated).await?;
    elevated.migrate().await?;

    let tenant = PgTenantBackend::connect(&sources.tenant, &settings.isolation).await?;
    let mut contexts = TenantContextManager::new(tenant);
    if let Some(limit) = settings.isolation.unit_timeout {
        contexts = contexts.with_unit_timeout(limit);
    }

    let grant_pool = PgPoolOptions::new()
        .max_connections(sources.tenant.max_connections)
        .acquire_timeout(sources.tenant.acquire_timeout)
        .connect(&sources.tenant.url)
        .await
        .map_err(|e| WardenError::GrantStoreUnavailable(e.to_string()))?;
    let resolver = PermissionResolver::new(PgGrantStore::new(grant_pool));

    let mut recorder = AuditRecorder::new(PgAuditSink::new(contexts.clone()));
    if let Some(limit) = settings.audit.write_timeout {
        recorder = recorder.with_write_timeout(limit);
    }
    let coordinator = InvalidationCoordinator::new(cache, settings.cache.dependents.clone());
    let publisher = EventPublisher::new(transport, settings.events.topic.clone());

    let warden = Warden::new(contexts, resolver)
        .with_hook(AuditHook::new(recorder))
        .with_hook(InvalidationHook::new(coordinator))
        .with_hook(EventHook::new(publisher))
        .with_dispatch(settings.audit.dispatch)
        .with_hook_timeout(settings.audit.hook_timeout);

    tracing::info!(dispatch = ?settings.audit.dispatch, "postgres stack ready");
    Ok(PgStack {
        warden,
        elevated: ElevatedContextManager::new(elevated),
    })
}

use warden_audit::AuditSettings;
use warden_cache::CacheSettings;
use warden_core::{init_tracing, ConfigError, FromConfig, WardenConfig, WardenError};
use warden_data::IsolationSettings;
use warden_events::EventSettings;

/// Every `warden.*` section except the datasources, which only the Postgres
/// wiring needs.
#[derive(Clone, Debug)]
pub struct WardenSettings {
    pub isolation: IsolationSettings,
    pub cache: CacheSettings,
    pub audit: AuditSettings,
    pub events: EventSettings,
}

impl FromConfig for WardenSettings {
    const PREFIX: &'static str = "warden";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        Ok(WardenSettings {
            isolation: config.typed()?,
            cache: config.typed()?,
            audit: config.typed()?,
            events: config.typed()?,
        })
    }
}

/// Load configuration for `profile`, install tracing and parse the settings.
pub fn bootstrap(profile: &str) -> Result<(WardenConfig, WardenSettings), WardenError> {
    let config = WardenConfig::load(profile)?;
    init_tracing(&config);
    let settings: WardenSettings = config.typed()?;
    tracing::info!(
        profile = config.profile(),
        tenant_setting = %settings.isolation.tenant_setting,
        dispatch = ?settings.audit.dispatch,
        topic = %settings.events.topic,
        "warden configured"
    );
    Ok((config, settings))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use warden_audit::Dispatch;

    use super::*;

    #[test]
    fn reads_every_section() {
        let yaml = r#"
warden:
  isolation:
    tenant_setting: app.tenant
    unit_timeout_ms: 1500
  cache:
    default_ttl_secs: 30
    dependents:
      projects: [tasks]
  audit:
    dispatch: detached
  events:
    topic: tenancy.mutations
    max_redeliveries: 2
"#;
        let config = WardenConfig::from_yaml_str(yaml, "test").unwrap();
        let settings: WardenSettings = config.typed().unwrap();
        assert_eq!(settings.isolation.tenant_setting, "app.tenant");
        assert_eq!(settings.isolation.unit_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(settings.cache.default_ttl, Duration::from_secs(30));
        assert_eq!(settings.cache.dependents.direct("projects"), ["tasks"]);
        assert_eq!(settings.audit.dispatch, Dispatch::Detached);
        assert_eq!(settings.events.topic, "tenancy.mutations");
        assert_eq!(settings.events.max_redeliveries, 2);
    }

    #[test]
    fn bad_section_fails_the_whole_load() {
        let config = WardenConfig::from_yaml_str("warden:\n  audit:\n    dispatch: sometimes\n", "test").unwrap();
        assert!(matches!(
            config.typed::<WardenSettings>(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}

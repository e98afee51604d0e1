use std::time::Duration;

use warden_core::{ConfigError, FromConfig, WardenConfig};

/// Connection settings of one credential set.
#[derive(Clone, Debug)]
pub struct DataSourceSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DataSourceSettings {
    /// Read `{prefix}.url`, `{prefix}.max_connections` and
    /// `{prefix}.acquire_timeout_ms`.
    pub fn from_section(config: &WardenConfig, prefix: &str) -> Result<Self, ConfigError> {
        Ok(DataSourceSettings {
            url: config.get(&format!("{prefix}.url"))?,
            max_connections: config.get_or(&format!("{prefix}.max_connections"), 10)?,
            acquire_timeout: Duration::from_millis(
                config.get_or(&format!("{prefix}.acquire_timeout_ms"), 5_000u64)?,
            ),
        })
    }
}

/// The two credential sets: `tenant` for ordinary traffic, `elevated` for
/// administrative paths.
#[derive(Clone, Debug)]
pub struct DataSources {
    pub tenant: DataSourceSettings,
    pub elevated: DataSourceSettings,
}

impl FromConfig for DataSources {
    const PREFIX: &'static str = "warden.datasource";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let tenant = DataSourceSettings::from_section(config, &format!("{}.tenant", Self::PREFIX))?;
        let elevated =
            DataSourceSettings::from_section(config, &format!("{}.elevated", Self::PREFIX))?;
        if tenant.url == elevated.url {
            return Err(ConfigError::Invalid {
                key: format!("{}.elevated.url", Self::PREFIX),
                reason: "the elevated datasource must use separate credentials".into(),
            });
        }
        Ok(DataSources { tenant, elevated })
    }
}

/// How the tenant directive is applied.
#[derive(Clone, Debug)]
pub struct IsolationSettings {
    /// Name of the transaction-local setting read by the row policies. The
    /// bundled migration uses `app.current_tenant`; the Postgres backend
    /// refuses to connect when existing policies read another name.
    pub tenant_setting: String,
    pub statement_timeout: Option<Duration>,
    pub unit_timeout: Option<Duration>,
    /// Refuse to start when the ordinary credential can bypass row security.
    pub verify_least_privilege: bool,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        IsolationSettings {
            tenant_setting: "app.current_tenant".into(),
            statement_timeout: None,
            unit_timeout: None,
            verify_least_privilege: true,
        }
    }
}

impl FromConfig for IsolationSettings {
    const PREFIX: &'static str = "warden.isolation";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let defaults = IsolationSettings::default();
        let key = |name: &str| format!("{}.{name}", Self::PREFIX);

        let tenant_setting: String = config.get_or(&key("tenant_setting"), defaults.tenant_setting)?;
        // Custom settings must be `namespace.name`.
        let valid = tenant_setting.split_once('.').is_some_and(|(ns, name)| {
            !ns.is_empty()
                && !name.is_empty()
                && tenant_setting
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        });
        if !valid {
            return Err(ConfigError::Invalid {
                key: key("tenant_setting"),
                reason: format!("'{tenant_setting}' is not a custom setting name"),
            });
        }

        let millis = |name: &str| -> Result<Option<Duration>, ConfigError> {
            let value: Option<u64> = config.get_or(&key(name), None)?;
            Ok(value.filter(|ms| *ms > 0).map(Duration::from_millis))
        };

        Ok(IsolationSettings {
            tenant_setting,
            statement_timeout: millis("statement_timeout_ms")?,
            unit_timeout: millis("unit_timeout_ms")?,
            verify_least_privilege: config
                .get_or(&key("verify_least_privilege"), defaults.verify_least_privilege)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_POOLS: &str = r#"
warden:
  datasource:
    tenant:
      url: "postgres://app_user@db/app"
      max_connections: 16
    elevated:
      url: "postgres://app_admin@db/app"
      max_connections: 2
      acquire_timeout_ms: 250
"#;

    #[test]
    fn reads_both_credential_sets() {
        let config = WardenConfig::from_yaml_str(TWO_POOLS, "test").unwrap();
        let sources: DataSources = config.typed().unwrap();
        assert_eq!(sources.tenant.max_connections, 16);
        assert_eq!(sources.tenant.acquire_timeout, Duration::from_secs(5));
        assert_eq!(sources.elevated.acquire_timeout, Duration::from_millis(250));
    }

    #[test]
    fn shared_credentials_are_rejected() {
        let yaml = TWO_POOLS.replace("app_admin", "app_user");
        let config = WardenConfig::from_yaml_str(&yaml, "test").unwrap();
        let err = config.typed::<DataSources>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn isolation_defaults() {
        let settings: IsolationSettings = WardenConfig::empty().typed().unwrap();
        assert_eq!(settings.tenant_setting, "app.current_tenant");
        assert!(settings.statement_timeout.is_none());
        assert!(settings.verify_least_privilege);
    }

    #[test]
    fn isolation_rejects_bare_setting_names() {
        let config = WardenConfig::from_yaml_str(
            "warden:\n  isolation:\n    tenant_setting: \"tenant\"\n",
            "test",
        )
        .unwrap();
        assert!(config.typed::<IsolationSettings>().is_err());
    }
}

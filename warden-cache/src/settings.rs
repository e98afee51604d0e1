use std::collections::HashMap;
use std::time::Duration;

use warden_core::{ConfigError, FromConfig, WardenConfig};

use crate::dependents::DependencyMap;

/// `warden.cache.*`: default TTL and the dependent-resource table.
///
/// ```yaml
/// warden:
///   cache:
///     default_ttl_secs: 300
///     dependents:
///       projects: [tasks]
///       clients: [projects, invoices]
/// ```
#[derive(Clone, Debug)]
pub struct CacheSettings {
    pub default_ttl: Duration,
    pub dependents: DependencyMap,
}

impl FromConfig for CacheSettings {
    const PREFIX: &'static str = "warden.cache";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let ttl_key = format!("{}.default_ttl_secs", Self::PREFIX);
        let ttl: u64 = config.get_or(&ttl_key, 300)?;
        if ttl == 0 {
            return Err(ConfigError::Invalid {
                key: ttl_key,
                reason: "must be positive".into(),
            });
        }
        let dependents: HashMap<String, Vec<String>> =
            config.section(&format!("{}.dependents", Self::PREFIX))?;

        Ok(CacheSettings {
            default_ttl: Duration::from_secs(ttl),
            dependents: dependents.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_dependents_table() {
        let config = WardenConfig::from_yaml_str(
            "warden:\n  cache:\n    default_ttl_secs: 60\n    dependents:\n      projects: [tasks]\n      clients: [projects, invoices]\n",
            "test",
        )
        .unwrap();
        let settings: CacheSettings = config.typed().unwrap();
        assert_eq!(settings.default_ttl, Duration::from_secs(60));
        assert_eq!(settings.dependents.direct("projects"), ["tasks"]);
        assert_eq!(
            settings.dependents.dependents_of("clients"),
            vec!["projects", "invoices", "tasks"]
        );
    }

    #[test]
    fn defaults_without_section() {
        let settings: CacheSettings = WardenConfig::empty().typed().unwrap();
        assert_eq!(settings.default_ttl, Duration::from_secs(300));
        assert!(settings.dependents.is_empty());
    }
}

use std::time::Duration;

use warden_core::{ConfigError, FromConfig, WardenConfig};

/// Where post-commit work runs relative to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// Awaited before the unit of work returns.
    #[default]
    Inline,
    /// Spawned on the runtime; the unit of work returns immediately.
    Detached,
}

impl std::str::FromStr for Dispatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inline" => Ok(Dispatch::Inline),
            "detached" => Ok(Dispatch::Detached),
            other => Err(format!("unknown dispatch mode '{other}', expected inline or detached")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditSettings {
    pub write_timeout: Option<Duration>,
    pub dispatch: Dispatch,
    /// Bound on each post-commit hook, audit included.
    pub hook_timeout: Option<Duration>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            write_timeout: Some(Duration::from_secs(2)),
            dispatch: Dispatch::Inline,
            hook_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl FromConfig for AuditSettings {
    const PREFIX: &'static str = "warden.audit";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let timeout_key = format!("{}.write_timeout_ms", Self::PREFIX);
        let dispatch_key = format!("{}.dispatch", Self::PREFIX);
        let hook_timeout_key = format!("{}.hook_timeout_ms", Self::PREFIX);

        let timeout_ms: u64 = config.get_or(&timeout_key, 2_000)?;
        let hook_timeout_ms: u64 = config.get_or(&hook_timeout_key, 5_000)?;
        let dispatch: String = config.get_or(&dispatch_key, "inline".to_string())?;
        let dispatch = dispatch
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                key: dispatch_key,
                reason,
            })?;

        Ok(AuditSettings {
            write_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            dispatch,
            hook_timeout: (hook_timeout_ms > 0).then(|| Duration::from_millis(hook_timeout_ms)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings: AuditSettings = WardenConfig::empty().typed().unwrap();
        assert_eq!(settings.write_timeout, Some(Duration::from_secs(2)));
        assert_eq!(settings.dispatch, Dispatch::Inline);
        assert_eq!(settings.hook_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn detached_without_timeout() {
        let config = WardenConfig::from_yaml_str(
            "warden:\n  audit:\n    write_timeout_ms: 0\n    dispatch: Detached\n",
            "test",
        )
        .unwrap();
        let settings: AuditSettings = config.typed().unwrap();
        assert_eq!(settings.write_timeout, None);
        assert_eq!(settings.dispatch, Dispatch::Detached);
    }

    #[test]
    fn hook_timeout_is_configurable() {
        let config =
            WardenConfig::from_yaml_str("warden:\n  audit:\n    hook_timeout_ms: 250\n", "test").unwrap();
        let settings: AuditSettings = config.typed().unwrap();
        assert_eq!(settings.hook_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn unknown_dispatch_is_invalid() {
        let config =
            WardenConfig::from_yaml_str("warden:\n  audit:\n    dispatch: queued\n", "test").unwrap();
        assert!(config.typed::<AuditSettings>().is_err());
    }
}

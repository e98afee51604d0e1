mod loader;
pub mod secrets;
pub mod value;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use secrets::{DefaultSecretResolver, SecretResolver};
pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    /// The requested key was not found.
    NotFound(String),
    /// The value could not be converted to the requested type.
    TypeMismatch { key: String, expected: &'static str },
    /// An I/O or YAML parsing error occurred while loading config files.
    Load(String),
    /// A typed section was readable but semantically invalid.
    Invalid { key: String, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "Config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "Config load error: {msg}"),
            ConfigError::Invalid { key, reason } => write!(f, "Invalid config '{key}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A strongly-typed configuration section read from a [`WardenConfig`].
pub trait FromConfig: Sized {
    /// Key prefix of the section, e.g. `"warden.isolation"`.
    const PREFIX: &'static str;

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError>;
}

/// Layered configuration: YAML files, `.env` files, then environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml`
/// 2. `application-{profile}.yaml`
/// 3. `.env` and `.env.{profile}` (loaded into the process environment)
/// 4. `${...}` placeholders resolved through a [`SecretResolver`]
/// 5. `WARDEN_*` environment variables
///
/// The active profile is `WARDEN_PROFILE` if set, else the argument.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl WardenConfig {
    /// Load configuration from the current directory for `profile`.
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), profile, &DefaultSecretResolver)
    }

    /// Load configuration from `dir` with a custom secret resolver.
    pub fn load_from(
        dir: &Path,
        profile: &str,
        resolver: &dyn SecretResolver,
    ) -> Result<Self, ConfigError> {
        let profile = std::env::var("WARDEN_PROFILE").unwrap_or_else(|_| profile.to_string());
        let mut values = HashMap::new();

        loader::load_yaml_file(&dir.join("application.yaml"), &mut values)?;
        loader::load_yaml_file(&dir.join(format!("application-{profile}.yaml")), &mut values)?;

        // .env files never overwrite variables that are already set.
        let _ = dotenvy::from_path(dir.join(".env"));
        let _ = dotenvy::from_path(dir.join(PathBuf::from(format!(".env.{profile}"))));

        for value in values.values_mut() {
            if let ConfigValue::String(s) = value {
                if s.contains("${") {
                    *s = secrets::resolve_placeholders(s, resolver)?;
                }
            }
        }

        for (env_key, env_val) in std::env::vars() {
            if let Some(key) = loader::env_key_to_config_key(&env_key) {
                values.insert(key, ConfigValue::String(env_val));
            }
        }

        tracing::debug!(profile = %profile, keys = values.len(), "configuration loaded");
        Ok(WardenConfig { values, profile })
    }

    /// Build a config from a YAML string, without env overlay.
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(WardenConfig {
            values,
            profile: profile.to_string(),
        })
    }

    pub fn empty() -> Self {
        WardenConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    /// Get a value, falling back to `default` when the key is missing.
    ///
    /// A present but malformed value is still an error.
    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> Result<V, ConfigError> {
        match self.values.get(key) {
            Some(value) => V::from_config_value(value, key),
            None => Ok(default),
        }
    }

    /// All direct children of `prefix`, keyed by the child segment.
    pub fn section<V: FromConfigValue>(&self, prefix: &str) -> Result<HashMap<String, V>, ConfigError> {
        value::collect_section(&self.values, prefix)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Read a typed section.
    pub fn typed<C: FromConfig>(&self) -> Result<C, ConfigError> {
        C::from_config(self)
    }
}

use std::collections::HashMap;
use std::path::Path;

use super::value::ConfigValue;
use super::ConfigError;

pub(crate) fn load_yaml_file(
    path: &Path,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    load_yaml_str(&content, values)
}

pub(crate) fn load_yaml_str(
    content: &str,
    values: &mut HashMap<String, ConfigValue>,
) -> Result<(), ConfigError> {
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten_yaml("", &yaml, values);
    Ok(())
}

/// Flatten a YAML tree into dot-separated keys.
///
/// Sequences are stored whole under their parent key and element by element
/// under `key.N`, so both list access and indexed env overrides work.
pub(crate) fn flatten_yaml(
    prefix: &str,
    value: &serde_yaml::Value,
    out: &mut HashMap<String, ConfigValue>,
) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let segment = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => format!("{other:?}"),
                };
                let full_key = if prefix.is_empty() {
                    segment
                } else {
                    format!("{prefix}.{segment}")
                };
                flatten_yaml(&full_key, v, out);
            }
        }
        serde_yaml::Value::Sequence(seq) if !prefix.is_empty() => {
            out.insert(
                prefix.to_string(),
                ConfigValue::List(seq.iter().map(ConfigValue::from_yaml).collect()),
            );
            for (i, item) in seq.iter().enumerate() {
                flatten_yaml(&format!("{prefix}.{i}"), item, out);
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
        }
        _ => {}
    }
}

/// Map an environment variable name onto a config key.
///
/// Only `WARDEN_`-prefixed variables participate. A single `_` separates
/// segments and `__` stands for a literal underscore, so
/// `WARDEN_DATASOURCE_TENANT_MAX__CONNECTIONS` maps to
/// `warden.datasource.tenant.max_connections`.
pub(crate) fn env_key_to_config_key(env_key: &str) -> Option<String> {
    if !env_key.starts_with("WARDEN_") {
        return None;
    }
    let lowered = env_key.to_lowercase();
    let key = lowered
        .split("__")
        .map(|part| part.replace('_', "."))
        .collect::<Vec<_>>()
        .join("_");
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_dotted_keys() {
        assert_eq!(
            env_key_to_config_key("WARDEN_DATASOURCE_TENANT_URL").as_deref(),
            Some("warden.datasource.tenant.url")
        );
        assert_eq!(
            env_key_to_config_key("WARDEN_DATASOURCE_TENANT_MAX__CONNECTIONS").as_deref(),
            Some("warden.datasource.tenant.max_connections")
        );
        assert_eq!(env_key_to_config_key("PATH"), None);
    }
}

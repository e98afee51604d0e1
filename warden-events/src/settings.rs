use warden_core::{ConfigError, FromConfig, WardenConfig};

use crate::memory::DEFAULT_MAX_REDELIVERIES;

/// `warden.events.*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventSettings {
    pub topic: String,
    pub max_redeliveries: u32,
}

impl FromConfig for EventSettings {
    const PREFIX: &'static str = "warden.events";

    fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let topic_key = format!("{}.topic", Self::PREFIX);
        let topic: String = config.get_or(&topic_key, "warden.mutations".to_string())?;
        if topic.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: topic_key,
                reason: "must not be empty".into(),
            });
        }
        Ok(EventSettings {
            topic,
            max_redeliveries: config.get_or(
                &format!("{}.max_redeliveries", Self::PREFIX),
                DEFAULT_MAX_REDELIVERIES,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings: EventSettings = WardenConfig::empty().typed().unwrap();
        assert_eq!(settings.topic, "warden.mutations");
        assert_eq!(settings.max_redeliveries, DEFAULT_MAX_REDELIVERIES);
    }

    #[test]
    fn blank_topic_is_rejected() {
        let config = WardenConfig::from_yaml_str("warden:\n  events:\n    topic: \"  \"\n", "test").unwrap();
        assert!(matches!(
            config.typed::<EventSettings>(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}

//! Model Configuration
//!
//! How a model enforces its schema at the storage layer and what it does to
//! the schema at definition time.

use serde::{Deserialize, Serialize};

use crate::store::{ValidationAction, ValidationLevel, ValidationSettings};

/// Model configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Which writes the storage validator checks (default: strict)
    #[serde(default)]
    pub validation_level: ValidationLevel,

    /// What storage does with a rejected write (default: error)
    #[serde(default)]
    pub validation_action: ValidationAction,

    /// Add an optional `_id` field when the schema declares none (default: true)
    #[serde(default = "default_true")]
    pub add_id_field: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            validation_level: ValidationLevel::default(),
            validation_action: ValidationAction::default(),
            add_id_field: default_true(),
        }
    }
}

impl ModelConfig {
    /// Parses a config from JSON; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Config with the given validation action
    pub fn with_action(action: ValidationAction) -> Self {
        Self {
            validation_action: action,
            ..Default::default()
        }
    }

    /// Storage validator settings
    pub fn settings(&self) -> ValidationSettings {
        ValidationSettings::new(self.validation_level, self.validation_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.validation_level, ValidationLevel::Strict);
        assert_eq!(config.validation_action, ValidationAction::Error);
        assert!(config.add_id_field);
    }

    #[test]
    fn test_from_json_partial() {
        let config = ModelConfig::from_json_str(r#"{"validation_action": "warn"}"#).unwrap();
        assert_eq!(config.validation_action, ValidationAction::Warn);
        assert_eq!(config.validation_level, ValidationLevel::Strict);
        assert!(config.add_id_field);
    }

    #[test]
    fn test_from_json_rejects_unknown_level() {
        assert!(ModelConfig::from_json_str(r#"{"validation_level": "paranoid"}"#).is_err());
    }
}

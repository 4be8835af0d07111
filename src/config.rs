//! Configuration for the ledger driver

use serde::Deserialize;
use thiserror::Error;

use std::fs;
use std::path::Path;

use crate::blockchain::SignerPolicy;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How required signers are derived for new transactions
    #[serde(default)]
    pub signer_policy: SignerPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            log_level: default_log_level(),
            signer_policy: SignerPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::from_toml_str("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.signer_policy, SignerPolicy::Explicit);
    }

    #[test]
    fn test_parse() {
        let config = LedgerConfig::from_toml_str(
            r#"
            log_level = "debug"
            signer_policy = "input_owners"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.signer_policy, SignerPolicy::InputOwners);
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let result = LedgerConfig::from_toml_str(r#"signer_policy = "anyone""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = LedgerConfig::load("/nonexistent/hashledger.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

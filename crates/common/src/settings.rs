use config::{Config, Environment, File, FileFormat};
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::TrustCenterError;
use crate::models::Keyspec;

pub const ENVIRONMENT_VARIABLE_PREFIX: &str = "TRUST_CENTER";
pub const ENVIRONMENT_VARIABLE_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Stores {
    /// KV store holding issuance records.
    #[validate(length(min = 1))]
    pub record_store: String,
    /// Secret store holding the signing keys.
    #[validate(length(min = 1))]
    pub key_store: String,
}

/// Backend key identifier per keyspec.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Keys {
    #[validate(length(min = 1))]
    pub prime256v1: String,
    #[validate(length(min = 1))]
    pub secp256k1: String,
}

impl Keys {
    #[must_use]
    pub fn key_id(&self, keyspec: Keyspec) -> &str {
        match keyspec {
            Keyspec::Prime256v1 => &self.prime256v1,
            Keyspec::Secp256k1 => &self.secp256k1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    #[serde(default = "default_log_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            endpoint: default_log_endpoint(),
            level: default_log_level(),
        }
    }
}

fn default_log_endpoint() -> String {
    "tclog".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct Settings {
    #[validate(nested)]
    pub stores: Stores,
    #[validate(nested)]
    pub keys: Keys,
    #[serde(default)]
    pub logging: Logging,
}

impl Settings {
    /// Parse settings from a TOML string, applying `TRUST_CENTER__*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, required fields are missing or validation fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, Report<TrustCenterError>> {
        let environment = Environment::default()
            .prefix(ENVIRONMENT_VARIABLE_PREFIX)
            .separator(ENVIRONMENT_VARIABLE_SEPARATOR);

        let toml = File::from_str(toml_str, FileFormat::Toml);
        let config = Config::builder()
            .add_source(toml)
            .add_source(environment)
            .build()
            .change_context(TrustCenterError::Configuration {
                message: "Failed to build configuration".to_string(),
            })?;

        let settings: Self =
            config
                .try_deserialize()
                .change_context(TrustCenterError::Configuration {
                    message: "Failed to deserialize configuration".to_string(),
                })?;

        settings
            .validate()
            .change_context(TrustCenterError::Configuration {
                message: "Settings validation failed".to_string(),
            })?;

        Ok(settings)
    }
}

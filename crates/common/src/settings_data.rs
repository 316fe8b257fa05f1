//! Settings embedded at build time.
//!
//! `trust-center.toml` at the workspace root is compiled into the binary; environment variables
//! prefixed `TRUST_CENTER__` override individual keys.

use core::str;

use error_stack::{Report, ResultExt};

use crate::error::TrustCenterError;
use crate::settings::Settings;

const SETTINGS_DATA: &[u8] = include_bytes!("../../../trust-center.toml");

/// Load and validate the embedded settings.
///
/// # Errors
///
/// Returns an error if the embedded TOML is not UTF-8, cannot be parsed or fails validation.
pub fn get_settings() -> Result<Settings, Report<TrustCenterError>> {
    let toml_str = str::from_utf8(SETTINGS_DATA).change_context(TrustCenterError::Configuration {
        message: "embedded settings are not valid UTF-8".to_string(),
    })?;

    let settings = Settings::from_toml(toml_str)?;
    log::debug!(
        "Loaded settings: record_store={}, key_store={}",
        settings.stores.record_store,
        settings.stores.key_store
    );
    Ok(settings)
}

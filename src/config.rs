//! Configuration system for nightlightr with validation.
//!
//! This module handles the TOML-based configuration file, default value
//! generation, and a validation pass that rejects unusable values with
//! actionable messages.
//!
//! ## Configuration structure
//!
//! ```toml
//! #[Controller]
//! utc_offset_secs = 3600     # Base UTC offset in seconds (-43200 to 50400)
//! resync_interval_secs = 60  # Clock resynchronization cadence (10-3600)
//! driver = "console"         # Output driver: "console", "null"
//!
//! #[Request surface]
//! secret = "changeme"        # Shared key required by schedule changes
//! socket_path = "/run/user/1000/nightlightr.sock"
//!
//! #[Persistence]
//! store_path = "~/.local/state/nightlightr/nvstore.bin"
//! ```
//!
//! Every field is optional; missing fields fall back to the defaults in
//! `constants`. Omitting `secret` disables schedule changes entirely while
//! leaving status queries available.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::constants::*;

/// Output driver selection.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Log channel transitions through the structured logger.
    Console,
    /// Discard channel writes (headless operation).
    Null,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Console => "console",
            Driver::Null => "null",
        }
    }
}

/// Configuration for the nightlightr daemon, loaded from `nightlightr.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Shared key required by schedule-change requests.
    pub secret: Option<String>,
    /// Base UTC offset in seconds; DST is toggled per schedule submission.
    pub utc_offset_secs: Option<i64>,
    /// Clock resynchronization cadence in seconds.
    pub resync_interval_secs: Option<u64>,
    /// Request surface socket path.
    pub socket_path: Option<PathBuf>,
    /// Non-volatile image path.
    pub store_path: Option<PathBuf>,
    /// Output driver backend.
    pub driver: Option<Driver>,
}

impl Config {
    /// Load the configuration, creating a commented default file on first
    /// run.
    pub fn load(custom_dir: Option<&Path>) -> Result<Self> {
        let path = config_path(custom_dir)?;
        if !path.exists() {
            create_default_config(&path)?;
            log_block_start!("Created default configuration at {}", path.display());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }
}

/// Determine the configuration file path.
pub fn config_path(custom_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = custom_dir {
        return Ok(dir.join("nightlightr.toml"));
    }
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("nightlightr").join("nightlightr.toml"))
}

/// Default socket path under the runtime directory.
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join("nightlightr.sock")
}

/// Default non-volatile image path under the state directory.
pub fn default_store_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("nightlightr").join("nvstore.bin"))
        .unwrap_or_else(|| PathBuf::from("/tmp/nightlightr-nvstore.bin"))
}

/// Write a commented default configuration file.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
    }
    fs::write(path, DEFAULT_CONFIG_CONTENT)
        .with_context(|| format!("Failed to write default configuration: {}", path.display()))
}

const DEFAULT_CONFIG_CONTENT: &str = r#"#[Controller]
utc_offset_secs = 3600     # Base UTC offset in seconds (-43200 to 50400)
resync_interval_secs = 60  # Clock resynchronization cadence (10-3600)
driver = "console"         # Output driver: "console", "null"

#[Request surface]
# secret = "changeme"      # Uncomment to allow schedule changes
# socket_path = "/run/user/1000/nightlightr.sock"

#[Persistence]
# store_path = "/home/user/.local/state/nightlightr/nvstore.bin"
"#;

/// Comprehensive validation to prevent unusable configurations.
pub fn validate_config(config: &Config) -> Result<()> {
    if let Some(offset) = config.utc_offset_secs
        && !(MINIMUM_UTC_OFFSET_SECS..=MAXIMUM_UTC_OFFSET_SECS).contains(&offset)
    {
        anyhow::bail!(
            "utc_offset_secs ({} s) must be between {} and {} seconds",
            offset,
            MINIMUM_UTC_OFFSET_SECS,
            MAXIMUM_UTC_OFFSET_SECS
        );
    }

    if let Some(interval) = config.resync_interval_secs
        && !(MINIMUM_RESYNC_INTERVAL_SECS..=MAXIMUM_RESYNC_INTERVAL_SECS).contains(&interval)
    {
        anyhow::bail!(
            "resync_interval_secs ({} s) must be between {} and {} seconds",
            interval,
            MINIMUM_RESYNC_INTERVAL_SECS,
            MAXIMUM_RESYNC_INTERVAL_SECS
        );
    }

    if let Some(secret) = &config.secret
        && secret.is_empty()
    {
        anyhow::bail!("secret must not be empty; remove the key to disable schedule changes");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_configuration() {
        let config: Config = toml::from_str(
            r#"
            secret = "hunter2"
            utc_offset_secs = 7200
            resync_interval_secs = 120
            socket_path = "/tmp/test.sock"
            store_path = "/tmp/test.bin"
            driver = "null"
            "#,
        )
        .unwrap();

        assert_eq!(config.secret.as_deref(), Some("hunter2"));
        assert_eq!(config.utc_offset_secs, Some(7200));
        assert_eq!(config.driver, Some(Driver::Null));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_configuration_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert!(validate_config(&config).is_ok());
        assert!(config.secret.is_none());
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let config: Config = toml::from_str("utc_offset_secs = 90000").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("utc_offset_secs"));
    }

    #[test]
    fn rejects_out_of_range_resync_interval() {
        let config: Config = toml::from_str("resync_interval_secs = 5").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("resync_interval_secs"));
    }

    #[test]
    fn rejects_empty_secret() {
        let config: Config = toml::from_str(r#"secret = """#).unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("secret"));
    }

    #[test]
    fn unknown_driver_fails_to_parse() {
        assert!(toml::from_str::<Config>(r#"driver = "gpio""#).is_err());
    }

    #[test]
    fn default_config_content_parses_and_validates() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_CONTENT).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.driver, Some(Driver::Console));
        assert_eq!(config.resync_interval_secs, Some(DEFAULT_RESYNC_INTERVAL_SECS));
    }
}

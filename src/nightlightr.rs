//! Application coordinator that manages the complete lifecycle of nightlightr.
//!
//! This module handles resource acquisition, initialization, and
//! orchestration of the control loop. It manages:
//! - Configuration loading
//! - Lock file management for single-instance enforcement
//! - Signal handler setup
//! - Construction of the clock, store, driver, and request surface

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{self, Config, Driver};
use crate::constants::{DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_UTC_OFFSET_SECS};
use crate::core::{Core, CoreParams};
use crate::engine::Engine;
use crate::output;
use crate::persist::FileStore;
use crate::surface::{self, Request, Response, Surface};
use crate::time_source::SystemClock;
use crate::{lock, signals};

/// Builder for configuring and running the nightlightr application.
///
/// # Examples
///
/// ```no_run
/// use nightlightr::Nightlightr;
///
/// # fn main() -> anyhow::Result<()> {
/// let debug_enabled = false;
/// Nightlightr::new(debug_enabled).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Nightlightr {
    debug_enabled: bool,
    config_dir: Option<PathBuf>,
}

impl Nightlightr {
    /// Create a runner with defaults matching a normal run.
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            config_dir: None,
        }
    }

    /// Use a custom configuration directory.
    pub fn with_config_dir(mut self, config_dir: Option<PathBuf>) -> Self {
        self.config_dir = config_dir;
        self
    }

    /// Execute the application with the configured settings.
    ///
    /// Acquires the instance lock, loads and validates configuration, wires
    /// up the collaborators, and hands control to the control loop until a
    /// shutdown signal arrives.
    pub fn run(self) -> Result<()> {
        log_version!();

        let lock_info = lock::acquire_lock()?;
        if lock_info.is_none() {
            log_pipe!();
            anyhow::bail!("nightlightr is already running");
        }

        let config = Config::load(self.config_dir.as_deref())?;
        log_config_summary(&config);

        let shutdown = signals::setup_signal_handler()?;

        let base_offset = config.utc_offset_secs.unwrap_or(DEFAULT_UTC_OFFSET_SECS);
        let clock = Box::new(SystemClock::new(base_offset));
        let driver = output::create_driver(config.driver.unwrap_or(Driver::Console));

        let store_path = config
            .store_path
            .clone()
            .unwrap_or_else(config::default_store_path);
        let store = Box::new(FileStore::open(&store_path)?);

        let socket_path = config
            .socket_path
            .clone()
            .unwrap_or_else(config::default_socket_path);
        let surface = Surface::bind(&socket_path, config.secret.clone())?;
        log_decorated!("Listening on {}", socket_path.display());
        if config.secret.is_none() {
            log_warning!("No secret configured; schedule changes are disabled");
        }

        let engine = Engine::new(base_offset);

        Core::new(CoreParams {
            config,
            clock,
            driver,
            store,
            surface,
            engine,
            shutdown,
            debug_enabled: self.debug_enabled,
            lock_info,
        })
        .execute()
    }
}

fn log_config_summary(config: &Config) {
    log_block_start!("Loaded configuration");
    log_indented!(
        "UTC offset: {} s",
        config.utc_offset_secs.unwrap_or(DEFAULT_UTC_OFFSET_SECS)
    );
    log_indented!(
        "Resync interval: {} s",
        config
            .resync_interval_secs
            .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS)
    );
    log_indented!(
        "Driver: {}",
        config.driver.unwrap_or(Driver::Console).as_str()
    );
}

/// Query a running instance over its socket and print the status summary.
pub fn print_status(config_dir: Option<&Path>) -> Result<()> {
    let config = Config::load(config_dir)?;
    let socket_path = config
        .socket_path
        .clone()
        .unwrap_or_else(config::default_socket_path);

    match surface::send_request(&socket_path, &Request::Status)? {
        Response::Status(status) => {
            log_version!();
            log_block_start!("Current time: {}, {}", status.weekday, status.time);
            log_indented!("Day schedule: {}, intensity {}%", status.day, status.day_intensity);
            log_indented!(
                "Night schedule: {}, intensity {}%",
                status.night,
                status.night_intensity
            );
            match status.weekend {
                Some(weekend) => {
                    log_indented!("Weekend day: {}", weekend.day);
                    log_indented!("Weekend night: {}", weekend.night);
                }
                None => log_indented!("Weekend: regular schedule"),
            }
            log_indented!("DST: {}", if status.dst { "active" } else { "inactive" });
            log_indented!(
                "Outputs: day {}, night {}",
                if status.day_active { "on" } else { "off" },
                if status.night_active { "on" } else { "off" }
            );
            log_indented!("Persisted: {}", if status.persisted { "yes" } else { "no" });
            log_end!();
            Ok(())
        }
        Response::Error { message } => {
            log_pipe!();
            anyhow::bail!(message)
        }
    }
}

//! Single-threaded control loop.
//!
//! One cooperative loop drives (a) periodic clock resynchronization, (b) the
//! engine tick, and (c) request handling. The engine state is only ever
//! mutated from this loop, so a schedule change runs to completion before
//! the next tick fires and no locking is needed. The first iteration loads
//! the persisted snapshot, reinstalls its schedule, and drives the outputs
//! to the restored flags.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::Config;
use crate::constants::{
    DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_UTC_OFFSET_SECS, DST_OFFSET_SECS, TICK_INTERVAL_MS,
};
use crate::engine::Engine;
use crate::lock;
use crate::output::OutputDriver;
use crate::persist::{self, NvStore};
use crate::surface::{Request, Response, StatusPayload, Surface};
use crate::time_source::Clock;

/// Bundled dependencies for the control loop.
///
/// Follows the parameter-struct pattern to avoid a constructor with too many
/// arguments; everything here is owned for the process lifetime.
pub(crate) struct CoreParams {
    pub config: Config,
    pub clock: Box<dyn Clock>,
    pub driver: Box<dyn OutputDriver>,
    pub store: Box<dyn NvStore>,
    pub surface: Surface,
    pub engine: Engine,
    pub shutdown: Arc<AtomicBool>,
    pub debug_enabled: bool,
    pub lock_info: Option<(std::fs::File, String)>,
}

/// The control loop and its runtime state.
pub(crate) struct Core {
    config: Config,
    clock: Box<dyn Clock>,
    driver: Box<dyn OutputDriver>,
    store: Box<dyn NvStore>,
    surface: Surface,
    engine: Engine,
    shutdown: Arc<AtomicBool>,
    debug_enabled: bool,
    lock_info: Option<(std::fs::File, String)>,
    last_resync: Option<Instant>,
}

impl Core {
    pub fn new(params: CoreParams) -> Self {
        Self {
            config: params.config,
            clock: params.clock,
            driver: params.driver,
            store: params.store,
            surface: params.surface,
            engine: params.engine,
            shutdown: params.shutdown,
            debug_enabled: params.debug_enabled,
            lock_info: params.lock_info,
            last_resync: None,
        }
    }

    /// Run the control loop until a shutdown is requested.
    pub fn execute(mut self) -> Result<()> {
        self.resync_clock(true);
        self.restore_persisted();
        log_block_start!("Entering control loop");

        while !self.shutdown.load(Ordering::SeqCst) {
            self.resync_clock(false);

            let now = self.clock.now();
            let fired = self.engine.tick(now, self.driver.as_mut());
            if !fired.is_empty() {
                if self.debug_enabled {
                    log_debug!("Alarms fired at {}: {fired:?}", now.hms());
                }
                self.persist_state();
            }

            self.poll_surface();
            std::thread::sleep(Duration::from_millis(TICK_INTERVAL_MS));
        }

        log_block_start!("Shutting down nightlightr...");
        if let Some((lock_file, lock_path)) = self.lock_info.take() {
            lock::release_lock(lock_file, &lock_path);
        }
        log_end!();
        Ok(())
    }

    /// Re-apply the configured offset and resynchronize on the configured
    /// cadence. A failed resync is logged and tolerated; readings stay
    /// usable until the next attempt.
    fn resync_clock(&mut self, force: bool) {
        let interval = Duration::from_secs(
            self.config
                .resync_interval_secs
                .unwrap_or(DEFAULT_RESYNC_INTERVAL_SECS),
        );
        if !force && self.last_resync.is_some_and(|at| at.elapsed() < interval) {
            return;
        }
        self.last_resync = Some(Instant::now());

        let dst_offset = if self.engine.state().dst_active {
            DST_OFFSET_SECS
        } else {
            0
        };
        let base_offset = self.config.utc_offset_secs.unwrap_or(DEFAULT_UTC_OFFSET_SECS);
        self.clock.set_offset(base_offset + dst_offset);
        if let Err(e) = self.clock.resync() {
            log_warning!("Clock resync failed: {e}");
        }
    }

    /// First-run recovery of the persisted schedule.
    fn restore_persisted(&mut self) {
        match persist::load_snapshot(self.store.as_ref()) {
            Some(snapshot) => match self.engine.restore(&snapshot, self.clock.as_mut()) {
                Ok(()) => {
                    log_block_start!("Restored persisted schedule");
                    self.log_schedule_summary();
                    self.engine.drive_outputs(self.driver.as_mut());
                }
                Err(e) => {
                    log_pipe!();
                    log_warning!("Persisted schedule rejected: {e}");
                }
            },
            None => {
                log_block_start!("No persisted schedule found; awaiting configuration");
            }
        }
    }

    fn log_schedule_summary(&self) {
        let state = self.engine.state();
        log_indented!(
            "Day: {}, intensity {}%",
            state.day.span,
            state.day_intensity
        );
        log_indented!(
            "Night: {}, intensity {}%",
            state.night.span,
            state.night_intensity
        );
        match (&state.weekend_day, &state.weekend_night) {
            (Some(weekend_day), Some(weekend_night)) => {
                log_indented!("Weekend day: {}", weekend_day.span);
                log_indented!("Weekend night: {}", weekend_night.span);
            }
            _ => log_indented!("Weekend: regular schedule"),
        }
        log_indented!("DST: {}", if state.dst_active { "active" } else { "inactive" });
    }

    /// Write the current state and record the commit outcome.
    fn persist_state(&mut self) {
        let saved = persist::save_snapshot(self.store.as_mut(), &self.engine.snapshot());
        self.engine.mark_persisted(saved);
        if !saved {
            log_pipe!();
            log_warning!("State write failed; keeping in-memory schedule");
        }
    }

    /// Answer every pending surface request within this loop iteration.
    fn poll_surface(&mut self) {
        let debug_enabled = self.debug_enabled;
        let Core {
            surface,
            engine,
            clock,
            store,
            ..
        } = self;

        surface.poll(debug_enabled, |request| match request {
            Request::Status => {
                Response::Status(StatusPayload::collect(engine.state(), clock.now()))
            }
            Request::Apply(form) => {
                let candidate = match form.to_schedule() {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        log_pipe!();
                        log_warning!("Rejected schedule change: {e}");
                        return Response::Error {
                            message: e.to_string(),
                        };
                    }
                };
                match engine.apply_schedule(&candidate, clock.as_mut()) {
                    Ok(()) => {
                        let saved = persist::save_snapshot(store.as_mut(), &engine.snapshot());
                        engine.mark_persisted(saved);
                        log_block_start!("Schedule updated");
                        log_indented!(
                            "Day: {}, intensity {}%",
                            engine.state().day.span,
                            engine.state().day_intensity
                        );
                        log_indented!(
                            "Night: {}, intensity {}%",
                            engine.state().night.span,
                            engine.state().night_intensity
                        );
                        if !saved {
                            log_warning!("State write failed; change is active but not persistent");
                        }
                        Response::Status(StatusPayload::collect(engine.state(), clock.now()))
                    }
                    Err(e) => {
                        log_pipe!();
                        log_warning!("Rejected schedule change: {e}");
                        Response::Error {
                            message: e.to_string(),
                        }
                    }
                }
            }
        });
    }
}

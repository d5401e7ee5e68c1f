//! Signal handling for clean shutdown.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

/// Register TERM/INT handlers.
///
/// The returned flag flips to true when a shutdown has been requested; the
/// control loop checks it once per iteration.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGINT] {
        flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(shutdown)
}

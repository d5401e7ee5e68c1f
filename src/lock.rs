//! Lock file management for single-instance enforcement.
//!
//! Only one nightlightr instance may own the alarm state and the physical
//! outputs at a time. The lock file lives in the runtime directory and
//! carries the owning PID for diagnostics.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use anyhow::Result;
use fs2::FileExt;

/// Acquire an exclusive lock on the lock file.
///
/// # Returns
/// - `Ok(Some((lock_file, lock_path)))` if the lock was acquired
/// - `Ok(None)` if another instance currently holds it
pub fn acquire_lock() -> Result<Option<(File, String)>> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    let lock_path = format!("{runtime_dir}/nightlightr.lock");

    // Open without truncating to preserve existing content while contended
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {
            lock_file.set_len(0)?;
            lock_file.seek(SeekFrom::Start(0))?;
            let pid = std::process::id();
            writeln!(&lock_file, "{pid}")?;
            lock_file.flush()?;
            Ok(Some((lock_file, lock_path)))
        }
        Err(_) => Ok(None),
    }
}

/// Release the lock and remove the lock file.
pub fn release_lock(lock_file: File, lock_path: &str) {
    let _ = FileExt::unlock(&lock_file);
    drop(lock_file);
    let _ = std::fs::remove_file(lock_path);
}

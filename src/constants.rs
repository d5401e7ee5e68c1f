//! Application-wide constants and tuning defaults.

/// Fixed capacity of the alarm slot arena.
///
/// A schedule with a weekend override holds 15 slots at peak (4 regular,
/// 6 weekend day, 5 weekend night); the arena is sized with headroom and
/// never grows.
pub const ALARM_CAPACITY: usize = 24;

/// Live slots held by a regular-only schedule (start/end per channel).
pub const REGULAR_SLOT_COUNT: usize = 4;

/// Additional live slots held when a weekend override is configured.
pub const WEEKEND_SLOT_COUNT: usize = 11;

/// Native duty-cycle range of the output driver (inclusive upper bound).
pub const PWM_RANGE: u32 = 1023;

/// Seconds added to the clock offset while daylight saving is active.
pub const DST_OFFSET_SECS: i64 = 3600;

/// Main control loop cadence in milliseconds.
pub const TICK_INTERVAL_MS: u64 = 250;

/// Default clock resynchronization cadence in seconds.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Resynchronization cadence bounds accepted from configuration.
pub const MINIMUM_RESYNC_INTERVAL_SECS: u64 = 10;
pub const MAXIMUM_RESYNC_INTERVAL_SECS: u64 = 3600;

/// Default base UTC offset in seconds (UTC+1).
pub const DEFAULT_UTC_OFFSET_SECS: i64 = 3600;

/// Base UTC offset bounds accepted from configuration (UTC-12 to UTC+14).
pub const MINIMUM_UTC_OFFSET_SECS: i64 = -12 * 3600;
pub const MAXIMUM_UTC_OFFSET_SECS: i64 = 14 * 3600;

/// Channel intensity bounds (percent of full duty).
pub const MINIMUM_INTENSITY: u8 = 1;
pub const MAXIMUM_INTENSITY: u8 = 100;

/// Byte size of the emulated non-volatile image.
pub const NV_IMAGE_SIZE: usize = 512;

/// Well-known address of the persisted state snapshot.
pub const SNAPSHOT_ADDRESS: usize = 0;

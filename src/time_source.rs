//! Clock provider abstraction for supporting both real and manually stepped time.
//!
//! This module provides a trait-based abstraction that allows the controller
//! to run against the operating system clock in production and against a
//! deterministic, manually advanced clock in tests. The engine only ever sees
//! offset-adjusted wall-clock instants; the combined UTC+DST offset is owned
//! by the clock implementation and re-applied whenever a schedule change
//! toggles daylight saving.

use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Offset-adjusted wall-clock instant handed to the engine on each tick.
///
/// Carries epoch seconds with the clock provider's offset already applied;
/// weekday and time-of-day fields are derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    epoch_seconds: i64,
}

impl WallClock {
    /// Wrap an already offset-adjusted epoch timestamp.
    pub fn from_epoch(epoch_seconds: i64) -> Self {
        Self { epoch_seconds }
    }

    /// Wrap a chrono timestamp (useful in tests for naming calendar days).
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self::from_epoch(datetime.timestamp())
    }

    /// The raw offset-adjusted epoch seconds.
    pub fn epoch_seconds(&self) -> i64 {
        self.epoch_seconds
    }

    /// Minute index since the epoch, used for once-per-minute deduplication.
    pub fn epoch_minute(&self) -> i64 {
        self.epoch_seconds.div_euclid(60)
    }

    fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.epoch_seconds, 0).unwrap_or_default()
    }

    /// Day of week of this instant.
    pub fn weekday(&self) -> Weekday {
        self.datetime().weekday()
    }

    /// Hour of day (0-23).
    pub fn hour(&self) -> u8 {
        self.datetime().hour() as u8
    }

    /// Minute of hour (0-59).
    pub fn minute(&self) -> u8 {
        self.datetime().minute() as u8
    }

    /// Formatted `HH:MM:SS` time of day.
    pub fn hms(&self) -> String {
        self.datetime().format("%H:%M:%S").to_string()
    }
}

/// Contract of the external clock provider.
///
/// The production implementation wraps the operating system clock; embedded
/// targets would plug an SNTP client in at this seam. The core tolerates
/// stale time between successful resynchronizations.
pub trait Clock {
    /// Current offset-adjusted wall-clock time.
    fn now(&self) -> WallClock;

    /// Replace the combined UTC+DST offset applied to subsequent readings.
    fn set_offset(&mut self, offset_secs: i64);

    /// Resynchronize against the upstream time authority.
    ///
    /// May fail transiently; callers log and carry on with the last known
    /// offset-adjusted time.
    fn resync(&mut self) -> Result<()>;
}

/// Production clock backed by the operating system time.
pub struct SystemClock {
    offset_secs: i64,
}

impl SystemClock {
    /// Create a system clock applying the given offset to UTC readings.
    pub fn new(offset_secs: i64) -> Self {
        Self { offset_secs }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> WallClock {
        WallClock::from_epoch(Utc::now().timestamp() + self.offset_secs)
    }

    fn set_offset(&mut self, offset_secs: i64) {
        self.offset_secs = offset_secs;
    }

    fn resync(&mut self) -> Result<()> {
        // The host clock is already NTP-disciplined; nothing to do here.
        Ok(())
    }
}

/// Manually stepped clock for tests and deterministic simulation.
pub struct ManualClock {
    epoch_seconds: i64,
    offset_secs: i64,
}

impl ManualClock {
    /// Create a clock frozen at the given offset-adjusted epoch timestamp.
    pub fn starting_at(epoch_seconds: i64) -> Self {
        Self {
            epoch_seconds,
            offset_secs: 0,
        }
    }

    /// Advance the clock by whole seconds.
    pub fn advance(&mut self, secs: i64) {
        self.epoch_seconds += secs;
    }

    /// Jump the clock to an absolute epoch timestamp.
    pub fn jump_to(&mut self, epoch_seconds: i64) {
        self.epoch_seconds = epoch_seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> WallClock {
        WallClock::from_epoch(self.epoch_seconds + self.offset_secs)
    }

    fn set_offset(&mut self, offset_secs: i64) {
        self.offset_secs = offset_secs;
    }

    fn resync(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wall_clock_derives_weekday_and_time() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 4, 7, 30, 15).unwrap();
        let clock = WallClock::from_datetime(dt);

        assert_eq!(clock.weekday(), Weekday::Tue);
        assert_eq!(clock.hour(), 7);
        assert_eq!(clock.minute(), 30);
        assert_eq!(clock.hms(), "07:30:15");
    }

    #[test]
    fn epoch_minute_is_stable_within_a_minute() {
        let base = WallClock::from_epoch(1_000_000_020);
        let later = WallClock::from_epoch(1_000_000_059);
        let next = WallClock::from_epoch(1_000_000_060);

        assert_eq!(base.epoch_minute(), later.epoch_minute());
        assert_ne!(base.epoch_minute(), next.epoch_minute());
    }

    #[test]
    fn manual_clock_applies_offset_to_readings() {
        let mut clock = ManualClock::starting_at(3600);
        assert_eq!(clock.now().epoch_seconds(), 3600);

        clock.set_offset(7200);
        assert_eq!(clock.now().epoch_seconds(), 10800);

        clock.advance(60);
        assert_eq!(clock.now().epoch_seconds(), 10860);
    }
}

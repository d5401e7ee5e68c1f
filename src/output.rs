//! Output channel abstraction for the two lighting outputs.
//!
//! The engine talks to a trait object so the physical write path stays
//! swappable: the console driver logs transitions for development machines,
//! the null driver discards them for headless runs, and a GPIO/PWM driver
//! would slot in behind the same trait on real hardware.

use crate::config::Driver;
use crate::constants::{MAXIMUM_INTENSITY, PWM_RANGE};

/// Physical output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Day,
    Night,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Day => "day",
            Channel::Night => "night",
        }
    }
}

/// Map a 1-100 intensity percentage onto the driver's native duty-cycle range.
pub fn duty_from_intensity(intensity: u8) -> u16 {
    let clamped = intensity.min(MAXIMUM_INTENSITY) as u32;
    (clamped * PWM_RANGE / 100) as u16
}

/// Contract of the physical output driver.
#[cfg_attr(test, mockall::automock)]
pub trait OutputDriver {
    /// Drive the channel at the given duty cycle (0-1023).
    fn set_channel(&mut self, channel: Channel, duty: u16);

    /// Turn the channel fully off.
    fn disable_channel(&mut self, channel: Channel);
}

/// Driver that logs channel transitions through the structured logger.
pub struct ConsoleDriver;

impl OutputDriver for ConsoleDriver {
    fn set_channel(&mut self, channel: Channel, duty: u16) {
        log_decorated!(
            "{} channel on at duty {duty}/{PWM_RANGE}",
            channel.as_str()
        );
    }

    fn disable_channel(&mut self, channel: Channel) {
        log_decorated!("{} channel off", channel.as_str());
    }
}

/// Driver that discards all writes.
pub struct NullDriver;

impl OutputDriver for NullDriver {
    fn set_channel(&mut self, _channel: Channel, _duty: u16) {}

    fn disable_channel(&mut self, _channel: Channel) {}
}

/// Instantiate the configured driver backend.
pub fn create_driver(kind: Driver) -> Box<dyn OutputDriver> {
    match kind {
        Driver::Console => Box::new(ConsoleDriver),
        Driver::Null => Box::new(NullDriver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_mapping_matches_native_range() {
        assert_eq!(duty_from_intensity(1), 10);
        assert_eq!(duty_from_intensity(30), 306);
        assert_eq!(duty_from_intensity(80), 818);
        assert_eq!(duty_from_intensity(100), 1023);
    }

    #[test]
    fn duty_mapping_clamps_out_of_range_input() {
        assert_eq!(duty_from_intensity(200), 1023);
    }
}

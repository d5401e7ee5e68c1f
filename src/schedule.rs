//! Schedule data model and validation.
//!
//! Value types for the day/night schedule: a minute-granularity time of day,
//! start/end spans per channel, the optional weekend override, and the
//! validated candidate schedule delivered by the request surface. All range
//! checking lives here so invalid times can never reach the engine or the
//! alarm registry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::constants::{MAXIMUM_INTENSITY, MINIMUM_INTENSITY};

/// Immutable wall-clock time of day with minute granularity.
///
/// Valid by construction: hour 0-23, minute 0-59. Serializes as the `"HH:MM"`
/// string used by schedule submissions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Construct from numeric components, rejecting out-of-range values.
    pub fn new(hour: u8, minute: u8) -> Result<Self, Error> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTimeOfDay(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    /// Parse an `"HH:MM"` string.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidTimeOfDay(input.trim().to_string());
        let (hour_part, minute_part) = input.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour_part.parse().map_err(|_| invalid())?;
        let minute: u8 = minute_part.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }

    /// Hour of day (0-23).
    pub fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute of hour (0-59).
    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// One channel's on/off boundary pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Optional alternate schedule applied Friday through Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekendOverride {
    pub day: Span,
    pub night: Span,
}

impl WeekendOverride {
    /// Build from the four optional submission fields.
    ///
    /// Weekend times are all-or-nothing: four supplied fields yield an
    /// override, four absent (or blank) fields yield `None`, and anything in
    /// between is rejected before any state is touched.
    pub fn from_fields(
        day_start: Option<&str>,
        day_end: Option<&str>,
        night_start: Option<&str>,
        night_end: Option<&str>,
    ) -> Result<Option<Self>, Error> {
        let fields =
            [day_start, day_end, night_start, night_end].map(|f| f.filter(|s| !s.trim().is_empty()));
        match fields {
            [None, None, None, None] => Ok(None),
            [Some(day_start), Some(day_end), Some(night_start), Some(night_end)] => {
                Ok(Some(Self {
                    day: Span {
                        start: TimeOfDay::parse(day_start)?,
                        end: TimeOfDay::parse(day_end)?,
                    },
                    night: Span {
                        start: TimeOfDay::parse(night_start)?,
                        end: TimeOfDay::parse(night_end)?,
                    },
                }))
            }
            _ => Err(Error::IncompleteWeekendSchedule),
        }
    }
}

/// Validated candidate schedule delivered by the request surface.
///
/// Authentication happened upstream; the engine still runs `validate` before
/// touching any installed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub day: Span,
    pub night: Span,
    pub day_intensity: u8,
    pub night_intensity: u8,
    pub dst: bool,
    pub weekend: Option<WeekendOverride>,
}

impl ScheduleRequest {
    /// Range-check the request fields.
    ///
    /// Times are valid by construction; intensities are not and must fall in
    /// the accepted percent range.
    pub fn validate(&self) -> Result<(), Error> {
        for intensity in [self.day_intensity, self.night_intensity] {
            if !(MINIMUM_INTENSITY..=MAXIMUM_INTENSITY).contains(&intensity) {
                return Err(Error::InvalidIntensity(intensity));
            }
        }
        Ok(())
    }
}

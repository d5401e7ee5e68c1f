//! # Nightlightr Library
//!
//! Internal library for the nightlightr binary application.
//!
//! This library exists to enable testing of the schedule engine internals and
//! provide clean separation between CLI dispatch (main.rs) and application
//! logic.
//!
//! ## Architecture
//!
//! The library is organized into several layers:
//!
//! - **Entry Point**: `Nightlightr` struct provides the main application API
//!   with resource management
//! - **Core Logic**: `core` module contains the single-threaded control loop
//! - **Schedule Engine**: `engine` module reconciles submitted schedules into
//!   recurring alarms and derives the channel output state
//! - **Alarm Registry**: `alarm` module with the fixed-capacity slot arena
//! - **Schedule Model**: `schedule` module with time-of-day types and
//!   validation
//! - **Collaborators**: `time_source` (clock provider), `persist`
//!   (non-volatile store), `output` (channel drivers), `surface`
//!   (authenticated request socket)
//! - **Configuration**: `config` module for TOML-based settings
//! - **Infrastructure**: Signal handling, instance locking, logging

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

// Public API modules
pub mod alarm;
pub mod args;
pub mod config;
pub mod constants;
pub mod engine;
pub mod output;
pub mod persist;
pub mod schedule;
pub mod surface;
pub mod time_source;

// Internal modules
mod core;
mod lock;
mod nightlightr;
mod signals;

// Re-export for binary
pub use nightlightr::{Nightlightr, print_status};

use thiserror::Error as ThisError;

/// Errors reported by the schedule model, alarm registry, and engine.
///
/// Every variant is raised synchronously from `apply_schedule` or the model
/// constructors, before any mutation of previously installed state. Alarm
/// firing and `tick` never produce caller-visible errors.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Hour or minute outside the valid wall-clock range, or unparseable input.
    #[error("invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    /// Weekend schedule fields are all-or-nothing; a partial set was supplied.
    #[error("incomplete weekend schedule: supply all four weekend times or none")]
    IncompleteWeekendSchedule,

    /// Channel intensity outside the accepted percent range.
    #[error("intensity {0} out of range (1..=100)")]
    InvalidIntensity(u8),

    /// The alarm slot arena is exhausted.
    #[error("alarm registry capacity exceeded")]
    CapacityExceeded,
}

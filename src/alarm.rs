//! Fixed-capacity registry of recurring wall-clock alarms.
//!
//! The registry is an arena of alarm slots indexed by small generational
//! handles. Each occupied slot is bound to a day-of-week (or "every day"),
//! an hour:minute trigger, and a callback tag, and fires at most once per
//! matching minute. Slots move through `Free → Armed ⇄ Suspended → Free`;
//! suspension keeps the slot allocated while suppressing firing, which is how
//! the engine parks the regular alarm set over the weekend.

use chrono::Weekday;

use crate::Error;
use crate::constants::ALARM_CAPACITY;
use crate::schedule::TimeOfDay;
use crate::time_source::WallClock;

/// Identifies the engine action bound to an alarm slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmTag {
    DayStart,
    DayEnd,
    NightStart,
    NightEnd,
}

/// Handle to an allocated alarm slot.
///
/// Handles are generational: releasing a slot invalidates every handle issued
/// for its previous occupancy, so a stale handle from a torn-down schedule
/// can never free a slot that has since been reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmHandle {
    index: u16,
    generation: u32,
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    enabled: bool,
    day: Option<Weekday>,
    time: TimeOfDay,
    tag: AlarmTag,
    last_fired_minute: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    generation: u32,
    occupant: Option<Occupant>,
}

/// Bounded pool of recurring alarm slots.
#[derive(Debug, Clone)]
pub struct AlarmRegistry {
    slots: Vec<Slot>,
}

impl AlarmRegistry {
    /// Create a registry with the standard capacity.
    pub fn new() -> Self {
        Self::with_capacity(ALARM_CAPACITY)
    }

    /// Create a registry with an explicit slot count.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![Slot::default(); capacity],
        }
    }

    /// Register a recurring alarm.
    ///
    /// `day == None` means the alarm fires every day of the week. Fails with
    /// `Error::CapacityExceeded` when no slot is free.
    pub fn allocate(
        &mut self,
        day: Option<Weekday>,
        time: TimeOfDay,
        tag: AlarmTag,
    ) -> Result<AlarmHandle, Error> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.occupant.is_none())
            .ok_or(Error::CapacityExceeded)?;
        let slot = &mut self.slots[index];
        slot.occupant = Some(Occupant {
            enabled: true,
            day,
            time,
            tag,
            last_fired_minute: None,
        });
        Ok(AlarmHandle {
            index: index as u16,
            generation: slot.generation,
        })
    }

    /// Deactivate and free the slot behind `handle`.
    ///
    /// Idempotent: releasing an already-released or stale handle is a no-op,
    /// never an error.
    pub fn release(&mut self, handle: AlarmHandle) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation != handle.generation || slot.occupant.is_none() {
            return;
        }
        slot.occupant = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Suppress or resume firing without freeing the slot.
    ///
    /// Stale or invalid handles are ignored, like `release`.
    pub fn set_enabled(&mut self, handle: AlarmHandle, enabled: bool) {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation != handle.generation {
            return;
        }
        if let Some(occupant) = slot.occupant.as_mut() {
            occupant.enabled = enabled;
        }
    }

    /// Fire every armed alarm matching `now`.
    ///
    /// Returns the tags of matching slots in allocation order, each at most
    /// once per matching minute (de-duplicated on the epoch minute, so the
    /// host loop may tick at sub-second cadence).
    pub fn tick(&mut self, now: WallClock) -> Vec<AlarmTag> {
        let minute_stamp = now.epoch_minute();
        let weekday = now.weekday();
        let hour = now.hour();
        let minute = now.minute();

        let mut fired = Vec::new();
        for slot in &mut self.slots {
            let Some(occupant) = slot.occupant.as_mut() else {
                continue;
            };
            if !occupant.enabled {
                continue;
            }
            if occupant.day.is_some_and(|day| day != weekday) {
                continue;
            }
            if occupant.time.hour() != hour || occupant.time.minute() != minute {
                continue;
            }
            if occupant.last_fired_minute == Some(minute_stamp) {
                continue;
            }
            occupant.last_fired_minute = Some(minute_stamp);
            fired.push(occupant.tag);
        }
        fired
    }

    /// Number of currently allocated slots (armed or suspended).
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.occupant.is_some()).count()
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether `handle` refers to a live slot that will fire on match.
    pub fn is_armed(&self, handle: AlarmHandle) -> bool {
        self.occupant(handle).is_some_and(|occupant| occupant.enabled)
    }

    /// Whether `handle` refers to a live slot with firing suppressed.
    pub fn is_suspended(&self, handle: AlarmHandle) -> bool {
        self.occupant(handle).is_some_and(|occupant| !occupant.enabled)
    }

    fn occupant(&self, handle: AlarmHandle) -> Option<&Occupant> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.occupant.as_ref()
    }
}

impl Default for AlarmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

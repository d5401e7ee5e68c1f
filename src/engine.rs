//! Schedule reconciliation engine.
//!
//! Single entry point for "apply a new schedule" and "advance time", owning
//! every alarm-slot lifecycle decision. Applying a schedule tears down the
//! alarms of the state being replaced before allocating new ones; ticking
//! arbitrates which alarm set (regular or weekend) is live for the current
//! calendar day, fires due alarms, and derives the physical channel state
//! from the latched output flags.
//!
//! Alarm placement: the regular start/end alarms fire every day of the week
//! and are suspended, not freed, while a weekend override governs Friday
//! through Sunday. Weekend alarms are allocated per calendar day with
//! deliberately asymmetric boundaries: Friday's day segment opens at the
//! regular day-start, Sunday's day segment closes at the regular day-end,
//! and the weekend night chain allocates three starts but only two ends,
//! leaving the Sunday-into-Monday segment to terminate at the re-armed
//! regular night alarm.

use chrono::Weekday;

use crate::Error;
use crate::alarm::{AlarmHandle, AlarmRegistry, AlarmTag};
use crate::constants::DST_OFFSET_SECS;
use crate::output::{Channel, OutputDriver, duty_from_intensity};
use crate::persist::Snapshot;
use crate::schedule::{ScheduleRequest, Span, TimeOfDay, WeekendOverride};
use crate::time_source::{Clock, WallClock};

/// One channel's boundary pair for one schedule class, plus the alarm
/// handles installed for it.
#[derive(Debug, Clone, Default)]
pub struct DaySchedule {
    pub span: Span,
    slots: Vec<AlarmHandle>,
}

impl DaySchedule {
    fn new(span: Span) -> Self {
        Self {
            span,
            slots: Vec::new(),
        }
    }

    /// Number of alarm slots owned by this schedule class.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Latched per-channel on/off flags, updated only by alarm firings.
///
/// Deriving these from firings instead of polling the spans against the
/// clock keeps the state resilient to brief resynchronization gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputState {
    pub day_active: bool,
    pub night_active: bool,
}

/// Root aggregate for the engine's runtime state.
///
/// Created once, zero-valued, at process start; overwritten (not merged)
/// whenever a new schedule is accepted; never destroyed. `persisted` is a
/// cache invalidation flag only: it tracks whether a restart would recover
/// the current configuration, and gates nothing in-memory.
#[derive(Debug, Clone, Default)]
pub struct ActiveState {
    pub dst_active: bool,
    pub persisted: bool,
    pub initialized: bool,
    pub day: DaySchedule,
    pub night: DaySchedule,
    pub weekend_day: Option<DaySchedule>,
    pub weekend_night: Option<DaySchedule>,
    pub day_intensity: u8,
    pub night_intensity: u8,
    pub output: OutputState,
}

/// Which schedule record owns an allocated alarm slot.
#[derive(Debug, Clone, Copy)]
enum SlotOwner {
    Day,
    Night,
    WeekendDay,
    WeekendNight,
}

/// Reconciliation engine owning the alarm registry and active state.
pub struct Engine {
    state: ActiveState,
    registry: AlarmRegistry,
    base_utc_offset: i64,
    regular_suspended: bool,
}

impl Engine {
    /// Create an engine with the standard alarm capacity.
    ///
    /// `base_utc_offset` is the configured UTC offset in seconds, before any
    /// DST adjustment.
    pub fn new(base_utc_offset: i64) -> Self {
        Self::with_registry(base_utc_offset, AlarmRegistry::new())
    }

    /// Create an engine over a registry with an explicit slot capacity.
    pub fn with_capacity(base_utc_offset: i64, capacity: usize) -> Self {
        Self::with_registry(base_utc_offset, AlarmRegistry::with_capacity(capacity))
    }

    fn with_registry(base_utc_offset: i64, registry: AlarmRegistry) -> Self {
        Self {
            state: ActiveState::default(),
            registry,
            base_utc_offset,
            regular_suspended: false,
        }
    }

    /// The current runtime state.
    pub fn state(&self) -> &ActiveState {
        &self.state
    }

    /// Number of alarm slots currently held across all schedule records.
    pub fn live_slot_count(&self) -> usize {
        self.registry.live_count()
    }

    /// Install `request` as the active schedule.
    ///
    /// Validation runs before any teardown, so a rejected request leaves the
    /// previous schedule and its alarms fully intact. On success the previous
    /// alarms are released (tolerating double-free), the clock provider is
    /// told to re-apply the combined UTC+DST offset and resynchronize, and
    /// the new alarm set is allocated and recorded on the owning schedule
    /// records. A mid-allocation `CapacityExceeded` releases every slot the
    /// call had already taken.
    pub fn apply_schedule(
        &mut self,
        request: &ScheduleRequest,
        clock: &mut dyn Clock,
    ) -> Result<(), Error> {
        request.validate()?;

        if self.state.initialized {
            self.teardown();
        }

        // Subsequent alarm placement must use corrected local time.
        let dst_offset = if request.dst { DST_OFFSET_SECS } else { 0 };
        clock.set_offset(self.base_utc_offset + dst_offset);
        if let Err(e) = clock.resync() {
            log_warning!("Clock resync failed after offset change: {e}");
        }

        if let Err(err) = self.install_alarms(request) {
            self.state.initialized = false;
            return Err(err);
        }

        self.state.dst_active = request.dst;
        self.state.day_intensity = request.day_intensity;
        self.state.night_intensity = request.night_intensity;
        self.state.initialized = true;
        self.state.persisted = false;
        self.regular_suspended = false;
        Ok(())
    }

    /// Advance time.
    ///
    /// Arbitrates the weekday/weekend alarm sets for `now`'s calendar day,
    /// fires due alarms, latches the output flags (start tags set, end tags
    /// clear), and re-drives both channels when anything fired. Returns the
    /// fired tags; the caller persists the state when the list is non-empty.
    /// Never produces caller-visible errors.
    pub fn tick(&mut self, now: WallClock, driver: &mut dyn OutputDriver) -> Vec<AlarmTag> {
        if !self.state.initialized {
            return Vec::new();
        }

        self.arbitrate_weekend(now.weekday());

        let fired = self.registry.tick(now);
        if fired.is_empty() {
            return fired;
        }

        for tag in &fired {
            match tag {
                AlarmTag::DayStart => self.state.output.day_active = true,
                AlarmTag::DayEnd => self.state.output.day_active = false,
                AlarmTag::NightStart => self.state.output.night_active = true,
                AlarmTag::NightEnd => self.state.output.night_active = false,
            }
        }
        self.state.persisted = false;
        self.drive_outputs(driver);
        fired
    }

    /// Drive both channels to the latched output flags.
    ///
    /// Also used once at startup to restore the physical outputs after a
    /// snapshot load.
    pub fn drive_outputs(&self, driver: &mut dyn OutputDriver) {
        if self.state.output.day_active {
            driver.set_channel(Channel::Day, duty_from_intensity(self.state.day_intensity));
        } else {
            driver.disable_channel(Channel::Day);
        }
        if self.state.output.night_active {
            driver.set_channel(
                Channel::Night,
                duty_from_intensity(self.state.night_intensity),
            );
        } else {
            driver.disable_channel(Channel::Night);
        }
    }

    /// Serialize the current state for persistence.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            dst_active: self.state.dst_active,
            day: self.state.day.span,
            night: self.state.night.span,
            weekend: match (&self.state.weekend_day, &self.state.weekend_night) {
                (Some(day), Some(night)) => Some(WeekendOverride {
                    day: day.span,
                    night: night.span,
                }),
                _ => None,
            },
            day_intensity: self.state.day_intensity,
            night_intensity: self.state.night_intensity,
            day_active: self.state.output.day_active,
            night_active: self.state.output.night_active,
        }
    }

    /// Reinstall a persisted snapshot.
    ///
    /// Applies the snapshot's schedule, then restores the latched output
    /// flags it carried; the state is considered persisted since it matches
    /// the store it was just read from.
    pub fn restore(&mut self, snapshot: &Snapshot, clock: &mut dyn Clock) -> Result<(), Error> {
        let request = ScheduleRequest {
            day: snapshot.day,
            night: snapshot.night,
            day_intensity: snapshot.day_intensity,
            night_intensity: snapshot.night_intensity,
            dst: snapshot.dst_active,
            weekend: snapshot.weekend,
        };
        self.apply_schedule(&request, clock)?;
        self.state.output.day_active = snapshot.day_active;
        self.state.output.night_active = snapshot.night_active;
        self.state.persisted = true;
        Ok(())
    }

    /// Record the outcome of the caller's persistence attempt.
    pub fn mark_persisted(&mut self, persisted: bool) {
        self.state.persisted = persisted;
    }

    /// Release every alarm handle owned by the current state, in the order
    /// day, night, weekend day, weekend night.
    fn teardown(&mut self) {
        let state = &mut self.state;
        let registry = &mut self.registry;
        for handle in state.day.slots.drain(..) {
            registry.release(handle);
        }
        for handle in state.night.slots.drain(..) {
            registry.release(handle);
        }
        if let Some(weekend_day) = &mut state.weekend_day {
            for handle in weekend_day.slots.drain(..) {
                registry.release(handle);
            }
        }
        if let Some(weekend_night) = &mut state.weekend_night {
            for handle in weekend_night.slots.drain(..) {
                registry.release(handle);
            }
        }
    }

    /// Allocate the full alarm set for `request` and record the handles on
    /// fresh schedule records. All-or-nothing: a failed allocation releases
    /// everything taken so far and leaves the records untouched.
    fn install_alarms(&mut self, request: &ScheduleRequest) -> Result<(), Error> {
        let plan = alarm_plan(request);
        let mut allocated: Vec<(AlarmHandle, SlotOwner)> = Vec::with_capacity(plan.len());
        for (day, time, tag, owner) in plan {
            match self.registry.allocate(day, time, tag) {
                Ok(handle) => allocated.push((handle, owner)),
                Err(err) => {
                    for (handle, _) in allocated {
                        self.registry.release(handle);
                    }
                    return Err(err);
                }
            }
        }

        self.state.day = DaySchedule::new(request.day);
        self.state.night = DaySchedule::new(request.night);
        self.state.weekend_day = request.weekend.map(|weekend| DaySchedule::new(weekend.day));
        self.state.weekend_night = request.weekend.map(|weekend| DaySchedule::new(weekend.night));

        for (handle, owner) in allocated {
            let record = match owner {
                SlotOwner::Day => Some(&mut self.state.day),
                SlotOwner::Night => Some(&mut self.state.night),
                SlotOwner::WeekendDay => self.state.weekend_day.as_mut(),
                SlotOwner::WeekendNight => self.state.weekend_night.as_mut(),
            };
            if let Some(record) = record {
                record.slots.push(handle);
            }
        }
        Ok(())
    }

    /// Suspend the regular alarm set on Friday through Sunday while a weekend
    /// override is configured, and re-arm it otherwise. Weekend alarms stay
    /// armed permanently; their day-of-week binding keeps them dormant off
    /// the weekend.
    fn arbitrate_weekend(&mut self, weekday: Weekday) {
        if self.state.weekend_day.is_none() {
            return;
        }
        let weekend_today = matches!(weekday, Weekday::Fri | Weekday::Sat | Weekday::Sun);
        if weekend_today == self.regular_suspended {
            return;
        }
        let registry = &mut self.registry;
        for handle in self
            .state
            .day
            .slots
            .iter()
            .chain(self.state.night.slots.iter())
        {
            registry.set_enabled(*handle, !weekend_today);
        }
        self.regular_suspended = weekend_today;
    }
}

/// Expand a request into the full list of alarms to allocate.
///
/// Friday hands over from the weekday schedule and Sunday hands back, so the
/// outer boundaries of the weekend day segments reuse the regular times.
/// Night spans cross midnight: each start's companion end lands on the
/// following calendar day, and the Sunday night segment has no weekend end
/// alarm at all; it terminates at the regular night alarms re-armed on
/// Monday.
fn alarm_plan(
    request: &ScheduleRequest,
) -> Vec<(Option<Weekday>, TimeOfDay, AlarmTag, SlotOwner)> {
    use chrono::Weekday::{Fri, Sat, Sun};

    let mut plan = vec![
        (None, request.day.start, AlarmTag::DayStart, SlotOwner::Day),
        (None, request.day.end, AlarmTag::DayEnd, SlotOwner::Day),
        (None, request.night.start, AlarmTag::NightStart, SlotOwner::Night),
        (None, request.night.end, AlarmTag::NightEnd, SlotOwner::Night),
    ];

    if let Some(weekend) = &request.weekend {
        plan.extend([
            (
                Some(Fri),
                request.day.start,
                AlarmTag::DayStart,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Fri),
                weekend.day.end,
                AlarmTag::DayEnd,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Sat),
                weekend.day.start,
                AlarmTag::DayStart,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Sat),
                weekend.day.end,
                AlarmTag::DayEnd,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Sun),
                weekend.day.start,
                AlarmTag::DayStart,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Sun),
                request.day.end,
                AlarmTag::DayEnd,
                SlotOwner::WeekendDay,
            ),
            (
                Some(Fri),
                weekend.night.start,
                AlarmTag::NightStart,
                SlotOwner::WeekendNight,
            ),
            (
                Some(Sat),
                weekend.night.end,
                AlarmTag::NightEnd,
                SlotOwner::WeekendNight,
            ),
            (
                Some(Sat),
                weekend.night.start,
                AlarmTag::NightStart,
                SlotOwner::WeekendNight,
            ),
            (
                Some(Sun),
                weekend.night.end,
                AlarmTag::NightEnd,
                SlotOwner::WeekendNight,
            ),
            (
                Some(Sun),
                weekend.night.start,
                AlarmTag::NightStart,
                SlotOwner::WeekendNight,
            ),
        ]);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{REGULAR_SLOT_COUNT, WEEKEND_SLOT_COUNT};
    use crate::output::MockOutputDriver;
    use crate::time_source::ManualClock;
    use chrono::{Datelike, Duration, TimeZone, Utc, Weekday};
    use mockall::predicate::eq;

    fn tod(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).unwrap()
    }

    fn span(start: (u8, u8), end: (u8, u8)) -> Span {
        Span {
            start: tod(start.0, start.1),
            end: tod(end.0, end.1),
        }
    }

    fn regular_request() -> ScheduleRequest {
        ScheduleRequest {
            day: span((7, 0), (19, 0)),
            night: span((19, 0), (7, 0)),
            day_intensity: 80,
            night_intensity: 30,
            dst: false,
            weekend: None,
        }
    }

    fn weekend_request() -> ScheduleRequest {
        ScheduleRequest {
            weekend: Some(WeekendOverride {
                day: span((9, 0), (20, 0)),
                night: span((22, 0), (6, 0)),
            }),
            ..regular_request()
        }
    }

    /// Epoch timestamp for `weekday` of the week starting Monday 2026-08-03.
    fn at(weekday: Weekday, hour: u8, minute: u8) -> WallClock {
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);
        let instant = monday
            + Duration::days(weekday.num_days_from_monday() as i64)
            + Duration::hours(hour as i64)
            + Duration::minutes(minute as i64);
        WallClock::from_datetime(instant)
    }

    struct Sink;

    impl OutputDriver for Sink {
        fn set_channel(&mut self, _channel: Channel, _duty: u16) {}
        fn disable_channel(&mut self, _channel: Channel) {}
    }

    #[test]
    fn regular_schedule_holds_exactly_four_slots() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&regular_request(), &mut clock).unwrap();

        assert_eq!(engine.live_slot_count(), REGULAR_SLOT_COUNT);
        assert_eq!(engine.state().day.slot_count(), 2);
        assert_eq!(engine.state().night.slot_count(), 2);
        assert!(engine.state().initialized);
        assert!(!engine.state().persisted);
    }

    #[test]
    fn weekend_schedule_holds_exactly_fifteen_slots() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();

        assert_eq!(
            engine.live_slot_count(),
            REGULAR_SLOT_COUNT + WEEKEND_SLOT_COUNT
        );
        let state = engine.state();
        assert_eq!(state.weekend_day.as_ref().unwrap().slot_count(), 6);
        assert_eq!(state.weekend_night.as_ref().unwrap().slot_count(), 5);
    }

    #[test]
    fn reapplying_a_schedule_never_accumulates_slots() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);

        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();
        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();
        assert_eq!(
            engine.live_slot_count(),
            REGULAR_SLOT_COUNT + WEEKEND_SLOT_COUNT
        );

        engine.apply_schedule(&regular_request(), &mut clock).unwrap();
        assert_eq!(engine.live_slot_count(), REGULAR_SLOT_COUNT);
        assert!(engine.state().weekend_day.is_none());
        assert!(engine.state().weekend_night.is_none());
    }

    #[test]
    fn round_trip_of_submitted_times() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        let request = weekend_request();
        engine.apply_schedule(&request, &mut clock).unwrap();

        let state = engine.state();
        assert_eq!(state.day.span, request.day);
        assert_eq!(state.night.span, request.night);
        let weekend = request.weekend.unwrap();
        assert_eq!(state.weekend_day.as_ref().unwrap().span, weekend.day);
        assert_eq!(state.weekend_night.as_ref().unwrap().span, weekend.night);
        assert_eq!(state.day_intensity, 80);
        assert_eq!(state.night_intensity, 30);
    }

    #[test]
    fn rejected_request_leaves_previous_alarms_firing() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&regular_request(), &mut clock).unwrap();

        let mut bad = regular_request();
        bad.night_intensity = 0;
        assert_eq!(
            engine.apply_schedule(&bad, &mut clock).unwrap_err(),
            Error::InvalidIntensity(0)
        );

        assert_eq!(engine.live_slot_count(), REGULAR_SLOT_COUNT);
        assert!(engine.state().initialized);
        let fired = engine.tick(at(Weekday::Tue, 7, 0), &mut Sink);
        assert!(fired.contains(&AlarmTag::DayStart));
    }

    #[test]
    fn capacity_exhaustion_releases_partial_allocations() {
        let mut engine = Engine::with_capacity(0, 10);
        let mut clock = ManualClock::starting_at(0);

        let err = engine.apply_schedule(&weekend_request(), &mut clock);
        assert_eq!(err.unwrap_err(), Error::CapacityExceeded);
        assert_eq!(engine.live_slot_count(), 0);
        assert!(!engine.state().initialized);
    }

    #[test]
    fn dst_toggle_reapplies_combined_offset() {
        let mut engine = Engine::new(3600);
        let mut clock = ManualClock::starting_at(0);

        let mut request = regular_request();
        request.dst = true;
        engine.apply_schedule(&request, &mut clock).unwrap();
        assert_eq!(clock.now().epoch_seconds(), 7200);
        assert!(engine.state().dst_active);

        request.dst = false;
        engine.apply_schedule(&request, &mut clock).unwrap();
        assert_eq!(clock.now().epoch_seconds(), 3600);
        assert!(!engine.state().dst_active);
    }

    #[test]
    fn day_start_firing_drives_channels_at_mapped_duty() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&regular_request(), &mut clock).unwrap();

        let mut driver = MockOutputDriver::new();
        driver
            .expect_set_channel()
            .with(eq(Channel::Day), eq(818))
            .times(1)
            .return_const(());
        driver
            .expect_disable_channel()
            .with(eq(Channel::Night))
            .times(1)
            .return_const(());

        // 07:00 is both the day start and the night end.
        let fired = engine.tick(at(Weekday::Tue, 7, 0), &mut driver);
        assert_eq!(fired, vec![AlarmTag::DayStart, AlarmTag::NightEnd]);
        assert!(engine.state().output.day_active);
        assert!(!engine.state().output.night_active);
        assert!(!engine.state().persisted);
    }

    #[test]
    fn saturday_suspends_regular_alarms_while_weekend_fires() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();

        // Regular day start (07:00) must not fire on Saturday.
        assert_eq!(engine.tick(at(Weekday::Sat, 7, 0), &mut Sink), vec![]);
        // Weekend day start (09:00) fires instead.
        assert_eq!(
            engine.tick(at(Weekday::Sat, 9, 0), &mut Sink),
            vec![AlarmTag::DayStart]
        );
    }

    #[test]
    fn monday_rearms_regular_alarms_and_keeps_weekend_slots() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();

        assert_eq!(engine.tick(at(Weekday::Sat, 7, 0), &mut Sink), vec![]);

        // The following Monday: the regular set fires again and every
        // weekend slot stays allocated, dormant until next Friday.
        let monday = at(Weekday::Mon, 7, 0).epoch_seconds() + 7 * 86_400;
        let fired = engine.tick(WallClock::from_epoch(monday), &mut Sink);
        assert!(fired.contains(&AlarmTag::DayStart));
        assert_eq!(
            engine.live_slot_count(),
            REGULAR_SLOT_COUNT + WEEKEND_SLOT_COUNT
        );
    }

    #[test]
    fn regular_only_schedule_fires_on_weekends_too() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&regular_request(), &mut clock).unwrap();

        let fired = engine.tick(at(Weekday::Sat, 7, 0), &mut Sink);
        assert!(fired.contains(&AlarmTag::DayStart));
    }

    #[test]
    fn snapshot_restore_round_trips_state() {
        let mut engine = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        engine.apply_schedule(&weekend_request(), &mut clock).unwrap();
        engine.tick(at(Weekday::Tue, 7, 0), &mut Sink);

        let snapshot = engine.snapshot();
        assert!(snapshot.day_active);

        let mut restored = Engine::new(0);
        let mut clock = ManualClock::starting_at(0);
        restored.restore(&snapshot, &mut clock).unwrap();

        assert_eq!(
            restored.live_slot_count(),
            REGULAR_SLOT_COUNT + WEEKEND_SLOT_COUNT
        );
        assert_eq!(restored.state().day.span, engine.state().day.span);
        assert!(restored.state().output.day_active);
        assert!(restored.state().persisted);
    }

    #[test]
    fn tick_before_first_schedule_is_inert() {
        let mut engine = Engine::new(0);
        assert_eq!(engine.tick(at(Weekday::Tue, 7, 0), &mut Sink), vec![]);
        assert_eq!(engine.live_slot_count(), 0);
    }
}

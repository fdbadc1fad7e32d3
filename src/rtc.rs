//! Software real-time clock with periodic alarms.
//!
//! [`PseudoRtc`] keeps a calendar [`Timestamp`] and an [`AlarmTable`], both
//! advanced by [`PseudoRtc::tick`] from the hardware tick interrupt. It has no
//! other time source.
//!
//! The clock is shared between the tick interrupt (which calls `tick`) and the
//! main loop (which reads the time, manages alarms and raises them).
//! [`SharedRtc`] wraps it in a critical-section mutex so every multi-field
//! read or write crossing that boundary happens with interrupts masked.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use crate::alarm::{AlarmError, AlarmHandler, AlarmId, AlarmTable, MAX_ALARMS};
use crate::calendar::{self, ParseError, Timestamp, TimestampString};
use crate::config::ClockConfig;

/// Calendar clock advanced by a fixed-period tick.
///
/// `H` is the alarm handler type stored in each slot, `N` the number of
/// alarm slots.
pub struct PseudoRtc<H = fn(), const N: usize = MAX_ALARMS> {
    now: Timestamp,
    config: ClockConfig,
    alarms: AlarmTable<H, N>,
}

impl<H, const N: usize> PseudoRtc<H, N> {
    /// Creates a clock at [`Timestamp::EPOCH`] with every alarm slot free.
    ///
    /// # Arguments
    ///
    /// * `config` - Tick cadence; each [`PseudoRtc::tick`] adds this many seconds
    pub const fn new(config: ClockConfig) -> Self {
        Self {
            now: Timestamp::EPOCH,
            config,
            alarms: AlarmTable::new(),
        }
    }

    /// Tick cadence this clock was built with.
    pub fn config(&self) -> ClockConfig {
        self.config
    }

    /// Advances the calendar by one tick period and counts the tick on every
    /// alarm.
    ///
    /// Called from the tick interrupt. Never runs alarm handlers and performs
    /// no I/O.
    pub fn tick(&mut self) {
        self.now.advance(self.config.tick_seconds());
        self.alarms.count_tick();
    }

    /// Current calendar time.
    pub fn get_time(&self) -> Timestamp {
        self.now
    }

    /// Replaces the calendar time. The value is not validated.
    pub fn set_time(&mut self, time: Timestamp) {
        self.now = time;
    }

    /// Seeds the clock from build date/time strings.
    ///
    /// On error the current time is left unchanged.
    pub fn set_time_from_compile_headers(&mut self, date: &str, time: &str) -> Result<(), ParseError> {
        self.now = calendar::parse_build_timestamp(date, time)?;
        Ok(())
    }

    /// Gregorian leap year check for the year of `time`.
    pub fn is_leap_year(time: &Timestamp) -> bool {
        calendar::is_leap_year(time.year)
    }

    /// Installs an alarm due every `ticks` clock ticks.
    pub fn add_alarm_every_n_ticks(&mut self, ticks: u32, handler: H) -> Result<AlarmId, AlarmError> {
        self.alarms.add(ticks, handler)
    }

    /// Installs an alarm due every `seconds`, converted to whole ticks
    /// (rounded up, at least one).
    pub fn add_alarm_every_n_seconds(&mut self, seconds: u32, handler: H) -> Result<AlarmId, AlarmError> {
        let ticks = self.config.seconds_to_ticks(seconds);
        self.alarms.add(ticks, handler)
    }

    /// Frees an alarm slot. Out-of-range identifiers are ignored.
    pub fn remove_alarm(&mut self, id: AlarmId) {
        self.alarms.remove(id);
    }

    /// Read-only view of the alarm slots.
    pub fn alarms(&self) -> &AlarmTable<H, N> {
        &self.alarms
    }

    /// Formats the current time as `DD-MM-YYYY HH:MM:SS`.
    pub fn timestamp(&self) -> TimestampString {
        self.now.format()
    }

    /// Writes the current timestamp into `buffer`, returning its length.
    pub fn get_timestamp(&self, buffer: &mut [u8]) -> usize {
        self.now.write_to(buffer)
    }
}

impl<H: Copy, const N: usize> PseudoRtc<H, N> {
    /// Clears due flags and returns the handlers to run, in slot order.
    pub fn take_due_alarms(&mut self) -> Vec<(AlarmId, H), N> {
        self.alarms.take_due()
    }

    /// Clears the due flag of one slot and returns its handler if it was due.
    pub fn take_due_alarm(&mut self, id: AlarmId) -> Option<H> {
        self.alarms.take_due_at(id)
    }

    /// Runs every due alarm handler, slot 0 first.
    ///
    /// Main loop only: handlers may do arbitrary work. Returns the number of
    /// handlers run.
    pub fn raise_alarms<C: ?Sized>(&mut self, ctx: &mut C) -> usize
    where
        H: AlarmHandler<C>,
    {
        let due = self.take_due_alarms();
        for (_, handler) in due.iter() {
            handler.on_alarm(ctx);
        }
        due.len()
    }
}

/// [`PseudoRtc`] shared between the tick interrupt and the main loop.
///
/// Every access runs inside a critical section, so the interrupt can never
/// observe or produce a torn timestamp or alarm slot.
pub struct SharedRtc<H = fn(), const N: usize = MAX_ALARMS> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<PseudoRtc<H, N>>>,
}

impl<H, const N: usize> SharedRtc<H, N> {
    /// Creates a shared clock at [`Timestamp::EPOCH`] with every alarm slot
    /// free. Usable in a `static`.
    ///
    /// # Arguments
    ///
    /// * `config` - Tick cadence of the interrupt that will drive the clock
    pub const fn new(config: ClockConfig) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PseudoRtc::new(config))),
        }
    }

    /// Runs `f` with exclusive access to the clock, interrupts masked.
    ///
    /// Keep `f` short: the tick interrupt is held off while it runs.
    pub fn with<R>(&self, f: impl FnOnce(&mut PseudoRtc<H, N>) -> R) -> R {
        self.inner.lock(|rtc| f(&mut *rtc.borrow_mut()))
    }

    /// Tick interrupt entry point.
    pub fn tick(&self) {
        self.with(|rtc| rtc.tick());
    }

    /// Consistent snapshot of the calendar time.
    pub fn get_time(&self) -> Timestamp {
        self.with(|rtc| rtc.get_time())
    }

    /// Replaces the calendar time. The value is not validated.
    pub fn set_time(&self, time: Timestamp) {
        self.with(|rtc| rtc.set_time(time));
    }

    /// Seeds the clock from build date/time strings, leaving the time
    /// unchanged on error.
    pub fn set_time_from_compile_headers(&self, date: &str, time: &str) -> Result<(), ParseError> {
        // Parse outside the critical section, install inside it.
        let stamp = calendar::parse_build_timestamp(date, time)?;
        self.set_time(stamp);
        Ok(())
    }

    /// Installs an alarm due every `ticks` clock ticks.
    pub fn add_alarm_every_n_ticks(&self, ticks: u32, handler: H) -> Result<AlarmId, AlarmError> {
        self.with(|rtc| rtc.add_alarm_every_n_ticks(ticks, handler))
    }

    /// Installs an alarm due every `seconds`, rounded up to whole ticks.
    pub fn add_alarm_every_n_seconds(&self, seconds: u32, handler: H) -> Result<AlarmId, AlarmError> {
        self.with(|rtc| rtc.add_alarm_every_n_seconds(seconds, handler))
    }

    /// Frees an alarm slot. Out-of-range identifiers are ignored.
    pub fn remove_alarm(&self, id: AlarmId) {
        self.with(|rtc| rtc.remove_alarm(id));
    }

    pub fn timestamp(&self) -> TimestampString {
        self.get_time().format()
    }

    pub fn get_timestamp(&self, buffer: &mut [u8]) -> usize {
        self.get_time().write_to(buffer)
    }
}

impl<H: Copy, const N: usize> SharedRtc<H, N> {
    /// Runs every due alarm handler, slot 0 first.
    ///
    /// Each slot's due flag is taken in its own critical section right before
    /// its handler runs, with the tick interrupt enabled. Handlers may read
    /// the clock or add and remove alarms; a slot freed by an earlier handler
    /// is not raised. Returns the number of handlers run.
    pub fn raise_alarms<C: ?Sized>(&self, ctx: &mut C) -> usize
    where
        H: AlarmHandler<C>,
    {
        let mut raised = 0;
        for index in 0..N {
            let id = AlarmId::from(index as u8);
            if let Some(handler) = self.with(|rtc| rtc.take_due_alarm(id)) {
                handler.on_alarm(ctx);
                raised += 1;
            }
        }
        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmSlot, NO_FREE_SLOT};
    use chrono::{Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
    use core::sync::atomic::{AtomicU32, Ordering};

    fn to_chrono(t: Timestamp) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(i32::from(t.year), u32::from(t.month) + 1, u32::from(t.day))
            .unwrap()
            .and_hms_opt(u32::from(t.hour), u32::from(t.minute), u32::from(t.second))
            .unwrap()
    }

    fn from_chrono(t: NaiveDateTime) -> Timestamp {
        Timestamp::new(
            t.year() as u16,
            t.month0() as u8,
            t.day() as u8,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
        )
    }

    fn clock(tick_seconds: u32) -> PseudoRtc<u8> {
        PseudoRtc::new(ClockConfig::new(tick_seconds).unwrap())
    }

    #[test]
    fn test_ticks_match_calendar_addition() {
        let starts = [
            Timestamp::new(2023, 1, 27, 22, 10, 0),
            Timestamp::new(2024, 1, 28, 23, 0, 0),
            Timestamp::new(1999, 11, 31, 23, 59, 0),
            Timestamp::new(2100, 1, 28, 23, 59, 30),
        ];
        for tick_seconds in [1, 7, 60] {
            for start in starts {
                let mut rtc = clock(tick_seconds);
                rtc.set_time(start);
                let ticks = 100_000 / tick_seconds;
                for _ in 0..ticks {
                    rtc.tick();
                }
                let expected =
                    to_chrono(start) + TimeDelta::seconds(i64::from(ticks * tick_seconds));
                assert_eq!(rtc.get_time(), from_chrono(expected), "start {}", start);
            }
        }
    }

    #[test]
    fn test_day_rollover() {
        let mut rtc = clock(1);
        rtc.set_time(Timestamp::new(2023, 1, 28, 23, 59, 59));
        rtc.tick();
        assert_eq!(rtc.get_time(), Timestamp::new(2023, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_leap_year_rollover() {
        let mut rtc = clock(1);
        rtc.set_time(Timestamp::new(2024, 1, 29, 23, 59, 59));
        rtc.tick();
        assert_eq!(rtc.get_time(), Timestamp::new(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_year_rollover() {
        let mut rtc = clock(1);
        rtc.set_time(Timestamp::new(9999, 11, 31, 23, 59, 59));
        rtc.tick();
        assert_eq!(rtc.get_time(), Timestamp::new(0, 0, 1, 0, 0, 0));
    }

    #[test]
    fn test_is_leap_year() {
        for (year, leap) in [(2000, true), (2024, true), (1900, false), (2023, false), (2100, false)] {
            let t = Timestamp::new(year, 0, 1, 0, 0, 0);
            assert_eq!(PseudoRtc::<u8>::is_leap_year(&t), leap, "{}", year);
        }
    }

    #[test]
    fn test_set_time_from_compile_headers() {
        let mut rtc = clock(1);
        rtc.set_time_from_compile_headers("Feb  6 2024", "17:13:10").unwrap();
        assert_eq!(rtc.get_time(), Timestamp::new(2024, 1, 6, 17, 13, 10));
        assert_eq!(rtc.timestamp().as_str(), "06-02-2024 17:13:10");
    }

    #[test]
    fn test_bad_month_leaves_time_unchanged() {
        let mut rtc = clock(1);
        let before = Timestamp::new(2024, 4, 2, 8, 0, 0);
        rtc.set_time(before);
        assert_eq!(
            rtc.set_time_from_compile_headers("Smr 6 2024", "17:13:10"),
            Err(ParseError::UnknownMonth)
        );
        assert_eq!(rtc.get_time(), before);
    }

    #[test]
    fn test_alarm_coalescing_through_ticks() {
        let mut rtc = clock(1);
        let id = rtc.add_alarm_every_n_ticks(3, 9).unwrap();
        for _ in 0..7 {
            rtc.tick();
        }
        let alarm = rtc.alarms().get(id).unwrap();
        assert!(alarm.is_due());
        assert_eq!(alarm.elapsed(), 1);
        assert_eq!(rtc.take_due_alarms().len(), 1);
        assert!(rtc.take_due_alarms().is_empty());
    }

    #[test]
    fn test_alarm_seconds_scaled_to_ticks() {
        let mut rtc = clock(8);
        let id = rtc.add_alarm_every_n_seconds(60, 1).unwrap();
        assert_eq!(rtc.alarms().get(id).unwrap().interval(), 8);
        let id = rtc.add_alarm_every_n_ticks(60, 2).unwrap();
        assert_eq!(rtc.alarms().get(id).unwrap().interval(), 60);
    }

    #[test]
    fn test_table_full_and_reuse() {
        let mut rtc = clock(1);
        for k in 0..4 {
            assert_eq!(rtc.add_alarm_every_n_seconds(10, k), Ok(AlarmId::from(k)));
        }
        let err = rtc.add_alarm_every_n_seconds(10, 4).unwrap_err();
        assert_eq!(err.code(), NO_FREE_SLOT);

        rtc.remove_alarm(AlarmId::from(1));
        assert_eq!(rtc.add_alarm_every_n_seconds(10, 4), Ok(AlarmId::from(1)));
    }

    #[test]
    fn test_raise_alarms_runs_handlers_in_slot_order() {
        let mut rtc: PseudoRtc<fn(&mut std::vec::Vec<u8>)> = PseudoRtc::new(ClockConfig::default());
        fn first(log: &mut std::vec::Vec<u8>) {
            log.push(1);
        }
        fn second(log: &mut std::vec::Vec<u8>) {
            log.push(2);
        }
        rtc.add_alarm_every_n_ticks(2, second).unwrap();
        rtc.add_alarm_every_n_ticks(1, first).unwrap();

        let mut log = std::vec::Vec::new();
        assert_eq!(rtc.raise_alarms(&mut log), 0);
        assert!(log.is_empty());

        rtc.tick();
        rtc.tick();
        assert_eq!(rtc.raise_alarms(&mut log), 2);
        assert_eq!(log, [2, 1]);
    }

    static ZERO_ARG_CALLS: AtomicU32 = AtomicU32::new(0);

    fn zero_arg_alarm() {
        ZERO_ARG_CALLS.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_shared_clock_raises_zero_arg_callbacks() {
        let rtc: SharedRtc = SharedRtc::new(ClockConfig::default());
        rtc.add_alarm_every_n_seconds(2, zero_arg_alarm as fn()).unwrap();
        rtc.set_time(Timestamp::new(2024, 0, 1, 0, 0, 0));

        for _ in 0..5 {
            rtc.tick();
        }
        assert_eq!(rtc.raise_alarms(&mut ()), 1);
        assert_eq!(ZERO_ARG_CALLS.load(Ordering::Relaxed), 1);
        assert_eq!(rtc.raise_alarms(&mut ()), 0);
        assert_eq!(rtc.get_time(), Timestamp::new(2024, 0, 1, 0, 0, 5));

        let mut buffer = [0u8; 24];
        let len = rtc.get_timestamp(&mut buffer);
        assert_eq!(&buffer[..len], b"01-01-2024 00:00:05");
    }

    #[derive(Clone, Copy)]
    struct ReadAndRemove;

    struct Reentrant<'a> {
        rtc: &'a SharedRtc<ReadAndRemove>,
        seen: Option<Timestamp>,
    }

    impl<'a> AlarmHandler<Reentrant<'a>> for ReadAndRemove {
        fn on_alarm(&self, ctx: &mut Reentrant<'a>) {
            ctx.seen = Some(ctx.rtc.get_time());
            ctx.rtc.remove_alarm(AlarmId::from(0));
        }
    }

    #[test]
    fn test_handlers_may_use_the_clock() {
        let rtc: SharedRtc<ReadAndRemove> = SharedRtc::new(ClockConfig::default());
        rtc.add_alarm_every_n_ticks(1, ReadAndRemove).unwrap();
        rtc.tick();

        let mut ctx = Reentrant { rtc: &rtc, seen: None };
        assert_eq!(rtc.raise_alarms(&mut ctx), 1);
        assert_eq!(ctx.seen, Some(Timestamp::new(0, 0, 1, 0, 0, 1)));
        assert!(rtc.with(|inner| inner.alarms().is_empty()));
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Slot(u8);

    struct RemovesLater<'a> {
        rtc: &'a SharedRtc<Slot>,
        ran: Vec<u8, MAX_ALARMS>,
    }

    impl<'a> AlarmHandler<RemovesLater<'a>> for Slot {
        fn on_alarm(&self, ctx: &mut RemovesLater<'a>) {
            ctx.ran.push(self.0).unwrap();
            if self.0 == 0 {
                ctx.rtc.remove_alarm(AlarmId::from(1));
            }
        }
    }

    #[test]
    fn test_alarm_removed_during_raise_does_not_run() {
        let rtc: SharedRtc<Slot> = SharedRtc::new(ClockConfig::default());
        rtc.add_alarm_every_n_ticks(1, Slot(0)).unwrap();
        rtc.add_alarm_every_n_ticks(1, Slot(1)).unwrap();
        rtc.tick();

        let mut ctx = RemovesLater { rtc: &rtc, ran: Vec::new() };
        assert_eq!(rtc.raise_alarms(&mut ctx), 1);
        assert_eq!(ctx.ran.as_slice(), &[0]);
        assert_eq!(
            rtc.with(|inner| inner.alarms().slot(AlarmId::from(1)).copied()),
            Some(AlarmSlot::Free)
        );
    }
}

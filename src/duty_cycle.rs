//! Wake → work → sleep controller.
//!
//! # Overview
//!
//! The logger spends almost all of its life asleep. The tick interrupt
//! advances the clock once per tick period; whenever it fires while the
//! processor is asleep it also signals a wake-up. The main loop then:
//!
//! 1. Restores the full clock speed ([`DutyCycle::wake`])
//! 2. Runs every due alarm handler
//! 3. Stops the cadence timer, drops the clock speed and waits for the next
//!    wake event ([`DutyCycle::sleep`])
//!
//! ```text
//!            tick irq                 wake event
//!   ASLEEP ───────────▶ TICKING ──┐   ASLEEP ─────────▶ AWAKE
//!     ▲                           │                       │
//!     └───────────────────────────┘                       │ raise alarms
//!     ▲                                                   │
//!     └───────────────────────── sleep ◀──────────────────┘
//! ```
//!
//! Waiting is an `async` await on an [`embassy_sync::signal::Signal`]; the
//! executor puts the core into its low-power state while nothing is runnable.

use core::cell::Cell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU8, Ordering};

use crate::alarm::{AlarmHandler, MAX_ALARMS};
use crate::rtc::SharedRtc;

/// Processor power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerState {
    /// Main loop running at full clock speed
    Awake = 0,
    /// Inside the tick interrupt
    Ticking = 1,
    /// Low-power wait for the next wake event
    Asleep = 2,
}

impl PowerState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Ticking,
            2 => Self::Asleep,
            _ => Self::Awake,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Awake => write!(f, "awake"),
            Self::Ticking => write!(f, "ticking"),
            Self::Asleep => write!(f, "asleep"),
        }
    }
}

/// Board-specific power switching.
pub trait PowerControl {
    /// Back to the full-speed core clock after a wake-up.
    fn restore_clock_speed(&mut self);

    /// Drop to the low-power core clock before sleeping.
    fn reduce_clock_speed(&mut self);

    /// Stop timers that must not run during sleep (e.g. SysTick).
    fn suspend_cadence_timer(&mut self);

    fn resume_cadence_timer(&mut self);
}

/// Something the tick interrupt drives.
pub trait OnTick {
    fn on_tick(&self);
}

impl<H, const N: usize> OnTick for SharedRtc<H, N> {
    fn on_tick(&self) {
        self.tick();
    }
}

/// Duty-cycle controller for one clock.
pub struct DutyCycle<'a, H = fn(), const N: usize = MAX_ALARMS> {
    clock: &'a SharedRtc<H, N>,
    state: AtomicU8,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl<'a, H, const N: usize> DutyCycle<'a, H, N> {
    /// Creates a controller in the [`PowerState::Awake`] state.
    ///
    /// # Arguments
    ///
    /// * `clock` - Clock advanced by [`DutyCycle::on_tick`] and raised by [`DutyCycle::run_cycle`]
    pub const fn new(clock: &'a SharedRtc<H, N>) -> Self {
        Self {
            clock,
            state: AtomicU8::new(PowerState::Awake as u8),
            wake: Signal::new(),
        }
    }

    pub fn clock(&self) -> &'a SharedRtc<H, N> {
        self.clock
    }

    /// Current power state.
    pub fn state(&self) -> PowerState {
        PowerState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Tick interrupt entry point.
    ///
    /// Advances the clock only; alarm handlers run later from the main loop.
    /// A tick that lands while asleep wakes the main loop.
    pub fn on_tick(&self) {
        let previous = self.state.swap(PowerState::Ticking as u8, Ordering::AcqRel);
        self.clock.tick();
        self.state.store(previous, Ordering::Release);

        if PowerState::from_raw(previous) == PowerState::Asleep {
            self.wake.signal(());
        }
    }

    /// Wakes the main loop from any context other than the tick interrupt.
    pub fn request_wake(&self) {
        self.wake.signal(());
    }

    /// Leaves the sleep state and restores the full clock speed.
    pub fn wake<P: PowerControl>(&self, power: &mut P) {
        power.restore_clock_speed();
        self.state.store(PowerState::Awake as u8, Ordering::Release);
        #[cfg(feature = "debug-mode")]
        crate::fmt::trace!("awake");
    }

    /// Enters low power and returns on the next wake event.
    ///
    /// A wake requested while the main loop was busy is not lost: it makes
    /// this return immediately.
    pub async fn sleep<P: PowerControl>(&self, power: &mut P) {
        power.suspend_cadence_timer();
        power.reduce_clock_speed();
        self.state.store(PowerState::Asleep as u8, Ordering::Release);

        self.wake.wait().await;

        power.resume_cadence_timer();
    }
}

impl<H: Copy, const N: usize> DutyCycle<'_, H, N> {
    /// One full duty cycle: wake, raise due alarms, sleep.
    ///
    /// Returns the number of alarm handlers that ran.
    pub async fn run_cycle<P, C>(&self, power: &mut P, ctx: &mut C) -> usize
    where
        P: PowerControl,
        C: ?Sized,
        H: AlarmHandler<C>,
    {
        self.wake(power);
        let raised = self.clock.raise_alarms(ctx);
        self.sleep(power).await;
        raised
    }
}

impl<H, const N: usize> OnTick for DutyCycle<'_, H, N> {
    fn on_tick(&self) {
        DutyCycle::on_tick(self);
    }
}

/// Slot through which an interrupt handler reaches the controller that
/// `main` created.
///
/// Empty until [`TickHook::install`]; firing an empty hook does nothing.
pub struct TickHook<T: 'static> {
    target: Mutex<CriticalSectionRawMutex, Cell<Option<&'static T>>>,
}

impl<T: 'static> Default for TickHook<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> TickHook<T> {
    /// Creates an empty hook, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            target: Mutex::new(Cell::new(None)),
        }
    }

    /// Routes subsequent [`TickHook::fire`] calls to `target`.
    pub fn install(&self, target: &'static T) {
        self.target.lock(|cell| cell.set(Some(target)));
    }

    pub fn is_installed(&self) -> bool {
        self.target.lock(|cell| cell.get().is_some())
    }
}

impl<T: OnTick + 'static> TickHook<T> {
    /// Forwards one tick to the installed target.
    pub fn fire(&self) {
        if let Some(target) = self.target.lock(|cell| cell.get()) {
            target.on_tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClockConfig;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use heapless::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Restore,
        Reduce,
        Suspend,
        Resume,
    }

    #[derive(Default)]
    struct FakePower {
        events: Vec<Event, 32>,
    }

    impl PowerControl for FakePower {
        fn restore_clock_speed(&mut self) {
            self.events.push(Event::Restore).unwrap();
        }

        fn reduce_clock_speed(&mut self) {
            self.events.push(Event::Reduce).unwrap();
        }

        fn suspend_cadence_timer(&mut self) {
            self.events.push(Event::Suspend).unwrap();
        }

        fn resume_cadence_timer(&mut self) {
            self.events.push(Event::Resume).unwrap();
        }
    }

    fn count(hits: &mut u32) {
        *hits += 1;
    }

    #[test]
    fn test_tick_while_awake_does_not_wake() {
        let clock: SharedRtc<u8> = SharedRtc::new(ClockConfig::default());
        let duty = DutyCycle::new(&clock);

        duty.on_tick();

        assert_eq!(duty.state(), PowerState::Awake);
        assert!(!duty.wake.signaled());
        assert_eq!(clock.get_time().second, 1);
    }

    #[test]
    fn test_tick_while_asleep_wakes_and_returns_to_asleep() {
        let clock: SharedRtc<u8> = SharedRtc::new(ClockConfig::default());
        let duty = DutyCycle::new(&clock);
        let mut power = FakePower::default();

        block_on(join(duty.sleep(&mut power), async {
            assert_eq!(duty.state(), PowerState::Asleep);
            duty.on_tick();
            assert_eq!(duty.state(), PowerState::Asleep);
        }));

        assert_eq!(clock.get_time().second, 1);
        assert_eq!(
            power.events.as_slice(),
            &[Event::Suspend, Event::Reduce, Event::Resume]
        );

        duty.wake(&mut power);
        assert_eq!(duty.state(), PowerState::Awake);
        assert_eq!(power.events.last(), Some(&Event::Restore));
    }

    #[test]
    fn test_request_wake_before_sleep_is_kept() {
        let clock: SharedRtc<u8> = SharedRtc::new(ClockConfig::default());
        let duty = DutyCycle::new(&clock);
        let mut power = FakePower::default();

        duty.request_wake();
        block_on(duty.sleep(&mut power));
        assert_eq!(clock.get_time().second, 0);
    }

    #[test]
    fn test_run_cycle_raises_due_alarms() {
        let clock: SharedRtc<fn(&mut u32)> = SharedRtc::new(ClockConfig::default());
        clock.add_alarm_every_n_ticks(2, count).unwrap();
        let duty = DutyCycle::new(&clock);
        let mut power = FakePower::default();
        let mut hits = 0u32;

        let (raised, ()) = block_on(join(duty.run_cycle(&mut power, &mut hits), async {
            duty.on_tick();
            duty.on_tick();
        }));
        assert_eq!(raised, 0);

        let (raised, ()) = block_on(join(duty.run_cycle(&mut power, &mut hits), async {
            duty.on_tick();
        }));
        assert_eq!(raised, 1);
        assert_eq!(hits, 1);
        assert_eq!(
            &power.events[..4],
            &[Event::Restore, Event::Suspend, Event::Reduce, Event::Resume]
        );
    }

    #[test]
    fn test_tick_hook() {
        static CLOCK: SharedRtc<u8> = SharedRtc::new(ClockConfig::ONE_SECOND);
        static HOOK: TickHook<SharedRtc<u8>> = TickHook::new();

        HOOK.fire();
        assert!(!HOOK.is_installed());
        assert_eq!(CLOCK.get_time().second, 0);

        HOOK.install(&CLOCK);
        HOOK.fire();
        HOOK.fire();
        assert_eq!(CLOCK.get_time().second, 2);
    }
}

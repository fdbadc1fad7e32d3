//! Tick interrupt and low-power switching for the STM32L031.
//!
//! # Tick Source
//!
//! The RTC runs from the 32.768 kHz LSE crystal, which keeps going in STOP
//! mode. Its wakeup timer is clocked from the 1 Hz `ck_spre` signal and
//! reloads every `tick_seconds` seconds. Each expiry raises the RTC interrupt
//! (through EXTI line 20, which is what lets it wake the core from STOP);
//! the handler clears the flags and fires [`TICK_HOOK`].
//!
//! # Sleep
//!
//! The embassy executor executes `WFE` whenever no task is runnable. With
//! `SLEEPDEEP` set that enters STOP mode, so sleeping amounts to:
//!
//! - Dropping MSI to 65 kHz
//! - Setting `SLEEPDEEP`
//! - Masking the SysTick interrupt
//!
//! In `debug-mode` the core clock and sleep depth are left alone so the
//! debug probe stays connected.

use cortex_m::peripheral::{SCB, SYST};
use embassy_stm32::{pac, rcc::MSIRange};
use pac::interrupt;
use remote_datalogger::duty_cycle::{DutyCycle, PowerControl, TickHook};
use remote_datalogger::station::StationJob;

/// EXTI line wired to the RTC wakeup timer on STM32L0
const RTC_WAKEUP_EXTI_LINE: usize = 20;

/// EXTI register bank for lines 0-31
const EXTI_BANK: usize = 0;

/// Full-speed MSI range used while awake
const AWAKE_MSI: MSIRange = MSIRange::RANGE2M;

/// MSI range used while asleep
const ASLEEP_MSI: MSIRange = MSIRange::RANGE66K;

/// Route from the RTC interrupt to the duty-cycle controller built in `main`.
pub static TICK_HOOK: TickHook<DutyCycle<'static, StationJob>> = TickHook::new();

/// RTC global interrupt (wakeup timer).
///
/// Only advances the clock; alarm handlers run on the main loop.
#[interrupt]
fn RTC() {
    let rtc = pac::RTC;

    rtc.isr().modify(|w| w.set_wutf(false));
    pac::EXTI
        .pr(EXTI_BANK)
        .write(|w| w.set_line(RTC_WAKEUP_EXTI_LINE, true));

    TICK_HOOK.fire();
}

/// Starts the RTC wakeup timer with a period of `tick_seconds`.
///
/// The RTC clock itself (LSE, `RTCEN`) is enabled by the RCC configuration
/// in `main`; with the reset prescalers `ck_spre` is 1 Hz.
///
/// # Arguments
///
/// * `tick_seconds` - Wakeup period, 1..=60
pub fn setup_tick_timer(tick_seconds: u8) {
    let rtc = pac::RTC;
    let exti = pac::EXTI;

    // RTC registers sit in the backup domain
    pac::RCC.apb1enr().modify(|w| w.set_pwren(true));
    pac::PWR.cr().modify(|w| w.set_dbp(true));

    // Unlock RTC write protection
    rtc.wpr().write(|w| w.set_key(0xCA));
    rtc.wpr().write(|w| w.set_key(0x53));

    rtc.cr().modify(|w| w.set_wute(false));
    while !rtc.isr().read().wutwf() {}

    rtc.wutr()
        .write(|w| w.set_wut(u16::from(tick_seconds.max(1)) - 1));
    rtc.cr().modify(|w| {
        w.set_wucksel(pac::rtc::vals::Wucksel::CLOCKSPARE);
        w.set_wutie(true);
        w.set_wute(true);
    });

    // Lock again
    rtc.wpr().write(|w| w.set_key(0xFF));

    exti.imr(EXTI_BANK)
        .modify(|w| w.set_line(RTC_WAKEUP_EXTI_LINE, true));
    exti.rtsr(EXTI_BANK)
        .modify(|w| w.set_line(RTC_WAKEUP_EXTI_LINE, true));

    unsafe {
        cortex_m::peripheral::NVIC::unmask(embassy_stm32::interrupt::RTC);
    };
}

/// Board implementation of the duty-cycle power hooks.
pub struct BoardPower {
    scb: SCB,
    syst: SYST,
}

impl BoardPower {
    /// # Arguments
    ///
    /// * `scb` - System control block, for `SLEEPDEEP`
    /// * `syst` - SysTick, masked while asleep
    pub fn new(scb: SCB, syst: SYST) -> Self {
        Self { scb, syst }
    }
}

impl PowerControl for BoardPower {
    fn restore_clock_speed(&mut self) {
        #[cfg(not(feature = "debug-mode"))]
        {
            pac::RCC.icscr().modify(|w| w.set_msirange(AWAKE_MSI));
            self.scb.clear_sleepdeep();
        }
    }

    fn reduce_clock_speed(&mut self) {
        #[cfg(not(feature = "debug-mode"))]
        {
            pac::RCC.icscr().modify(|w| w.set_msirange(ASLEEP_MSI));
            self.scb.set_sleepdeep();
        }
    }

    fn suspend_cadence_timer(&mut self) {
        self.syst.disable_interrupt();
    }

    fn resume_cadence_timer(&mut self) {
        self.syst.enable_interrupt();
    }
}

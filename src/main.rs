//! Firmware for a battery/solar-powered remote temperature datalogger.
//!
//! # Overview
//!
//! The logger measures a temperature probe and its own power rails once per
//! sample interval and sends the result as a fixed-size telemetry packet over
//! a serial radio modem. Between measurements it sits in STOP mode.
//!
//! # Hardware
//!
//! - **MCU**: STM32L031G6U6 (Cortex-M0+, ultra-low-power)
//! - **Power monitor**: INA3221 on battery, solar panel and load rails
//! - **Radio**: transparent serial modem with a power-enable line
//! - **RTC**: 32.768 kHz crystal, keeps the tick going in STOP mode
//!
//! # Duty Cycle
//!
//! - RTC wakeup timer ticks the software clock every `TICK_SECONDS`
//! - Each tick wakes the main loop, which raises any due alarms
//! - The transmit alarm samples, stamps and sends a packet
//! - The log-flush alarm flushes the device debug log
//! - MSI drops to 65 kHz and the core enters STOP until the next tick
//!
//! # Module Organization
//!
//! - [`power`] - RTC tick interrupt and low-power switching
//! - [`hardware`] - Pin mappings, peripheral initialization and fault LED

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod hardware;
#[cfg(target_os = "none")]
mod power;

#[cfg(target_os = "none")]
mod firmware {
    use embassy_executor::Spawner;
    use embassy_stm32::{
        Config,
        rcc::{LsConfig, LseConfig, mux::ClockMux},
        time::Hertz,
    };
    use embassy_time::Timer;
    use remote_datalogger::analog::AdcSettings;
    use remote_datalogger::config::{BUILD_DATE, BUILD_TIME, FALLBACK_TIME, StationConfig};
    use remote_datalogger::debug_log::{DebugLog, Discard};
    use remote_datalogger::duty_cycle::DutyCycle;
    use remote_datalogger::fault::FaultCode;
    use remote_datalogger::rtc::SharedRtc;
    use remote_datalogger::station::{Radio, Station, StationJob};
    use static_cell::StaticCell;
    use {defmt_rtt as _, panic_probe as _};

    use crate::hardware::{Board, halt_with_fault};
    use crate::power::{BoardPower, TICK_HOOK, setup_tick_timer};

    static CLOCK: StaticCell<SharedRtc<StationJob>> = StaticCell::new();
    static DUTY_CYCLE: StaticCell<DutyCycle<'static, StationJob>> = StaticCell::new();

    /// Creates the awake-time clock configuration for STM32L031.
    ///
    /// # Clock Settings
    ///
    /// - **MSI**: 2.097 MHz while awake; the duty cycle drops it to 65 kHz for sleep
    /// - **System clock**: MSI (no PLL)
    /// - **LSE**: 32.768 kHz external crystal for the RTC tick
    /// - **Voltage scale**: Range 1
    ///
    /// # Returns
    ///
    /// Configured RCC settings for embassy-stm32 initialization
    fn create_low_power_config() -> embassy_stm32::rcc::Config {
        embassy_stm32::rcc::Config {
            msi: Some(embassy_stm32::rcc::MSIRange::RANGE2M),
            hsi: false,
            hse: None,
            pll: None,
            sys: embassy_stm32::rcc::Sysclk::MSI,
            ahb_pre: embassy_stm32::rcc::AHBPrescaler::DIV1,
            apb1_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
            apb2_pre: embassy_stm32::rcc::APBPrescaler::DIV1,
            ls: LsConfig {
                rtc: embassy_stm32::rcc::RtcClockSource::LSE,
                lsi: false,
                lse: Some(LseConfig {
                    frequency: Hertz::hz(32768),
                    mode: embassy_stm32::rcc::LseMode::Oscillator(embassy_stm32::rcc::LseDrive::Low),
                }),
            },
            voltage_scale: embassy_stm32::rcc::VoltageScale::RANGE1,
            mux: ClockMux::default(),
        }
    }

    /// Main entry point for the datalogger firmware.
    ///
    /// # Initialization Sequence
    ///
    /// 1. Configure clocks and initialize STM32 peripherals
    /// 2. Seed the software clock from the build timestamp
    /// 3. Bring up the power monitor, radio and probe (fault LED on failure)
    /// 4. Install the transmit and log-flush alarms
    /// 5. Hand the duty-cycle controller to the RTC interrupt and start ticking
    /// 6. Loop: wake, raise alarms, sleep
    #[embassy_executor::main]
    async fn main(_spawner: Spawner) {
        let mut config = Config::default();
        config.rcc = create_low_power_config();

        let p = embassy_stm32::init(config);

        #[cfg(feature = "debug-mode")]
        defmt::info!("Remote datalogger starting...");

        // Wait 3 seconds after boot to allow debugger connection
        // before entering STOP mode.
        Timer::after_secs(3).await;

        let station_config = match StationConfig::from_build() {
            Ok(config) => config,
            Err(e) => defmt::panic!("Invalid build configuration: {}", e),
        };
        let Some(core) = cortex_m::Peripherals::take() else {
            defmt::panic!("Core peripherals already taken");
        };

        let clock: &'static SharedRtc<StationJob> = CLOCK.init(SharedRtc::new(station_config.clock));
        let seeded = match (BUILD_DATE, BUILD_TIME) {
            (Some(date), Some(time)) => clock.set_time_from_compile_headers(date, time).is_ok(),
            _ => false,
        };
        if !seeded {
            defmt::warn!("No usable build timestamp, starting at {}", FALLBACK_TIME);
            clock.set_time(FALLBACK_TIME);
        }

        #[cfg(feature = "debug-mode")]
        defmt::info!("Clock set to {}", clock.get_time());

        let adc_settings = AdcSettings::default();
        let mut board = match Board::new(p, adc_settings) {
            Ok(board) => board,
            Err(e) => defmt::panic!("Board bring-up failed: {}", e),
        };

        if board.monitor.init().is_err() {
            halt_with_fault(&mut board.led, FaultCode::PowerMonitorInit).await;
        }
        if board.radio.disable().is_err() {
            halt_with_fault(&mut board.led, FaultCode::RadioInit).await;
        }
        if adc_settings.validate().is_err() || board.sensors.configure(&adc_settings).is_err() {
            halt_with_fault(&mut board.led, FaultCode::AuxSensorInit).await;
        }

        let log = DebugLog::new(station_config.debug_level, board.debug_serial, Discard);
        let mut station = Station::new(
            clock,
            station_config,
            board.sensors,
            board.monitor,
            board.radio,
            log,
        );
        station.note("Remote datalogger started");

        if let Err(e) = station.schedule() {
            defmt::panic!("Could not install alarms: {}", e);
        }

        let duty_cycle = DUTY_CYCLE.init(DutyCycle::new(clock));
        TICK_HOOK.install(duty_cycle);
        setup_tick_timer(station_config.clock.tick_seconds());

        #[cfg(feature = "debug-mode")]
        defmt::info!("Entering duty cycle loop...");

        let mut power = BoardPower::new(core.SCB, core.SYST);
        loop {
            let raised = duty_cycle.run_cycle(&mut power, &mut station).await;

            #[cfg(feature = "debug-mode")]
            if raised > 0 {
                defmt::info!("Ran {} alarm handlers", raised);
            }
            #[cfg(not(feature = "debug-mode"))]
            let _ = raised;
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}

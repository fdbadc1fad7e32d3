//! Board wiring and the on-board implementations of the sensor interfaces.
//!
//! # Pin Assignments
//!
//! ## Radio (transparent serial modem)
//! - **PA9**: USART2_TX - Packet data to the modem
//! - **PA8**: RADIO_EN - Modem power enable (high = on)
//!
//! ## Debug Serial
//! - **PA2**: LPUART1_TX - Device debug log
//!
//! ## Power Monitor (INA3221 at 0x40)
//! - **PB6**: I2C1_SCL
//! - **PB7**: I2C1_SDA
//!
//! ## Temperature Probe
//! - **PA0**: ADC_IN0 - Probe bridge, positive leg
//! - **PA1**: ADC_IN1 - Probe bridge, negative leg
//!
//! ## Status
//! - **PB3**: LED - Fault indicator (high = on)
//!
//! ## Low Power & RTC
//! - **PC14**: OSC32_IN - 32.768 kHz crystal input
//! - **PC15**: OSC32_OUT - 32.768 kHz crystal output

use core::convert::Infallible;

use embassy_stm32::{
    adc::{self, Adc, AdcChannel, AnyAdcChannel, Temperature},
    bind_interrupts,
    gpio::{Level, Output, Speed},
    i2c::I2c,
    mode::Blocking,
    peripherals::{self, ADC1},
    time::Hertz,
    usart::{self, UartTx},
};
use embassy_time::Timer;
use remote_datalogger::analog::{AdcSettings, DifferentialAdc, Resolution, Sensors};
use remote_datalogger::fault::{FaultCode, blink_pattern};
use remote_datalogger::power_monitor::Ina3221;
use remote_datalogger::station::SerialRadio;
use remote_datalogger::telemetry::{SensorReading, raw_adc_word};

bind_interrupts!(struct Irqs {
    ADC1_COMP => adc::InterruptHandler<peripherals::ADC1>;
});

/// Modem line rate.
const RADIO_BAUD: u32 = 9600;

/// Debug serial line rate.
const DEBUG_BAUD: u32 = 115_200;

/// Probe calibration: degrees Celsius per volt across the bridge.
const PROBE_DEGREES_PER_VOLT: f32 = 2_597.4;

/// Probe calibration: temperature at zero bridge voltage.
const PROBE_OFFSET_DEGREES: f32 = 0.0;

/// Factory temperature sensor calibration points (30 °C and 130 °C, VDDA = 3.0 V).
const TS_CAL1: *const u16 = 0x1FF8_007A as *const u16;
const TS_CAL2: *const u16 = 0x1FF8_007E as *const u16;

pub type RadioPort = SerialRadio<UartTx<'static, Blocking>, Output<'static>>;
pub type PowerMonitorBus = Ina3221<I2c<'static, Blocking>>;
pub type DebugSerial = UartTx<'static, Blocking>;

/// Pseudo-differential probe input: two single-ended conversions subtracted.
///
/// This part has no programmable gain stage, so [`AdcSettings::gain`] only
/// scales the conversion to volts. Averaging is done in software.
pub struct ProbeAdc {
    adc: Adc<'static, ADC1>,
    positive: AnyAdcChannel<ADC1>,
    negative: AnyAdcChannel<ADC1>,
    settings: AdcSettings,
}

impl ProbeAdc {
    async fn sample_pair(&mut self) -> i32 {
        let positive = self.adc.read(&mut self.positive).await;
        let negative = self.adc.read(&mut self.negative).await;
        i32::from(positive) - i32::from(negative)
    }
}

impl DifferentialAdc for ProbeAdc {
    type Error = Infallible;

    fn configure(&mut self, settings: &AdcSettings) -> Result<(), Infallible> {
        self.adc.set_resolution(match settings.resolution {
            Resolution::Bits8 => adc::Resolution::BITS8,
            Resolution::Bits10 => adc::Resolution::BITS10,
            Resolution::Bits12 | Resolution::Averaged => adc::Resolution::BITS12,
        });
        self.settings = *settings;
        Ok(())
    }

    fn read(&mut self) -> Result<i16, Infallible> {
        let samples = i32::from(self.settings.averages.samples());
        let mut sum = 0i32;
        for _ in 0..samples {
            sum += embassy_futures::block_on(self.sample_pair());
        }
        let mean = sum / samples;
        // Averaged results are reported on a 16-bit scale
        let scaled = match self.settings.resolution {
            Resolution::Averaged => mean << 4,
            _ => mean,
        };
        Ok(scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
    }
}

/// Probe plus the MCU's internal temperature sensor.
pub struct BoardSensors {
    probe: ProbeAdc,
    die_temperature: Temperature,
}

impl BoardSensors {
    /// Applies the probe converter configuration.
    pub fn configure(&mut self, settings: &AdcSettings) -> Result<(), Infallible> {
        self.probe.configure(settings)
    }

    fn die_temperature(&mut self) -> f32 {
        let raw = embassy_futures::block_on(self.probe.adc.read(&mut self.die_temperature));
        // Factory calibration words live in system memory
        let (cal1, cal2) = unsafe { (TS_CAL1.read_volatile(), TS_CAL2.read_volatile()) };
        let span = f32::from(cal2) - f32::from(cal1);
        if span <= 0.0 {
            return f32::NAN;
        }
        30.0 + (f32::from(raw) - f32::from(cal1)) * 100.0 / span
    }
}

impl Sensors for BoardSensors {
    type Error = Infallible;

    fn sample(&mut self) -> Result<SensorReading, Infallible> {
        let raw = self.probe.read()?;
        let volts = self.probe.settings.counts_to_volts(i32::from(raw));

        #[cfg(feature = "debug-mode")]
        defmt::debug!("Probe raw {} = {} V", raw, volts);

        Ok(SensorReading {
            aux_temperature: self.die_temperature(),
            channel_temperature: volts * PROBE_DEGREES_PER_VOLT + PROBE_OFFSET_DEGREES,
            raw_adc: Some(raw_adc_word(raw)),
        })
    }
}

/// All board peripherals the logger uses.
pub struct Board {
    /// Fault indicator LED
    pub led: Output<'static>,
    /// Packet radio
    pub radio: RadioPort,
    /// Power rail monitor
    pub monitor: PowerMonitorBus,
    /// Temperature sensors
    pub sensors: BoardSensors,
    /// Debug log serial sink
    pub debug_serial: DebugSerial,
}

/// Board bring-up failures, before anything can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum BoardError {
    RadioPort,
    DebugPort,
}

impl Board {
    /// Initializes all peripherals from the STM32 peripheral singleton.
    ///
    /// # Initial GPIO States
    ///
    /// - PA8 (RADIO_EN): Low (modem off)
    /// - PB3 (LED): Low
    ///
    /// # Arguments
    ///
    /// * `p` - STM32 peripheral singleton from embassy_stm32::init()
    /// * `adc_settings` - Probe converter configuration
    pub fn new(p: embassy_stm32::Peripherals, adc_settings: AdcSettings) -> Result<Self, BoardError> {
        let mut radio_config = usart::Config::default();
        radio_config.baudrate = RADIO_BAUD;
        let radio_tx = UartTx::new_blocking(p.USART2, p.PA9, radio_config)
            .map_err(|_| BoardError::RadioPort)?;

        let mut debug_config = usart::Config::default();
        debug_config.baudrate = DEBUG_BAUD;
        let debug_serial = UartTx::new_blocking(p.LPUART1, p.PA2, debug_config)
            .map_err(|_| BoardError::DebugPort)?;

        let i2c = I2c::new_blocking(p.I2C1, p.PB6, p.PB7, Hertz::khz(100), Default::default());

        let mut adc = Adc::new(p.ADC1, Irqs);
        let die_temperature = adc.enable_temperature();

        Ok(Self {
            led: Output::new(p.PB3, Level::Low, Speed::Low),
            radio: SerialRadio::new(radio_tx, Output::new(p.PA8, Level::Low, Speed::Low)),
            monitor: Ina3221::new(i2c),
            sensors: BoardSensors {
                probe: ProbeAdc {
                    adc,
                    positive: p.PA0.degrade_adc(),
                    negative: p.PA1.degrade_adc(),
                    settings: adc_settings,
                },
                die_temperature,
            },
            debug_serial,
        })
    }
}

/// Flashes `code` on the LED forever.
///
/// # Arguments
///
/// * `led` - Status LED output
/// * `code` - Fault to report
pub async fn halt_with_fault(led: &mut Output<'static>, code: FaultCode) -> ! {
    defmt::error!("Fatal: {}", code);
    let pattern = blink_pattern(code);
    loop {
        for step in pattern.iter() {
            if step.led_on {
                led.set_high();
            } else {
                led.set_low();
            }
            Timer::after_millis(u64::from(step.duration_ms)).await;
        }
    }
}

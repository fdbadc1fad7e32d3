//! Compile-time configuration for the datalogger.
//!
//! Values are fixed at build time. The build date and time used to seed the
//! clock come from the `DATALOGGER_BUILD_DATE` (`"Mon DD YYYY"`) and
//! `DATALOGGER_BUILD_TIME` (`"HH:MM:SS"`) environment variables.

use core::fmt;

use crate::calendar::Timestamp;
use crate::debug_log::DebugLevel;

/// Seconds the calendar advances per tick interrupt.
///
/// The tick interrupt is the only thing that wakes the logger, so this is
/// also the granularity of every alarm.
pub const TICK_SECONDS: u32 = 1;

/// Sample-and-transmit cadence in seconds.
pub const SAMPLE_INTERVAL_SECONDS: u32 = 60;

/// Period at which the persistent debug log is flushed, in seconds.
pub const LOG_FLUSH_SECONDS: u32 = 30;

/// Unique identifier of this logger, carried in every telemetry packet.
pub const SENSOR_ID: u32 = 0x0000_0001;

/// Where device debug messages go.
#[cfg(feature = "debug-mode")]
pub const DEBUG_LEVEL: DebugLevel = DebugLevel::SerialAndFile;
#[cfg(not(feature = "debug-mode"))]
pub const DEBUG_LEVEL: DebugLevel = DebugLevel::Disabled;

/// Build date (`"Mon DD YYYY"`), if supplied at compile time.
pub const BUILD_DATE: Option<&str> = option_env!("DATALOGGER_BUILD_DATE");

/// Build time (`"HH:MM:SS"`), if supplied at compile time.
pub const BUILD_TIME: Option<&str> = option_env!("DATALOGGER_BUILD_TIME");

/// Start time used when no usable build timestamp is available.
pub const FALLBACK_TIME: Timestamp = Timestamp::new(2025, 0, 1, 0, 0, 0);

/// Configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ConfigError {
    /// Tick period must be between 1 and 60 seconds
    TickPeriodOutOfRange,
    /// Alarm cadences must be non-zero
    ZeroInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TickPeriodOutOfRange => write!(f, "Tick period out of range"),
            Self::ZeroInterval => write!(f, "Zero alarm interval"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Tick cadence of the calendar clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct ClockConfig {
    tick_seconds: u8,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::ONE_SECOND
    }
}

impl ClockConfig {
    pub const ONE_SECOND: Self = Self { tick_seconds: 1 };

    /// Validates a tick period of 1..=60 seconds.
    ///
    /// The calendar carries at most one minute per tick, so longer periods
    /// would lose time.
    pub fn new(tick_seconds: u32) -> Result<Self, ConfigError> {
        match tick_seconds {
            1..=60 => Ok(Self {
                tick_seconds: tick_seconds as u8,
            }),
            _ => Err(ConfigError::TickPeriodOutOfRange),
        }
    }

    pub fn tick_seconds(&self) -> u8 {
        self.tick_seconds
    }

    /// Converts a period in seconds to whole ticks, rounding up, minimum 1.
    pub fn seconds_to_ticks(&self, seconds: u32) -> u32 {
        seconds.div_ceil(u32::from(self.tick_seconds)).max(1)
    }
}

/// Everything the station needs at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct StationConfig {
    pub sensor_id: u32,
    pub clock: ClockConfig,
    pub sample_interval_seconds: u32,
    pub log_flush_seconds: u32,
    pub debug_level: DebugLevel,
}

impl StationConfig {
    /// Configuration assembled from the constants in this module.
    pub fn from_build() -> Result<Self, ConfigError> {
        let config = Self {
            sensor_id: SENSOR_ID,
            clock: ClockConfig::new(TICK_SECONDS)?,
            sample_interval_seconds: SAMPLE_INTERVAL_SECONDS,
            log_flush_seconds: LOG_FLUSH_SECONDS,
            debug_level: DEBUG_LEVEL,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval_seconds == 0 || self.log_flush_seconds == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

//! Differential analog front-end settings and the sensor interfaces.
//!
//! The temperature probe is read through a differential ADC channel. The
//! converter is configured with an [`AdcSettings`]: programmable gain,
//! hardware averaging, result resolution and voltage reference.

use core::fmt;

use crate::telemetry::SensorReading;

/// Programmable input gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Gain {
    Half,
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl Gain {
    const ALL: [Gain; 6] = [Gain::Half, Gain::X1, Gain::X2, Gain::X4, Gain::X8, Gain::X16];

    pub const fn factor(self) -> f32 {
        match self {
            Self::Half => 0.5,
            Self::X1 => 1.0,
            Self::X2 => 2.0,
            Self::X4 => 4.0,
            Self::X8 => 8.0,
            Self::X16 => 16.0,
        }
    }

    /// Largest supported gain not above `requested`, never below 0.5x.
    pub fn nearest(requested: f32) -> Self {
        Self::ALL
            .iter()
            .rev()
            .copied()
            .find(|gain| gain.factor() <= requested)
            .unwrap_or(Self::Half)
    }
}

/// Number of conversions accumulated into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum Averages {
    X1 = 0,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
    X128,
    X256,
    X512,
    X1024,
}

impl Averages {
    pub const fn samples(self) -> u16 {
        1 << (self as u8)
    }
}

/// Result resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Resolution {
    Bits8,
    Bits10,
    Bits12,
    /// 16-bit accumulated result, required when averaging
    Averaged,
}

impl Resolution {
    pub const fn bits(self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits10 => 10,
            Self::Bits12 => 12,
            Self::Averaged => 16,
        }
    }
}

/// Converter voltage reference.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Reference {
    /// Internal 1.0 V bandgap
    Internal1V,
    /// Analog supply divided by 1.48
    SupplyDiv148,
    /// Analog supply divided by 2
    SupplyDiv2,
    /// External reference pin at the given voltage
    External(f32),
}

impl Reference {
    pub fn volts(self, supply_volts: f32) -> f32 {
        match self {
            Self::Internal1V => 1.0,
            Self::SupplyDiv148 => supply_volts / 1.48,
            Self::SupplyDiv2 => supply_volts / 2.0,
            Self::External(volts) => volts,
        }
    }
}

/// Analog configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum AnalogError {
    /// Averaging more than one sample needs the averaged resolution
    AveragingNeedsAveragedResolution,
}

impl fmt::Display for AnalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AveragingNeedsAveragedResolution => {
                write!(f, "Averaging requires the averaged resolution")
            }
        }
    }
}

impl core::error::Error for AnalogError {}

/// Differential converter configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct AdcSettings {
    pub gain: Gain,
    pub averages: Averages,
    pub resolution: Resolution,
    pub reference: Reference,
    /// Analog supply, used by the supply-derived references
    pub supply_volts: f32,
}

impl Default for AdcSettings {
    fn default() -> Self {
        Self {
            gain: Gain::X1,
            averages: Averages::X1024,
            resolution: Resolution::Averaged,
            reference: Reference::Internal1V,
            supply_volts: 3.3,
        }
    }
}

impl AdcSettings {
    pub fn validate(&self) -> Result<(), AnalogError> {
        if self.averages != Averages::X1 && self.resolution != Resolution::Averaged {
            return Err(AnalogError::AveragingNeedsAveragedResolution);
        }
        Ok(())
    }

    /// Converts a signed differential result to volts at the input pins.
    pub fn counts_to_volts(&self, raw: i32) -> f32 {
        let full_scale = (1u32 << (self.resolution.bits() - 1)) as f32;
        raw as f32 / full_scale * self.reference.volts(self.supply_volts) / self.gain.factor()
    }
}

/// A differential ADC channel.
pub trait DifferentialAdc {
    type Error;

    fn configure(&mut self, settings: &AdcSettings) -> Result<(), Self::Error>;

    /// Triggers one conversion and returns the signed result.
    fn read(&mut self) -> Result<i16, Self::Error>;
}

/// Source of sensor samples for the telemetry packet.
pub trait Sensors {
    type Error;

    fn sample(&mut self) -> Result<SensorReading, Self::Error>;
}

//! Power rail monitoring.
//!
//! # Hardware
//!
//! A Texas Instruments INA3221 triple-channel monitor on the I2C bus at
//! `0x40`, one channel per rail:
//!
//! - Channel 1: battery
//! - Channel 2: solar panel
//! - Channel 3: load
//!
//! Each channel measures its rail through a 100 mΩ shunt. Registers are 16
//! bits, big-endian, with the value in the upper 13 bits.

use core::fmt;

use embedded_hal::blocking::i2c::{Write, WriteRead};

/// Default 7-bit I2C address (A0 tied to GND).
pub const INA3221_ADDRESS: u8 = 0x40;

const REG_CONFIG: u8 = 0x00;
const REG_MANUFACTURER_ID: u8 = 0xFE;

const CONFIG_RESET: u16 = 0x8000;
const MANUFACTURER_ID: u16 = 0x5449;

const BUS_LSB_VOLTS: f32 = 0.008;
const SHUNT_LSB_VOLTS: f32 = 0.000_04;
const SHUNT_OHMS: f32 = 0.1;

/// Voltage and current on one rail.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct RailReading {
    /// Volts
    pub voltage: f32,
    /// Amps
    pub current: f32,
}

/// One reading of every monitored rail.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct PowerRails {
    pub battery: RailReading,
    pub solar_panel: RailReading,
    pub load: RailReading,
}

/// Anything that can report the power rails.
pub trait PowerMonitor {
    type Error;

    fn read_rails(&mut self) -> Result<PowerRails, Self::Error>;
}

/// INA3221 failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ina3221Error<E> {
    /// I2C transfer failed
    Bus(E),
    /// Device answered with an unexpected manufacturer id
    WrongDevice(u16),
}

impl<E: fmt::Debug> fmt::Display for Ina3221Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "INA3221 bus error: {:?}", err),
            Self::WrongDevice(id) => write!(f, "Unexpected manufacturer id 0x{:04X}", id),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Ina3221Error<E> {}

/// Measurement channels of the INA3221.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Channel {
    fn shunt_register(self) -> u8 {
        (self as u8 - 1) * 2 + 1
    }

    fn bus_register(self) -> u8 {
        self.shunt_register() + 1
    }
}

/// INA3221 driver over a blocking I2C bus.
pub struct Ina3221<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Ina3221<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Creates a driver at the default address (A0 tied to GND).
    ///
    /// # Arguments
    ///
    /// * `i2c` - Blocking I2C bus the INA3221 sits on
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, INA3221_ADDRESS)
    }

    /// Creates a driver at a non-default address.
    ///
    /// # Arguments
    ///
    /// * `i2c` - Blocking I2C bus the INA3221 sits on
    /// * `address` - 7-bit device address, 0x40..=0x43
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Resets the device and checks that it is an INA3221.
    pub fn init(&mut self) -> Result<(), Ina3221Error<E>> {
        self.write_register(REG_CONFIG, CONFIG_RESET)
            .map_err(Ina3221Error::Bus)?;
        let id = self
            .read_register(REG_MANUFACTURER_ID)
            .map_err(Ina3221Error::Bus)?;
        if id != MANUFACTURER_ID {
            return Err(Ina3221Error::WrongDevice(id));
        }
        Ok(())
    }

    /// Bus voltage of `channel` in volts.
    pub fn bus_voltage(&mut self, channel: Channel) -> Result<f32, E> {
        let raw = self.read_register(channel.bus_register())? as i16;
        Ok(f32::from(raw >> 3) * BUS_LSB_VOLTS)
    }

    /// Shunt voltage of `channel` in volts.
    pub fn shunt_voltage(&mut self, channel: Channel) -> Result<f32, E> {
        let raw = self.read_register(channel.shunt_register())? as i16;
        Ok(f32::from(raw / 8) * SHUNT_LSB_VOLTS)
    }

    /// Current through the shunt of `channel` in amps.
    pub fn current(&mut self, channel: Channel) -> Result<f32, E> {
        Ok(self.shunt_voltage(channel)? / SHUNT_OHMS)
    }

    pub fn rail(&mut self, channel: Channel) -> Result<RailReading, E> {
        Ok(RailReading {
            voltage: self.bus_voltage(channel)?,
            current: self.current(channel)?,
        })
    }

    /// Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<(), E> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.address, &[register, hi, lo])
    }

    fn read_register(&mut self, register: u8) -> Result<u16, E> {
        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[register], &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl<I2C, E> PowerMonitor for Ina3221<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    type Error = E;

    fn read_rails(&mut self) -> Result<PowerRails, E> {
        Ok(PowerRails {
            battery: self.rail(Channel::One)?,
            solar_panel: self.rail(Channel::Two)?,
            load: self.rail(Channel::Three)?,
        })
    }
}

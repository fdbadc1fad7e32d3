//! Firmware core for a battery/solar-powered remote environmental datalogger.
//!
//! # Overview
//!
//! The logger spends almost all of its life asleep. A fixed-period hardware
//! tick interrupt advances a software calendar clock; when one of the clock's
//! periodic alarms becomes due the main loop wakes, samples the sensors and
//! power rails, stamps a telemetry packet and sends it over a low-power radio
//! link, then goes back to sleep.
//!
//! # Timekeeping
//!
//! There is no network or GPS time source. The calendar is seeded once from
//! the build timestamp and then advanced one tick at a time, so drift is an
//! accepted limitation. The tick handler only updates plain data; alarm
//! callbacks always run later on the main loop.
//!
//! # Module Organization
//!
//! - [`calendar`] - Calendar timestamp, leap years, parsing and formatting
//! - [`alarm`] - Fixed-capacity periodic alarm table
//! - [`rtc`] - Software real-time clock and its interrupt-safe shared wrapper
//! - [`duty_cycle`] - Wake / work / sleep controller and tick interrupt hook
//! - [`config`] - Compile-time configuration
//! - [`station`] - Application jobs wiring sensors, power rails and radio
//! - [`telemetry`] - Fixed-size telemetry packet
//! - [`debug_log`] - Timestamped device debug log
//! - [`power_monitor`] - Power rail telemetry (INA3221)
//! - [`analog`] - Differential ADC front-end settings
//! - [`fault`] - Fatal fault indicator blink pattern

#![no_std]

#[cfg(test)]
extern crate std;

// Host builds need a critical-section implementation linked in.
#[cfg(not(target_os = "none"))]
use critical_section as _;

pub mod fmt;

pub mod alarm;
pub mod analog;
pub mod calendar;
pub mod config;
pub mod debug_log;
pub mod duty_cycle;
pub mod fault;
pub mod power_monitor;
pub mod rtc;
pub mod station;
pub mod telemetry;

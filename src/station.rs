//! The logger application: what happens when an alarm goes off.
//!
//! [`Station`] owns the peripherals needed to take a measurement and send it:
//! the [`Sensors`], a [`PowerMonitor`], a [`Radio`], the packet encoder and
//! the device debug log. It is the context passed to `raise_alarms`, and
//! [`StationJob`] is the alarm handler type stored in the clock.
//!
//! ```text
//! Transmit (every SAMPLE_INTERVAL_SECONDS)
//!   sample sensors → read rails → stamp → encode → radio on → send → radio off
//!
//! FlushLog (every LOG_FLUSH_SECONDS)
//!   flush the debug log file
//! ```

use core::fmt;

use embedded_hal::digital::v2::OutputPin;
use embedded_io::Write;

use crate::alarm::{AlarmError, AlarmHandler, AlarmId};
use crate::analog::Sensors;
use crate::config::StationConfig;
use crate::debug_log::DebugLog;
use crate::fmt::{debug, warn};
use crate::power_monitor::{PowerMonitor, PowerRails};
use crate::rtc::SharedRtc;
use crate::telemetry::{TelemetryEncoder, TelemetryPacket};

/// Packet radio link.
pub trait Radio {
    type Error;

    /// Powers the radio up.
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Powers the radio down.
    fn disable(&mut self) -> Result<(), Self::Error>;

    /// Transmits one packet, returning once it has left the radio.
    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;
}

/// [`SerialRadio`] failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialRadioError<E, P> {
    /// Serial port write failed
    Port(E),
    /// Enable line could not be driven
    Pin(P),
}

impl<E: fmt::Debug, P: fmt::Debug> fmt::Display for SerialRadioError<E, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(err) => write!(f, "Radio port error: {:?}", err),
            Self::Pin(err) => write!(f, "Radio enable pin error: {:?}", err),
        }
    }
}

impl<E: fmt::Debug, P: fmt::Debug> core::error::Error for SerialRadioError<E, P> {}

/// Transparent serial radio modem with a power-enable line.
pub struct SerialRadio<W, EN> {
    port: W,
    enable: EN,
}

impl<W: Write, EN: OutputPin> SerialRadio<W, EN> {
    /// # Arguments
    ///
    /// * `port` - Serial port wired to the modem's data input
    /// * `enable` - Modem power enable line, high = on
    pub fn new(port: W, enable: EN) -> Self {
        Self { port, enable }
    }

    pub fn release(self) -> (W, EN) {
        (self.port, self.enable)
    }
}

impl<W: Write, EN: OutputPin> Radio for SerialRadio<W, EN> {
    type Error = SerialRadioError<W::Error, EN::Error>;

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.enable.set_high().map_err(SerialRadioError::Pin)
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.enable.set_low().map_err(SerialRadioError::Pin)
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        self.port.write_all(packet).map_err(SerialRadioError::Port)?;
        self.port.flush().map_err(SerialRadioError::Port)
    }
}

/// Alarm handlers installed by [`Station::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum StationJob {
    /// Sample, build and send one telemetry packet
    Transmit,
    /// Flush the persistent debug log
    FlushLog,
}

/// Outcome of one transmit job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum TransmitOutcome {
    Sent,
    /// Sensors could not be read, nothing was sent
    NoReading,
    /// The radio refused the packet
    RadioFailed,
}

/// Logger application state.
pub struct Station<'a, S, M, R, DS, DF> {
    clock: &'a SharedRtc<StationJob>,
    config: StationConfig,
    sensors: S,
    monitor: M,
    radio: R,
    encoder: TelemetryEncoder,
    log: DebugLog<DS, DF>,
    last_packet: Option<TelemetryPacket>,
}

impl<'a, S, M, R, DS, DF> Station<'a, S, M, R, DS, DF>
where
    S: Sensors,
    M: PowerMonitor,
    R: Radio,
    DS: Write,
    DF: Write,
{
    /// Creates the station. Alarms are not installed until
    /// [`Station::schedule`].
    ///
    /// # Arguments
    ///
    /// * `clock` - Shared clock used for timestamps and the job alarms
    /// * `config` - Sensor id and job cadences
    /// * `sensors` - Temperature sensors
    /// * `monitor` - Power rail monitor
    /// * `radio` - Packet radio, expected to start disabled
    /// * `log` - Device debug log
    pub fn new(
        clock: &'a SharedRtc<StationJob>,
        config: StationConfig,
        sensors: S,
        monitor: M,
        radio: R,
        log: DebugLog<DS, DF>,
    ) -> Self {
        Self {
            clock,
            config,
            sensors,
            monitor,
            radio,
            encoder: TelemetryEncoder::new(config.sensor_id),
            log,
            last_packet: None,
        }
    }

    /// Installs the transmit and log-flush alarms on the clock.
    pub fn schedule(&self) -> Result<(AlarmId, AlarmId), AlarmError> {
        let transmit = self
            .clock
            .add_alarm_every_n_seconds(self.config.sample_interval_seconds, StationJob::Transmit)?;
        let flush = self
            .clock
            .add_alarm_every_n_seconds(self.config.log_flush_seconds, StationJob::FlushLog)?;
        Ok((transmit, flush))
    }

    /// Writes a timestamped line to the device debug log.
    pub fn note(&mut self, text: &str) {
        let stamp = self.clock.get_time();
        if self.log.message(&stamp, text).is_err() {
            warn!("Debug log write failed");
        }
    }

    /// Samples, stamps and sends one telemetry packet.
    ///
    /// A failed sensor sample skips the packet. A failed rail read sends
    /// zeroed rails. The radio is disabled afterwards in every case.
    pub fn transmit(&mut self) -> TransmitOutcome {
        self.note("Sampling sensors");
        let Ok(reading) = self.sensors.sample() else {
            warn!("Sensor read failed, skipping packet");
            self.note("Sensor read failed");
            return TransmitOutcome::NoReading;
        };

        let rails = match self.monitor.read_rails() {
            Ok(rails) => rails,
            Err(_) => {
                warn!("Power monitor read failed, sending zeroed rails");
                self.note("Power monitor read failed");
                PowerRails::default()
            }
        };

        let stamp = self.clock.get_time();
        let packet = self.encoder.build(reading, rails, &stamp);
        let bytes = packet.encode();
        self.last_packet = Some(packet);

        self.note("Sending packet");
        let sent = self.send(&bytes);
        // The radio is never left powered, even after a failed send
        if self.radio.disable().is_err() {
            warn!("Radio disable failed");
        }

        if sent {
            debug!("Packet {} sent", packet.packet_id);
            self.note("Packet sent");
            TransmitOutcome::Sent
        } else {
            warn!("Packet {} not sent", packet.packet_id);
            self.note("Radio send failed");
            TransmitOutcome::RadioFailed
        }
    }

    /// Flushes the persistent debug log.
    pub fn flush_log(&mut self) {
        if self.log.flush().is_err() {
            warn!("Debug log flush failed");
        }
    }

    pub fn clock(&self) -> &'a SharedRtc<StationJob> {
        self.clock
    }

    /// Most recently built packet, sent or not.
    pub fn last_packet(&self) -> Option<&TelemetryPacket> {
        self.last_packet.as_ref()
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn log(&self) -> &DebugLog<DS, DF> {
        &self.log
    }

    fn send(&mut self, bytes: &[u8]) -> bool {
        self.radio.enable().is_ok() && self.radio.send(bytes).is_ok()
    }
}

impl<'a, S, M, R, DS, DF> AlarmHandler<Station<'a, S, M, R, DS, DF>> for StationJob
where
    S: Sensors,
    M: PowerMonitor,
    R: Radio,
    DS: Write,
    DF: Write,
{
    fn on_alarm(&self, station: &mut Station<'a, S, M, R, DS, DF>) {
        match self {
            Self::Transmit => {
                station.transmit();
            }
            Self::FlushLog => station.flush_log(),
        }
    }
}

//! Fixed-size telemetry packet sent over the radio link.
//!
//! The byte layout is the receiver's contract: the 32-bit little-endian C
//! struct layout, 72 bytes, with two padding bytes after the header.
//!
//! ```text
//! offset  size  field
//!      0     1  packet_type (0xC5)
//!      1     1  packet_length (72)
//!      2     2  padding
//!      4     4  packet_id
//!      8     4  sensor_id
//!     12     4  aux_temperature       f32
//!     16     4  channel_temperature   f32
//!     20     4  raw_adc_value
//!     24    24  battery / solar / load voltage and current, f32 pairs
//!     48    24  timestamp, "DD-MM-YYYY HH:MM:SS" NUL padded
//! ```

use core::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::calendar::{TIMESTAMP_FIELD_LEN, Timestamp};
use crate::power_monitor::{PowerRails, RailReading};

/// Packet type byte of every telemetry packet.
pub const PACKET_TYPE: u8 = 0xC5;

/// Encoded packet size in bytes.
pub const PACKET_LEN: usize = 72;

/// `raw_adc_value` carried when no raw reading accompanies the packet.
///
/// Signed conversion results go into the low 16 bits with the upper half
/// zeroed (see [`raw_adc_word`]), so a reading can never equal this value.
pub const NO_RAW_VALUE: u32 = 0xFFFF_FFFF;

/// Packs a signed 16-bit conversion result into the `raw_adc_value` word.
///
/// The result is zero-extended: -1 becomes `0x0000_FFFF`. Sign extension
/// would make -1 indistinguishable from [`NO_RAW_VALUE`].
pub const fn raw_adc_word(raw: i16) -> u32 {
    raw as u16 as u32
}

const TIMESTAMP_OFFSET: usize = 48;

/// Packet decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum PacketError {
    /// Buffer or length byte does not match the packet size
    WrongLength,
    /// Unrecognised packet type byte
    UnknownType,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength => write!(f, "Wrong packet length"),
            Self::UnknownType => write!(f, "Unknown packet type"),
        }
    }
}

impl core::error::Error for PacketError {}

/// One sensor sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct SensorReading {
    /// Auxiliary digital temperature sensor, °C
    pub aux_temperature: f32,
    /// Temperature derived from the differential analog channel, °C
    pub channel_temperature: f32,
    /// Raw differential ADC conversion, if recorded
    pub raw_adc: Option<u32>,
}

/// Decoded telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    pub packet_id: u32,
    pub sensor_id: u32,
    pub reading: SensorReading,
    pub rails: PowerRails,
    pub timestamp: [u8; TIMESTAMP_FIELD_LEN],
}

impl TelemetryPacket {
    /// Timestamp text up to the first NUL byte.
    pub fn timestamp_str(&self) -> &str {
        let end = self
            .timestamp
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(TIMESTAMP_FIELD_LEN);
        core::str::from_utf8(&self.timestamp[..end]).unwrap_or("")
    }

    /// Serializes the packet in the receiver's byte layout.
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut buf = [0u8; PACKET_LEN];
        buf[0] = PACKET_TYPE;
        buf[1] = PACKET_LEN as u8;
        LittleEndian::write_u32(&mut buf[4..8], self.packet_id);
        LittleEndian::write_u32(&mut buf[8..12], self.sensor_id);
        LittleEndian::write_f32(&mut buf[12..16], self.reading.aux_temperature);
        LittleEndian::write_f32(&mut buf[16..20], self.reading.channel_temperature);
        LittleEndian::write_u32(&mut buf[20..24], self.reading.raw_adc.unwrap_or(NO_RAW_VALUE));

        let rails = [self.rails.battery, self.rails.solar_panel, self.rails.load];
        for (k, rail) in rails.iter().enumerate() {
            let at = 24 + k * 8;
            LittleEndian::write_f32(&mut buf[at..at + 4], rail.voltage);
            LittleEndian::write_f32(&mut buf[at + 4..at + 8], rail.current);
        }

        buf[TIMESTAMP_OFFSET..].copy_from_slice(&self.timestamp);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() != PACKET_LEN || usize::from(bytes[1]) != PACKET_LEN {
            return Err(PacketError::WrongLength);
        }
        if bytes[0] != PACKET_TYPE {
            return Err(PacketError::UnknownType);
        }

        let raw = LittleEndian::read_u32(&bytes[20..24]);
        let rail = |at: usize| RailReading {
            voltage: LittleEndian::read_f32(&bytes[at..at + 4]),
            current: LittleEndian::read_f32(&bytes[at + 4..at + 8]),
        };
        let mut timestamp = [0u8; TIMESTAMP_FIELD_LEN];
        timestamp.copy_from_slice(&bytes[TIMESTAMP_OFFSET..]);

        Ok(Self {
            packet_id: LittleEndian::read_u32(&bytes[4..8]),
            sensor_id: LittleEndian::read_u32(&bytes[8..12]),
            reading: SensorReading {
                aux_temperature: LittleEndian::read_f32(&bytes[12..16]),
                channel_temperature: LittleEndian::read_f32(&bytes[16..20]),
                raw_adc: (raw != NO_RAW_VALUE).then_some(raw),
            },
            rails: PowerRails {
                battery: rail(24),
                solar_panel: rail(32),
                load: rail(40),
            },
            timestamp,
        })
    }
}

/// Builds packets for one sensor, numbering them in sequence.
pub struct TelemetryEncoder {
    sensor_id: u32,
    next_packet_id: u32,
}

impl TelemetryEncoder {
    /// Creates an encoder whose first packet has id 0.
    ///
    /// # Arguments
    ///
    /// * `sensor_id` - Unique identifier placed in every packet
    pub const fn new(sensor_id: u32) -> Self {
        Self {
            sensor_id,
            next_packet_id: 0,
        }
    }

    pub fn sensor_id(&self) -> u32 {
        self.sensor_id
    }

    /// Identifier the next packet will carry.
    pub fn next_packet_id(&self) -> u32 {
        self.next_packet_id
    }

    /// Assembles the next packet and advances the sequence number.
    pub fn build(
        &mut self,
        reading: SensorReading,
        rails: PowerRails,
        stamp: &Timestamp,
    ) -> TelemetryPacket {
        let mut timestamp = [0u8; TIMESTAMP_FIELD_LEN];
        stamp.write_to(&mut timestamp);
        let packet = TelemetryPacket {
            packet_id: self.next_packet_id,
            sensor_id: self.sensor_id,
            reading,
            rails,
            timestamp,
        };
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rails() -> PowerRails {
        PowerRails {
            battery: RailReading { voltage: 3.7, current: 0.012 },
            solar_panel: RailReading { voltage: 5.1, current: 0.2 },
            load: RailReading { voltage: 3.3, current: 0.008 },
        }
    }

    fn sample_reading() -> SensorReading {
        SensorReading {
            aux_temperature: -4.5,
            channel_temperature: -4.25,
            raw_adc: Some(1234),
        }
    }

    #[test]
    fn test_layout() {
        let mut encoder = TelemetryEncoder::new(0xDEAD_BEEF);
        let stamp = Timestamp::new(2024, 1, 6, 17, 13, 10);
        let bytes = encoder.build(sample_reading(), sample_rails(), &stamp).encode();

        assert_eq!(bytes.len(), PACKET_LEN);
        assert_eq!(bytes[0], 0xC5);
        assert_eq!(bytes[1], 72);
        assert_eq!(&bytes[2..4], &[0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&bytes[12..16], &(-4.5f32).to_le_bytes());
        assert_eq!(&bytes[20..24], &1234u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &3.7f32.to_le_bytes());
        assert_eq!(&bytes[44..48], &0.008f32.to_le_bytes());
        assert_eq!(&bytes[48..67], b"06-02-2024 17:13:10");
        assert!(bytes[67..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sequence_numbers() {
        let mut encoder = TelemetryEncoder::new(7);
        let stamp = Timestamp::new(2024, 0, 1, 0, 0, 0);
        let first = encoder.build(sample_reading(), sample_rails(), &stamp);
        let second = encoder.build(sample_reading(), sample_rails(), &stamp);
        assert_eq!(first.packet_id, 0);
        assert_eq!(second.packet_id, 1);
        assert_eq!(encoder.next_packet_id(), 2);
    }

    #[test]
    fn test_missing_raw_value_uses_sentinel() {
        let mut encoder = TelemetryEncoder::new(7);
        let reading = SensorReading { raw_adc: None, ..sample_reading() };
        let stamp = Timestamp::new(2024, 0, 1, 0, 0, 0);
        let bytes = encoder.build(reading, sample_rails(), &stamp).encode();
        assert_eq!(&bytes[20..24], &[0xFF; 4]);

        let decoded = TelemetryPacket::decode(&bytes).unwrap();
        assert_eq!(decoded.reading.raw_adc, None);
    }

    #[test]
    fn test_decode_receiver_side() {
        let mut encoder = TelemetryEncoder::new(42);
        let stamp = Timestamp::new(2025, 11, 31, 23, 59, 59);
        let packet = encoder.build(sample_reading(), sample_rails(), &stamp);
        let decoded = TelemetryPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.timestamp_str(), "31-12-2025 23:59:59");
    }

    #[test]
    fn test_decode_rejects_bad_packets() {
        let mut encoder = TelemetryEncoder::new(42);
        let stamp = Timestamp::new(2025, 0, 1, 0, 0, 0);
        let mut bytes = encoder.build(sample_reading(), sample_rails(), &stamp).encode();

        assert_eq!(TelemetryPacket::decode(&bytes[..71]), Err(PacketError::WrongLength));
        bytes[0] = 0x11;
        assert_eq!(TelemetryPacket::decode(&bytes), Err(PacketError::UnknownType));
        bytes[0] = PACKET_TYPE;
        bytes[1] = 70;
        assert_eq!(TelemetryPacket::decode(&bytes), Err(PacketError::WrongLength));
    }

    #[test]
    fn test_negative_raw_reading_is_zero_extended() {
        assert_eq!(raw_adc_word(-1), 0x0000_FFFF);
        assert_eq!(raw_adc_word(i16::MIN), 0x0000_8000);
        assert_eq!(raw_adc_word(1234), 1234);
        assert_ne!(raw_adc_word(-1), NO_RAW_VALUE);

        let reading = SensorReading { raw_adc: Some(raw_adc_word(-1)), ..sample_reading() };
        let mut encoder = TelemetryEncoder::new(7);
        let packet = encoder.build(reading, PowerRails::default(), &Timestamp::EPOCH);
        let decoded = TelemetryPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.reading.raw_adc, Some(0x0000_FFFF));
        assert_eq!(decoded.reading.raw_adc.map(|word| word as u16 as i16), Some(-1));
    }
}

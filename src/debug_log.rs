//! Device debug log.
//!
//! Messages can go to a serial port, to a persistent log file, or both,
//! selected by [`DebugLevel`]. File lines are prefixed with the clock's
//! timestamp:
//!
//! ```text
//! 06-02-2024 17:13:10 : Sending packet
//! ```
//!
//! Both sinks are `embedded_io::Write`, so any UART, SD card file or test
//! buffer can be plugged in.

use core::fmt;

use embedded_io::{Error as _, ErrorKind, ErrorType, Write};

use crate::calendar::Timestamp;

/// Destinations for debug messages, as a two-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum DebugLevel {
    Disabled = 0b00,
    Serial = 0b01,
    File = 0b10,
    SerialAndFile = 0b11,
}

impl DebugLevel {
    pub const fn serial(self) -> bool {
        (self as u8) & (DebugLevel::Serial as u8) != 0
    }

    pub const fn file(self) -> bool {
        (self as u8) & (DebugLevel::File as u8) != 0
    }
}

/// Debug log write failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    /// Writing to the serial sink failed
    Serial(ErrorKind),
    /// Writing to the log file failed
    File(ErrorKind),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(kind) => write!(f, "Serial log write failed: {:?}", kind),
            Self::File(kind) => write!(f, "Log file write failed: {:?}", kind),
        }
    }
}

impl core::error::Error for LogError {}

/// Sink that accepts and drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ErrorType for Discard {
    type Error = core::convert::Infallible;
}

impl Write for Discard {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timestamped debug log over a serial sink and a file sink.
pub struct DebugLog<S, F> {
    level: DebugLevel,
    serial: S,
    file: F,
}

impl<S: Write, F: Write> DebugLog<S, F> {
    /// Creates a debug log over two sinks.
    ///
    /// # Arguments
    ///
    /// * `level` - Which sinks receive messages
    /// * `serial` - Live console, flushed after every message
    /// * `file` - Persistent log, flushed by [`DebugLog::flush`]
    pub fn new(level: DebugLevel, serial: S, file: F) -> Self {
        Self {
            level,
            serial,
            file,
        }
    }

    pub fn level(&self) -> DebugLevel {
        self.level
    }

    pub fn set_level(&mut self, level: DebugLevel) {
        self.level = level;
    }

    /// Writes `text` to the enabled sinks.
    ///
    /// The serial sink gets the bare message and is flushed straight away.
    /// The file sink gets `"<timestamp> : <text>"` and is flushed by
    /// [`DebugLog::flush`].
    pub fn message(&mut self, stamp: &Timestamp, text: &str) -> Result<(), LogError> {
        if self.level.serial() {
            self.write_serial(text)
                .map_err(|e| LogError::Serial(e.kind()))?;
        }
        if self.level.file() {
            self.write_file(stamp, text)
                .map_err(|e| LogError::File(e.kind()))?;
        }
        Ok(())
    }

    /// Flushes buffered file output.
    pub fn flush(&mut self) -> Result<(), LogError> {
        if self.level.file() {
            self.file.flush().map_err(|e| LogError::File(e.kind()))?;
        }
        Ok(())
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn file(&self) -> &F {
        &self.file
    }

    /// Releases the serial and file sinks.
    pub fn into_inner(self) -> (S, F) {
        (self.serial, self.file)
    }

    fn write_serial(&mut self, text: &str) -> Result<(), S::Error> {
        self.serial.write_all(text.as_bytes())?;
        self.serial.write_all(b"\r\n")?;
        self.serial.flush()
    }

    fn write_file(&mut self, stamp: &Timestamp, text: &str) -> Result<(), F::Error> {
        self.file.write_all(stamp.format().as_bytes())?;
        self.file.write_all(b" : ")?;
        self.file.write_all(text.as_bytes())?;
        self.file.write_all(b"\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[derive(Default)]
    struct Capture {
        data: Vec<u8, 256>,
        flushes: usize,
    }

    impl ErrorType for Capture {
        type Error = ErrorKind;
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.data
                .extend_from_slice(buf)
                .map_err(|_| ErrorKind::OutOfMemory)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.flushes += 1;
            Ok(())
        }
    }

    struct Broken;

    impl ErrorType for Broken {
        type Error = ErrorKind;
    }

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> Result<usize, Self::Error> {
            Err(ErrorKind::NotConnected)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Err(ErrorKind::NotConnected)
        }
    }

    const STAMP: Timestamp = Timestamp::new(2024, 1, 6, 17, 13, 10);

    #[test]
    fn test_level_mask() {
        assert!(!DebugLevel::Disabled.serial() && !DebugLevel::Disabled.file());
        assert!(DebugLevel::Serial.serial() && !DebugLevel::Serial.file());
        assert!(!DebugLevel::File.serial() && DebugLevel::File.file());
        assert!(DebugLevel::SerialAndFile.serial() && DebugLevel::SerialAndFile.file());
    }

    #[test]
    fn test_serial_and_file_lines() {
        let mut log = DebugLog::new(
            DebugLevel::SerialAndFile,
            Capture::default(),
            Capture::default(),
        );
        log.message(&STAMP, "Radio init OK").unwrap();
        log.flush().unwrap();

        let (serial, file) = log.into_inner();
        assert_eq!(serial.data.as_slice(), b"Radio init OK\r\n");
        assert_eq!(serial.flushes, 1);
        assert_eq!(file.data.as_slice(), b"06-02-2024 17:13:10 : Radio init OK\n");
        assert_eq!(file.flushes, 1);
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let mut log = DebugLog::new(DebugLevel::Disabled, Capture::default(), Capture::default());
        log.message(&STAMP, "ignored").unwrap();
        log.flush().unwrap();
        let (serial, file) = log.into_inner();
        assert!(serial.data.is_empty());
        assert!(file.data.is_empty());
        assert_eq!(file.flushes, 0);
    }

    #[test]
    fn test_file_only_skips_serial() {
        let mut log = DebugLog::new(DebugLevel::File, Broken, Capture::default());
        log.message(&STAMP, "stored").unwrap();
        let (_, file) = log.into_inner();
        assert_eq!(file.data.as_slice(), b"06-02-2024 17:13:10 : stored\n");
    }

    #[test]
    fn test_sink_errors_are_reported() {
        let mut log = DebugLog::new(DebugLevel::Serial, Broken, Discard);
        assert_eq!(
            log.message(&STAMP, "lost"),
            Err(LogError::Serial(ErrorKind::NotConnected))
        );

        let mut log = DebugLog::new(DebugLevel::File, Discard, Broken);
        assert_eq!(
            log.message(&STAMP, "lost"),
            Err(LogError::File(ErrorKind::NotConnected))
        );
        assert_eq!(log.flush(), Err(LogError::File(ErrorKind::NotConnected)));
    }
}

//! Calendar timestamp kept by the software clock.
//!
//! A [`Timestamp`] is a plain set of calendar fields. It is advanced one tick at
//! a time by [`crate::rtc::PseudoRtc`], so the arithmetic here only ever has to
//! carry a single step per field; it is not a general date library.
//!
//! # Field conventions
//!
//! - `month` is zero-based (0 = January, 11 = December)
//! - `day` is one-based (1..=days in month)
//! - `year` has four digits and wraps from 9999 back to 0

use core::fmt::{self, Write};

use heapless::String;

/// Largest representable year. The timestamp text has a four-digit year field.
pub const MAX_YEAR: u16 = 9999;

/// Length of a formatted `DD-MM-YYYY HH:MM:SS` timestamp.
pub const TIMESTAMP_LEN: usize = 19;

/// Size of the NUL-padded timestamp field carried in telemetry packets.
pub const TIMESTAMP_FIELD_LEN: usize = 24;

/// Formatted timestamp text.
///
/// Sized for the widest possible field values, so formatting an unvalidated
/// timestamp never truncates.
pub type TimestampString = String<32>;

/// Three-letter English month names, as produced by build tools.
pub const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Days per month in a common year. February is substituted in leap years.
const DAYS_OF_MONTH: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Errors from parsing build date/time strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum ParseError {
    /// Month name is not one of `Jan`..`Dec`
    UnknownMonth,
    /// Date is not `"Mon DD YYYY"`
    MalformedDate,
    /// Time is not `"HH:MM:SS"`
    MalformedTime,
    /// Fields parsed but do not form a valid calendar time
    OutOfRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMonth => write!(f, "Unknown month name"),
            Self::MalformedDate => write!(f, "Malformed date"),
            Self::MalformedTime => write!(f, "Malformed time"),
            Self::OutOfRange => write!(f, "Date/time out of range"),
        }
    }
}

impl core::error::Error for ParseError {}

/// Gregorian leap year rule.
///
/// Divisible by 4, except centuries, which are leap years only when also
/// divisible by 400 (2000 is, 1900 and 2100 are not).
pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in a zero-based `month` of `year`.
///
/// Months outside 0..=11 can only come from an unvalidated
/// [`crate::rtc::PseudoRtc::set_time`]; they are treated as 31-day months.
pub const fn days_in_month(month: u8, year: u16) -> u8 {
    match month {
        1 if is_leap_year(year) => 29,
        0..=11 => DAYS_OF_MONTH[month as usize],
        _ => 31,
    }
}

/// Zero-based month index for a three-letter month name.
pub fn month_from_name(name: &str) -> Option<u8> {
    MONTH_NAMES
        .iter()
        .position(|&candidate| candidate == name)
        .map(|index| index as u8)
}

/// Wall-clock calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct Timestamp {
    pub year: u16,
    /// Zero-based month
    pub month: u8,
    /// One-based day of month
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl Timestamp {
    /// First instant representable by the clock: 01-01-0000 00:00:00.
    pub const EPOCH: Timestamp = Timestamp::new(0, 0, 1, 0, 0, 0);

    /// Builds a timestamp from its fields. Nothing is validated; see
    /// [`Timestamp::is_valid`].
    ///
    /// # Arguments
    ///
    /// * `year` - 0..=9999
    /// * `month` - Zero-based, 0 = January
    /// * `day` - One-based day of the month
    /// * `hour`, `minute`, `second` - Time of day, 24-hour clock
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Whether February of this timestamp's year has 29 days.
    pub const fn is_leap_year(&self) -> bool {
        is_leap_year(self.year)
    }

    /// Checks every field against its calendar range.
    pub const fn is_valid(&self) -> bool {
        self.year <= MAX_YEAR
            && self.month <= 11
            && self.day >= 1
            && self.day <= days_in_month(self.month, self.year)
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
    }

    /// Advances the calendar by `seconds` (at most 60).
    ///
    /// Carries cascade second → minute → hour → day → month → year, with one
    /// carry step per field. Runs inside the tick interrupt: no I/O, no panics,
    /// even for out-of-range fields installed by an unvalidated `set_time`.
    pub fn advance(&mut self, seconds: u8) {
        self.second = self.second.saturating_add(seconds);
        if self.second > 59 {
            self.second -= 60;
            self.minute = self.minute.saturating_add(1);
        }
        if self.minute > 59 {
            self.minute = 0;
            self.hour = self.hour.saturating_add(1);
        }
        if self.hour > 23 {
            self.hour = 0;
            self.day = self.day.saturating_add(1);
        }
        if self.day > days_in_month(self.month, self.year) {
            self.day = 1;
            self.month = self.month.saturating_add(1);
        }
        if self.month > 11 {
            self.month = 0;
            self.year = self.year.saturating_add(1);
        }
        if self.year > MAX_YEAR {
            self.year = 0;
        }
    }

    /// Formats as `DD-MM-YYYY HH:MM:SS`.
    pub fn format(&self) -> TimestampString {
        let mut text = TimestampString::new();
        // Capacity covers the widest field values, so this cannot fail.
        let _ = write!(text, "{self}");
        text
    }

    /// Writes the formatted timestamp into `buffer` and returns the number of
    /// bytes written. The text is truncated if `buffer` is too short.
    pub fn write_to(&self, buffer: &mut [u8]) -> usize {
        let text = self.format();
        let len = text.len().min(buffer.len());
        buffer[..len].copy_from_slice(&text.as_bytes()[..len]);
        len
    }

    /// Packed FAT directory-entry date: `(year - 1980) << 9 | month << 5 | day`.
    ///
    /// Years before 1980 clamp to 1980.
    pub fn fat_date(&self) -> u16 {
        let year = self.year.saturating_sub(1980).min(127);
        let month = (u16::from(self.month) + 1) & 0x0F;
        (year << 9) | (month << 5) | (u16::from(self.day) & 0x1F)
    }

    /// Packed FAT directory-entry time: `hour << 11 | minute << 5 | second / 2`.
    pub fn fat_time(&self) -> u16 {
        (u16::from(self.hour & 0x1F) << 11)
            | (u16::from(self.minute & 0x3F) << 5)
            | u16::from((self.second / 2) & 0x1F)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}-{:02}-{:04} {:02}:{:02}:{:02}",
            self.day,
            u16::from(self.month) + 1,
            self.year,
            self.hour,
            self.minute,
            self.second
        )
    }
}

/// Parses build-time strings into a timestamp.
///
/// `date` is `"Mon DD YYYY"` (the day may be space padded, as in
/// `"Feb  6 2024"`) and `time` is `"HH:MM:SS"`.
pub fn parse_build_timestamp(date: &str, time: &str) -> Result<Timestamp, ParseError> {
    let mut fields = date.split_whitespace();
    let (Some(month), Some(day), Some(year), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::MalformedDate);
    };
    let month = month_from_name(month).ok_or(ParseError::UnknownMonth)?;
    let day: u8 = day.parse().map_err(|_| ParseError::MalformedDate)?;
    let year: u16 = year.parse().map_err(|_| ParseError::MalformedDate)?;

    let mut fields = time.trim().split(':');
    let (Some(hour), Some(minute), Some(second), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseError::MalformedTime);
    };
    let hour: u8 = hour.parse().map_err(|_| ParseError::MalformedTime)?;
    let minute: u8 = minute.parse().map_err(|_| ParseError::MalformedTime)?;
    let second: u8 = second.parse().map_err(|_| ParseError::MalformedTime)?;

    let stamp = Timestamp::new(year, month, day, hour, minute, second);
    if !stamp.is_valid() {
        return Err(ParseError::OutOfRange);
    }
    Ok(stamp)
}

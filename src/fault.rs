//! Fatal start-up faults and their LED blink codes.
//!
//! When a peripheral fails to initialise the logger cannot do anything
//! useful, so it halts and flashes an 8-bit code on the status LED forever.
//! Bits are sent most significant first: a long flash is a 1, a short flash
//! a 0.

use core::fmt;

use heapless::Vec;

/// Base blink unit in milliseconds.
pub const BLINK_UNIT_MS: u32 = 100;

const BIT_LEAD_MS: u32 = 50;

/// Steps in one repetition: at most four per bit plus the closing gap.
pub const MAX_BLINK_STEPS: usize = 8 * 4 + 1;

/// Unrecoverable start-up failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
#[repr(u8)]
pub enum FaultCode {
    RadioInit = 0b1000_0000,
    AuxSensorInit = 0b0100_0000,
    StorageInit = 0b0010_0000,
    StorageFilename = 0b0010_0001,
    PowerMonitorInit = 0b0001_0000,
}

impl FaultCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self {
            Self::RadioInit => "Radio init failed",
            Self::AuxSensorInit => "Auxiliary sensor init failed",
            Self::StorageInit => "Storage init failed",
            Self::StorageFilename => "Storage filename invalid",
            Self::PowerMonitorInit => "Power monitor init failed",
        };
        write!(f, "{} (0b{:08b})", what, self.code())
    }
}

impl core::error::Error for FaultCode {}

/// Hold the LED in one state for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct BlinkStep {
    pub led_on: bool,
    pub duration_ms: u32,
}

impl BlinkStep {
    const fn on(duration_ms: u32) -> Self {
        Self { led_on: true, duration_ms }
    }

    const fn off(duration_ms: u32) -> Self {
        Self { led_on: false, duration_ms }
    }
}

/// LED steps for one repetition of `code`.
pub fn blink_pattern(code: FaultCode) -> Vec<BlinkStep, MAX_BLINK_STEPS> {
    let mut steps = Vec::new();
    let mut push = |step| {
        // Bounded by MAX_BLINK_STEPS
        let _ = steps.push(step);
    };

    for bit in (0..8).rev() {
        push(BlinkStep::off(BIT_LEAD_MS));
        if (code.code() >> bit) & 1 == 1 {
            push(BlinkStep::on(BLINK_UNIT_MS * 4));
        } else {
            push(BlinkStep::on(BLINK_UNIT_MS));
            push(BlinkStep::off(BLINK_UNIT_MS * 3));
        }
        push(BlinkStep::off(BLINK_UNIT_MS * 4));
    }
    push(BlinkStep::off(BLINK_UNIT_MS * 4));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flashes(code: FaultCode) -> std::vec::Vec<u32> {
        blink_pattern(code)
            .iter()
            .filter(|step| step.led_on)
            .map(|step| step.duration_ms)
            .collect()
    }

    #[test]
    fn test_msb_first_long_and_short() {
        assert_eq!(
            flashes(FaultCode::RadioInit),
            [400, 100, 100, 100, 100, 100, 100, 100]
        );
        assert_eq!(
            flashes(FaultCode::StorageFilename),
            [100, 100, 400, 100, 100, 100, 100, 400]
        );
    }

    #[test]
    fn test_bit_framing() {
        let steps = blink_pattern(FaultCode::RadioInit);
        assert_eq!(
            &steps[..7],
            &[
                BlinkStep::off(50),
                BlinkStep::on(400),
                BlinkStep::off(400),
                BlinkStep::off(50),
                BlinkStep::on(100),
                BlinkStep::off(300),
                BlinkStep::off(400),
            ]
        );
        assert_eq!(steps.last(), Some(&BlinkStep::off(400)));
        assert_eq!(steps.len(), 3 + 7 * 4 + 1);
    }

    #[test]
    fn test_repetition_length() {
        // Every bit takes 850 ms whatever its value
        for code in [FaultCode::PowerMonitorInit, FaultCode::StorageFilename] {
            let total: u32 = blink_pattern(code).iter().map(|s| s.duration_ms).sum();
            assert_eq!(total, 8 * 850 + 400);
        }
    }
}

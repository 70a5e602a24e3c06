//! Byte-range mapping for actuator channels

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Round to the nearest integer, then clamp into a byte. NaN maps to 0.
pub fn clamp_u8(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Linearly map `u` from `[lo, hi]` onto `0..=255`.
///
/// `u` is clamped into the window first. An empty, inverted or non-finite
/// window maps everything to 0.
pub fn map_pwm(u: f64, lo: f64, hi: f64) -> u8 {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return 0;
    }
    let t = (u.clamp(lo, hi) - lo) / (hi - lo);
    clamp_u8(t * 255.0)
}

/// Input range a servo or ESC treats as its full command range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct PwmWindow {
    low_us: f64,
    high_us: f64,
}

impl PwmWindow {
    /// Standard RC servo pulse range
    pub const SERVO_US: PwmWindow = PwmWindow { low_us: 1000.0, high_us: 2000.0 };
    /// Torpedo launcher window, in servo degrees
    pub const TORPEDO: PwmWindow = PwmWindow { low_us: 90.0, high_us: 150.0 };

    pub fn new(low_us: f64, high_us: f64) -> Result<Self> {
        if !(low_us.is_finite() && high_us.is_finite()) || high_us <= low_us {
            return Err(Error::Configuration(format!(
                "PWM window must satisfy low < high (got {low_us}..{high_us})"
            )));
        }
        Ok(Self { low_us, high_us })
    }

    pub fn low_us(&self) -> f64 {
        self.low_us
    }

    pub fn high_us(&self) -> f64 {
        self.high_us
    }

    pub fn map(&self, u: f64) -> u8 {
        map_pwm(u, self.low_us, self.high_us)
    }
}

impl TryFrom<[f64; 2]> for PwmWindow {
    type Error = Error;

    fn try_from([low, high]: [f64; 2]) -> Result<Self> {
        PwmWindow::new(low, high)
    }
}

impl From<PwmWindow> for [f64; 2] {
    fn from(window: PwmWindow) -> Self {
        [window.low_us, window.high_us]
    }
}

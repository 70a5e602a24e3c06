//! Qualification run: a timed open-loop thruster script
//!
//! Drives the motor controller through forward, reverse, dive, forward and
//! surface phases without consulting the record store. Each phase repeats
//! its command every control tick for the phase's hold time.

use std::time::Duration;

use crate::actuator::MotorCommand;

/// One scripted step: a motor command held for a fixed time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    pub name: &'static str,
    pub motors: [u8; 8],
    pub hold: Duration,
}

impl Phase {
    const fn new(name: &'static str, motors: [u8; 8], secs: u64) -> Self {
        Phase { name, motors, hold: Duration::from_secs(secs) }
    }

    pub fn command(&self) -> MotorCommand {
        MotorCommand(self.motors.map(f64::from))
    }

    /// Ticks needed to cover the hold time at `period`, at least one
    pub fn ticks(&self, period: Duration) -> u64 {
        let period = period.as_nanos().max(1);
        let ticks = self.hold.as_nanos().div_ceil(period).max(1);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

const NEUTRAL: [u8; 8] = [127; 8];

pub const SCRIPT: [Phase; 8] = [
    Phase::new("settle", NEUTRAL, 5),
    Phase::new("forward", [255, 255, 0, 255, 255, 255, 0, 0], 4),
    Phase::new("coast", [127, 127, 127, 127, 255, 255, 0, 0], 2),
    Phase::new("reverse", [0, 0, 255, 0, 255, 255, 0, 0], 1),
    Phase::new("neutral", NEUTRAL, 2),
    Phase::new("dive", [127, 127, 127, 127, 0, 0, 255, 255], 3),
    Phase::new("forward", [255, 255, 0, 255, 127, 127, 127, 127], 4),
    Phase::new("surface", [127, 127, 127, 127, 255, 255, 0, 0], 5),
];

/// Total scripted time
pub fn duration() -> Duration {
    SCRIPT.iter().map(|p| p.hold).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_shape() {
        assert_eq!(duration(), Duration::from_secs(26));
        assert_eq!(SCRIPT.first().map(|p| p.motors), Some(NEUTRAL));
        assert_eq!(SCRIPT[3].name, "reverse");
        assert_eq!(SCRIPT[3].command().to_bytes(), [0, 0, 255, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_ticks_cover_hold() {
        let phase = Phase::new("p", NEUTRAL, 1);
        assert_eq!(phase.ticks(Duration::from_millis(20)), 50);
        assert_eq!(phase.ticks(Duration::from_millis(300)), 4);
        assert_eq!(phase.ticks(Duration::from_secs(2)), 1);
        assert_eq!(phase.ticks(Duration::ZERO), 1_000_000_000);
    }
}

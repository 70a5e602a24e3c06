//! Fixed-shape actuator commands, one per controller
//!
//! Built once from an [`OutputRecord`] so the bus layer never sees a
//! free-form channel map. Any channel missing from the record is neutral:
//! mid-scale for thrusters, and the mid-scale output byte for servos, whose
//! commanded values live in their own PWM window.

use crate::bus::pwm::{clamp_u8, PwmWindow};
use crate::store::OutputRecord;

/// Mid-scale byte value every channel falls back to
pub const NEUTRAL: f64 = 127.0;

const NEUTRAL_BYTE: u8 = 127;

fn servo_byte(value: Option<f64>, window: &PwmWindow) -> u8 {
    value.map_or(NEUTRAL_BYTE, |v| window.map(v))
}

/// Thruster bytes for `M1..M8`, sent as-is after clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand(pub [f64; 8]);

impl MotorCommand {
    pub const NEUTRAL: MotorCommand = MotorCommand([NEUTRAL; 8]);

    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.map(clamp_u8)
    }
}

impl Default for MotorCommand {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Launcher servos `S2`, `S3`, in window units. `None` holds the servo at neutral.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TorpedoCommand {
    pub s2_us: Option<f64>,
    pub s3_us: Option<f64>,
}

impl TorpedoCommand {
    pub const NEUTRAL: TorpedoCommand = TorpedoCommand { s2_us: None, s3_us: None };

    pub fn to_bytes(&self, window: &PwmWindow) -> [u8; 2] {
        [servo_byte(self.s2_us, window), servo_byte(self.s3_us, window)]
    }
}

/// Manipulator servo `S1`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArmCommand {
    pub s1_us: Option<f64>,
}

impl ArmCommand {
    pub const NEUTRAL: ArmCommand = ArmCommand { s1_us: None };

    pub fn to_bytes(&self, window: &PwmWindow) -> [u8; 1] {
        [servo_byte(self.s1_us, window)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Motor(MotorCommand),
    Torpedo(TorpedoCommand),
    Arm(ArmCommand),
}

impl ActuatorCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ActuatorCommand::Motor(_) => "motor",
            ActuatorCommand::Torpedo(_) => "torpedo",
            ActuatorCommand::Arm(_) => "arm",
        }
    }
}

/// Everything one control tick commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorSet {
    pub motor: MotorCommand,
    pub torpedo: TorpedoCommand,
    pub arm: ArmCommand,
}

impl ActuatorSet {
    pub fn neutral() -> Self {
        ActuatorSet {
            motor: MotorCommand::NEUTRAL,
            torpedo: TorpedoCommand::NEUTRAL,
            arm: ArmCommand::NEUTRAL,
        }
    }

    pub fn from_record(record: &OutputRecord) -> Self {
        let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
        ActuatorSet {
            motor: MotorCommand(record.motor_channels().map(|v| finite(v).unwrap_or(NEUTRAL))),
            torpedo: TorpedoCommand { s2_us: finite(record.s2), s3_us: finite(record.s3) },
            arm: ArmCommand { s1_us: finite(record.s1) },
        }
    }

    pub fn commands(&self) -> [ActuatorCommand; 3] {
        [
            ActuatorCommand::Motor(self.motor),
            ActuatorCommand::Torpedo(self.torpedo),
            ActuatorCommand::Arm(self.arm),
        ]
    }
}

impl Default for ActuatorSet {
    fn default() -> Self {
        Self::neutral()
    }
}

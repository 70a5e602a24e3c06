/*!
 * I2C bus orchestration
 *
 * Probes the configured devices once at start and drives the write-only
 * actuator controllers every control tick. Probe and write failures are
 * reported as data and logged; nothing here stops the control loop.
 */

pub mod pwm;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::actuator::ActuatorCommand;
use crate::error::{Error, Result};
use pwm::PwmWindow;

/// Register every controller block write starts at
pub const CONTROL_REGISTER: u8 = 0x00;
/// Bytes read by an address probe
pub const PROBE_LEN: usize = 1;

/// 7-bit I2C device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "AddressRepr", into = "u8")]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    pub const MAX: u8 = 0x7F;
    /// Where the thruster controller usually sits
    pub const MOTOR_CONTROLLER: DeviceAddress = DeviceAddress(0x4C);

    pub fn new(raw: u8) -> Result<Self> {
        if raw > Self::MAX {
            return Err(Error::Configuration(format!("I2C address {raw:#04x} is not 7-bit")));
        }
        Ok(DeviceAddress(raw))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

impl From<DeviceAddress> for u8 {
    fn from(addr: DeviceAddress) -> u8 {
        addr.0
    }
}

impl TryFrom<i64> for DeviceAddress {
    type Error = Error;

    fn try_from(raw: i64) -> Result<Self> {
        let byte = u8::try_from(raw)
            .map_err(|_| Error::Configuration(format!("I2C address {raw} out of range")))?;
        DeviceAddress::new(byte)
    }
}

impl FromStr for DeviceAddress {
    type Err = Error;

    /// Accepts `0x`-prefixed hex or plain decimal
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => s.parse::<i64>(),
        };
        let raw = parsed.map_err(|_| Error::Configuration(format!("invalid I2C address '{s}'")))?;
        DeviceAddress::try_from(raw)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Int(i64),
    Text(String),
}

impl TryFrom<AddressRepr> for DeviceAddress {
    type Error = Error;

    fn try_from(repr: AddressRepr) -> Result<Self> {
        match repr {
            AddressRepr::Int(raw) => DeviceAddress::try_from(raw),
            AddressRepr::Text(text) => text.parse(),
        }
    }
}

/// Bus-level failure, split on whether the device simply did not answer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("not acknowledged")]
    NoAcknowledge,
    #[error("{0}")]
    Other(String),
}

/// The two transactions the orchestrator needs from an I2C adapter
pub trait I2cBus {
    fn probe_read(&mut self, address: u8, buffer: &mut [u8]) -> std::result::Result<(), BusError>;

    /// One write transaction: `register` followed by `data`
    fn write_block(&mut self, address: u8, register: u8, data: &[u8]) -> std::result::Result<(), BusError>;
}

/// [`I2cBus`] over any `embedded-hal` 1.0 I2C implementation
pub struct EmbeddedHalBus<I> {
    i2c: I,
}

impl<I: embedded_hal::i2c::I2c> EmbeddedHalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }
}

/// Linux errno for a transfer the adapter saw go unanswered. The Broadcom
/// adapter reports an absent device this way, which `embedded-hal`
/// implementations surface as `ErrorKind::Other`.
const EREMOTEIO: i32 = 121;

fn classify<E: embedded_hal::i2c::Error>(err: E) -> BusError {
    use embedded_hal::i2c::ErrorKind;
    let text = format!("{err:?}");
    match err.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::NoAcknowledge,
        _ if is_remote_io(&text) => BusError::NoAcknowledge,
        _ => BusError::Other(text),
    }
}

//matches the errno in the adapter's error text: `Errno(121)`, `code: 121`, `os error 121`
fn is_remote_io(text: &str) -> bool {
    if text.contains("Remote I/O error") {
        return true;
    }

    let errno = EREMOTEIO.to_string();
    ["Errno(", "code: ", "os error "].iter().any(|prefix| {
        text.match_indices(prefix).any(|(at, _)| {
            let rest = &text[at + prefix.len()..];
            rest.starts_with(&errno) && !rest[errno.len()..].starts_with(|c: char| c.is_ascii_digit())
        })
    })
}

impl<I: embedded_hal::i2c::I2c> I2cBus for EmbeddedHalBus<I> {
    fn probe_read(&mut self, address: u8, buffer: &mut [u8]) -> std::result::Result<(), BusError> {
        self.i2c.read(address, buffer).map_err(classify)
    }

    fn write_block(&mut self, address: u8, register: u8, data: &[u8]) -> std::result::Result<(), BusError> {
        let mut frame = Vec::with_capacity(1 + data.len());
        frame.push(register);
        frame.extend_from_slice(data);
        self.i2c.write(address, &frame).map_err(classify)
    }
}

/// Outcome of probing one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: DeviceAddress,
    pub present: bool,
    pub reason: Option<String>,
    /// `Info` for present or silent devices, `Error` for bus faults
    pub severity: log::Level,
}

impl ProbeResult {
    pub fn require_present(&self) -> Result<()> {
        if self.present {
            Ok(())
        } else {
            Err(Error::DeviceNotPresent(self.address))
        }
    }
}

/// Addresses and mappings fixed at start-up
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub motor_controller: DeviceAddress,
    pub torpedo_controller: Option<DeviceAddress>,
    pub arm_controller: Option<DeviceAddress>,
    /// Every configured address, probed at start unless skipped
    pub devices: Vec<DeviceAddress>,
    /// Write-only controllers that must never be read-probed
    pub skip_probe: BTreeSet<DeviceAddress>,
    pub torpedo_window: PwmWindow,
    pub arm_window: PwmWindow,
}

impl OrchestratorConfig {
    pub fn new(motor_controller: DeviceAddress) -> Self {
        OrchestratorConfig {
            motor_controller,
            torpedo_controller: None,
            arm_controller: None,
            devices: vec![motor_controller],
            skip_probe: BTreeSet::from([motor_controller]),
            torpedo_window: PwmWindow::TORPEDO,
            arm_window: PwmWindow::SERVO_US,
        }
    }
}

pub struct BusOrchestrator<B: I2cBus> {
    bus: B,
    config: OrchestratorConfig,
}

impl<B: I2cBus> BusOrchestrator<B> {
    pub fn new(bus: B, config: OrchestratorConfig) -> Self {
        Self { bus, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Probe every address not in `skip`, in order. Never fails; faults are
    /// carried in the results and logged at the classified level.
    pub fn probe_all(&mut self, addresses: &[DeviceAddress], skip: &BTreeSet<DeviceAddress>) -> Vec<ProbeResult> {
        let mut results = Vec::new();
        for &address in addresses {
            if skip.contains(&address) {
                log::debug!("skipping probe of {address}");
                continue;
            }

            let mut buffer = [0u8; PROBE_LEN];
            let result = match self.bus.probe_read(address.get(), &mut buffer) {
                Ok(()) => ProbeResult { address, present: true, reason: None, severity: log::Level::Info },
                Err(BusError::NoAcknowledge) => ProbeResult {
                    address,
                    present: false,
                    reason: Some(BusError::NoAcknowledge.to_string()),
                    severity: log::Level::Info,
                },
                Err(BusError::Other(reason)) => ProbeResult {
                    address,
                    present: false,
                    reason: Some(reason),
                    severity: log::Level::Error,
                },
            };

            match &result.reason {
                None => log::log!(result.severity, "device at {address}: present"),
                Some(reason) => log::log!(result.severity, "device at {address}: absent ({reason})"),
            }
            results.push(result);
        }
        results
    }

    /// Probe the configured device list with the configured skip set
    pub fn probe_configured(&mut self) -> Vec<ProbeResult> {
        let devices = self.config.devices.clone();
        let skip = self.config.skip_probe.clone();
        log::info!(
            "probing {} devices (skipped: {:?})",
            devices.len(),
            skip.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
        self.probe_all(&devices, &skip)
    }

    /// Write one command to its controller. Returns whether the write went
    /// through; failures are logged, never raised.
    pub fn send_actuator_command(&mut self, command: &ActuatorCommand) -> bool {
        let (address, bytes): (Option<DeviceAddress>, Vec<u8>) = match command {
            ActuatorCommand::Motor(cmd) => (Some(self.config.motor_controller), cmd.to_bytes().to_vec()),
            ActuatorCommand::Torpedo(cmd) => {
                (self.config.torpedo_controller, cmd.to_bytes(&self.config.torpedo_window).to_vec())
            }
            ActuatorCommand::Arm(cmd) => (self.config.arm_controller, cmd.to_bytes(&self.config.arm_window).to_vec()),
        };

        let Some(address) = address else {
            log::trace!("no {} controller configured", command.name());
            return false;
        };

        match self.bus.write_block(address.get(), CONTROL_REGISTER, &bytes) {
            Ok(()) => {
                log::trace!("{} command to {address}: {bytes:?}", command.name());
                true
            }
            Err(e) => {
                log::error!("failed to send {} command to {address}: {e}", command.name());
                false
            }
        }
    }
}

//! Hardware configuration
//!
//! Read from the vehicle's JSON config. A per-host local file can be
//! overlaid on the shared global one; local keys win.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::pwm::PwmWindow;
use crate::bus::{DeviceAddress, OrchestratorConfig};
use crate::error::{Error, Result};
use crate::telemetry::ImuProtocol;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// Linux I2C adapter number (`/dev/i2c-N`)
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    #[serde(rename = "IMU_Address", default)]
    pub imu_address: Option<DeviceAddress>,
    #[serde(rename = "Hydrophone_Address", default)]
    pub hydrophone_address: Option<DeviceAddress>,
    /// Write-only thruster controller, never read-probed
    #[serde(rename = "Motor_Controller_Address", default = "default_motor_address")]
    pub motor_controller_address: DeviceAddress,
    #[serde(rename = "Display_Address", default)]
    pub display_address: Option<DeviceAddress>,
    #[serde(rename = "Torpedo_Address", alias = "Torpedo_Controller_Address", default)]
    pub torpedo_address: Option<DeviceAddress>,
    #[serde(rename = "Arm_Controller_Address", default)]
    pub arm_controller_address: Option<DeviceAddress>,
    #[serde(rename = "Power_Safety_Address", default)]
    pub power_safety_address: Option<DeviceAddress>,
    #[serde(rename = "Skip_Probe_Addresses", default)]
    pub skip_probe_addresses: Vec<DeviceAddress>,

    /// IMU serial port
    #[serde(rename = "BNO08x_Port", default = "default_imu_port")]
    pub imu_port: String,
    #[serde(rename = "BNO08x_Baudrate", default = "default_imu_baud")]
    pub imu_baud: u32,
    /// Read timeout in seconds
    #[serde(rename = "BNO08x_Timeout", default = "default_imu_timeout")]
    pub imu_timeout: f64,
    #[serde(rename = "IMU_Protocol", default)]
    pub imu_protocol: ImuProtocol,

    /// Record store host, with or without scheme
    #[serde(rename = "DB_Address", default = "default_db_address")]
    pub db_address: String,
    #[serde(rename = "DB_Port", default = "default_db_port")]
    pub db_port: u16,

    #[serde(rename = "Torpedo_PWM_Window", default = "default_torpedo_window")]
    pub torpedo_window: PwmWindow,
    #[serde(rename = "Arm_PWM_Window", default = "default_arm_window")]
    pub arm_window: PwmWindow,

    #[serde(rename = "Control_Rate_Hz", default = "default_rate_hz")]
    pub control_rate_hz: f64,
    #[serde(rename = "Sensor_Rate_Hz", default = "default_rate_hz")]
    pub sensor_rate_hz: f64,
}

fn default_i2c_bus() -> u8 {
    1
}

fn default_motor_address() -> DeviceAddress {
    DeviceAddress::MOTOR_CONTROLLER
}

fn default_imu_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_imu_baud() -> u32 {
    115_200
}

fn default_imu_timeout() -> f64 {
    1.0
}

fn default_db_address() -> String {
    "http://localhost".to_string()
}

fn default_db_port() -> u16 {
    8000
}

fn default_torpedo_window() -> PwmWindow {
    PwmWindow::TORPEDO
}

fn default_arm_window() -> PwmWindow {
    PwmWindow::SERVO_US
}

fn default_rate_hz() -> f64 {
    50.0
}

impl HardwareConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(contents)?)
    }

    /// Load the global config with the local file's keys laid over it
    pub fn load_merged<P: AsRef<Path>, Q: AsRef<Path>>(global: P, local: Q) -> Result<Self> {
        let global: Value = serde_json::from_str(&fs::read_to_string(global)?)?;
        let local: Value = serde_json::from_str(&fs::read_to_string(local)?)?;
        Self::from_value(merge(global, local)?)
    }

    fn from_value(value: Value) -> Result<Self> {
        let config: HardwareConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.imu_timeout.is_finite() && self.imu_timeout > 0.0) {
            return Err(Error::Configuration(format!(
                "BNO08x_Timeout must be a positive number of seconds (got {})",
                self.imu_timeout
            )));
        }
        for (key, rate) in [("Control_Rate_Hz", self.control_rate_hz), ("Sensor_Rate_Hz", self.sensor_rate_hz)] {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(Error::Configuration(format!("{key} must be positive (got {rate})")));
            }
        }
        Ok(())
    }

    pub fn imu_read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.imu_timeout)
    }

    /// Every configured device address, in config order, without repeats
    pub fn device_addresses(&self) -> Vec<DeviceAddress> {
        let candidates = [
            self.imu_address,
            self.hydrophone_address,
            Some(self.motor_controller_address),
            self.display_address,
            self.torpedo_address,
            self.arm_controller_address,
            self.power_safety_address,
        ];

        let mut out: Vec<DeviceAddress> = Vec::new();
        for addr in candidates.into_iter().flatten() {
            if !out.contains(&addr) {
                out.push(addr);
            }
        }
        out
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut skip_probe: BTreeSet<DeviceAddress> = self.skip_probe_addresses.iter().copied().collect();
        skip_probe.insert(self.motor_controller_address);

        OrchestratorConfig {
            motor_controller: self.motor_controller_address,
            torpedo_controller: self.torpedo_address,
            arm_controller: self.arm_controller_address,
            devices: self.device_addresses(),
            skip_probe,
            torpedo_window: self.torpedo_window,
            arm_window: self.arm_window,
        }
    }
}

fn merge(global: Value, local: Value) -> Result<Value> {
    match (global, local) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Ok(Value::Object(base))
        }
        _ => Err(Error::Configuration("config files must hold JSON objects".to_string())),
    }
}

//! Legacy IMU link: the board pushes codec `POST` frames carrying JSON
//!
//! ```text
//! {"vel_ms":{"X_vel":..,"Y_vel":..,"Z_vel":..},"euler_deg":{"Roll":..,"Pitch":..,"Yaw":..}}
//! ```
//!
//! Kept for boards still running the older firmware. It has no way to
//! express home or velocity-reset commands.

use serde::Deserialize;

use super::{TelemetrySample, TelemetryTransport};
use crate::codec::{Command, FrameCodec, CHECKSUM_LEN, HEADER_LEN, MAGIC};
use crate::error::{Error, Result};
use crate::transport::Transport;

const MAX_PAYLOAD_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
struct ImuReport {
    #[serde(default)]
    micros: u32,
    vel_ms: Velocity,
    euler_deg: Euler,
}

#[derive(Debug, Default, Deserialize)]
struct Velocity {
    #[serde(rename = "X_vel", default)]
    x: f32,
    #[serde(rename = "Y_vel", default)]
    y: f32,
    #[serde(rename = "Z_vel", default)]
    z: f32,
}

#[derive(Debug, Default, Deserialize)]
struct Euler {
    #[serde(rename = "Roll", default)]
    roll: f32,
    #[serde(rename = "Pitch", default)]
    pitch: f32,
    #[serde(rename = "Yaw", default)]
    yaw: f32,
}

pub struct MessageHandlerImu<T: Transport> {
    transport: T,
    codec: FrameCodec,
}

impl<T: Transport> MessageHandlerImu<T> {
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, FrameCodec::default())
    }

    pub fn with_codec(transport: T, codec: FrameCodec) -> Self {
        Self { transport, codec }
    }

    //raw bytes of the next binary codec frame
    fn read_raw_frame(&mut self) -> Result<Vec<u8>> {
        let mut prev: Option<u8> = None;
        let mut byte = [0u8; 1];
        loop {
            self.transport.read_exact(&mut byte)?;
            if prev == Some(MAGIC[0]) && byte[0] == MAGIC[1] {
                break;
            }
            prev = Some(byte[0]);
        }

        let mut frame = vec![0u8; HEADER_LEN];
        frame[..2].copy_from_slice(&MAGIC);
        self.transport.read_exact(&mut frame[2..])?;

        let len = u16::from_be_bytes([frame[6], frame[7]]) as usize;
        if len > MAX_PAYLOAD_LEN {
            return Err(Error::FrameFormat(format!("unreasonable payload length {len}")));
        }

        frame.resize(HEADER_LEN + len + CHECKSUM_LEN, 0);
        self.transport.read_exact(&mut frame[HEADER_LEN..])?;
        Ok(frame)
    }
}

impl<T: Transport> TelemetryTransport for MessageHandlerImu<T> {
    fn get_imu_sample(&mut self) -> Result<TelemetrySample> {
        self.transport.clear_input()?;
        loop {
            let raw = self.read_raw_frame()?;
            let frame = self.codec.parse_verified(&raw)?;
            if frame.command != Command::Post {
                log::debug!("ignoring {} frame from {}", frame.command.name(), frame.source);
                continue;
            }

            let report: ImuReport = serde_json::from_slice(&frame.payload)?;
            return Ok(TelemetrySample {
                micros: report.micros,
                roll_deg: report.euler_deg.roll,
                pitch_deg: report.euler_deg.pitch,
                yaw_deg: report.euler_deg.yaw,
                vx: report.vel_ms.x,
                vy: report.vel_ms.y,
                vz: report.vel_ms.z,
                ..Default::default()
            });
        }
    }

    fn set_home_to_current_attitude(&mut self) -> Result<()> {
        Err(Error::NotSupported("set home on message-handler IMU"))
    }

    fn set_home_explicit(&mut self, _roll_deg: f32, _pitch_deg: f32, _yaw_deg: f32) -> Result<()> {
        Err(Error::NotSupported("set home on message-handler IMU"))
    }

    fn reset_velocity_integrator(&mut self) -> Result<()> {
        Err(Error::NotSupported("velocity reset on message-handler IMU"))
    }
}

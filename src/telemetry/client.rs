//! Request/response client for the IMU board
//!
//! Frame format (little-endian):
//!
//! ```text
//! 'B' 'R' | len:u16 | msg_id:u16 | src:u8 | dst:u8 | payload[len] | checksum:u16
//! ```
//!
//! The checksum is the 16-bit truncated sum of every byte from the start
//! marker through the end of the payload. At most one request is in flight;
//! every call flushes stale input before sending.

use super::{TelemetrySample, TelemetryTransport};
use crate::codec::checksum16;
use crate::error::{Error, Result};
use crate::transport::Transport;

pub const START: [u8; 2] = *b"BR";
/// len(2) + msg_id(2) + src(1) + dst(1)
const HEADER_REST_LEN: usize = 6;
pub const MAX_PAYLOAD_LEN: usize = 4096;

pub const DEFAULT_HOST_ID: u8 = 0x00;
pub const DEFAULT_DEVICE_ID: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageId {
    GetImu = 0x0101,
    SetHome = 0x0102,
    ResetVelocity = 0x0103,
    ImuResponse = 0x8101,
    Ack = 0x8000,
    Nack = 0x8001,
}

impl MessageId {
    pub fn from_u16(val: u16) -> Option<Self> {
        match val {
            0x0101 => Some(MessageId::GetImu),
            0x0102 => Some(MessageId::SetHome),
            0x0103 => Some(MessageId::ResetVelocity),
            0x8101 => Some(MessageId::ImuResponse),
            0x8000 => Some(MessageId::Ack),
            0x8001 => Some(MessageId::Nack),
            _ => None,
        }
    }
}

/// One checksum-validated frame from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFrame {
    pub msg_id: u16,
    pub source: u8,
    pub destination: u8,
    pub payload: Vec<u8>,
}

pub fn encode_frame(msg_id: u16, source: u8, destination: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(START.len() + HEADER_REST_LEN + payload.len() + 2);
    frame.extend_from_slice(&START);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&msg_id.to_le_bytes());
    frame.push(source);
    frame.push(destination);
    frame.extend_from_slice(payload);

    let checksum = checksum16(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame
}

pub struct ImuClient<T: Transport> {
    transport: T,
    host_id: u8,
    device_id: u8,
}

impl<T: Transport> ImuClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_ids(transport, DEFAULT_HOST_ID, DEFAULT_DEVICE_ID)
    }

    pub fn with_ids(transport: T, host_id: u8, device_id: u8) -> Self {
        Self {
            transport,
            host_id,
            device_id,
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn send(&mut self, msg_id: MessageId, payload: &[u8]) -> Result<()> {
        self.transport.clear_input()?;
        let frame = encode_frame(msg_id as u16, self.host_id, self.device_id, payload);
        self.transport.write_all(&frame)?;
        self.transport.flush()
    }

    /// Send a request that must be answered with an ACK
    fn command(&mut self, msg_id: MessageId, payload: &[u8]) -> Result<()> {
        self.send(msg_id, payload)?;
        let reply = self.read_frame()?;
        if reply.msg_id != MessageId::Ack as u16 {
            log::warn!("{:?} answered with {:#06x}", msg_id, reply.msg_id);
            return Err(Error::CommandFailed {
                request: msg_id as u16,
                reply: reply.msg_id,
            });
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.transport.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    //discard until 'B','R'
    fn sync_to_start(&mut self) -> Result<()> {
        let mut prev: Option<u8> = None;
        let mut discarded = 0usize;
        loop {
            let byte = self.read_byte()?;
            if prev == Some(START[0]) && byte == START[1] {
                break;
            }
            if prev.is_some() {
                discarded += 1;
            }
            prev = Some(byte);
        }
        if discarded > 0 {
            log::trace!("discarded {} bytes before start marker", discarded);
        }
        Ok(())
    }

    /// Block for the next complete frame
    pub fn read_frame(&mut self) -> Result<DeviceFrame> {
        self.sync_to_start()?;

        let mut rest = [0u8; HEADER_REST_LEN];
        self.transport.read_exact(&mut rest)?;
        let len = u16::from_le_bytes([rest[0], rest[1]]) as usize;
        let msg_id = u16::from_le_bytes([rest[2], rest[3]]);
        if len > MAX_PAYLOAD_LEN {
            return Err(Error::FrameFormat(format!("unreasonable payload length {len}")));
        }

        let mut payload = vec![0u8; len];
        self.transport.read_exact(&mut payload)?;
        let mut tail = [0u8; 2];
        self.transport.read_exact(&mut tail)?;

        let actual = u16::from_le_bytes(tail);
        let expected = checksum16(&START)
            .wrapping_add(checksum16(&rest))
            .wrapping_add(checksum16(&payload));
        if actual != expected {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        Ok(DeviceFrame {
            msg_id,
            source: rest[4],
            destination: rest[5],
            payload,
        })
    }
}

impl<T: Transport> TelemetryTransport for ImuClient<T> {
    fn get_imu_sample(&mut self) -> Result<TelemetrySample> {
        self.send(MessageId::GetImu, &[])?;
        loop {
            let frame = self.read_frame()?;
            match MessageId::from_u16(frame.msg_id) {
                Some(MessageId::ImuResponse) => return TelemetrySample::from_payload(&frame.payload),
                Some(MessageId::Nack) => {
                    return Err(Error::DeviceRejected {
                        code: frame.payload.first().copied(),
                    })
                }
                _ => log::debug!("ignoring frame {:#06x} while waiting for IMU data", frame.msg_id),
            }
        }
    }

    fn set_home_to_current_attitude(&mut self) -> Result<()> {
        self.command(MessageId::SetHome, &[])
    }

    fn set_home_explicit(&mut self, roll_deg: f32, pitch_deg: f32, yaw_deg: f32) -> Result<()> {
        let mut payload = Vec::with_capacity(12);
        for v in [roll_deg, pitch_deg, yaw_deg] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        self.command(MessageId::SetHome, &payload)
    }

    fn reset_velocity_integrator(&mut self) -> Result<()> {
        self.command(MessageId::ResetVelocity, &[])
    }
}

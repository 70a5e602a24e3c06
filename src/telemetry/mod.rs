/*!
 * IMU telemetry
 *
 * Decoded samples, the capability interface both IMU wire protocols
 * implement, and a fixed-rate sample stream on top of it.
 */

pub mod client;
pub mod legacy;

pub use client::{ImuClient, MessageId};
pub use legacy::MessageHandlerImu;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schedule::{Clock, FixedPeriod, SystemClock};
use crate::transport::Transport;

pub const IMU_PAYLOAD_LEN: usize = 42;
pub const LEGACY_IMU_PAYLOAD_LEN: usize = 30;

/// One IMU reading.
///
/// Velocities are body-frame m/s, zero for the legacy payload. Linear
/// acceleration is gravity-removed, except on the legacy payload where it
/// still includes gravity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TelemetrySample {
    /// Device clock, monotonic microseconds
    pub micros: u32,
    pub rv_status: u8,
    pub accel_status: u8,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
    pub ax_lin: f32,
    pub ay_lin: f32,
    pub az_lin: f32,
    pub is_legacy_payload: bool,
}

//length is checked by the caller
struct LeFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LeFields<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

impl TelemetrySample {
    /// Decode an IMU response payload, picking the shape by length.
    ///
    /// 42 bytes: `micros:u32 rv:u8 la:u8 roll pitch yaw vx vy vz ax ay az` (f32 LE)
    ///
    /// 30 bytes (legacy): `micros:u32 rv:u8 acc:u8 yaw pitch roll ax ay az` (f32 LE)
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut f = LeFields::new(payload);
        match payload.len() {
            IMU_PAYLOAD_LEN => Ok(TelemetrySample {
                micros: f.u32(),
                rv_status: f.u8(),
                accel_status: f.u8(),
                roll_deg: f.f32(),
                pitch_deg: f.f32(),
                yaw_deg: f.f32(),
                vx: f.f32(),
                vy: f.f32(),
                vz: f.f32(),
                ax_lin: f.f32(),
                ay_lin: f.f32(),
                az_lin: f.f32(),
                is_legacy_payload: false,
            }),
            LEGACY_IMU_PAYLOAD_LEN => {
                let micros = f.u32();
                let rv_status = f.u8();
                let accel_status = f.u8();
                let yaw_deg = f.f32();
                let pitch_deg = f.f32();
                let roll_deg = f.f32();
                Ok(TelemetrySample {
                    micros,
                    rv_status,
                    accel_status,
                    roll_deg,
                    pitch_deg,
                    yaw_deg,
                    vx: 0.0,
                    vy: 0.0,
                    vz: 0.0,
                    ax_lin: f.f32(),
                    ay_lin: f.f32(),
                    az_lin: f.f32(),
                    is_legacy_payload: true,
                })
            }
            len => Err(Error::PayloadFormat { len }),
        }
    }
}

/// What an IMU link can do, independent of its framing
pub trait TelemetryTransport {
    fn get_imu_sample(&mut self) -> Result<TelemetrySample>;

    /// Zero orientation at the current attitude
    fn set_home_to_current_attitude(&mut self) -> Result<()>;

    /// Set the home attitude explicitly, in degrees
    fn set_home_explicit(&mut self, roll_deg: f32, pitch_deg: f32, yaw_deg: f32) -> Result<()>;

    /// Zero the onboard velocity integrator
    fn reset_velocity_integrator(&mut self) -> Result<()>;

    /// Unbounded sample stream at one request per `period`
    fn stream(&mut self, period: Duration) -> TelemetryStream<'_, Self, SystemClock>
    where
        Self: Sized,
    {
        TelemetryStream::new(self, FixedPeriod::new(SystemClock, period))
    }
}

impl<T: TelemetryTransport + ?Sized> TelemetryTransport for Box<T> {
    fn get_imu_sample(&mut self) -> Result<TelemetrySample> {
        (**self).get_imu_sample()
    }

    fn set_home_to_current_attitude(&mut self) -> Result<()> {
        (**self).set_home_to_current_attitude()
    }

    fn set_home_explicit(&mut self, roll_deg: f32, pitch_deg: f32, yaw_deg: f32) -> Result<()> {
        (**self).set_home_explicit(roll_deg, pitch_deg, yaw_deg)
    }

    fn reset_velocity_integrator(&mut self) -> Result<()> {
        (**self).reset_velocity_integrator()
    }
}

/// Which framing the IMU speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImuProtocol {
    /// Little-endian request/response protocol (canonical)
    #[default]
    Binary,
    /// Legacy: device pushes codec POST frames with a JSON body
    MessageHandler,
}

impl ImuProtocol {
    pub fn bind<T: Transport + 'static>(self, transport: T) -> Box<dyn TelemetryTransport + Send> {
        match self {
            ImuProtocol::Binary => Box::new(ImuClient::new(transport)),
            ImuProtocol::MessageHandler => Box::new(MessageHandlerImu::new(transport)),
        }
    }
}

/// Lazy, unbounded sequence of samples, one request per tick.
///
/// Errors are yielded, not swallowed; the stream keeps going after one.
pub struct TelemetryStream<'a, T: TelemetryTransport + ?Sized, C: Clock> {
    source: &'a mut T,
    ticker: FixedPeriod<C>,
}

impl<'a, T: TelemetryTransport + ?Sized, C: Clock> TelemetryStream<'a, T, C> {
    pub fn new(source: &'a mut T, ticker: FixedPeriod<C>) -> Self {
        Self { source, ticker }
    }
}

impl<T: TelemetryTransport + ?Sized, C: Clock> Iterator for TelemetryStream<'_, T, C> {
    type Item = Result<TelemetrySample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ticker.tick();
        Some(self.source.get_imu_sample())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schedule::testing::ManualClock;

    pub(crate) fn payload_42(micros: u32, rpy: [f32; 3], vel: [f32; 3], acc: [f32; 3]) -> Vec<u8> {
        let mut p = micros.to_le_bytes().to_vec();
        p.extend_from_slice(&[3, 2]);
        for v in rpy.iter().chain(vel.iter()).chain(acc.iter()) {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p
    }

    pub(crate) fn payload_30(micros: u32, ypr: [f32; 3], acc: [f32; 3]) -> Vec<u8> {
        let mut p = micros.to_le_bytes().to_vec();
        p.extend_from_slice(&[1, 0]);
        for v in ypr.iter().chain(acc.iter()) {
            p.extend_from_slice(&v.to_le_bytes());
        }
        p
    }

    #[test]
    fn test_current_payload_shape() {
        let p = payload_42(1234, [1.0, 2.0, 3.0], [0.5, -0.5, 0.25], [0.1, 0.2, 9.0]);
        assert_eq!(p.len(), IMU_PAYLOAD_LEN);

        let s = TelemetrySample::from_payload(&p).unwrap();
        assert!(!s.is_legacy_payload);
        assert_eq!(s.micros, 1234);
        assert_eq!((s.rv_status, s.accel_status), (3, 2));
        assert_eq!((s.roll_deg, s.pitch_deg, s.yaw_deg), (1.0, 2.0, 3.0));
        assert_eq!((s.vx, s.vy, s.vz), (0.5, -0.5, 0.25));
        assert_eq!(s.az_lin, 9.0);
    }

    #[test]
    fn test_legacy_payload_shape() {
        //legacy order is yaw, pitch, roll
        let p = payload_30(99, [30.0, 20.0, 10.0], [0.0, 0.0, 9.81]);
        assert_eq!(p.len(), LEGACY_IMU_PAYLOAD_LEN);

        let s = TelemetrySample::from_payload(&p).unwrap();
        assert!(s.is_legacy_payload);
        assert_eq!((s.roll_deg, s.pitch_deg, s.yaw_deg), (10.0, 20.0, 30.0));
        assert_eq!((s.vx, s.vy, s.vz), (0.0, 0.0, 0.0));
        assert_eq!(s.az_lin, 9.81);
    }

    #[test]
    fn test_other_lengths_rejected() {
        for len in [0, 29, 31, 41, 43] {
            match TelemetrySample::from_payload(&vec![0u8; len]) {
                Err(Error::PayloadFormat { len: got }) => assert_eq!(got, len),
                other => panic!("length {len}: expected payload error, got {other:?}"),
            }
        }
    }

    struct CountingImu {
        calls: u32,
        clock: ManualClock,
    }

    impl TelemetryTransport for CountingImu {
        fn get_imu_sample(&mut self) -> Result<TelemetrySample> {
            self.calls += 1;
            self.clock.advance(Duration::from_millis(4));
            if self.calls == 2 {
                return Err(Error::Timeout);
            }
            Ok(TelemetrySample { micros: self.calls, ..Default::default() })
        }

        fn set_home_to_current_attitude(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_home_explicit(&mut self, _: f32, _: f32, _: f32) -> Result<()> {
            Ok(())
        }

        fn reset_velocity_integrator(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_paces_requests_and_survives_errors() {
        let clock = ManualClock::new();
        let mut imu = CountingImu { calls: 0, clock: clock.clone() };
        let ticker = FixedPeriod::new(clock.clone(), Duration::from_millis(20));

        let results: Vec<_> = TelemetryStream::new(&mut imu, ticker).take(3).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Timeout)));
        assert_eq!(results[2].as_ref().unwrap().micros, 3);

        //4ms of work per request, the rest of each 20ms period is slept
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(16); 2]);
    }
}

//! Sensing loop: IMU -> store

use crate::error::Result;
use crate::schedule::{Clock, FixedPeriod, SystemClock};
use crate::store::{ImuRecord, RecordStore};
use crate::telemetry::TelemetryTransport;

use super::ControlHandle;

pub const DEFAULT_RATE_HZ: f64 = 50.0;

pub struct SensorLoop<T: TelemetryTransport, S: RecordStore> {
    imu: T,
    store: S,
    handle: ControlHandle,
    rate_hz: f64,
    step_index: u64,
}

impl<T: TelemetryTransport, S: RecordStore> SensorLoop<T, S> {
    pub fn new(imu: T, store: S) -> Self {
        Self {
            imu,
            store,
            handle: ControlHandle::new(),
            rate_hz: DEFAULT_RATE_HZ,
            step_index: 0,
        }
    }

    pub fn with_rate(mut self, rate_hz: f64) -> Self {
        self.rate_hz = rate_hz;
        self
    }

    pub fn with_handle(mut self, handle: ControlHandle) -> Self {
        self.handle = handle;
        self
    }

    pub fn imu_mut(&mut self) -> &mut T {
        &mut self.imu
    }

    /// Step index of the last formatted record
    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Read one sample and publish it. Step indices start at 1 and advance
    /// for every sample read, published or not.
    pub fn tick(&mut self) -> Result<ImuRecord> {
        let sample = self.imu.get_imu_sample()?;
        self.step_index += 1;
        let record = ImuRecord::from_sample(self.step_index, &sample);
        log::debug!("IMU: {record:?}");
        self.store.publish_imu(&record)?;
        Ok(record)
    }

    pub fn run(&mut self) {
        let ticker = FixedPeriod::from_rate_hz(SystemClock, self.rate_hz);
        self.run_with(ticker);
    }

    pub fn run_with<C: Clock>(&mut self, mut ticker: FixedPeriod<C>) {
        log::info!("sensor loop running at {:?} per sample", ticker.period());
        while self.handle.is_running() {
            ticker.tick();
            if let Err(e) = self.tick() {
                log::warn!("sensor step failed: {e}");
            }
        }
        log::info!("sensor loop stopped after {} samples", self.step_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schedule::testing::ManualClock;
    use crate::store::memory::MemoryStore;
    use crate::telemetry::TelemetrySample;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedImu {
        samples: VecDeque<Result<TelemetrySample>>,
        handle: ControlHandle,
    }

    impl TelemetryTransport for ScriptedImu {
        fn get_imu_sample(&mut self) -> Result<TelemetrySample> {
            let next = self.samples.pop_front().unwrap_or(Err(Error::Timeout));
            if self.samples.is_empty() {
                self.handle.shutdown();
            }
            next
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

    fn sample(yaw: f32) -> TelemetrySample {
        TelemetrySample { yaw_deg: yaw, vx: 0.5, ..Default::default() }
    }

    #[test]
    fn test_publishes_with_increasing_step_index() {
        let handle = ControlHandle::new();
        let imu = ScriptedImu {
            samples: VecDeque::from([Ok(sample(10.0)), Err(Error::Timeout), Ok(sample(20.0))]),
            handle: handle.clone(),
        };
        let store = MemoryStore::new();
        let mut sensor = SensorLoop::new(imu, store.clone()).with_handle(handle);

        let clock = ManualClock::new();
        sensor.run_with(FixedPeriod::new(clock.clone(), Duration::from_millis(20)));

        let published = store.published();
        assert_eq!(published.len(), 2);
        assert_eq!((published[0].step_index, published[0].yaw), (1, 10.0));
        assert_eq!((published[1].step_index, published[1].yaw), (2, 20.0));
        assert_eq!(published[1].x, 0.5);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[test]
    fn test_publish_failure_still_advances_step() {
        let imu = ScriptedImu {
            samples: VecDeque::from([Ok(sample(1.0)), Ok(sample(2.0)), Ok(sample(3.0))]),
            handle: ControlHandle::new(),
        };
        let store = MemoryStore::new();
        let mut sensor = SensorLoop::new(imu, store.clone());

        store.set_failing(true);
        assert!(matches!(sensor.tick(), Err(Error::Store(_))));
        store.set_failing(false);
        assert_eq!(sensor.tick().unwrap().step_index, 2);
        assert_eq!(sensor.step_index(), 2);
    }
}

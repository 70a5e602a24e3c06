//! Actuation loop: store -> I2C controllers

use crate::actuator::{ActuatorCommand, ActuatorSet, MotorCommand};
use crate::bus::{BusOrchestrator, I2cBus};
use crate::replay::{self, ReplaySegment};
use crate::schedule::{Clock, FixedPeriod, SystemClock};
use crate::store::RecordStore;

use super::qualify;
use super::ControlHandle;

pub const DEFAULT_RATE_HZ: f64 = 50.0;

pub struct ControlLoop<B: I2cBus, S: RecordStore> {
    orchestrator: BusOrchestrator<B>,
    store: S,
    handle: ControlHandle,
    rate_hz: f64,

    // last applied command, held whenever a fetch fails
    current: ActuatorSet,
    segment: ReplaySegment,
}

impl<B: I2cBus, S: RecordStore> ControlLoop<B, S> {
    pub fn new(orchestrator: BusOrchestrator<B>, store: S) -> Self {
        Self {
            orchestrator,
            store,
            handle: ControlHandle::new(),
            rate_hz: DEFAULT_RATE_HZ,
            current: ActuatorSet::neutral(),
            segment: ReplaySegment::default(),
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

    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn orchestrator(&self) -> &BusOrchestrator<B> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut BusOrchestrator<B> {
        &mut self.orchestrator
    }

    /// Command currently held
    pub fn current(&self) -> &ActuatorSet {
        &self.current
    }

    pub fn segment(&self) -> &ReplaySegment {
        &self.segment
    }

    /// One control step: fetch the latest outputs and drive every controller.
    /// Without a fresh record the previous command is sent again.
    pub fn tick(&mut self) -> ActuatorSet {
        match self.store.latest_output() {
            Ok(Some(record)) => {
                self.current = ActuatorSet::from_record(&record);
                log::trace!("step {}: {:?}", record.step_index, self.current);
            }
            Ok(None) => log::warn!("no outputs available yet, holding last command"),
            Err(e) => log::warn!("failed to fetch latest outputs ({e}), holding last command"),
        }

        for command in self.current.commands() {
            self.orchestrator.send_actuator_command(&command);
        }
        self.current
    }

    /// Run at the configured rate until the handle is shut down
    pub fn run(&mut self) {
        let ticker = FixedPeriod::from_rate_hz(SystemClock, self.rate_hz);
        self.run_with(ticker);
    }

    pub fn run_with<C: Clock>(&mut self, mut ticker: FixedPeriod<C>) {
        log::info!("control loop running at {:?} per tick", ticker.period());

        while self.handle.is_running() {
            ticker.tick();
            if self.handle.take_qualification_request() {
                self.qualify_with(FixedPeriod::new(ticker.clock(), ticker.period()));
            }
            if self.handle.take_replay_request() && self.replay() > 0 {
                self.play_replay_with(FixedPeriod::new(ticker.clock(), ticker.period()));
            }
            if !self.handle.is_running() {
                break;
            }
            self.tick();
        }

        if ticker.overruns() > 0 {
            log::warn!("control loop overran its period {} times", ticker.overruns());
        }

        log::info!("stopping thrusters...");
        self.current = ActuatorSet::neutral();
        self.orchestrator.send_actuator_command(&ActuatorCommand::Motor(MotorCommand::NEUTRAL));
        log::info!("control loop stopped");
    }

    /// Load the newest armed segment from the output history for playback.
    /// Returns the number of rows held; a failed fetch holds nothing.
    pub fn replay(&mut self) -> usize {
        let records = match self.store.list_outputs() {
            Ok(records) => records,
            Err(e) => {
                log::error!("replay: failed to fetch outputs: {e}");
                self.segment = ReplaySegment::default();
                return 0;
            }
        };

        self.segment = replay::extract(&records);
        match self.segment.span() {
            Some((first, last)) => {
                log::info!("replay: stored {} frames (step {first}..{last})", self.segment.len())
            }
            None => log::info!("replay: no complete armed segment between disarmed bounds"),
        }
        self.segment.len()
    }

    /// Drive the motors through the held segment, one row per period, then
    /// return them to neutral. Servos are not replayed. A shutdown cuts the
    /// playback short but still ends on neutral.
    pub fn play_replay(&mut self, rate_hz: f64) {
        self.play_replay_with(FixedPeriod::from_rate_hz(SystemClock, rate_hz));
    }

    pub fn play_replay_with<C: Clock>(&mut self, mut ticker: FixedPeriod<C>) {
        let segment = std::mem::take(&mut self.segment);
        if segment.is_empty() {
            log::warn!("play_replay: no frames loaded, call replay() first");
            return;
        }

        log::info!("play_replay: {} frames at {:?} per frame", segment.len(), ticker.period());
        for (played, record) in segment.records.iter().enumerate() {
            ticker.tick();
            if !self.handle.is_running() {
                log::warn!("play_replay: stopped after {played} of {} frames", segment.len());
                break;
            }
            let motor = ActuatorSet::from_record(record).motor;
            self.orchestrator.send_actuator_command(&ActuatorCommand::Motor(motor));
        }

        ticker.tick();
        self.orchestrator.send_actuator_command(&ActuatorCommand::Motor(MotorCommand::NEUTRAL));
    }

    /// Run the qualification script at the loop rate. Returns whether every
    /// phase completed; the motors end on neutral either way.
    pub fn qualify(&mut self) -> bool {
        let ticker = FixedPeriod::from_rate_hz(SystemClock, self.rate_hz);
        self.qualify_with(ticker)
    }

    pub fn qualify_with<C: Clock>(&mut self, mut ticker: FixedPeriod<C>) -> bool {
        log::info!("qualification: {} phases over {:?}", qualify::SCRIPT.len(), qualify::duration());

        let mut completed = true;
        'script: for phase in &qualify::SCRIPT {
            log::info!("qualification: {} for {:?}", phase.name, phase.hold);
            let command = ActuatorCommand::Motor(phase.command());
            for _ in 0..phase.ticks(ticker.period()) {
                ticker.tick();
                if !self.handle.is_running() {
                    log::warn!("qualification: stopped during {}", phase.name);
                    completed = false;
                    break 'script;
                }
                self.orchestrator.send_actuator_command(&command);
            }
        }

        ticker.tick();
        self.current = ActuatorSet::neutral();
        self.orchestrator.send_actuator_command(&ActuatorCommand::Motor(MotorCommand::NEUTRAL));
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::MockBus;
    use crate::bus::{DeviceAddress, OrchestratorConfig};
    use crate::error::Result;
    use crate::schedule::testing::ManualClock;
    use crate::store::memory::MemoryStore;
    use crate::store::{ImuRecord, OutputRecord};
    use std::cell::Cell;
    use std::time::Duration;

    const MOTOR: u8 = 0x4C;
    const TORPEDO: u8 = 0x30;
    const ARM: u8 = 0x32;

    fn orchestrator() -> BusOrchestrator<MockBus> {
        let mut config = OrchestratorConfig::new(DeviceAddress::new(MOTOR).unwrap());
        config.arm_controller = Some(DeviceAddress::new(ARM).unwrap());
        BusOrchestrator::new(MockBus::default(), config)
    }

    fn motor_writes(control: &ControlLoop<MockBus, impl RecordStore>) -> Vec<Vec<u8>> {
        control
            .orchestrator()
            .bus()
            .writes
            .iter()
            .filter(|(addr, _, _)| *addr == MOTOR)
            .map(|(_, _, data)| data.clone())
            .collect()
    }

    fn row(step: u64, m1: f64, armed: bool) -> OutputRecord {
        OutputRecord { step_index: step, m1: Some(m1), armed, ..Default::default() }
    }

    #[test]
    fn test_tick_drives_all_configured_controllers() {
        let store = MemoryStore::new();
        store.push_output(OutputRecord { m1: Some(200.0), s1: Some(2000.0), ..Default::default() });
        let mut control = ControlLoop::new(orchestrator(), store);

        let set = control.tick();
        assert_eq!(set.motor.to_bytes()[0], 200);
        let writes = &control.orchestrator().bus().writes;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], (MOTOR, 0, vec![200, 127, 127, 127, 127, 127, 127, 127]));
        assert_eq!(writes[1], (ARM, 0, vec![255]));
    }

    #[test]
    fn test_empty_store_sends_neutral() {
        let mut control = ControlLoop::new(orchestrator(), MemoryStore::new());
        assert_eq!(control.tick(), ActuatorSet::neutral());
        assert_eq!(motor_writes(&control), vec![vec![127; 8]]);
    }

    #[test]
    fn test_empty_store_holds_servos_mid_scale() {
        let mut config = OrchestratorConfig::new(DeviceAddress::new(MOTOR).unwrap());
        config.torpedo_controller = Some(DeviceAddress::new(TORPEDO).unwrap());
        config.arm_controller = Some(DeviceAddress::new(ARM).unwrap());
        let mut control = ControlLoop::new(BusOrchestrator::new(MockBus::default(), config), MemoryStore::new());

        control.tick();
        assert_eq!(
            control.orchestrator().bus().writes,
            vec![(MOTOR, 0, vec![127; 8]), (TORPEDO, 0, vec![127, 127]), (ARM, 0, vec![127])]
        );
    }

    #[test]
    fn test_fetch_failure_holds_last_command() {
        let store = MemoryStore::new();
        store.push_output(row(1, 180.0, true));
        let mut control = ControlLoop::new(orchestrator(), store.clone());
        control.tick();

        store.set_failing(true);
        let held = control.tick();
        assert_eq!(held.motor.to_bytes()[0], 180);
        assert_eq!(motor_writes(&control)[1][0], 180);
    }

    #[test]
    fn test_replay_then_play() {
        let store = MemoryStore::new();
        let flags = [false, true, true, false, false, true, true, true, false];
        for (i, armed) in flags.into_iter().enumerate() {
            store.push_output(row(i as u64, 100.0 + i as f64, armed));
        }
        let mut control = ControlLoop::new(orchestrator(), store);

        assert_eq!(control.replay(), 3);
        assert_eq!(control.segment().span(), Some((5, 7)));

        let clock = ManualClock::new();
        control.play_replay_with(FixedPeriod::new(clock.clone(), Duration::from_millis(100)));

        let motor: Vec<u8> = motor_writes(&control).iter().map(|w| w[0]).collect();
        assert_eq!(motor, vec![105, 106, 107, 127]);
        assert_eq!(motor_writes(&control)[3], vec![127; 8]);
        //replay never touches the servos
        assert_eq!(control.orchestrator().bus().writes.len(), 4);
        assert_eq!(clock.elapsed(), Duration::from_millis(300));
        assert!(control.segment().is_empty());
    }

    #[test]
    fn test_replay_fetch_failure_clears_segment() {
        let store = MemoryStore::new();
        for (i, armed) in [false, true, false].into_iter().enumerate() {
            store.push_output(row(i as u64, 150.0, armed));
        }
        let mut control = ControlLoop::new(orchestrator(), store.clone());
        assert_eq!(control.replay(), 1);

        store.set_failing(true);
        assert_eq!(control.replay(), 0);
        assert!(control.segment().is_empty());
    }

    #[test]
    fn test_play_without_segment_is_noop() {
        let mut control = ControlLoop::new(orchestrator(), MemoryStore::new());
        control.play_replay_with(FixedPeriod::new(ManualClock::new(), Duration::from_millis(20)));
        assert!(control.orchestrator().bus().writes.is_empty());
    }

    #[test]
    fn test_shutdown_cuts_playback_short() {
        let store = MemoryStore::new();
        for (i, armed) in [false, true, true, true, false].into_iter().enumerate() {
            store.push_output(row(i as u64, 150.0, armed));
        }
        let handle = ControlHandle::new();
        let mut control = ControlLoop::new(orchestrator(), store).with_handle(handle.clone());
        assert_eq!(control.replay(), 3);

        handle.shutdown();
        control.play_replay_with(FixedPeriod::new(ManualClock::new(), Duration::from_millis(20)));
        assert_eq!(motor_writes(&control), vec![vec![127; 8]]);
        assert!(control.segment().is_empty());
    }

    #[test]
    fn test_qualification_script_bytes() {
        let mut control = ControlLoop::new(orchestrator(), MemoryStore::new());
        let clock = ManualClock::new();
        let period = Duration::from_millis(500);
        assert!(control.qualify_with(FixedPeriod::new(clock.clone(), period)));

        let mut expected = Vec::new();
        for phase in &qualify::SCRIPT {
            for _ in 0..phase.ticks(period) {
                expected.push(phase.motors.to_vec());
            }
        }
        expected.push(vec![127; 8]);

        let writes = motor_writes(&control);
        assert_eq!(writes, expected);
        assert_eq!(writes.len(), 53);
        //settle, then forward
        assert_eq!(writes[9], vec![127; 8]);
        assert_eq!(writes[10], vec![255, 255, 0, 255, 255, 255, 0, 0]);
        //open loop: servos untouched
        assert_eq!(control.orchestrator().bus().writes.len(), 53);
        assert_eq!(clock.elapsed(), Duration::from_secs(26));
    }

    #[test]
    fn test_qualification_stops_on_shutdown() {
        let handle = ControlHandle::new();
        let mut control = ControlLoop::new(orchestrator(), MemoryStore::new()).with_handle(handle.clone());
        handle.shutdown();
        assert!(!control.qualify_with(FixedPeriod::new(ManualClock::new(), Duration::from_millis(20))));
        assert_eq!(motor_writes(&control), vec![vec![127; 8]]);
    }

    struct StoppingStore {
        inner: MemoryStore,
        handle: ControlHandle,
        remaining: Cell<u32>,
    }

    impl RecordStore for StoppingStore {
        fn latest_output(&self) -> Result<Option<OutputRecord>> {
            let left = self.remaining.get().saturating_sub(1);
            self.remaining.set(left);
            if left == 0 {
                self.handle.shutdown();
            }
            self.inner.latest_output()
        }

        fn list_outputs(&self) -> Result<Vec<OutputRecord>> {
            self.inner.list_outputs()
        }

        fn publish_imu(&self, record: &ImuRecord) -> Result<()> {
            self.inner.publish_imu(record)
        }
    }

    #[test]
    fn test_run_paces_ticks_and_neutralizes_on_stop() {
        let handle = ControlHandle::new();
        let inner = MemoryStore::new();
        inner.push_output(row(1, 220.0, true));
        let store = StoppingStore { inner, handle: handle.clone(), remaining: Cell::new(3) };

        let mut control = ControlLoop::new(orchestrator(), store).with_handle(handle.clone());
        let clock = ManualClock::new();
        control.run_with(FixedPeriod::new(clock.clone(), Duration::from_millis(20)));

        assert!(!handle.is_running());
        let motor: Vec<u8> = motor_writes(&control).iter().map(|w| w[0]).collect();
        assert_eq!(motor, vec![220, 220, 220, 127]);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(20); 2]);
        assert_eq!(control.current(), &ActuatorSet::neutral());
    }

    #[test]
    fn test_run_serves_replay_request() {
        let handle = ControlHandle::new();
        let inner = MemoryStore::new();
        for (i, armed) in [false, true, false].into_iter().enumerate() {
            inner.push_output(row(i as u64, 140.0 + i as f64, armed));
        }
        let store = StoppingStore { inner, handle: handle.clone(), remaining: Cell::new(1) };

        let mut control = ControlLoop::new(orchestrator(), store).with_handle(handle.clone());
        handle.request_replay();
        control.run_with(FixedPeriod::new(ManualClock::new(), Duration::from_millis(20)));

        //replayed row, replay neutral, live tick (latest row), stop neutral
        let motor: Vec<u8> = motor_writes(&control).iter().map(|w| w[0]).collect();
        assert_eq!(motor, vec![141, 127, 142, 127]);
    }

    #[test]
    fn test_run_serves_qualification_request() {
        let handle = ControlHandle::new();
        let inner = MemoryStore::new();
        inner.push_output(row(1, 200.0, true));
        let store = StoppingStore { inner, handle: handle.clone(), remaining: Cell::new(1) };

        let mut control = ControlLoop::new(orchestrator(), store).with_handle(handle.clone());
        handle.request_qualification();
        control.run_with(FixedPeriod::new(ManualClock::new(), Duration::from_millis(500)));

        //script (52 phase ticks + neutral), live tick, stop neutral
        let motor = motor_writes(&control);
        assert_eq!(motor.len(), 55);
        assert_eq!(motor[53][0], 200);
        assert_eq!(motor[54], vec![127; 8]);
    }
}

pub mod error;
pub mod codec;
pub mod transport;
pub mod telemetry;
pub mod bus;
pub mod actuator;
pub mod store;
pub mod replay;
pub mod schedule;
pub mod control;
pub mod config;

pub use error::{Error, Result};

pub use codec::{Command, Encoding, Frame, FrameCodec, CodecConfig, Payload, WireFrame};
pub use transport::{Transport, SerialTransport};
pub use telemetry::{
    TelemetrySample, TelemetryTransport, TelemetryStream, ImuProtocol,
    ImuClient, MessageHandlerImu,
};
pub use bus::{
    BusOrchestrator, OrchestratorConfig, DeviceAddress, ProbeResult,
    I2cBus, BusError, EmbeddedHalBus,
};
pub use actuator::{ActuatorCommand, ActuatorSet, MotorCommand, TorpedoCommand, ArmCommand};
pub use store::{RecordStore, HttpRecordStore, OutputRecord, ImuRecord};
pub use replay::ReplaySegment;
pub use control::{ControlLoop, SensorLoop, ControlHandle};
pub use config::HardwareConfig;

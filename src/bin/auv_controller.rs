/*!
 * AUV Controller Binary
 *
 * Runs the two vehicle loops:
 * 1. Actuation: latest outputs from the record store -> I2C controllers
 * 2. Sensing: serial IMU -> record store
 *
 * Usage: auv_controller [--qualify] [config.json] [local_config.json]
 * Default: config/hardware_config.json
 * --qualify runs the scripted thruster qualification before live control.
 * Logging follows RUST_LOG (default info).
 */

use auv_link::{
    BusOrchestrator, ControlHandle, ControlLoop, HardwareConfig, HttpRecordStore, SensorLoop,
    SerialTransport, TelemetryTransport,
};
use env_logger::Env;
use std::io::{self, Write};
use std::thread;

const DEFAULT_CONFIG: &str = "config/hardware_config.json";

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn load_config(paths: &[String]) -> auv_link::Result<HardwareConfig> {
    match (paths.first(), paths.get(1)) {
        (Some(global), Some(local)) => HardwareConfig::load_merged(global, local),
        (Some(path), None) => HardwareConfig::load(path),
        _ => HardwareConfig::load(DEFAULT_CONFIG),
    }
}

#[cfg(target_os = "linux")]
fn open_bus(config: &HardwareConfig) -> auv_link::Result<auv_link::EmbeddedHalBus<linux_embedded_hal::I2cdev>> {
    let path = format!("/dev/i2c-{}", config.i2c_bus);
    let i2c = linux_embedded_hal::I2cdev::new(&path)
        .map_err(|e| auv_link::Error::Configuration(format!("cannot open {path}: {e}")))?;
    log::info!("I2C bus {} opened", config.i2c_bus);
    Ok(auv_link::EmbeddedHalBus::new(i2c))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_config: &HardwareConfig) -> auv_link::Result<NoBus> {
    Err(auv_link::Error::NotSupported("I2C is only available on Linux"))
}

#[cfg(not(target_os = "linux"))]
struct NoBus;

#[cfg(not(target_os = "linux"))]
impl auv_link::I2cBus for NoBus {
    fn probe_read(&mut self, _: u8, _: &mut [u8]) -> Result<(), auv_link::BusError> {
        Err(auv_link::BusError::Other("no I2C support".to_string()))
    }

    fn write_block(&mut self, _: u8, _: u8, _: &[u8]) -> Result<(), auv_link::BusError> {
        Err(auv_link::BusError::Other("no I2C support".to_string()))
    }
}

fn run() -> auv_link::Result<()> {
    let (flags, paths): (Vec<String>, Vec<String>) = std::env::args().skip(1).partition(|a| a.starts_with("--"));
    let config = load_config(&paths)?;
    log::info!("configuration loaded: {config:?}");

    let handle = ControlHandle::new();
    if flags.iter().any(|f| f == "--qualify") {
        handle.request_qualification();
    }

    // actuation
    let mut orchestrator = BusOrchestrator::new(open_bus(&config)?, config.orchestrator_config());
    let absent = orchestrator.probe_configured().iter().filter(|r| !r.present).count();
    if absent > 0 {
        log::warn!("{absent} configured devices did not answer the probe");
    }
    let control_store = HttpRecordStore::new(&config.db_address, config.db_port)?;
    let mut control = ControlLoop::new(orchestrator, control_store)
        .with_rate(config.control_rate_hz)
        .with_handle(handle.clone());

    // sensing
    let transport = SerialTransport::open(&config.imu_port, config.imu_baud, config.imu_read_timeout())?;
    let mut imu = config.imu_protocol.bind(transport);
    if let Err(e) = imu.set_home_to_current_attitude() {
        log::warn!("IMU home not set: {e}");
    }
    let sensor_store = HttpRecordStore::new(&config.db_address, config.db_port)?;
    let mut sensor = SensorLoop::new(imu, sensor_store)
        .with_rate(config.sensor_rate_hz)
        .with_handle(handle.clone());

    let control_thread = thread::spawn(move || control.run());
    let sensor_thread = thread::spawn(move || sensor.run());

    println!("\n[Commands]");
    println!("  replay  - play back the last armed segment");
    println!("  qualify - run the thruster qualification script");
    println!("  x       - exit\n");

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => {
                // detached from a terminal, run until killed
                log::info!("stdin closed, loops keep running");
                let _ = control_thread.join();
                let _ = sensor_thread.join();
                return Ok(());
            }
            Err(_) => break,
            Ok(_) => {}
        }

        match input.trim() {
            "replay" | "r" => {
                handle.request_replay();
                println!("[REPLAY]");
            }
            "qualify" => {
                handle.request_qualification();
                println!("[QUALIFY]");
            }
            "x" | "exit" | "quit" => break,
            "" => {}
            other => println!("Unknown command: {other}"),
        }
    }

    println!("[SHUTDOWN]");
    handle.shutdown();
    let _ = control_thread.join();
    let _ = sensor_thread.join();
    Ok(())
}

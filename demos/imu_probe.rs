/*!
 * IMU bench check
 *
 * Opens the IMU serial link, zeroes the home attitude and velocity
 * integrator, then prints samples at a fixed rate.
 *
 * Usage: imu_probe [port] [baud] [binary|message_handler] [count]
 * Default: /dev/ttyACM0, 115200, binary, 50
 */

use auv_link::{ImuProtocol, SerialTransport, TelemetryTransport};
use std::time::{Duration, Instant};

fn main() -> auv_link::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let port = args.get(1).map(|s| s.as_str()).unwrap_or("/dev/ttyACM0");
    let baud: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(115_200);
    let protocol = match args.get(3).map(|s| s.as_str()) {
        Some("message_handler") => ImuProtocol::MessageHandler,
        _ => ImuProtocol::Binary,
    };
    let count: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(50);

    println!("==============================================");
    println!("  IMU probe: {port} @ {baud} ({protocol:?})");
    println!("==============================================\n");

    let transport = SerialTransport::open(port, baud, Duration::from_millis(500))?;
    let mut imu = protocol.bind(transport);

    for (name, result) in [
        ("set home", imu.set_home_to_current_attitude()),
        ("reset velocity", imu.reset_velocity_integrator()),
    ] {
        match result {
            Ok(()) => println!("[OK] {name}"),
            Err(e) => println!("[SKIP] {name}: {e}"),
        }
    }

    let start = Instant::now();
    let mut ok = 0;
    let mut failed = 0;
    for result in imu.stream(Duration::from_millis(20)).take(count) {
        match result {
            Ok(s) => {
                ok += 1;
                println!(
                    "[{:>10}us] rpy=({:7.2}, {:7.2}, {:7.2}) v=({:6.3}, {:6.3}, {:6.3}) status={}/{}{}",
                    s.micros, s.roll_deg, s.pitch_deg, s.yaw_deg, s.vx, s.vy, s.vz,
                    s.rv_status, s.accel_status,
                    if s.is_legacy_payload { " legacy" } else { "" }
                );
            }
            Err(e) => {
                failed += 1;
                println!("[ERR] {e}");
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!("\n{ok} samples, {failed} failures in {elapsed:.2}s ({:.1} Hz)", ok as f64 / elapsed);
    Ok(())
}

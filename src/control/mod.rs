/*!
 * Vehicle control loops
 *
 * Two blocking loops, each owning its own link:
 * - actuation: latest commanded outputs from the store -> I2C controllers
 * - sensing: IMU samples -> store
 *
 * Both stop on a shared handle. The actuation loop can also be switched
 * into a scripted qualification run.
 */

pub mod actuation;
pub mod qualify;
pub mod sensor;

pub use actuation::ControlLoop;
pub use sensor::SensorLoop;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared run, replay and qualification flags for the loops
#[derive(Debug, Clone)]
pub struct ControlHandle {
    running: Arc<AtomicBool>,
    replay: Arc<AtomicBool>,
    qualify: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            replay: Arc::new(AtomicBool::new(false)),
            qualify: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Ask the actuation loop to load and play the last armed segment
    pub fn request_replay(&self) {
        self.replay.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_replay_request(&self) -> bool {
        self.replay.swap(false, Ordering::SeqCst)
    }

    /// Ask the actuation loop to run the qualification script once
    pub fn request_qualification(&self) {
        self.qualify.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_qualification_request(&self) -> bool {
        self.qualify.swap(false, Ordering::SeqCst)
    }
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new()
    }
}

use crate::interface::state_vector::Identity;
use log::{debug, info, warn};

/// Logger bound to the trajectory currently being processed.
#[derive(Debug, Clone)]
pub struct LogManager {
    target: String,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            target: String::from("-"),
        }
    }

    pub fn for_trajectory(identity: &Identity) -> Self {
        Self {
            target: format!("{}/{}", identity.icao24, identity.callsign),
        }
    }

    pub fn bind(&mut self, identity: &Identity) {
        *self = Self::for_trajectory(identity);
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.target, message);
    }

    /// Per-filter detail, off by default.
    pub fn stage(&self, stage: &str, changed: usize) {
        debug!("[{}] {}: {} samples changed", self.target, stage, changed);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.target, message);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

//! One countdown+quiz cycle.

use std::time::{Instant, SystemTime};

use crate::countdown::RunId;
use crate::state::SessionPhase;

/// The live control session, owned by the coordinator. A new one supersedes
/// the previous one.
#[derive(Debug, Clone)]
pub struct ControlSession {
    pub run: RunId,
    pub phase: SessionPhase,
    /// Seconds left as last displayed. Only ever decreases.
    pub remaining_seconds: u64,
    pub started_at: Instant,
    pub started_wall: SystemTime,
}

impl ControlSession {
    pub fn new(run: RunId, duration_seconds: u64) -> Self {
        Self {
            run,
            phase: SessionPhase::CountdownRunning,
            remaining_seconds: duration_seconds,
            started_at: Instant::now(),
            started_wall: SystemTime::now(),
        }
    }

    /// Record a displayed tick. Values above the current one are ignored.
    pub fn tick(&mut self, remaining: u64) {
        self.remaining_seconds = self.remaining_seconds.min(remaining);
    }

    /// Seconds since the wall-clock start, for logging.
    pub fn started_unix(&self) -> u64 {
        self.started_wall
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clamp an inbound duration to a non-negative second count.
pub fn clamp_duration(seconds: i64) -> u64 {
    u64::try_from(seconds).unwrap_or(0)
}

//! Core agent for guardian.
//!
//! Owns the device identity, the countdown engine, the quiz state machine and
//! the session coordinator that ties them to the realtime channel and the
//! host surface.

pub mod config;
pub mod coordinator;
pub mod countdown;
pub mod error;
pub mod identity;
pub mod quiz;
pub mod session;
pub mod setup;
pub mod state;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorEvent, CoordinatorStatus};
pub use countdown::{format_hms, Countdown, RunId};
pub use error::DaemonError;
pub use identity::IdentityStore;
pub use quiz::{QuizRun, QuizState};
pub use state::SessionPhase;

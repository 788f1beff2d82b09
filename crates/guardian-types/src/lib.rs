//! Shared types for guardian.
//!
//! This crate contains the types shared across the guardian workspace:
//! the persistent device identity, the questionnaire reference data, and the
//! names of the realtime events exchanged with the control server.

pub mod event;
pub mod identity;
pub mod quiz;

pub use event::{ChannelEvent, DURATION_EVENT, SESSION_FINISHED_EVENT};
pub use identity::DeviceIdentity;
pub use quiz::{Question, Questionnaire, QuestionnaireError};

//! Control-server transport for guardian.
//!
//! This crate handles the realtime event channel (Socket.IO over WebSocket,
//! via tokio-tungstenite), its packet framing, and the plain HTTP calls used
//! for liveness announcements and identity registration (via reqwest).

pub mod api;
pub mod channel;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod wire;

pub use api::{ApiOptions, HttpServerApi, Liveness, Registration, ServerApi};
pub use channel::{ChannelOptions, ControlChannel, SocketIoChannel};
pub use error::ProtocolError;

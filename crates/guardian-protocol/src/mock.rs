//! Mock channel and API backends for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use guardian_types::{ChannelEvent, DeviceIdentity};
use tokio::sync::mpsc;

use crate::api::{Liveness, Registration, ServerApi};
use crate::channel::ControlChannel;
use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// MockChannel
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockChannelState {
    connected: bool,
    emitted: usize,
    disconnected: bool,
}

/// Mock realtime channel.
///
/// Returns a `mpsc::Sender<ChannelEvent>` that tests use to inject server
/// events. When `connect()` is called, it spawns a task that forwards injected
/// events to the consumer.
pub struct MockChannel {
    feed_rx: Option<mpsc::Receiver<ChannelEvent>>,
    state: Arc<Mutex<MockChannelState>>,
}

impl MockChannel {
    /// Create a new mock channel and a sender for injecting events.
    pub fn new() -> (Self, mpsc::Sender<ChannelEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(64);
        let channel = Self {
            feed_rx: Some(feed_rx),
            state: Arc::new(Mutex::new(MockChannelState::default())),
        };
        (channel, feed_tx)
    }

    /// Get a clonable handle for observing the channel from tests.
    pub fn handle(&self) -> MockChannelHandle {
        MockChannelHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for `MockChannel`.
#[derive(Clone)]
pub struct MockChannelHandle {
    state: Arc<Mutex<MockChannelState>>,
}

impl MockChannelHandle {
    /// Number of `timer-finished` emissions so far.
    pub fn emitted(&self) -> usize {
        self.state.lock().unwrap().emitted
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn was_disconnected(&self) -> bool {
        self.state.lock().unwrap().disconnected
    }
}

#[async_trait]
impl ControlChannel for MockChannel {
    async fn connect(&mut self, events: mpsc::Sender<ChannelEvent>) -> Result<(), ProtocolError> {
        let mut feed_rx = self.feed_rx.take().ok_or(ProtocolError::AlreadyConnected)?;
        self.state.lock().unwrap().connected = true;
        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if events.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    fn emit_session_complete(&self) {
        self.state.lock().unwrap().emitted += 1;
    }

    async fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.disconnected = true;
    }
}

// ---------------------------------------------------------------------------
// MockServerApi
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MockApiState {
    announcements: Vec<Liveness>,
    registrations: Vec<DeviceIdentity>,
    registration: Option<Registration>,
}

/// Mock control-server API. Records every call.
///
/// Registration answers with the configured outcome, or fails with a
/// connection error when configured with `None`.
#[derive(Clone)]
pub struct MockServerApi {
    state: Arc<Mutex<MockApiState>>,
}

impl Default for MockServerApi {
    fn default() -> Self {
        Self::new(Some(Registration::Registered))
    }
}

impl MockServerApi {
    pub fn new(registration: Option<Registration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockApiState {
                announcements: Vec::new(),
                registrations: Vec::new(),
                registration,
            })),
        }
    }

    /// Liveness announcements received so far, in order.
    pub fn announcements(&self) -> Vec<Liveness> {
        self.state.lock().unwrap().announcements.clone()
    }

    /// Identities registered so far, in order.
    pub fn registrations(&self) -> Vec<DeviceIdentity> {
        self.state.lock().unwrap().registrations.clone()
    }
}

#[async_trait]
impl ServerApi for MockServerApi {
    async fn announce(&self, liveness: Liveness) -> Result<(), ProtocolError> {
        self.state.lock().unwrap().announcements.push(liveness);
        Ok(())
    }

    async fn register(&self, identity: &DeviceIdentity) -> Result<Registration, ProtocolError> {
        let mut state = self.state.lock().unwrap();
        state.registrations.push(identity.clone());
        state
            .registration
            .ok_or_else(|| ProtocolError::Connection("mock server unreachable".to_string()))
    }
}

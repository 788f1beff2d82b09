//! Recording surface backend for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use guardian_types::Question;
use tokio::sync::mpsc;

use crate::error::SurfaceError;
use crate::{HostSurface, Notice, Presentation, SurfaceEvent};

/// One call the coordinator made on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Countdown(String),
    Message(String),
    Question(Question),
    Notice(Notice),
    Presentation(Presentation),
}

#[derive(Debug, Default)]
struct MockSurfaceState {
    calls: Vec<SurfaceCall>,
    presentation: Option<Presentation>,
    shutdown: bool,
}

/// Mock host surface.
///
/// Returns a `mpsc::Sender<SurfaceEvent>` that tests use to simulate user
/// actions. When `start()` is called, it spawns a task that forwards them to
/// the coordinator.
pub struct MockSurface {
    feed_rx: Option<mpsc::Receiver<SurfaceEvent>>,
    state: Arc<Mutex<MockSurfaceState>>,
}

impl MockSurface {
    /// Create a new mock surface and a sender for simulating user actions.
    pub fn new() -> (Self, mpsc::Sender<SurfaceEvent>) {
        let (feed_tx, feed_rx) = mpsc::channel(64);
        let surface = Self {
            feed_rx: Some(feed_rx),
            state: Arc::new(Mutex::new(MockSurfaceState::default())),
        };
        (surface, feed_tx)
    }

    /// Get a clonable handle for observing the surface from tests.
    pub fn handle(&self) -> MockSurfaceHandle {
        MockSurfaceHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, call: SurfaceCall) {
        let mut state = self.state.lock().unwrap();
        if let SurfaceCall::Presentation(p) = &call {
            state.presentation = Some(*p);
        }
        state.calls.push(call);
    }
}

/// Clonable observer handle for `MockSurface`.
#[derive(Clone)]
pub struct MockSurfaceHandle {
    state: Arc<Mutex<MockSurfaceState>>,
}

impl MockSurfaceHandle {
    /// Snapshot of every call so far, in order.
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Countdown texts shown so far, in order.
    pub fn countdowns(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Countdown(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Notices shown so far, in order.
    pub fn notices(&self) -> Vec<Notice> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Notice(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    /// The most recently shown question, if any.
    pub fn last_question(&self) -> Option<Question> {
        self.calls().into_iter().rev().find_map(|c| match c {
            SurfaceCall::Question(q) => Some(q),
            _ => None,
        })
    }

    /// The current presentation, if one was ever set.
    pub fn presentation(&self) -> Option<Presentation> {
        self.state.lock().unwrap().presentation
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Forget recorded calls (the current presentation is kept).
    pub fn clear(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

#[async_trait]
impl HostSurface for MockSurface {
    async fn start(&mut self, tx: mpsc::Sender<SurfaceEvent>) -> Result<(), SurfaceError> {
        let mut feed_rx = self.feed_rx.take().ok_or(SurfaceError::AlreadyStarted)?;
        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    async fn show_countdown(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Countdown(text.to_string()));
        Ok(())
    }

    async fn show_message(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Message(text.to_string()));
        Ok(())
    }

    async fn show_question(&mut self, question: &Question) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Question(question.clone()));
        Ok(())
    }

    async fn show_notice(&mut self, notice: Notice) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Notice(notice));
        Ok(())
    }

    async fn set_presentation(&mut self, presentation: Presentation) -> Result<(), SurfaceError> {
        self.record(SurfaceCall::Presentation(presentation));
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SurfaceError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}

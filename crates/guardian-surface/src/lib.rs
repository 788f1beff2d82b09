//! Host surface contract for guardian.
//!
//! This crate defines the [`HostSurface`] trait the session coordinator
//! drives: it renders the countdown, one quiz question at a time and short
//! notices, and moves the top-level surface between background (tray),
//! normal, minimized and forced-foreground presentation. User actions flow
//! back to the coordinator as [`SurfaceEvent`]s; the surface itself never
//! decides whether a close or minimize is allowed.
//!
//! A terminal backend (ratatui/crossterm) is available behind the `terminal`
//! feature and a recording backend for tests behind `mock`.

use async_trait::async_trait;
use guardian_types::Question;
use tokio::sync::mpsc;

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
#[cfg(feature = "terminal")]
pub mod terminal;

pub use error::SurfaceError;

/// A user action on the surface, reported to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The user picked an answer option; carries the option text.
    AnswerSelected(String),
    /// The user tried to close or hide the top-level surface.
    CloseRequested,
    /// The user tried to minimize the top-level surface.
    MinimizeRequested,
    /// The user reopened the surface from the background (tray).
    RestoreRequested,
}

/// How the top-level surface is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Hidden; only a tray indicator remains.
    Background,
    /// A regular window.
    Normal { always_on_top: bool },
    Minimized,
    /// Maximized, focused and always on top.
    Foreground,
}

/// Informational notices shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A close was refused because the countdown is still running.
    WaitForTimer,
    /// A close was refused because the quiz is not finished.
    FinishQuiz,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Self::WaitForTimer => "Please wait for the timer to finish.",
            Self::FinishQuiz => "Please answer all the questions first.",
        }
    }
}

/// The UI surface driven by the session coordinator.
#[async_trait]
pub trait HostSurface: Send + 'static {
    /// Start the surface, sending user actions to `tx`.
    async fn start(&mut self, tx: mpsc::Sender<SurfaceEvent>) -> Result<(), SurfaceError>;

    /// Show the remaining countdown, already formatted as `HH:MM:SS`.
    async fn show_countdown(&mut self, text: &str) -> Result<(), SurfaceError>;

    /// Replace the main text with a status message and clear any question.
    async fn show_message(&mut self, text: &str) -> Result<(), SurfaceError>;

    /// Render one question with its options in display order.
    async fn show_question(&mut self, question: &Question) -> Result<(), SurfaceError>;

    /// Show a transient informational notice.
    async fn show_notice(&mut self, notice: Notice) -> Result<(), SurfaceError>;

    /// Move the top-level surface to the given presentation.
    async fn set_presentation(&mut self, presentation: Presentation) -> Result<(), SurfaceError>;

    /// Tear the surface down and restore whatever it took over.
    async fn shutdown(&mut self) -> Result<(), SurfaceError>;
}

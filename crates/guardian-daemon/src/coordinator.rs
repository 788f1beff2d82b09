//! Session coordinator: the single owner of session state.
//!
//! Every input (server durations, countdown beats, user actions) arrives as a
//! [`CoordinatorEvent`] on one queue and is handled in order on the task
//! running [`Coordinator::run`].

use std::sync::Arc;
use std::time::Duration;

use guardian_protocol::{ControlChannel, Liveness, ServerApi};
use guardian_surface::{HostSurface, Notice, Presentation, SurfaceError, SurfaceEvent};
use guardian_types::{ChannelEvent, DeviceIdentity, Questionnaire};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::countdown::{format_hms, Countdown, RunId};
use crate::error::DaemonError;
use crate::identity::register_identity;
use crate::quiz::{QuizRun, QuizState};
use crate::session::{clamp_duration, ControlSession};
use crate::state::SessionPhase;

/// Shown when the countdown runs out.
pub const TIME_UP_MESSAGE: &str = "Time is up!";

/// Replaces an unfinished quiz when a new countdown starts.
pub const QUIZ_ABANDONED_MESSAGE: &str = "A new countdown has started.";

/// Events processed by the coordinator's main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// The server asked for a countdown of this many seconds.
    DurationReceived(i64),
    /// The realtime channel connected (`true`) or dropped (`false`).
    ChannelStatus(bool),
    /// One second of the given countdown run elapsed.
    CountdownBeat(RunId),
    /// A user action on the surface.
    Surface(SurfaceEvent),
    /// Shutdown signal.
    Shutdown,
}

/// Snapshot of coordinator state, published after every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStatus {
    pub phase: SessionPhase,
    /// Seconds left on the running countdown.
    pub remaining_seconds: Option<u64>,
    /// Index of the question awaiting an answer.
    pub quiz_index: Option<usize>,
    pub quiz_score: Option<usize>,
    pub connected: bool,
}

/// The guardian session coordinator.
pub struct Coordinator {
    identity: DeviceIdentity,
    questionnaire: Arc<Questionnaire>,
    channel: Box<dyn ControlChannel>,
    api: Arc<dyn ServerApi>,
    surface: Box<dyn HostSurface>,
    /// Upper bound on the shutdown liveness request.
    request_timeout: Duration,
    countdown: Countdown,
    session: Option<ControlSession>,
    quiz: Option<QuizRun>,
    connected: bool,
    event_tx: mpsc::Sender<CoordinatorEvent>,
    event_rx: mpsc::Receiver<CoordinatorEvent>,
    status_tx: watch::Sender<CoordinatorStatus>,
}

impl Coordinator {
    /// Create a new coordinator instance.
    pub fn new(
        identity: DeviceIdentity,
        questionnaire: Arc<Questionnaire>,
        channel: Box<dyn ControlChannel>,
        api: Arc<dyn ServerApi>,
        surface: Box<dyn HostSurface>,
        request_timeout: Duration,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (status_tx, _) = watch::channel(CoordinatorStatus::default());

        Self {
            identity,
            questionnaire,
            channel,
            api,
            surface,
            request_timeout,
            countdown: Countdown::new(event_tx.clone()),
            session: None,
            quiz: None,
            connected: false,
            event_tx,
            event_rx,
            status_tx,
        }
    }

    /// Get a clone of the event sender for feeding events into the coordinator.
    pub fn event_sender(&self) -> mpsc::Sender<CoordinatorEvent> {
        self.event_tx.clone()
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_tx.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map_or(SessionPhase::Idle, |session| session.phase)
    }

    /// Whether a close request would be honoured right now.
    pub fn can_close(&self) -> bool {
        self.phase().can_close()
    }

    /// Whether a minimize request would be honoured right now.
    pub fn can_minimize(&self) -> bool {
        self.phase().can_minimize()
    }

    /// Run the coordinator event loop until [`CoordinatorEvent::Shutdown`].
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        self.spawn_startup_requests();

        // Start the surface and forward user actions
        let (surface_tx, mut surface_rx) = mpsc::channel::<SurfaceEvent>(64);
        self.surface.start(surface_tx).await?;
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = surface_rx.recv().await {
                if event_tx.send(CoordinatorEvent::Surface(event)).await.is_err() {
                    break;
                }
            }
        });
        self.present(Presentation::Background).await;

        // Connect the realtime channel and forward server events
        let (channel_tx, mut channel_rx) = mpsc::channel::<ChannelEvent>(64);
        self.channel.connect(channel_tx).await?;
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = channel_rx.recv().await {
                let event = match event {
                    ChannelEvent::DurationReceived(seconds) => {
                        CoordinatorEvent::DurationReceived(seconds)
                    }
                    ChannelEvent::Connected => CoordinatorEvent::ChannelStatus(true),
                    ChannelEvent::Disconnected => CoordinatorEvent::ChannelStatus(false),
                };
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        info!(id = %self.identity, questions = self.questionnaire.len(), "coordinator running");
        self.publish_status();

        // Main event loop
        while let Some(event) = self.event_rx.recv().await {
            if event == CoordinatorEvent::Shutdown {
                info!("shutting down");
                break;
            }
            self.handle_event(event).await;
            self.publish_status();
        }

        self.shutdown().await
    }

    /// Liveness connect and identity registration, both fire-and-forget.
    fn spawn_startup_requests(&self) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.announce(Liveness::Connect).await {
                warn!(error = %e, "liveness connect failed");
            }
        });

        let api = Arc::clone(&self.api);
        let identity = self.identity.clone();
        tokio::spawn(async move {
            register_identity(api.as_ref(), &identity).await;
        });
    }

    async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::DurationReceived(seconds) => self.handle_duration(seconds).await,
            CoordinatorEvent::ChannelStatus(connected) => {
                self.connected = connected;
                if connected {
                    info!("control server connected");
                } else {
                    warn!("control server connection lost");
                }
            }
            CoordinatorEvent::CountdownBeat(run) => self.handle_beat(run).await,
            CoordinatorEvent::Surface(event) => self.handle_surface(event).await,
            CoordinatorEvent::Shutdown => {}
        }
    }

    async fn handle_duration(&mut self, seconds: i64) {
        let duration = clamp_duration(seconds);
        if seconds < 0 {
            warn!(seconds, "negative duration, counting down from zero");
        }

        // Any countdown or quiz in progress is superseded
        if let Some(previous) = self.session.take() {
            info!(run = %previous.run, phase = %previous.phase, "superseding active session");
            if previous.phase.in_quiz() {
                // Take the abandoned question off screen and release the foreground
                log_surface_error(self.surface.show_message(QUIZ_ABANDONED_MESSAGE).await);
                self.present(Presentation::Background).await;
            }
        }
        self.quiz = None;

        let run = self.countdown.start(duration);
        let session = ControlSession::new(run, duration);
        info!(
            run = %run,
            duration_seconds = duration,
            started = session.started_unix(),
            "control session started"
        );
        self.session = Some(session);
    }

    async fn handle_beat(&mut self, run: RunId) {
        let Some(beat) = self.countdown.on_beat(run) else {
            debug!(run = %run, "ignoring beat of a cancelled countdown");
            return;
        };
        let Some(session) = self.session.as_mut().filter(|s| s.run == run) else {
            return;
        };

        session.tick(beat.remaining);
        self.render_countdown(beat.remaining).await;

        if beat.expired {
            self.handle_expired().await;
        }
    }

    async fn handle_expired(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.phase = SessionPhase::CountdownExpired;
            info!(run = %session.run, elapsed = ?session.started_at.elapsed(), "countdown expired");
        }

        self.present(Presentation::Foreground).await;
        log_surface_error(self.surface.show_message(TIME_UP_MESSAGE).await);
        self.channel.emit_session_complete();

        self.quiz = Some(QuizRun::start(Arc::clone(&self.questionnaire)));
        self.enter_quiz().await;
    }

    /// Move from `CountdownExpired` to `QuizActive` and show question 0.
    async fn enter_quiz(&mut self) {
        let Some(quiz) = self.quiz.as_ref() else {
            return;
        };
        if quiz.is_complete() {
            // Nothing to ask
            let score = quiz.score();
            self.finish_quiz(score).await;
            return;
        }

        if let Some(session) = self.session.as_mut() {
            session.phase = SessionPhase::QuizActive;
        }
        self.show_current_question().await;
    }

    async fn show_current_question(&mut self) {
        let Some(question) = self.quiz.as_ref().and_then(|q| q.current_question()).cloned() else {
            return;
        };
        log_surface_error(self.surface.show_question(&question).await);
    }

    async fn handle_answer(&mut self, option: &str) {
        if self.phase() != SessionPhase::QuizActive {
            debug!(option, phase = %self.phase(), "ignoring answer outside the quiz");
            return;
        }
        let Some(quiz) = self.quiz.as_mut() else {
            return;
        };

        match quiz.submit_answer(option) {
            QuizState::AwaitingAnswer(index) => {
                debug!(index, score = quiz.score(), "next question");
                self.show_current_question().await;
            }
            QuizState::Complete { score } => self.finish_quiz(score).await,
        }
    }

    async fn finish_quiz(&mut self, score: usize) {
        let total = self
            .quiz
            .as_ref()
            .map_or_else(|| self.questionnaire.len(), QuizRun::total);
        info!(score, total, "quiz complete");

        let message =
            format!("Quiz complete: {score} of {total} correct. The notification was sent.");
        log_surface_error(self.surface.show_message(&message).await);
        self.present(Presentation::Background).await;

        self.session = None;
        self.quiz = None;
    }

    async fn handle_surface(&mut self, event: SurfaceEvent) {
        let phase = self.phase();
        match event {
            SurfaceEvent::AnswerSelected(option) => self.handle_answer(&option).await,
            SurfaceEvent::CloseRequested => match phase {
                SessionPhase::Idle => {
                    debug!("close redirected to background");
                    self.present(Presentation::Background).await;
                }
                SessionPhase::CountdownRunning => {
                    info!("close vetoed while the countdown runs");
                    self.notify(Notice::WaitForTimer).await;
                }
                SessionPhase::CountdownExpired | SessionPhase::QuizActive => {
                    info!("close vetoed while the quiz is unfinished");
                    self.notify(Notice::FinishQuiz).await;
                }
            },
            SurfaceEvent::MinimizeRequested => match phase {
                SessionPhase::Idle => {
                    debug!("minimize redirected to background");
                    self.present(Presentation::Background).await;
                }
                SessionPhase::CountdownRunning => {
                    debug!("minimize refused while the countdown runs, restoring");
                    self.present(Presentation::Normal {
                        always_on_top: true,
                    })
                    .await;
                }
                SessionPhase::CountdownExpired | SessionPhase::QuizActive => {
                    self.present(Presentation::Minimized).await;
                }
            },
            SurfaceEvent::RestoreRequested => {
                self.present(Presentation::Normal {
                    always_on_top: phase.is_active(),
                })
                .await;
            }
        }
    }

    async fn render_countdown(&mut self, remaining: u64) {
        let text = format_hms(remaining);
        log_surface_error(self.surface.show_countdown(&text).await);
    }

    async fn notify(&mut self, notice: Notice) {
        log_surface_error(self.surface.show_notice(notice).await);
    }

    async fn present(&mut self, presentation: Presentation) {
        log_surface_error(self.surface.set_presentation(presentation).await);
    }

    fn publish_status(&self) {
        let status = CoordinatorStatus {
            phase: self.phase(),
            remaining_seconds: self
                .session
                .as_ref()
                .filter(|s| s.phase == SessionPhase::CountdownRunning)
                .map(|s| s.remaining_seconds),
            quiz_index: self
                .quiz
                .as_ref()
                .filter(|q| !q.is_complete())
                .map(QuizRun::current_index),
            quiz_score: self.quiz.as_ref().map(QuizRun::score),
            connected: self.connected,
        };
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    async fn shutdown(&mut self) -> Result<(), DaemonError> {
        self.countdown.cancel();
        self.session = None;
        self.quiz = None;

        self.channel.disconnect().await;

        match tokio::time::timeout(self.request_timeout, self.api.announce(Liveness::Disconnect))
            .await
        {
            Ok(Ok(())) => debug!("liveness disconnect sent"),
            Ok(Err(e)) => warn!(error = %e, "liveness disconnect failed"),
            Err(_) => warn!("liveness disconnect timed out"),
        }

        if let Err(e) = self.surface.shutdown().await {
            warn!(error = %e, "surface shutdown failed");
        }

        self.connected = false;
        self.publish_status();
        info!("coordinator stopped");
        Ok(())
    }
}

/// Surface failures are logged and otherwise ignored.
fn log_surface_error(result: Result<(), SurfaceError>) {
    if let Err(e) = result {
        warn!(error = %e, "surface update failed");
    }
}

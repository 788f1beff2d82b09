//! Terminal host surface (ratatui + crossterm).
//!
//! The terminal stands in for the agent window: "background" collapses the
//! view to a one-line tray indicator, "foreground" paints the whole screen
//! with a highlighted border. Keys: `1`-`9` answer, `m` minimize, `q`/`Esc`
//! close, `Enter` reopen from the background.

use std::io;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use guardian_types::Question;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SurfaceError;
use crate::{HostSurface, Notice, Presentation, SurfaceEvent};

/// Redraw / key poll interval.
const TICK_RATE: Duration = Duration::from_millis(100);

/// How long a notice stays on screen.
const NOTICE_TTL: Duration = Duration::from_secs(3);

enum Command {
    Countdown(String),
    Message(String),
    Question(Question),
    Notice(Notice),
    Presentation(Presentation),
    Shutdown,
}

/// [`HostSurface`] rendered in the controlling terminal.
///
/// Rendering and key polling run on a dedicated thread that owns the
/// terminal; the async side only sends it commands.
#[derive(Default)]
pub struct TerminalSurface {
    commands: Option<mpsc::UnboundedSender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, command: Command) -> Result<(), SurfaceError> {
        self.commands
            .as_ref()
            .ok_or(SurfaceError::NotRunning)?
            .send(command)
            .map_err(|_| SurfaceError::NotRunning)
    }
}

#[async_trait]
impl HostSurface for TerminalSurface {
    async fn start(&mut self, tx: mpsc::Sender<SurfaceEvent>) -> Result<(), SurfaceError> {
        if self.commands.is_some() {
            return Err(SurfaceError::AlreadyStarted);
        }
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let thread = std::thread::Builder::new()
            .name("guardian-terminal".to_string())
            .spawn(move || {
                if let Err(e) = run_terminal(command_rx, &tx) {
                    warn!(error = %e, "terminal surface stopped");
                }
            })?;
        self.commands = Some(command_tx);
        self.thread = Some(thread);
        Ok(())
    }

    async fn show_countdown(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.send(Command::Countdown(text.to_string()))
    }

    async fn show_message(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.send(Command::Message(text.to_string()))
    }

    async fn show_question(&mut self, question: &Question) -> Result<(), SurfaceError> {
        self.send(Command::Question(question.clone()))
    }

    async fn show_notice(&mut self, notice: Notice) -> Result<(), SurfaceError> {
        self.send(Command::Notice(notice))
    }

    async fn set_presentation(&mut self, presentation: Presentation) -> Result<(), SurfaceError> {
        self.send(Command::Presentation(presentation))
    }

    async fn shutdown(&mut self) -> Result<(), SurfaceError> {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Shutdown);
        }
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| SurfaceError::Other(e.into()))?
                .map_err(|_| SurfaceError::Other(anyhow::anyhow!("terminal thread panicked")))?;
        }
        Ok(())
    }
}

/// What the terminal currently shows.
struct View {
    presentation: Presentation,
    headline: String,
    question: Option<Question>,
    notice: Option<(Notice, Instant)>,
}

impl Default for View {
    fn default() -> Self {
        Self {
            presentation: Presentation::Background,
            headline: String::new(),
            question: None,
            notice: None,
        }
    }
}

impl View {
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Countdown(text) => self.headline = text,
            Command::Message(text) => {
                self.headline = text;
                self.question = None;
            }
            Command::Question(question) => self.question = Some(question),
            Command::Notice(notice) => self.notice = Some((notice, Instant::now())),
            Command::Presentation(presentation) => self.presentation = presentation,
            Command::Shutdown => return false,
        }
        true
    }

    fn is_open(&self) -> bool {
        matches!(
            self.presentation,
            Presentation::Normal { .. } | Presentation::Foreground
        )
    }

    fn active_notice(&self) -> Option<Notice> {
        self.notice
            .filter(|(_, shown)| shown.elapsed() < NOTICE_TTL)
            .map(|(notice, _)| notice)
    }
}

fn run_terminal(
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<SurfaceEvent>,
) -> io::Result<()> {
    enable_raw_mode()?;
    with_restore(
        || {
            io::stdout().execute(EnterAlternateScreen)?;
            let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
            event_loop(&mut terminal, &mut commands, events)
        },
        restore_terminal,
    )
}

fn restore_terminal() -> io::Result<()> {
    let raw = disable_raw_mode();
    io::stdout().execute(LeaveAlternateScreen)?;
    raw
}

/// Run `body`, then `restore` whether or not `body` failed. The body's error
/// wins over the restore error.
fn with_restore<T>(
    body: impl FnOnce() -> io::Result<T>,
    restore: impl FnOnce() -> io::Result<()>,
) -> io::Result<T> {
    let result = body();
    let restored = restore();
    match (result, restored) {
        (Err(e), Err(restore_err)) => {
            warn!(error = %restore_err, "failed to restore terminal");
            Err(e)
        }
        (result, restored) => restored.and(result),
    }
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::Sender<SurfaceEvent>,
) -> io::Result<()> {
    let mut view = View::default();

    loop {
        while let Ok(command) = commands.try_recv() {
            if !view.apply(command) {
                return Ok(());
            }
        }

        terminal.draw(|f| draw(f, &view))?;

        if event::poll(TICK_RATE)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = map_key(key, &view) {
                        debug!(?action, "surface action");
                        if events.blocking_send(action).is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn map_key(key: KeyEvent, view: &View) -> Option<SurfaceEvent> {
    let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl_c {
        return Some(SurfaceEvent::CloseRequested);
    }

    if !view.is_open() {
        return (key.code == KeyCode::Enter).then_some(SurfaceEvent::RestoreRequested);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(SurfaceEvent::CloseRequested),
        KeyCode::Char('m') => Some(SurfaceEvent::MinimizeRequested),
        KeyCode::Char(c) => {
            let question = view.question.as_ref()?;
            let index = c.to_digit(10)?.checked_sub(1)?;
            question
                .options
                .get(usize::try_from(index).ok()?)
                .cloned()
                .map(SurfaceEvent::AnswerSelected)
        }
        _ => None,
    }
}

fn draw(f: &mut Frame, view: &View) {
    match view.presentation {
        Presentation::Background => {
            draw_tray(f, "guardian is running in the background. Press Enter to open.");
        }
        Presentation::Minimized => draw_tray(f, "guardian is minimized. Press Enter to restore."),
        Presentation::Normal { .. } | Presentation::Foreground => draw_window(f, view),
    }
}

fn draw_tray(f: &mut Frame, text: &str) {
    let line = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
    let area = Rect {
        height: 1.min(f.area().height),
        ..f.area()
    };
    f.render_widget(line, area);
}

fn draw_window(f: &mut Frame, view: &View) {
    let (border, title) = match view.presentation {
        Presentation::Foreground => (Color::Red, " guardian: time is up "),
        Presentation::Normal { always_on_top: true } => (Color::Yellow, " guardian (pinned) "),
        _ => (Color::Cyan, " guardian "),
    };
    let outer = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);
    let inner = outer.inner(f.area());
    f.render_widget(outer, f.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Headline
            Constraint::Min(5),    // Question
            Constraint::Length(1), // Notice
            Constraint::Length(1), // Help bar
        ])
        .split(inner);

    let headline = Paragraph::new(view.headline.as_str())
        .style(Style::default().add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(headline, chunks[0]);

    if let Some(question) = &view.question {
        draw_question(f, chunks[1], question);
    }

    if let Some(notice) = view.active_notice() {
        let notice = Paragraph::new(notice.message())
            .style(Style::default().fg(Color::Yellow))
            .alignment(Alignment::Center);
        f.render_widget(notice, chunks[2]);
    }

    let help = Paragraph::new(Line::from(vec![
        Span::styled("1-9", Style::default().fg(Color::Cyan)),
        Span::raw(" answer  "),
        Span::styled("m", Style::default().fg(Color::Cyan)),
        Span::raw(" minimize  "),
        Span::styled("q", Style::default().fg(Color::Cyan)),
        Span::raw(" close"),
    ]))
    .alignment(Alignment::Center);
    f.render_widget(help, chunks[3]);
}

fn draw_question(f: &mut Frame, area: Rect, question: &Question) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let text = Paragraph::new(question.text.as_str())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(text, chunks[0]);

    let items: Vec<ListItem> = question
        .options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", i + 1), Style::default().fg(Color::Black).bg(Color::Cyan)),
                Span::raw(format!(" {option}")),
            ]))
        })
        .collect();
    f.render_widget(List::new(items), chunks[1]);
}

//! Countdown engine: single-flight, cancellable, one-second resolution.
//!
//! The engine holds the count; a per-run ticker task only enqueues
//! [`CoordinatorEvent::CountdownBeat`] onto the coordinator's queue once per
//! second. Beats are tagged with the run they belong to, so a beat that was
//! already queued when its run got cancelled is recognised and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::coordinator::CoordinatorEvent;

/// Countdown resolution.
pub const BEAT: Duration = Duration::from_secs(1);

/// Identifies one countdown run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What one beat of the active run amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    /// Seconds left to display for this beat.
    pub remaining: u64,
    /// Set exactly once, on the beat that displays `0`; the run is over.
    pub expired: bool,
}

struct ActiveRun {
    id: RunId,
    /// Next value to display; goes negative when the run expires.
    next: i64,
    ticker: JoinHandle<()>,
}

/// The countdown engine. Owned and driven by the coordinator.
pub struct Countdown {
    beats: mpsc::Sender<CoordinatorEvent>,
    active: Option<ActiveRun>,
    next_id: u64,
}

impl Countdown {
    pub fn new(beats: mpsc::Sender<CoordinatorEvent>) -> Self {
        Self {
            beats,
            active: None,
            next_id: 0,
        }
    }

    /// Start counting down from `duration_seconds`, cancelling any running
    /// countdown first. The first beat arrives one second from now.
    pub fn start(&mut self, duration_seconds: u64) -> RunId {
        self.cancel();

        self.next_id += 1;
        let id = RunId(self.next_id);
        let beats = self.beats.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + BEAT, BEAT);
            // Catch up after a stall so the total duration stays wall-clock accurate.
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                if beats.send(CoordinatorEvent::CountdownBeat(id)).await.is_err() {
                    break;
                }
            }
        });

        debug!(run = %id, duration_seconds, "countdown started");
        self.active = Some(ActiveRun {
            id,
            next: i64::try_from(duration_seconds).unwrap_or(i64::MAX),
            ticker,
        });
        id
    }

    /// Stop the running countdown, if any. No beat of the cancelled run is
    /// reported afterwards.
    pub fn cancel(&mut self) {
        if let Some(run) = self.active.take() {
            run.ticker.abort();
            debug!(run = %run.id, "countdown cancelled");
        }
    }

    /// Account for one beat. Returns `None` for beats of runs that are no
    /// longer active.
    pub fn on_beat(&mut self, id: RunId) -> Option<Beat> {
        let run = self.active.as_mut().filter(|run| run.id == id)?;

        let shown = u64::try_from(run.next).unwrap_or(0);
        run.next -= 1;
        let expired = run.next < 0;
        if expired {
            self.cancel();
        }
        Some(Beat {
            remaining: shown,
            expired,
        })
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// The active run, if any.
    pub fn current_run(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| run.id)
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Format whole seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (Countdown, mpsc::Receiver<CoordinatorEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (Countdown::new(tx), rx)
    }

    async fn next_beat(rx: &mut mpsc::Receiver<CoordinatorEvent>) -> RunId {
        match rx.recv().await {
            Some(CoordinatorEvent::CountdownBeat(id)) => id,
            _ => panic!("expected a countdown beat"),
        }
    }

    /// Run a countdown to completion, collecting ticks and expiries.
    async fn run_to_end(duration: u64) -> (Vec<u64>, usize) {
        let (mut countdown, mut rx) = engine();
        countdown.start(duration);

        let mut ticks = Vec::new();
        let mut expiries = 0;
        while countdown.is_running() {
            let id = next_beat(&mut rx).await;
            if let Some(beat) = countdown.on_beat(id) {
                ticks.push(beat.remaining);
                if beat.expired {
                    expiries += 1;
                }
            }
        }
        (ticks, expiries)
    }

    #[test]
    fn formats_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(59), "00:00:59");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(3600), "01:00:00");
        assert_eq!(format_hms(3 * 3600 + 25 * 60 + 7), "03:25:07");
        assert_eq!(format_hms(100 * 3600), "100:00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn duration_three_ticks_three_to_zero_then_expires_once() {
        let (ticks, expiries) = run_to_end(3).await;
        assert_eq!(ticks, vec![3, 2, 1, 0]);
        assert_eq!(expiries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn every_duration_ticks_duration_plus_one_times() {
        for duration in [0_u64, 1, 5, 12] {
            let (ticks, expiries) = run_to_end(duration).await;
            assert_eq!(ticks.len() as u64, duration + 1, "duration {duration}");
            assert_eq!(ticks.first().copied(), Some(duration));
            assert_eq!(ticks.last().copied(), Some(0));
            assert_eq!(expiries, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_beats_after_expiry() {
        let (mut countdown, mut rx) = engine();
        let id = countdown.start(0);
        let beat = countdown.on_beat(next_beat(&mut rx).await).unwrap();
        assert!(beat.expired);
        assert!(!countdown.is_running());

        // Any late beat for the finished run is ignored.
        assert_eq!(countdown.on_beat(id), None);
        tokio::time::sleep(BEAT * 3).await;
        while let Ok(CoordinatorEvent::CountdownBeat(late)) = rx.try_recv() {
            assert_eq!(countdown.on_beat(late), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_beat_arrives_after_one_second() {
        let (mut countdown, mut rx) = engine();
        let started = Instant::now();
        countdown.start(10);
        next_beat(&mut rx).await;
        assert_eq!(Instant::now() - started, BEAT);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_previous_run() {
        let (mut countdown, mut rx) = engine();
        let first = countdown.start(10);
        let beat = countdown.on_beat(next_beat(&mut rx).await).unwrap();
        assert_eq!(beat.remaining, 10);

        let second = countdown.start(2);
        assert_ne!(first, second);
        assert_eq!(countdown.current_run(), Some(second));

        // A beat of the superseded run, even if already queued, is dropped.
        assert_eq!(countdown.on_beat(first), None);

        let mut ticks = Vec::new();
        while countdown.is_running() {
            let id = next_beat(&mut rx).await;
            assert_eq!(id, second, "no beat of the superseded run is delivered");
            if let Some(beat) = countdown.on_beat(id) {
                ticks.push(beat.remaining);
            }
        }
        assert_eq!(ticks, vec![2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_safe_when_idle_and_stops_ticks() {
        let (mut countdown, mut rx) = engine();
        countdown.cancel();
        assert!(!countdown.is_running());

        let id = countdown.start(5);
        countdown.cancel();
        countdown.cancel();
        assert_eq!(countdown.on_beat(id), None);

        tokio::time::sleep(BEAT * 10).await;
        assert!(rx.try_recv().is_err(), "cancelled ticker must not beat");
    }
}

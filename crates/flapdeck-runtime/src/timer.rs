//! Countdown-timer content source.
//!
//! Remaining time is re-derived from the start [`Instant`] on every
//! observation.  Reaching zero while running stops the countdown
//! automatically; starting with zero remaining is a no-op until a new
//! duration is set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flapdeck_types::TimerSnapshot;
use tokio::time::MissedTickBehavior;

use crate::controller::ModeController;

/// Poll period while the timer mode is active.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Countdown bookkeeping behind the timer commands.
///
/// Mutated only under the controller lock.
#[derive(Debug, Default)]
pub(crate) struct TimerCore {
    /// Remaining time as of the last stop/set; the live value subtracts the
    /// running span.
    remaining: Duration,
    started_at: Option<Instant>,
}

impl TimerCore {
    /// Re-arm the countdown.  A running countdown is stopped first.
    pub fn set(&mut self, duration: Duration) -> TimerSnapshot {
        self.started_at = None;
        self.remaining = duration;
        self.snapshot()
    }

    /// Begin counting down.  Returns `None` when already running or when
    /// nothing remains (the caller must set a new duration first).
    pub fn start(&mut self) -> Option<TimerSnapshot> {
        if self.started_at.is_some() || self.remaining.is_zero() {
            return None;
        }
        self.started_at = Some(Instant::now());
        Some(self.snapshot())
    }

    /// Pause the countdown, banking the remaining time.  Returns `None` when
    /// already stopped.
    pub fn stop(&mut self) -> Option<TimerSnapshot> {
        let started = self.started_at.take()?;
        self.remaining = self.remaining.saturating_sub(started.elapsed());
        Some(self.snapshot())
    }

    pub fn remaining(&self) -> Duration {
        match self.started_at {
            Some(started) => self.remaining.saturating_sub(started.elapsed()),
            None => self.remaining,
        }
    }

    pub fn running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Observe the countdown.  Flips to stopped exactly once when a running
    /// countdown reaches zero, returning the snapshot to notify with.
    pub fn settle(&mut self) -> Option<TimerSnapshot> {
        if self.started_at.is_some() && self.remaining().is_zero() {
            self.started_at = None;
            self.remaining = Duration::ZERO;
            return Some(self.snapshot());
        }
        None
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            remaining_ms: self.remaining().as_millis() as u64,
            running: self.running(),
        }
    }
}

/// Render remaining time as `MM:SS`, or `H:MM:SS` above an hour.
///
/// Rounds up, so the display only shows zero when the countdown has actually
/// expired.
pub(crate) fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_millis().div_ceil(1000) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Source task: poll the core, publish the auto-stop when zero is reached,
/// and re-emit whenever the rendered value changes.
pub(crate) async fn run(ctrl: Arc<ModeController>, generation: u64) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<String> = None;
    loop {
        interval.tick().await;
        let Some(text) = ctrl.timer_frame(generation) else {
            return;
        };
        if last.as_deref() != Some(&text) {
            if !ctrl.emit_frame(generation, &text) {
                return;
            }
            last = Some(text);
        }
    }
}

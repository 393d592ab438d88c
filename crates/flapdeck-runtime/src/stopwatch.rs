//! Stopwatch content source.
//!
//! Elapsed time is re-derived from a recorded start [`Instant`] plus an
//! accumulated duration, never from an incrementing counter, so polling
//! jitter cannot drift the displayed value.  The poll rate is well above the
//! 1-second display resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use flapdeck_types::StopwatchSnapshot;
use tokio::time::MissedTickBehavior;

use crate::controller::ModeController;

/// Poll period while the stopwatch mode is active.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Start/stop/reset bookkeeping behind the stopwatch commands.
///
/// Mutated only under the controller lock.
#[derive(Debug, Default)]
pub(crate) struct StopwatchCore {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl StopwatchCore {
    /// Begin (or resume) counting.  Returns `None` when already running.
    pub fn start(&mut self) -> Option<StopwatchSnapshot> {
        if self.started_at.is_some() {
            return None;
        }
        self.started_at = Some(Instant::now());
        Some(self.snapshot())
    }

    /// Pause counting, folding the running span into the accumulated total.
    /// Returns `None` when already stopped.
    pub fn stop(&mut self) -> Option<StopwatchSnapshot> {
        let started = self.started_at.take()?;
        self.accumulated += started.elapsed();
        Some(self.snapshot())
    }

    /// Zero the elapsed total.  A running stopwatch keeps running from now.
    pub fn reset(&mut self) -> StopwatchSnapshot {
        self.accumulated = Duration::ZERO;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
        self.snapshot()
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default()
    }

    pub fn running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            elapsed_ms: self.elapsed().as_millis() as u64,
            running: self.running(),
        }
    }
}

/// Render elapsed time as `H:MM:SS`.
pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Source task: poll the core and re-emit whenever the rendered second
/// changes.  Exits as soon as the generation goes stale.
pub(crate) async fn run(ctrl: Arc<ModeController>, generation: u64) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<String> = None;
    loop {
        interval.tick().await;
        let Some(text) = ctrl.stopwatch_frame(generation) else {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_core_is_zero_and_stopped() {
        let core = StopwatchCore::default();
        assert_eq!(core.elapsed(), Duration::ZERO);
        assert!(!core.running());
    }

    #[test]
    fn start_is_idempotent() {
        let mut core = StopwatchCore::default();
        assert!(core.start().is_some());
        assert!(core.start().is_none(), "second start in the same state is a no-op");
        assert!(core.running());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut core = StopwatchCore::default();
        assert!(core.stop().is_none(), "stop before start is a no-op");
        core.start();
        assert!(core.stop().is_some());
        assert!(core.stop().is_none());
    }

    #[test]
    fn elapsed_derives_from_wall_time_not_tick_count() {
        let mut core = StopwatchCore::default();
        core.start();
        // Backdating the start simulates five untracked seconds; elapsed must
        // come out right without a single poll having happened.
        core.started_at = Some(Instant::now() - Duration::from_secs(5));
        let elapsed = core.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[test]
    fn stop_accumulates_across_spans() {
        let mut core = StopwatchCore::default();
        core.start();
        core.started_at = Some(Instant::now() - Duration::from_secs(2));
        core.stop();
        assert!(core.elapsed() >= Duration::from_secs(2));

        core.start();
        core.started_at = Some(Instant::now() - Duration::from_secs(3));
        core.stop();
        assert!(core.elapsed() >= Duration::from_secs(5));
        assert!(core.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn reset_zeroes_a_stopped_core() {
        let mut core = StopwatchCore::default();
        core.start();
        core.started_at = Some(Instant::now() - Duration::from_secs(9));
        core.stop();
        let snap = core.reset();
        assert_eq!(snap.elapsed_ms, 0);
        assert!(!snap.running);
    }

    #[test]
    fn reset_keeps_a_running_core_running() {
        let mut core = StopwatchCore::default();
        core.start();
        core.started_at = Some(Instant::now() - Duration::from_secs(9));
        let snap = core.reset();
        assert!(snap.running);
        assert!(core.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn format_renders_hours_minutes_seconds() {
        assert_eq!(format_elapsed(Duration::ZERO), "0:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "0:01:01");
        assert_eq!(format_elapsed(Duration::from_secs(3600 + 125)), "1:02:05");
        assert_eq!(format_elapsed(Duration::from_millis(999)), "0:00:00");
    }
}

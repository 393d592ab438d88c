//! [`ModeController`] – the display orchestrator.
//!
//! Holds exactly one active content source and is the only writer of the
//! current output text.  Every command and every source tick funnels through
//! one mutex-guarded state block, so no two mutations interleave.  Each
//! emission carries the generation number it was spawned under and re-checks
//! it under the lock, which keeps a late tick from a cancelled source off the
//! wire even when the task had already fired before cancellation landed.
//!
//! Outbound frames are fitted to the display width, run through the
//! calibration transform, and handed to the [`DisplaySink`]; every state
//! change is mirrored onto the [`StateBus`] `Display` lane.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use flapdeck_hal::{FlapSequence, calibrate};
use flapdeck_link::{DisplaySink, Lane, StateBus};
use flapdeck_types::{
    DisplayFrame, Event, Mode, SceneScript, StatePayload, StopwatchSnapshot, TimerSnapshot,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stopwatch::{self, StopwatchCore};
use crate::timer::{self, TimerCore};
use crate::{clock, scene};

/// Source tag used on bus events emitted by the controller.
const SOURCE: &str = "flapdeck-runtime::controller";

/// Orchestration parameters, supplied at process start and immutable for the
/// process lifetime.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of character wheels on the display.
    pub display_width: usize,
    /// Per-position home-offset profile; `None` sends logical characters
    /// unchanged.
    pub calibration: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            display_width: 12,
            calibration: None,
        }
    }
}

/// Handle of the currently active timed source.  One arm per source so each
/// owns its task explicitly; `Text`/`Train` (and `Sequence` before a play
/// command) hold no task at all.
enum SourceHandle {
    None,
    Clock(JoinHandle<()>),
    Stopwatch(JoinHandle<()>),
    Timer(JoinHandle<()>),
    Scene(JoinHandle<()>),
}

impl SourceHandle {
    /// Abort whatever task is held and leave `None` behind.
    fn cancel(&mut self) {
        match std::mem::replace(self, SourceHandle::None) {
            SourceHandle::None => {}
            SourceHandle::Clock(handle)
            | SourceHandle::Stopwatch(handle)
            | SourceHandle::Timer(handle)
            | SourceHandle::Scene(handle) => handle.abort(),
        }
    }
}

struct ControllerState {
    mode: Mode,
    /// Bumped on every transition; emissions carrying an older value are
    /// stale and dropped.
    generation: u64,
    /// Current logical frame text, already fitted to the display width.
    text: String,
    stopwatch: StopwatchCore,
    timer: TimerCore,
    active: SourceHandle,
}

/// Full controller state for late-joining observers.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub mode: Mode,
    pub text: String,
    pub stopwatch: StopwatchSnapshot,
    pub timer: TimerSnapshot,
}

/// The display orchestrator.  Construct once, share via [`Arc`], and drive it
/// through the command methods; sources report back through the same object.
pub struct ModeController {
    cfg: ControllerConfig,
    sequence: FlapSequence,
    sink: Arc<dyn DisplaySink>,
    bus: Arc<StateBus>,
    /// Self-handle used to hand source tasks an owning reference.
    me: Weak<ModeController>,
    state: Mutex<ControllerState>,
}

impl ModeController {
    pub fn new(
        cfg: ControllerConfig,
        sequence: FlapSequence,
        sink: Arc<dyn DisplaySink>,
        bus: Arc<StateBus>,
    ) -> Arc<Self> {
        let blank = DisplayFrame::fit("", cfg.display_width).to_string();
        Arc::new_cyclic(|me| Self {
            cfg,
            sequence,
            sink,
            bus,
            me: me.clone(),
            state: Mutex::new(ControllerState {
                mode: Mode::default(),
                generation: 0,
                text: blank,
                stopwatch: StopwatchCore::default(),
                timer: TimerCore::default(),
                active: SourceHandle::None,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Command intake
    // -----------------------------------------------------------------------

    /// Switch the active content source.
    ///
    /// The outgoing source is cancelled before the new one starts, even when
    /// `mode` equals the current mode: re-entering a mode restarts it (e.g.
    /// re-entering Clock restarts its tick from now).
    pub fn set_mode(&self, mode: Mode) {
        let generation = {
            let mut st = self.lock();
            st.active.cancel();
            st.generation += 1;
            st.mode = mode;
            st.generation
        };
        info!(%mode, "mode activated");
        self.notify(StatePayload::ModeChanged { mode });
        self.start_source(mode, generation);
    }

    /// Record and show free text.  Only honoured while Text or Train is
    /// active; timed sources own the frame otherwise.
    pub fn set_text(&self, text: &str) {
        let generation = {
            let st = self.lock();
            if !matches!(st.mode, Mode::Text | Mode::Train) {
                warn!(mode = %st.mode, "set_text ignored; no text mode active");
                return;
            }
            st.generation
        };
        self.emit_frame(generation, text);
    }

    pub fn start_stopwatch(&self) {
        match { self.lock().stopwatch.start() } {
            Some(snap) => self.notify(StatePayload::StopwatchChanged(snap)),
            None => debug!("start_stopwatch ignored; already running"),
        }
    }

    pub fn stop_stopwatch(&self) {
        match { self.lock().stopwatch.stop() } {
            Some(snap) => self.notify(StatePayload::StopwatchChanged(snap)),
            None => debug!("stop_stopwatch ignored; not running"),
        }
    }

    pub fn reset_stopwatch(&self) {
        let snap = { self.lock().stopwatch.reset() };
        self.notify(StatePayload::StopwatchChanged(snap));
    }

    /// Re-arm the countdown.  A running countdown is stopped first.
    pub fn set_timer(&self, duration_ms: u64) {
        let snap = {
            self.lock()
                .timer
                .set(Duration::from_millis(duration_ms))
        };
        self.notify(StatePayload::TimerChanged(snap));
    }

    pub fn start_timer(&self) {
        match { self.lock().timer.start() } {
            Some(snap) => self.notify(StatePayload::TimerChanged(snap)),
            None => debug!("start_timer ignored; already running or nothing remains"),
        }
    }

    pub fn stop_timer(&self) {
        match { self.lock().timer.stop() } {
            Some(snap) => self.notify(StatePayload::TimerChanged(snap)),
            None => debug!("stop_timer ignored; not running"),
        }
    }

    /// Start scene playback, switching to Sequence mode and retiring whatever
    /// was playing.  At most one script is live; replaying restarts at line
    /// zero of the new script.
    pub fn play_sequence(&self, script: SceneScript) {
        let (generation, mode_changed) = {
            let mut st = self.lock();
            st.active.cancel();
            st.generation += 1;
            let changed = st.mode != Mode::Sequence;
            st.mode = Mode::Sequence;
            (st.generation, changed)
        };
        if mode_changed {
            self.notify(StatePayload::ModeChanged {
                mode: Mode::Sequence,
            });
        }
        if script.lines.is_empty() {
            info!("empty scene script; stopping immediately");
            self.notify(StatePayload::SequenceStopped);
            return;
        }
        info!(
            lines = script.lines.len(),
            looping = script.loop_forever,
            "scene playback started"
        );
        let Some(me) = self.me.upgrade() else {
            return;
        };
        let handle = tokio::spawn(scene::run(me, generation, script));
        self.store_handle(generation, SourceHandle::Scene(handle));
    }

    /// Halt scene playback immediately.  Silent: only natural completion
    /// raises the stopped notification.  A second stop is a no-op.
    pub fn stop_sequence(&self) {
        let mut st = self.lock();
        if !matches!(st.active, SourceHandle::Scene(_)) {
            debug!("stop_sequence ignored; no scene playing");
            return;
        }
        st.active.cancel();
        st.generation += 1;
        info!("scene playback stopped");
    }

    /// Full state for late-joining observers.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let mut st = self.lock();
        if let Some(snap) = st.timer.settle() {
            info!("timer reached zero; countdown stopped");
            self.notify(StatePayload::TimerChanged(snap));
        }
        ControllerSnapshot {
            mode: st.mode,
            text: st.text.clone(),
            stopwatch: st.stopwatch.snapshot(),
            timer: st.timer.snapshot(),
        }
    }

    /// Re-send the current frame, e.g. after the broker link reconnects.
    pub fn republish_frame(&self) {
        let (generation, text) = {
            let st = self.lock();
            (st.generation, st.text.clone())
        };
        self.emit_frame(generation, &text);
    }

    pub fn display_width(&self) -> usize {
        self.cfg.display_width
    }

    // -----------------------------------------------------------------------
    // Source plumbing
    // -----------------------------------------------------------------------

    /// Record + transmit one frame, provided `generation` is still current.
    ///
    /// Returns `false` when the emission was stale; source tasks use that as
    /// their exit signal.
    pub(crate) fn emit_frame(&self, generation: u64, text: &str) -> bool {
        let mut st = self.lock();
        if generation != st.generation {
            debug!(generation, current = st.generation, "stale frame dropped");
            return false;
        }
        let frame = DisplayFrame::fit(text, self.cfg.display_width);
        st.text = frame.to_string();
        let wire = calibrate(&frame, self.cfg.calibration.as_deref(), &self.sequence);
        self.sink.send_frame(wire.as_str());
        self.notify(StatePayload::FrameChanged {
            text: frame.to_string(),
        });
        true
    }

    /// Stopwatch poll: render the current elapsed value, or `None` when the
    /// generation went stale and the task should exit.
    pub(crate) fn stopwatch_frame(&self, generation: u64) -> Option<String> {
        let st = self.lock();
        if generation != st.generation {
            return None;
        }
        Some(stopwatch::format_elapsed(st.stopwatch.elapsed()))
    }

    /// Timer poll: settle an expired countdown (publishing the auto-stop) and
    /// render the remaining value, or `None` when the generation went stale.
    pub(crate) fn timer_frame(&self, generation: u64) -> Option<String> {
        let mut st = self.lock();
        if generation != st.generation {
            return None;
        }
        if let Some(snap) = st.timer.settle() {
            info!("timer reached zero; countdown stopped");
            self.notify(StatePayload::TimerChanged(snap));
        }
        Some(timer::format_remaining(st.timer.remaining()))
    }

    /// Natural end of scene playback: clears the handle and raises the
    /// stopped notification, unless a newer transition already took over.
    pub(crate) fn finish_sequence(&self, generation: u64) {
        let mut st = self.lock();
        if generation != st.generation {
            return;
        }
        st.active = SourceHandle::None;
        drop(st);
        info!("scene playback finished");
        self.notify(StatePayload::SequenceStopped);
    }

    fn start_source(&self, mode: Mode, generation: u64) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        match mode {
            Mode::Text | Mode::Train => {
                // Passive modes re-show the held text on (re)entry.
                let text = { self.lock().text.clone() };
                self.emit_frame(generation, &text);
            }
            Mode::Clock => {
                let handle = tokio::spawn(clock::run(me, generation));
                self.store_handle(generation, SourceHandle::Clock(handle));
            }
            Mode::Stopwatch => {
                let handle = tokio::spawn(stopwatch::run(me, generation));
                self.store_handle(generation, SourceHandle::Stopwatch(handle));
            }
            Mode::Timer => {
                let handle = tokio::spawn(timer::run(me, generation));
                self.store_handle(generation, SourceHandle::Timer(handle));
            }
            Mode::Sequence => {
                // Entering Sequence by bare mode switch holds the current
                // frame until a play command arrives.
            }
        }
    }

    fn store_handle(&self, generation: u64, handle: SourceHandle) {
        let mut st = self.lock();
        if st.generation == generation {
            st.active = handle;
        } else {
            // A newer transition raced the spawn; retire the fresh task.
            let mut stale = handle;
            stale.cancel();
        }
    }

    fn notify(&self, payload: StatePayload) {
        self.bus.publish(Lane::Display, Event::new(SOURCE, payload));
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

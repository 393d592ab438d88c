//! Clock content source.
//!
//! Ticks once per second while active and renders the local weekday and time
//! plus a purely cosmetic accent glyph that cycles through a fixed palette,
//! keyed by the current minute.  The accent glyphs sit outside the flap
//! alphabet, so calibration passes them through unchanged.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use tokio::time::MissedTickBehavior;

use crate::controller::ModeController;

/// Cosmetic accent palette, one glyph per minute, wrapping.
const ACCENTS: [char; 6] = ['♦', '♥', '♣', '♠', '★', '●'];

/// Render the clock frame for `now`.
///
/// Wide displays (≥ 14 positions) get seconds; narrower ones get `HH:MM`.
pub(crate) fn frame_text(now: DateTime<Local>, width: usize) -> String {
    let accent = ACCENTS[now.minute() as usize % ACCENTS.len()];
    let day = now.format("%a").to_string().to_uppercase();
    if width >= 14 {
        format!("{day} {} {accent}", now.format("%H:%M:%S"))
    } else {
        format!("{day} {} {accent}", now.format("%H:%M"))
    }
}

/// Source task: one frame per second, re-emitted only when the rendered text
/// changes.  Exits as soon as the generation goes stale.
pub(crate) async fn run(ctrl: Arc<ModeController>, generation: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<String> = None;
    loop {
        interval.tick().await;
        let text = frame_text(Local::now(), ctrl.display_width());
        if last.as_deref() != Some(&text) {
            if !ctrl.emit_frame(generation, &text) {
                return;
            }
            last = Some(text);
        }
    }
}

//! Scene sequencer – plays an ordered list of timed text lines.
//!
//! The sequencer is a source task like any other: it emits the line under
//! the cursor immediately, sleeps for the line's duration, and advances.
//! Past the last line it either wraps (loop flag) or halts with a
//! "sequence stopped" notification.  An explicit stop or a mode change
//! cancels the pending sleep and is silent; only natural completion
//! notifies.

use std::sync::Arc;
use std::time::Duration;

use flapdeck_types::SceneScript;

use crate::controller::ModeController;

/// Playback task for one script.  At most one is live; replaying spawns a
/// fresh task under a new generation, which retires this one.
pub(crate) async fn run(ctrl: Arc<ModeController>, generation: u64, script: SceneScript) {
    loop {
        for line in &script.lines {
            if !ctrl.emit_frame(generation, &line.text) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(line.duration_ms)).await;
        }
        if !script.loop_forever {
            break;
        }
    }
    ctrl.finish_sequence(generation);
}

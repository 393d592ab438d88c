//! Calibration transform – logical frame → wheel-relative frame.
//!
//! The physical wheels do not start at a known rotational offset.  A
//! calibration profile records, per display position, which character a wheel
//! shows at its physical home position.  This transform converts a logical
//! character into the sequence index the wheel must be commanded to, relative
//! to its own physical zero.
//!
//! The transform is pure, stateless, and total: unrecognised input falls back
//! to identity, never to an error.

use flapdeck_types::DisplayFrame;

use crate::sequence::FlapSequence;

/// Calibrate `frame` against `profile`.
///
/// Per character position *i* with logical character *c*:
///
/// 1. `c` not on the wheel → pass through unchanged (separators and accent
///    glyphs bypass calibration).
/// 2. No profile, or the profile character at `i mod profile.len()` not on
///    the wheel → pass through unchanged.
/// 3. Otherwise emit `sequence[(index(c) - index(home) + N) mod N]`.
///
/// The profile is consumed cyclically, so it need not match the display
/// width.  An empty profile behaves like no profile.
pub fn calibrate(frame: &DisplayFrame, profile: Option<&str>, seq: &FlapSequence) -> DisplayFrame {
    let Some(profile) = profile.filter(|p| !p.is_empty()) else {
        return frame.clone();
    };
    let homes: Vec<char> = profile.chars().collect();
    let n = seq.len();

    let out: String = frame
        .as_str()
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let Some(target) = seq.index_of(c) else {
                return c;
            };
            let Some(home_idx) = seq.index_of(homes[i % homes.len()]) else {
                return c;
            };
            seq.char_at((target + n - home_idx) % n)
        })
        .collect();

    DisplayFrame::fit(&out, frame.width())
}

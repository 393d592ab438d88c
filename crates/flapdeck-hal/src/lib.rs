//! `flapdeck-hal` – The Wheel Abstraction
//!
//! Everything the rest of the system needs to know about the physical
//! character wheels, without any wiring or transport concerns.
//!
//! # Modules
//!
//! - [`sequence`] – [`FlapSequence`][sequence::FlapSequence]: the fixed
//!   cyclic alphabet a wheel steps through.
//! - [`calibrate`] – [`calibrate`][calibrate::calibrate]: the pure transform
//!   mapping a logical frame to the wheel-relative characters that must be
//!   sent, given a per-position home-offset profile.

pub mod calibrate;
pub mod sequence;

pub use calibrate::calibrate;
pub use sequence::{DEFAULT_SEQUENCE, FlapSequence};

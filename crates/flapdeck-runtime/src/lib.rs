//! `flapdeck-runtime` – The Orchestrator
//!
//! The execution engine that decides what the display shows: exactly one
//! content source is live at a time, and every frame it produces is fitted,
//! calibrated, and pushed through the broker link.
//!
//! # Modules
//!
//! - [`controller`] – [`ModeController`][controller::ModeController]: the
//!   mode state machine and single writer of the current frame.  All command
//!   intake (`set_mode`, `set_text`, stopwatch/timer/scene commands) lands
//!   here.
//! - [`clock`] – 1 Hz weekday + time source with a cosmetic accent glyph.
//! - [`stopwatch`] – drift-free elapsed-time source derived from a recorded
//!   start instant.
//! - [`timer`] – countdown source that stops itself at zero.
//! - [`scene`] – plays an ordered, optionally looping list of timed text
//!   lines.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter
//!   (`OTEL_EXPORTER_OTLP_ENDPOINT`).

pub mod clock;
pub mod controller;
pub mod scene;
pub mod stopwatch;
pub mod telemetry;
pub mod timer;

pub use controller::{ControllerConfig, ControllerSnapshot, ModeController};
pub use telemetry::{TracerProviderGuard, init_tracing};

//! `flapdeck-link` – The Nervous System
//!
//! Routes state between the orchestration runtime, the MQTT broker, and any
//! in-process observer, without caring about what the state means.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, lane-based publish/subscribe bus for
//!   state-change events, built on Tokio broadcast channels.
//! - [`mqtt`] – [`BrokerLink`][mqtt::BrokerLink]: the single MQTT connection,
//!   modeled as an explicit state machine with last-will presence and an
//!   indefinite fixed-period reconnect loop.
//! - [`sink`] – [`DisplaySink`][sink::DisplaySink]: the seam through which
//!   frames reach the wire, so the runtime never touches MQTT directly.

pub mod bus;
pub mod mqtt;
pub mod sink;

pub use bus::{Lane, LaneReceiver, StateBus};
pub use mqtt::{BrokerLink, LinkConfig, LinkHandler, LinkMessage};
pub use sink::{DisplaySink, FrameTopicSink};

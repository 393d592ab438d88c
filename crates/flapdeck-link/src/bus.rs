//! Headless, typed, lane-based publish/subscribe bus for state-change events.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every event without any single subscriber blocking
//! the others.
//!
//! # Lanes
//!
//! Traffic is partitioned into two [`Lane`]s so observers only receive the
//! events they care about:
//!
//! | Lane | Typical traffic |
//! |---|---|
//! | [`Lane::Display`] | Frame, mode, stopwatch, timer, and sequence updates |
//! | [`Lane::Link`] | Broker connection status and availability changes |
//!
//! Publishing is best-effort: an event with no subscribers is dropped
//! silently, which is a normal condition for a headless service.

use flapdeck_types::Event;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the state bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// What the display is showing: frames, mode, stopwatch/timer snapshots,
    /// sequence lifecycle.
    Display,
    /// How the broker connection is doing: status and availability.
    Link,
}

/// Shared state bus.  Clone it cheaply – all clones share the same underlying
/// broadcast channels.
///
/// Every event is delivered both on its [`Lane`] channel and on the global
/// channel, so observers can choose between a filtered and a firehose view.
#[derive(Clone, Debug)]
pub struct StateBus {
    all: broadcast::Sender<Event>,
    display: broadcast::Sender<Event>,
    link: broadcast::Sender<Event>,
}

impl StateBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (display, _) = broadcast::channel(capacity);
        let (link, _) = broadcast::channel(capacity);
        Self { all, display, link }
    }

    /// Publish `event` on `lane` (and on the global channel).
    ///
    /// Returns the number of lane receivers that were handed the event.
    /// Zero subscribers is a normal condition, not an error.
    pub fn publish(&self, lane: Lane, event: Event) -> usize {
        let _ = self.all.send(event.clone());
        self.lane_sender(lane).send(event).unwrap_or(0)
    }

    /// Subscribe to every event regardless of lane.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Subscribe to a single [`Lane`].
    pub fn subscribe_lane(&self, lane: Lane) -> LaneReceiver {
        LaneReceiver {
            lane,
            receiver: self.lane_sender(lane).subscribe(),
        }
    }

    fn lane_sender(&self, lane: Lane) -> &broadcast::Sender<Event> {
        match lane {
            Lane::Display => &self.display,
            Lane::Link => &self.link,
        }
    }
}

impl Default for StateBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Lane`].
///
/// Obtained via [`StateBus::subscribe_lane`].
pub struct LaneReceiver {
    lane: Lane,
    receiver: broadcast::Receiver<Event>,
}

impl LaneReceiver {
    /// Wait for the next event on this lane.
    ///
    /// Returns `None` when the bus has shut down.  A lagged subscriber is
    /// logged and resumes with the oldest retained event.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lane = ?self.lane, lagged_by = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Lane`] this receiver is bound to.
    pub fn lane(&self) -> Lane {
        self.lane
    }
}

//! [`DisplaySink`] – the seam through which calibrated frames reach the wire.
//!
//! The orchestration runtime only ever talks to the trait, so the transport
//! can be swapped (or mocked in tests) without touching mode logic.

use std::sync::Arc;

use crate::mqtt::BrokerLink;

/// Consumer of calibrated, width-fitted frames.
///
/// Implementations must be non-blocking: the caller may hold orchestration
/// state while sending.
pub trait DisplaySink: Send + Sync {
    /// Hand one frame to the transport.  Fire-and-forget.
    fn send_frame(&self, frame: &str);
}

/// [`DisplaySink`] publishing each frame as raw UTF-8 text on a fixed broker
/// topic.
pub struct FrameTopicSink {
    link: Arc<BrokerLink>,
    topic: String,
}

impl FrameTopicSink {
    pub fn new(link: Arc<BrokerLink>, topic: impl Into<String>) -> Self {
        Self {
            link,
            topic: topic.into(),
        }
    }
}

impl DisplaySink for FrameTopicSink {
    fn send_frame(&self, frame: &str) {
        self.link.publish(&self.topic, frame.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::StateBus;
    use crate::mqtt::LinkConfig;

    /// Sending through the sink before the link is up must not panic; the
    /// frame is dropped and logged by the link.
    #[tokio::test]
    async fn send_frame_without_connection_is_harmless() {
        let bus = Arc::new(StateBus::default());
        let link = Arc::new(BrokerLink::new(LinkConfig::default(), bus));
        let sink = FrameTopicSink::new(link, "flapdeck/display");
        sink.send_frame("HELLO WORLD ");
    }
}

//! [`BrokerLink`] – the single MQTT connection to the external broker.
//!
//! The link is modeled as an explicit connection state machine
//! {Disconnected, Connecting, Connected, Errored} with one background task
//! driving the protocol event loop and retries.  It:
//!
//! 1. **Announces** presence through a broker-native last-will: if the
//!    process disappears uncleanly, the broker itself publishes `offline`
//!    (retained, QoS 1) on the availability topic.
//!
//! 2. **Forwards** every inbound publish verbatim (topic, payload bytes) to
//!    exactly one registered handler; the link performs no interpretation.
//!
//! 3. **Retries** transient transport errors forever at a fixed period.  A
//!    long-lived background service has no use for backoff or attempt caps;
//!    the broker coming back is the only exit condition.
//!
//! Malformed broker URLs are fatal at startup: the status is pinned to
//! `Errored` and no retry loop is started, since retrying cannot fix bad
//! configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flapdeck_types::{ConnectionStatus, Event, FlapError, LinkState, StatePayload};
use rumqttc::{AsyncClient, Event as PacketEvent, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{Lane, StateBus};

/// Source tag used on bus events emitted by the link.
const SOURCE: &str = "flapdeck-link::mqtt";

/// Keep-alive interval negotiated with the broker.
const KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Everything the link needs to reach the broker, supplied at process start
/// and immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// `mqtt://host:port` (the scheme and port are optional; the port
    /// defaults to 1883).
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Retained presence topic carrying `online`/`offline`.
    pub availability_topic: String,
    /// Fixed period between reconnect attempts.
    pub reconnect_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "flapdeck".to_string(),
            username: None,
            password: None,
            availability_topic: "flapdeck/available".to_string(),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Notifications delivered to the single registered handler.
#[derive(Debug, Clone)]
pub enum LinkMessage {
    /// Synthetic internal signal emitted once per successful (re)connect, so
    /// upstream logic can announce presence and republish state without a
    /// separate event type.
    Connected,
    /// Verbatim inbound publish from the broker.
    Inbound { topic: String, payload: Vec<u8> },
}

/// The one inbound dispatch callback.  Invoked from the driver task.
pub type LinkHandler = Arc<dyn Fn(LinkMessage) + Send + Sync>;

struct ActiveConnection {
    client: AsyncClient,
    driver: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// Owns at most one live connection to the external broker.
///
/// All operations are non-blocking: publishes are fire-and-forget, status is
/// read through [`BrokerLink::state`] or watched through
/// [`BrokerLink::watch`], and every status change is mirrored onto the
/// [`StateBus`] `Link` lane.
pub struct BrokerLink {
    cfg: LinkConfig,
    bus: Arc<StateBus>,
    state_tx: watch::Sender<LinkState>,
    active: Mutex<Option<ActiveConnection>>,
}

impl BrokerLink {
    pub fn new(cfg: LinkConfig, bus: Arc<StateBus>) -> Self {
        let (state_tx, _) = watch::channel(LinkState::default());
        Self {
            cfg,
            bus,
            state_tx,
            active: Mutex::new(None),
        }
    }

    /// Open the connection and register `handler` as the single inbound
    /// dispatch callback.
    ///
    /// Idempotent: a call while already connected or mid-reconnect is a
    /// logged no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FlapError::Config`] for a missing or malformed broker URL.
    /// The status is pinned to `Errored` and no retry is attempted, since
    /// retrying cannot fix bad configuration.
    pub fn connect(&self, handler: LinkHandler) -> Result<(), FlapError> {
        let mut active = self.lock_active();
        if active.is_some() {
            info!("connect ignored; broker link already active");
            return Ok(());
        }

        let (host, port) = match parse_broker_url(&self.cfg.broker_url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                report(&self.state_tx, &self.bus, LinkState::errored(e.to_string()));
                return Err(e);
            }
        };

        let mut opts = MqttOptions::new(self.cfg.client_id.clone(), host, port);
        opts.set_keep_alive(KEEP_ALIVE);
        opts.set_last_will(LastWill::new(
            &self.cfg.availability_topic,
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if let Some(user) = &self.cfg.username {
            opts.set_credentials(user.clone(), self.cfg.password.clone().unwrap_or_default());
        }

        report(
            &self.state_tx,
            &self.bus,
            LinkState::new(ConnectionStatus::Connecting),
        );

        let (client, eventloop) = AsyncClient::new(opts, 64);
        let stop = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive(
            eventloop,
            handler,
            self.state_tx.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&stop),
            self.cfg.reconnect_interval,
        ));
        *active = Some(ActiveConnection { client, driver, stop });
        Ok(())
    }

    /// Fire-and-forget publish (QoS 0, not retained).  Failures are logged,
    /// never surfaced to the caller.
    pub fn publish(&self, topic: &str, payload: &[u8]) {
        match self.lock_active().as_ref() {
            None => warn!(topic, "publish dropped; broker link not started"),
            Some(conn) => {
                if let Err(e) = conn.client.try_publish(topic, QoS::AtMostOnce, false, payload) {
                    warn!(topic, error = %e, "publish failed");
                }
            }
        }
    }

    /// Fire-and-forget retained publish at QoS 1, used for the availability
    /// topic so late-joining observers see the current presence value.
    pub fn publish_retained(&self, topic: &str, payload: &[u8]) {
        match self.lock_active().as_ref() {
            None => warn!(topic, "retained publish dropped; broker link not started"),
            Some(conn) => {
                if let Err(e) = conn.client.try_publish(topic, QoS::AtLeastOnce, true, payload) {
                    warn!(topic, error = %e, "retained publish failed");
                }
            }
        }
    }

    /// Register a broker subscription.  Inbound publishes on the topic reach
    /// the handler passed to [`BrokerLink::connect`].
    pub fn subscribe(&self, topic: &str) {
        match self.lock_active().as_ref() {
            None => warn!(topic, "subscribe dropped; broker link not started"),
            Some(conn) => {
                if let Err(e) = conn.client.try_subscribe(topic, QoS::AtMostOnce) {
                    warn!(topic, error = %e, "subscribe failed");
                }
            }
        }
    }

    /// Stop the retry loop, send the protocol disconnect, and drop the
    /// connection.  A second call is a no-op.
    pub fn disconnect(&self) {
        let mut active = self.lock_active();
        if let Some(conn) = active.take() {
            conn.stop.store(true, Ordering::Release);
            if let Err(e) = conn.client.try_disconnect() {
                debug!(error = %e, "disconnect packet not sent");
            }
            conn.driver.abort();
            report(
                &self.state_tx,
                &self.bus,
                LinkState::new(ConnectionStatus::Disconnected),
            );
            info!("broker link disconnected");
        } else {
            debug!("disconnect ignored; broker link not active");
        }
    }

    /// Current connection state.
    pub fn state(&self) -> LinkState {
        self.state_tx.borrow().clone()
    }

    /// Watch channel following every connection state change.
    pub fn watch(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Background task owning the protocol event loop.
///
/// Transient errors put the state machine back into `Connecting` and retry
/// after a fixed sleep, forever, until the stop flag is raised.
async fn drive(
    mut eventloop: EventLoop,
    handler: LinkHandler,
    state_tx: watch::Sender<LinkState>,
    bus: Arc<StateBus>,
    stop: Arc<AtomicBool>,
    retry: Duration,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        match eventloop.poll().await {
            Ok(PacketEvent::Incoming(Incoming::ConnAck(ack))) => {
                info!(code = ?ack.code, "broker connection established");
                report(&state_tx, &bus, LinkState::new(ConnectionStatus::Connected));
                handler(LinkMessage::Connected);
            }
            Ok(PacketEvent::Incoming(Incoming::Publish(publish))) => {
                handler(LinkMessage::Inbound {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %e, retry_in = ?retry, "broker connection lost; retrying");
                report(
                    &state_tx,
                    &bus,
                    LinkState {
                        status: ConnectionStatus::Connecting,
                        last_error: Some(e.to_string()),
                    },
                );
                tokio::time::sleep(retry).await;
            }
        }
    }
    report(
        &state_tx,
        &bus,
        LinkState::new(ConnectionStatus::Disconnected),
    );
}

/// Update the watch channel and mirror the change onto the bus.
///
/// Unchanged states are swallowed so retry loops do not flood observers.
fn report(state_tx: &watch::Sender<LinkState>, bus: &StateBus, state: LinkState) {
    let event_state = state.clone();
    let modified = state_tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
    if modified {
        bus.publish(
            Lane::Link,
            Event::new(SOURCE, StatePayload::LinkChanged(event_state)),
        );
    }
}

/// Split `mqtt://host:port` into host and port.
///
/// The scheme is optional; a missing port defaults to 1883.
fn parse_broker_url(url: &str) -> Result<(String, u16), FlapError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(FlapError::Config("broker URL is not set".to_string()));
    }
    let rest = trimmed.strip_prefix("mqtt://").unwrap_or(trimmed);
    if rest.is_empty() || rest.contains('/') {
        return Err(FlapError::Config(format!("malformed broker URL: {url}")));
    }
    match rest.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(FlapError::Config(format!("malformed broker URL: {url}")));
            }
            let port = port
                .parse::<u16>()
                .map_err(|_| FlapError::Config(format!("invalid broker port in URL: {url}")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((rest.to_string(), 1883)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flapdeck_types::StatePayload;

    fn noop_handler() -> LinkHandler {
        Arc::new(|_msg| {})
    }

    fn make_link(broker_url: &str) -> (Arc<StateBus>, BrokerLink) {
        let bus = Arc::new(StateBus::default());
        let cfg = LinkConfig {
            broker_url: broker_url.to_string(),
            ..LinkConfig::default()
        };
        let link = BrokerLink::new(cfg, Arc::clone(&bus));
        (bus, link)
    }

    #[test]
    fn parse_host_and_port() {
        assert_eq!(
            parse_broker_url("mqtt://broker.local:1884").unwrap(),
            ("broker.local".to_string(), 1884)
        );
    }

    #[test]
    fn parse_defaults_port() {
        assert_eq!(
            parse_broker_url("broker.local").unwrap(),
            ("broker.local".to_string(), 1883)
        );
    }

    #[test]
    fn parse_rejects_empty_url() {
        assert!(matches!(parse_broker_url(""), Err(FlapError::Config(_))));
        assert!(matches!(parse_broker_url("   "), Err(FlapError::Config(_))));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_broker_url("mqtt://").is_err());
        assert!(parse_broker_url("mqtt://host:port").is_err());
        assert!(parse_broker_url("mqtt://host/path").is_err());
        assert!(parse_broker_url(":1883").is_err());
    }

    #[tokio::test]
    async fn connect_with_empty_url_is_fatal() {
        let (_bus, link) = make_link("");
        let result = link.connect(noop_handler());
        assert!(matches!(result, Err(FlapError::Config(_))));
        // Pinned to errored; no retry loop was started.
        let state = link.state();
        assert_eq!(state.status, ConnectionStatus::Errored);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn connect_moves_state_to_connecting() {
        // Port 1 is reliably closed; the link must report Connecting while
        // the retry loop runs, never a silent failure.
        let (_bus, link) = make_link("mqtt://127.0.0.1:1");
        link.connect(noop_handler()).unwrap();
        assert_eq!(link.state().status, ConnectionStatus::Connecting);
        link.disconnect();
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (_bus, link) = make_link("mqtt://127.0.0.1:1");
        link.connect(noop_handler()).unwrap();
        // Second call is a logged no-op, not an error.
        link.connect(noop_handler()).unwrap();
        assert_eq!(link.state().status, ConnectionStatus::Connecting);
        link.disconnect();
    }

    #[tokio::test]
    async fn disconnect_moves_state_to_disconnected() {
        let (_bus, link) = make_link("mqtt://127.0.0.1:1");
        link.connect(noop_handler()).unwrap();
        link.disconnect();
        assert_eq!(link.state().status, ConnectionStatus::Disconnected);
        // Second disconnect is a no-op.
        link.disconnect();
        assert_eq!(link.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn publish_before_connect_is_dropped_not_fatal() {
        let (_bus, link) = make_link("mqtt://127.0.0.1:1");
        link.publish("flapdeck/display", b"HELLO");
        link.publish_retained("flapdeck/available", b"online");
        link.subscribe("flapdeck/commands");
        assert_eq!(link.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn state_changes_are_mirrored_on_the_bus() {
        let (bus, link) = make_link("mqtt://127.0.0.1:1");
        let mut rx = bus.subscribe_lane(Lane::Link);
        link.connect(noop_handler()).unwrap();

        let event = rx.recv().await.expect("link event must arrive");
        assert_eq!(event.source, SOURCE);
        match event.payload {
            StatePayload::LinkChanged(state) => {
                assert_eq!(state.status, ConnectionStatus::Connecting);
            }
            other => panic!("expected LinkChanged, got {other:?}"),
        }
        link.disconnect();
    }

    #[tokio::test]
    async fn watch_follows_the_state_machine() {
        let (_bus, link) = make_link("mqtt://127.0.0.1:1");
        let watch_rx = link.watch();
        assert_eq!(watch_rx.borrow().status, ConnectionStatus::Disconnected);
        link.connect(noop_handler()).unwrap();
        assert_eq!(watch_rx.borrow().status, ConnectionStatus::Connecting);
        link.disconnect();
        assert_eq!(watch_rx.borrow().status, ConnectionStatus::Disconnected);
    }
}

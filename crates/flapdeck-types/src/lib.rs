use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The single active content source governing what the display shows.
///
/// Exactly one mode is active at any instant; transitions happen only through
/// the mode controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Free text, written directly by command.
    #[default]
    Text,
    /// Train departure text, pushed by an external timetable collaborator.
    Train,
    /// Scripted multi-line scene playback.
    Sequence,
    /// Weekday + time, ticking once per second.
    Clock,
    /// Elapsed-time stopwatch.
    Stopwatch,
    /// Countdown timer.
    Timer,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Mode::Text => "text",
            Mode::Train => "train",
            Mode::Sequence => "sequence",
            Mode::Clock => "clock",
            Mode::Stopwatch => "stopwatch",
            Mode::Timer => "timer",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Mode {
    type Err = FlapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Mode::Text),
            "train" => Ok(Mode::Train),
            "sequence" => Ok(Mode::Sequence),
            "clock" => Ok(Mode::Clock),
            "stopwatch" => Ok(Mode::Stopwatch),
            "timer" => Ok(Mode::Timer),
            other => Err(FlapError::Config(format!("unknown mode: {other}"))),
        }
    }
}

/// Fixed-width logical text about to be (or already) shown on the display.
///
/// Width is measured in characters, not bytes, so accent glyphs outside the
/// ASCII range still occupy a single wheel position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFrame(String);

impl DisplayFrame {
    /// Build a frame of exactly `width` characters: longer input is truncated,
    /// shorter input is padded with spaces on the right.
    pub fn fit(text: &str, width: usize) -> Self {
        let mut chars: Vec<char> = text.chars().take(width).collect();
        while chars.len() < width {
            chars.push(' ');
        }
        Self(chars.into_iter().collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Width in characters.
    pub fn width(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Display for DisplayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timed line of a scene.
///
/// The `id` exists for external scene editors; playback only reads `text`
/// and `duration_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLine {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    pub duration_ms: u64,
}

impl SceneLine {
    pub fn new(text: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            duration_ms,
        }
    }
}

/// An ordered, optionally looping list of timed text lines.
///
/// Handed to the scene sequencer as an opaque value; persistence of named
/// scenes lives with external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneScript {
    pub lines: Vec<SceneLine>,
    #[serde(default)]
    pub loop_forever: bool,
}

/// Point-in-time stopwatch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StopwatchSnapshot {
    pub elapsed_ms: u64,
    pub running: bool,
}

/// Point-in-time countdown-timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TimerSnapshot {
    pub remaining_ms: u64,
    pub running: bool,
}

/// Broker connection status, owned exclusively by the broker link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// Connection status plus the most recent transport error, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LinkState {
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
}

impl LinkState {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            last_error: None,
        }
    }

    pub fn errored(detail: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Errored,
            last_error: Some(detail.into()),
        }
    }
}

/// Logical presence value published on the retained availability topic.
///
/// `Offline` is also the value the broker itself asserts via last-will when
/// the process disappears uncleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    /// Wire form used on the availability topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

/// Unified wrapper for state-change events on the internal bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "flapdeck-runtime::controller"
    pub source: String,
    pub payload: StatePayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: StatePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of state changes pushed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatePayload {
    /// The current logical frame text changed (uncalibrated, already fitted
    /// to the display width).
    FrameChanged { text: String },
    /// The active mode changed.
    ModeChanged { mode: Mode },
    StopwatchChanged(StopwatchSnapshot),
    TimerChanged(TimerSnapshot),
    /// A scene script ran to natural completion.
    SequenceStopped,
    /// The broker connection status changed.
    LinkChanged(LinkState),
    /// The retained presence value was (re)published.
    AvailabilityChanged(Availability),
}

/// Global error type spanning configuration, broker link, and bus failures.
#[derive(Error, Debug)]
pub enum FlapError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("broker link error: {0}")]
    Link(String),

    #[error("event bus error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serialization_roundtrip() {
        let mode = Mode::Stopwatch;
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, "\"stopwatch\"");
        let back: Mode = serde_json::from_str(&json).unwrap();
        assert_eq!(mode, back);
    }

    #[test]
    fn mode_parses_from_str() {
        assert_eq!("clock".parse::<Mode>().unwrap(), Mode::Clock);
        assert_eq!("TIMER".parse::<Mode>().unwrap(), Mode::Timer);
        assert!("disco".parse::<Mode>().is_err());
    }

    #[test]
    fn default_mode_is_text() {
        assert_eq!(Mode::default(), Mode::Text);
    }

    #[test]
    fn frame_fit_pads_short_text() {
        let frame = DisplayFrame::fit("HI", 6);
        assert_eq!(frame.as_str(), "HI    ");
        assert_eq!(frame.width(), 6);
    }

    #[test]
    fn frame_fit_truncates_long_text() {
        let frame = DisplayFrame::fit("HELLO WORLD", 5);
        assert_eq!(frame.as_str(), "HELLO");
    }

    #[test]
    fn frame_fit_counts_characters_not_bytes() {
        // '★' is three UTF-8 bytes but occupies one wheel position.
        let frame = DisplayFrame::fit("★", 3);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.as_str().chars().next(), Some('★'));
    }

    #[test]
    fn scene_script_roundtrip() {
        let script = SceneScript {
            lines: vec![SceneLine::new("DEPARTURES", 3000), SceneLine::new("PLATFORM 4", 1500)],
            loop_forever: true,
        };
        let json = serde_json::to_string(&script).unwrap();
        let back: SceneScript = serde_json::from_str(&json).unwrap();
        assert_eq!(script, back);
    }

    #[test]
    fn scene_line_id_defaults_when_absent() {
        // External editors send ids; hand-written scripts may omit them.
        let line: SceneLine =
            serde_json::from_str(r#"{"text":"HELLO","duration_ms":500}"#).unwrap();
        assert_eq!(line.text, "HELLO");
        assert_eq!(line.duration_ms, 500);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "flapdeck-runtime::controller",
            StatePayload::ModeChanged { mode: Mode::Clock },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        assert!(matches!(back.payload, StatePayload::ModeChanged { mode: Mode::Clock }));
    }

    #[test]
    fn availability_wire_form() {
        assert_eq!(Availability::Online.as_str(), "online");
        assert_eq!(Availability::Offline.as_str(), "offline");
    }

    #[test]
    fn link_state_default_is_disconnected() {
        let state = LinkState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn link_state_errored_records_detail() {
        let state = LinkState::errored("connection refused");
        assert_eq!(state.status, ConnectionStatus::Errored);
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn flap_error_display() {
        let err = FlapError::Config("broker URL is not set".to_string());
        assert!(err.to_string().contains("invalid configuration"));

        let err2 = FlapError::Link("connection reset".to_string());
        assert!(err2.to_string().contains("connection reset"));
    }
}

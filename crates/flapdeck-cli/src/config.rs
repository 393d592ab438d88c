//! Configuration Vault – reads/writes `~/.flapdeck/config.toml`.
//!
//! Everything here is supplied at process start and immutable for the
//! process lifetime: broker endpoint, topics, optional credentials, display
//! width, and the calibration profile.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted configuration stored in `~/.flapdeck/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Broker endpoint, `mqtt://host:port`.  Required; an empty value is a
    /// fatal startup error.
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Broker username (empty = anonymous).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// Broker password (stored as plain text – users should restrict file
    /// permissions on `~/.flapdeck/config.toml`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Topic carrying the calibrated frame as raw text.
    #[serde(default = "default_frame_topic")]
    pub frame_topic: String,

    /// Retained presence topic carrying `online`/`offline`.
    #[serde(default = "default_availability_topic")]
    pub availability_topic: String,

    /// Number of character wheels on the display.
    #[serde(default = "default_display_width")]
    pub display_width: usize,

    /// Per-position home-offset profile (empty = wheels homed at space).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub calibration: String,

    /// Fixed period between broker reconnect attempts.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("broker_url", &self.broker_url)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("frame_topic", &self.frame_topic)
            .field("availability_topic", &self.availability_topic)
            .field("display_width", &self.display_width)
            .field("calibration", &self.calibration)
            .field("reconnect_interval_secs", &self.reconnect_interval_secs)
            .finish()
    }
}

fn default_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}
fn default_client_id() -> String {
    "flapdeck".to_string()
}
fn default_frame_topic() -> String {
    "flapdeck/display".to_string()
}
fn default_availability_topic() -> String {
    "flapdeck/available".to_string()
}
fn default_display_width() -> usize {
    12
}
fn default_reconnect_interval_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            client_id: default_client_id(),
            username: String::new(),
            password: String::new(),
            frame_topic: default_frame_topic(),
            availability_topic: default_availability_topic(),
            display_width: default_display_width(),
            calibration: String::new(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

impl Config {
    /// Broker-link view of this configuration.
    pub fn link_config(&self) -> flapdeck_link::LinkConfig {
        flapdeck_link::LinkConfig {
            broker_url: self.broker_url.clone(),
            client_id: self.client_id.clone(),
            username: (!self.username.is_empty()).then(|| self.username.clone()),
            password: (!self.password.is_empty()).then(|| self.password.clone()),
            availability_topic: self.availability_topic.clone(),
            reconnect_interval: std::time::Duration::from_secs(self.reconnect_interval_secs),
        }
    }

    /// Controller view of this configuration.
    pub fn controller_config(&self) -> flapdeck_runtime::ControllerConfig {
        flapdeck_runtime::ControllerConfig {
            display_width: self.display_width,
            calibration: (!self.calibration.is_empty()).then(|| self.calibration.clone()),
        }
    }
}

/// Return the path to `~/.flapdeck/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".flapdeck").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `FLAPDECK_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `FLAPDECK_BROKER_URL` | `broker_url` |
/// | `FLAPDECK_CLIENT_ID` | `client_id` |
/// | `FLAPDECK_FRAME_TOPIC` | `frame_topic` |
/// | `FLAPDECK_AVAILABILITY_TOPIC` | `availability_topic` |
/// | `FLAPDECK_DISPLAY_WIDTH` | `display_width` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FLAPDECK_BROKER_URL") {
        cfg.broker_url = v;
    }
    if let Ok(v) = std::env::var("FLAPDECK_CLIENT_ID") {
        cfg.client_id = v;
    }
    if let Ok(v) = std::env::var("FLAPDECK_FRAME_TOPIC") {
        cfg.frame_topic = v;
    }
    if let Ok(v) = std::env::var("FLAPDECK_AVAILABILITY_TOPIC") {
        cfg.availability_topic = v;
    }
    if let Ok(v) = std::env::var("FLAPDECK_DISPLAY_WIDTH")
        && let Ok(width) = v.parse::<usize>() {
            cfg.display_width = width;
        }
}

/// Save the config to disk, creating `~/.flapdeck/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_password() {
        let mut cfg = Config::default();
        cfg.password = "hunter2".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("hunter2"), "password must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_password() {
        let cfg = Config::default();
        let debug_str = format!("{:?}", cfg);
        assert!(debug_str.contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_meta = std::fs::metadata(&path).expect("file metadata");
        let file_mode = file_meta.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        let dir_mode = dir_meta.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.broker_url, "mqtt://localhost:1883");
        assert_eq!(loaded.frame_topic, "flapdeck/display");
        assert_eq!(loaded.availability_topic, "flapdeck/available");
        assert_eq!(loaded.display_width, 12);
        assert_eq!(loaded.reconnect_interval_secs, 5);
    }

    #[test]
    fn config_path_points_to_flapdeck_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".flapdeck"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn apply_env_overrides_changes_broker_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("FLAPDECK_BROKER_URL", "mqtt://display-host:1884") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker_url, "mqtt://display-host:1884");
        unsafe { std::env::remove_var("FLAPDECK_BROKER_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_topics() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("FLAPDECK_FRAME_TOPIC", "hall/board") };
        unsafe { std::env::set_var("FLAPDECK_AVAILABILITY_TOPIC", "hall/board/available") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frame_topic, "hall/board");
        assert_eq!(cfg.availability_topic, "hall/board/available");
        unsafe { std::env::remove_var("FLAPDECK_FRAME_TOPIC") };
        unsafe { std::env::remove_var("FLAPDECK_AVAILABILITY_TOPIC") };
    }

    #[test]
    fn apply_env_overrides_changes_display_width() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("FLAPDECK_DISPLAY_WIDTH", "14") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.display_width, 14);
        unsafe { std::env::remove_var("FLAPDECK_DISPLAY_WIDTH") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_width() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("FLAPDECK_DISPLAY_WIDTH", "wide") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.display_width, default_display_width());
        unsafe { std::env::remove_var("FLAPDECK_DISPLAY_WIDTH") };
    }

    #[test]
    fn link_config_maps_empty_credentials_to_none() {
        let cfg = Config::default();
        let link = cfg.link_config();
        assert!(link.username.is_none());
        assert!(link.password.is_none());

        let mut cfg = Config::default();
        cfg.username = "board".to_string();
        cfg.password = "secret".to_string();
        let link = cfg.link_config();
        assert_eq!(link.username.as_deref(), Some("board"));
        assert_eq!(link.password.as_deref(), Some("secret"));
    }

    #[test]
    fn controller_config_maps_empty_calibration_to_none() {
        let cfg = Config::default();
        assert!(cfg.controller_config().calibration.is_none());

        let mut cfg = Config::default();
        cfg.calibration = "AA".to_string();
        assert_eq!(cfg.controller_config().calibration.as_deref(), Some("AA"));
    }
}

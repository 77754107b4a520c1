//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use tc_sync::SyncSettings;

/// Device ID used when neither config nor hostname provide one.
const FALLBACK_DEVICE_ID: &str = "unknown-device";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the offline queue database.
    pub queue_path: PathBuf,

    /// Path to the local event store, used when no server is configured.
    pub store_path: PathBuf,

    /// Base URL of the remote event store.
    pub server_url: Option<String>,

    /// Default staff member for punches.
    pub staff_id: Option<String>,

    /// This device's ID; defaults to the hostname.
    pub device_id: Option<String>,

    pub sync: SyncConfig,
}

/// Sync timing, in config-friendly units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub stabilization_delay_ms: u64,
    pub submit_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let defaults = SyncSettings::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            stabilization_delay_ms: u64::try_from(defaults.stabilization_delay.as_millis())
                .unwrap_or(u64::MAX),
            submit_timeout_secs: defaults.submit_timeout.as_secs(),
            probe_interval_secs: defaults.probe_interval.as_secs(),
        }
    }
}

impl SyncConfig {
    /// Engine settings. Periods and the submit timeout are at least one
    /// second; a zero stabilization delay means sync immediately.
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            stabilization_delay: Duration::from_millis(self.stabilization_delay_ms),
            submit_timeout: Duration::from_secs(self.submit_timeout_secs.max(1)),
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            queue_path: data_dir.join("queue.db"),
            store_path: data_dir.join("events.db"),
            server_url: None,
            staff_id: None,
            device_id: None,
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TC_*, nested keys split on "__")
        figment = figment.merge(Env::prefixed("TC_").split("__"));

        figment.extract()
    }

    /// Configured device ID, else the hostname.
    pub fn device_id(&self) -> String {
        self.device_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|name| name.into_string().ok())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| FALLBACK_DEVICE_ID.to_string())
    }

    /// Where the CLI remembers the last successful sync between runs.
    pub fn sync_state_path(&self) -> PathBuf {
        self.queue_path.with_file_name("sync.json")
    }
}

/// Returns the platform-specific config directory for tc.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tc"))
}

/// Returns the platform-specific data directory for tc.
///
/// On Linux: `~/.local/share/tc`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tc"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_tc() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tc");
    }

    #[test]
    fn test_default_config_uses_data_dir() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.queue_path, data_dir.join("queue.db"));
        assert_eq!(config.store_path, data_dir.join("events.db"));
        assert_eq!(config.sync_state_path(), data_dir.join("sync.json"));
    }

    #[test]
    fn test_default_sync_settings() {
        assert_eq!(SyncConfig::default().settings(), SyncSettings::default());
    }

    #[test]
    fn test_zero_sync_values_are_raised() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[sync]
interval_secs = 0
stabilization_delay_ms = 0
submit_timeout_secs = 0
probe_interval_secs = 0
"#
        )
        .unwrap();

        let settings = Config::load_from(Some(file.path())).unwrap().sync.settings();
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.submit_timeout, Duration::from_secs(1));
        assert_eq!(settings.probe_interval, Duration::from_secs(1));
        assert_eq!(settings.stabilization_delay, Duration::ZERO);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
queue_path = "/tmp/tc-test/queue.db"
staff_id = "s-42"
device_id = "kiosk-7"

[sync]
interval_secs = 5
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.queue_path, PathBuf::from("/tmp/tc-test/queue.db"));
        assert_eq!(config.staff_id.as_deref(), Some("s-42"));
        assert_eq!(config.device_id(), "kiosk-7");
        assert_eq!(config.sync.interval_secs, 5);
        assert_eq!(config.sync.submit_timeout_secs, 10);
        assert!(config.server_url.is_none());
    }

    #[test]
    fn test_blank_device_id_falls_back() {
        let config = Config {
            device_id: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(!config.device_id().trim().is_empty());
    }
}

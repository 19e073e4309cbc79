use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use lib_common::core::{
    validate_endpoint, ExponentialBackoff, NoReconnect, ReconnectPolicy, TransportError,
};
use lib_common::results::{RecordNormalizer, ZeroTimePolicy};
use lib_common::utils::display_time::{parse_time_zone, UnknownTimeZone};
use thiserror::Error;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "results_viewer.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Live sporting results viewer", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RESULTS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RESULTS_URL", help = "Results feed WebSocket URL (ws:// or wss://).")]
    pub url: Option<String>,

    #[clap(long, env = "RESULTS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RESULTS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RESULTS_DISPLAY_TZ", help = "IANA time zone used to display times, e.g. Europe/Riga.")]
    pub display_tz: Option<String>,

    #[clap(long, env = "RESULTS_ZERO_TIME_PRESENT", help = "Render a zero timestamp as a time instead of leaving it blank.")]
    pub zero_time_present: Option<bool>,

    #[clap(long, env = "RESULTS_CONNECT_TIMEOUT_MS", help = "Close a connection that has not opened within this many milliseconds (0 waits forever).")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "RESULTS_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "RESULTS_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "RESULTS_RECONNECT_MAX_ATTEMPTS", help = "Reconnect attempts after the feed drops (0 disables reconnecting).")]
    pub reconnect_max_attempts: Option<u32>,
}

/// Configuration values that cannot be turned into a running viewer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no results feed URL configured")]
    MissingUrl,

    #[error(transparent)]
    Endpoint(#[from] TransportError),

    #[error(transparent)]
    TimeZone(#[from] UnknownTimeZone),
}

/// Fully resolved settings, ready to build the feed session from.
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    pub endpoint: Url,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub normalizer: RecordNormalizer,
    pub connect_timeout: Option<Duration>,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_attempts: u32,
}

impl ViewerSettings {
    pub fn display_tz(&self) -> Tz {
        self.normalizer.time_zone()
    }

    pub fn reconnect_policy(&self) -> Box<dyn ReconnectPolicy> {
        if self.reconnect_max_attempts == 0 {
            Box::new(NoReconnect)
        } else {
            Box::new(ExponentialBackoff::new(
                self.reconnect_base_delay,
                self.reconnect_max_delay,
                self.reconnect_max_attempts,
            ))
        }
    }
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            url: other.url.or(self.url),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            display_tz: other.display_tz.or(self.display_tz),
            zero_time_present: other.zero_time_present.or(self.zero_time_present),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_max_attempts: other.reconnect_max_attempts.or(self.reconnect_max_attempts),
        }
    }

    fn defaults() -> Config {
        Config {
            url: Some("ws://localhost:8080/dashboard".to_string()),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            display_tz: Some("UTC".to_string()),
            zero_time_present: Some(false),
            connect_timeout_ms: Some(0),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(60000),
            reconnect_max_attempts: Some(0),
            ..Default::default()
        }
    }

    /// Checks every value and converts it into [`ViewerSettings`].
    pub fn resolve(&self) -> Result<ViewerSettings, ConfigError> {
        let defaults = Config::defaults();
        let url = self.url.as_deref().ok_or(ConfigError::MissingUrl)?;
        let tz = parse_time_zone(self.display_tz.as_deref().unwrap_or("UTC"))?;
        let zero_time = if self.zero_time_present.unwrap_or(false) {
            ZeroTimePolicy::Present
        } else {
            ZeroTimePolicy::Absent
        };

        Ok(ViewerSettings {
            endpoint: validate_endpoint(url)?,
            log_dir: self.log_dir.clone().or(defaults.log_dir).unwrap_or_default(),
            log_level: self.log_level.clone().or(defaults.log_level).unwrap_or_default(),
            normalizer: RecordNormalizer::new(tz, zero_time),
            connect_timeout: self
                .connect_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            reconnect_base_delay: Duration::from_millis(
                self.reconnect_base_delay_ms
                    .or(defaults.reconnect_base_delay_ms)
                    .unwrap_or_default(),
            ),
            reconnect_max_delay: Duration::from_millis(
                self.reconnect_max_delay_ms
                    .or(defaults.reconnect_max_delay_ms)
                    .unwrap_or_default(),
            ),
            reconnect_max_attempts: self.reconnect_max_attempts.unwrap_or(0),
        })
    }
}

pub fn load_config() -> Config {
    // Parse CLI (and env vars through clap) once; the config file path may come from there.
    layered(Config::parse())
}

/// Defaults, then the JSON config file, then `cli` on top.
fn layered(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            path.display()
        );
        return None;
    }
    let Ok(config_str) = fs::read_to_string(path) else {
        log::warn!(
            "Failed to read config file: {}. Falling back to other sources.",
            path.display()
        );
        return None;
    };
    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!(
                "Failed to parse config file: {} ({}). Falling back to other sources.",
                path.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_resolve_to_the_local_dashboard() {
        let settings = layered(Config {
            config_path: Some(PathBuf::from("/nonexistent/results_viewer.conf")),
            ..Default::default()
        })
        .resolve()
        .unwrap();

        assert_eq!(settings.endpoint.as_str(), "ws://localhost:8080/dashboard");
        assert_eq!(settings.display_tz(), chrono_tz::UTC);
        assert_eq!(settings.normalizer.zero_time_policy(), ZeroTimePolicy::Absent);
        assert_eq!(settings.connect_timeout, None);
        assert_eq!(settings.reconnect_max_attempts, 0);
        assert_eq!(settings.reconnect_policy().next_delay(0), None);
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let file = config_file(
            r#"{
                "url": "wss://results.example.com/dashboard",
                "logLevel": "debug",
                "displayTz": "Europe/Riga",
                "reconnectMaxAttempts": 3
            }"#,
        );
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            log_level: Some("warn".to_string()),
            connect_timeout_ms: Some(2500),
            ..Default::default()
        };

        let settings = layered(cli).resolve().unwrap();
        assert_eq!(settings.endpoint.as_str(), "wss://results.example.com/dashboard");
        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.display_tz(), chrono_tz::Europe::Riga);
        assert_eq!(settings.connect_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(settings.reconnect_policy().next_delay(0), Some(Duration::from_millis(1000)));
        assert_eq!(settings.reconnect_policy().next_delay(3), None);
    }

    #[test]
    fn broken_config_file_is_ignored() {
        let file = config_file("{ not json");
        let merged = layered(Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(merged.url.as_deref(), Some("ws://localhost:8080/dashboard"));
    }

    #[test]
    fn invalid_values_are_reported() {
        let http = Config {
            url: Some("http://localhost:8080/dashboard".to_string()),
            ..Config::defaults()
        };
        assert!(matches!(http.resolve(), Err(ConfigError::Endpoint(TransportError::UnsupportedScheme(_)))));

        let tz = Config {
            display_tz: Some("Mars/Olympus".to_string()),
            ..Config::defaults()
        };
        assert!(matches!(tz.resolve(), Err(ConfigError::TimeZone(_))));

        let no_url = Config { url: None, ..Config::defaults() };
        assert!(matches!(no_url.resolve(), Err(ConfigError::MissingUrl)));
    }

    #[test]
    fn clap_reads_flags() {
        let cli = Config::try_parse_from([
            "results_viewer",
            "--url",
            "ws://127.0.0.1:9000/feed",
            "--zero-time-present",
            "true",
            "--reconnect-max-attempts",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://127.0.0.1:9000/feed"));
        assert_eq!(cli.zero_time_present, Some(true));
        assert_eq!(cli.reconnect_max_attempts, Some(5));
    }
}

//! Application-level configuration loading: sign-in policy, request bounds and live sync.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CARPOOL_BACK_CONFIG_PATH";
const DEFAULT_EMAIL_DOMAIN: &str = "vitstudent.ac.in";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 10;

/// How join/leave keep seat counts and participant rows consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStrategy {
    /// One server-side procedure performs both writes in a transaction.
    #[default]
    Transactional,
    /// Two client-ordered writes with a best-effort compensating undo.
    Compensating,
}

/// Live sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Subscribe to table changes at all.
    pub enabled: bool,
    /// Also reload on `ride_participants` changes, not only `rides`.
    pub watch_participants: bool,
    /// Bound on reaching the `subscribed` state.
    pub subscribe_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_participants: true,
            subscribe_timeout: Duration::from_secs(DEFAULT_SUBSCRIBE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    allowed_email_domains: Vec<String>,
    request_timeout: Duration,
    seat_strategy: SeatStrategy,
    realtime: RealtimeConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        domains = ?app_config.allowed_email_domains,
                        seat_strategy = ?app_config.seat_strategy,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; absent keys take their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Whether `email` belongs to one of the allow-listed institutional domains.
    pub fn is_allowed_email(&self, email: &str) -> bool {
        let Some((_, domain)) = email.trim().rsplit_once('@') else {
            return false;
        };
        let domain = domain.to_ascii_lowercase();
        self.allowed_email_domains.iter().any(|allowed| {
            domain == *allowed
                || domain
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Domains accepted at sign-in, lowercase.
    pub fn allowed_email_domains(&self) -> &[String] {
        &self.allowed_email_domains
    }

    /// Upper bound on a single backend round-trip.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// How join and leave reach the store.
    pub fn seat_strategy(&self) -> SeatStrategy {
        self.seat_strategy
    }

    /// Live sync tuning.
    pub fn realtime(&self) -> &RealtimeConfig {
        &self.realtime
    }

    /// Same configuration with a different round-trip bound.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Same configuration with a different seat strategy.
    pub fn with_seat_strategy(mut self, strategy: SeatStrategy) -> Self {
        self.seat_strategy = strategy;
        self
    }

    /// Same configuration with different live sync settings.
    pub fn with_realtime(mut self, realtime: RealtimeConfig) -> Self {
        self.realtime = realtime;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            allowed_email_domains: vec![DEFAULT_EMAIL_DOMAIN.to_string()],
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            seat_strategy: SeatStrategy::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    allowed_email_domains: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
    seat_strategy: SeatStrategy,
    realtime: RawRealtime,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRealtime {
    enabled: Option<bool>,
    watch_participants: Option<bool>,
    subscribe_timeout_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = RealtimeConfig::default();
        let allowed_email_domains = value
            .allowed_email_domains
            .map(|domains| {
                domains
                    .into_iter()
                    .map(|domain| domain.trim().trim_start_matches('@').to_ascii_lowercase())
                    .filter(|domain| !domain.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|domains| !domains.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_EMAIL_DOMAIN.to_string()]);

        Self {
            allowed_email_domains,
            request_timeout: Duration::from_secs(
                value
                    .request_timeout_secs
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            seat_strategy: value.seat_strategy,
            realtime: RealtimeConfig {
                enabled: value.realtime.enabled.unwrap_or(defaults.enabled),
                watch_participants: value
                    .realtime
                    .watch_participants
                    .unwrap_or(defaults.watch_participants),
                subscribe_timeout: value
                    .realtime
                    .subscribe_timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.subscribe_timeout),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.allowed_email_domains(), ["vitstudent.ac.in"]);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.seat_strategy(), SeatStrategy::Transactional);
        assert_eq!(config.realtime(), &RealtimeConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = AppConfig::from_json(
            r#"{
                "allowed_email_domains": ["@Example.EDU"],
                "seat_strategy": "compensating",
                "realtime": { "watch_participants": false }
            }"#,
        )
        .unwrap();
        assert_eq!(config.allowed_email_domains(), ["example.edu"]);
        assert_eq!(config.seat_strategy(), SeatStrategy::Compensating);
        assert!(config.realtime().enabled);
        assert!(!config.realtime().watch_participants);
    }

    #[test]
    fn email_domain_must_match_on_a_label_boundary() {
        let config = AppConfig::default();
        assert!(config.is_allowed_email("asha.rao2023@vitstudent.ac.in"));
        assert!(config.is_allowed_email("Asha@VITSTUDENT.AC.IN"));
        assert!(config.is_allowed_email("asha@mail.vitstudent.ac.in"));
        assert!(!config.is_allowed_email("asha@notvitstudent.ac.in"));
        assert!(!config.is_allowed_email("asha@gmail.com"));
        assert!(!config.is_allowed_email("vitstudent.ac.in"));
    }
}

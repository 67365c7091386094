//! Sync runtime configuration.
//!
//! Values come from `RONDA_*` environment variables; every knob has a default
//! so a client with no remote configured still runs fully offline.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_HEARTBEAT_SECS: u64 = 15;
const DEFAULT_REJECTION_COOLDOWN_SECS: u64 = 300;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Base URL of the central incident API; `None` means offline-only
    pub remote_url: Option<String>,
    /// Bearer token sent to the central incident API
    pub remote_token: Option<String>,
    /// Fixed drain retry interval
    pub heartbeat_interval: Duration,
    /// How long a rejected record sits out before it is retried
    pub rejection_cooldown: Duration,
    /// Per-request timeout for remote calls
    pub request_timeout: Duration,
    /// How often the connectivity probe pings the remote store
    pub probe_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_token: None,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            rejection_cooldown: Duration::from_secs(DEFAULT_REJECTION_COOLDOWN_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
        }
    }
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("remote_url", &self.remote_url)
            .field(
                "remote_token",
                &self.remote_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("rejection_cooldown", &self.rejection_cooldown)
            .field("request_timeout", &self.request_timeout)
            .field("probe_interval", &self.probe_interval)
            .finish()
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let remote_url = normalize_text_option(lookup("RONDA_REMOTE_URL"))
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = remote_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "RONDA_REMOTE_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(Self {
            remote_url,
            remote_token: normalize_text_option(lookup("RONDA_REMOTE_TOKEN")),
            heartbeat_interval: seconds_in_range(
                &lookup,
                "RONDA_HEARTBEAT_SECS",
                DEFAULT_HEARTBEAT_SECS,
                1..=3_600,
            )?,
            rejection_cooldown: seconds_in_range(
                &lookup,
                "RONDA_REJECTION_COOLDOWN_SECS",
                DEFAULT_REJECTION_COOLDOWN_SECS,
                0..=86_400,
            )?,
            request_timeout: seconds_in_range(
                &lookup,
                "RONDA_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
                1..=120,
            )?,
            probe_interval: seconds_in_range(
                &lookup,
                "RONDA_PROBE_INTERVAL_SECS",
                DEFAULT_PROBE_INTERVAL_SECS,
                1..=600,
            )?,
        })
    }

    /// Whether a remote store is configured at all
    pub const fn has_remote(&self) -> bool {
        self.remote_url.is_some()
    }
}

fn seconds_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Duration, ConfigError> {
    let Some(raw) = normalize_text_option(lookup(name)) else {
        return Ok(Duration::from_secs(default));
    };

    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let secs = raw.parse::<u64>().map_err(|_| invalid())?;
    if !range.contains(&secs) {
        return Err(invalid());
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<SyncSettings, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncSettings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_without_environment() {
        let parsed = settings(&[]).unwrap();
        assert_eq!(parsed, SyncSettings::default());
        assert!(!parsed.has_remote());
        assert_eq!(parsed.heartbeat_interval, Duration::from_secs(15));
    }

    #[test]
    fn parses_remote_and_intervals() {
        let parsed = settings(&[
            ("RONDA_REMOTE_URL", " https://ra.example.gov/ "),
            ("RONDA_HEARTBEAT_SECS", "30"),
            ("RONDA_REJECTION_COOLDOWN_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(parsed.remote_url.as_deref(), Some("https://ra.example.gov"));
        assert_eq!(parsed.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(parsed.rejection_cooldown, Duration::ZERO);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let error = settings(&[("RONDA_HEARTBEAT_SECS", "0")]).unwrap_err();
        assert!(error.to_string().contains("RONDA_HEARTBEAT_SECS"));

        let error = settings(&[("RONDA_REQUEST_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(error.to_string().contains("RONDA_REQUEST_TIMEOUT_SECS"));

        let error = settings(&[("RONDA_REMOTE_URL", "ra.example.gov")]).unwrap_err();
        assert!(error.to_string().contains("http://"));
    }

    #[test]
    fn debug_redacts_token() {
        let parsed = settings(&[("RONDA_REMOTE_TOKEN", "very-secret")]).unwrap();
        let debug = format!("{parsed:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}

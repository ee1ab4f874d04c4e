//! User preferences persistence.
//!
//! Optional overrides read from ~/.config/backhaul/config.toml. Every field
//! is optional; anything missing keeps the built-in default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::config::{Config, ProbeStrategy, parse_remotes};
use crate::trace::MAX_TTL;

/// User preferences
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ProbeStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<u8>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hop_timeout: Option<f64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_timeout: Option<f64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remotes: Option<Vec<String>>,
    /// Hours
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracer_binary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_install: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ripe_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
}

/// Positive, finite seconds or nothing
fn seconds(value: Option<f64>, field: &str) -> Option<Duration> {
    let secs = value?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Some(d),
        _ => {
            warn!(field, value = secs, "ignoring invalid duration in preferences");
            None
        }
    }
}

impl Prefs {
    /// Get config file path: ~/.config/backhaul/config.toml
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("backhaul").join("config.toml"))
    }

    /// Load preferences from disk (returns default if missing/invalid)
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&text).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable preferences");
            Self::default()
        })
    }

    /// Overlay the file's values onto `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(max_ttl) = self.max_ttl.filter(|&t| t > 0) {
            config.max_ttl = max_ttl.min(MAX_TTL);
        }
        if let Some(t) = seconds(self.hop_timeout, "hop_timeout") {
            config.hop_timeout = t;
        }
        if let Some(t) = seconds(self.remote_timeout, "remote_timeout") {
            config.remote_timeout = t;
        }
        if let Some(t) = seconds(self.deadline, "deadline") {
            config.deadline = Some(t);
        }
        if let Some(t) = seconds(self.cache_ttl_hours.map(|h| h * 3600.0), "cache_ttl_hours") {
            config.cache_ttl = t;
        }
        if let Some(ref remotes) = self.remotes {
            let parsed = parse_remotes(remotes);
            if !parsed.is_empty() {
                config.remotes = parsed;
            }
        }
        if let Some(ref binary) = self.tracer_binary {
            config.tracer_binary = binary.clone();
        }
        if let Some(auto_install) = self.auto_install {
            config.auto_install = auto_install;
        }
        if let Some(ref command) = self.install_command {
            config.install_command = command.clone();
        }
        if let Some(ref url) = self.ripe_url {
            config.ripe_url = url.clone();
        }
        if let Some(ref url) = self.ws_url {
            config.ws_url = url.clone();
        }
    }
}

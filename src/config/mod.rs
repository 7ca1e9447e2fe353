//! Configuration management.
//!
//! Settings come from an optional TOML config file with `SCRUBGATE_*`
//! environment overrides applied on top. The encryption key is deliberately
//! not part of this type; it is loaded separately at startup via
//! [`crate::security::KeyMaterial::from_env`].

use crate::resilience::BreakerSettings;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for scrubgate.
#[derive(Debug, Clone)]
pub struct ScrubgateConfig {
    /// Path to the data directory.
    pub data_dir: PathBuf,
    /// Audit trail settings.
    pub audit: AuditSettings,
    /// Circuit breaker settings.
    pub breaker: BreakerSettings,
    /// Downstream assistant settings.
    pub downstream: DownstreamSettings,
    /// Observability settings.
    pub observability: ObservabilitySettings,
}

/// Audit trail settings.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// Path to the audit store document.
    pub store_path: PathBuf,
    /// HMAC key for chain signing (base64 in config/env). `None` disables
    /// signing.
    pub hmac_key: Option<Vec<u8>>,
}

/// Downstream assistant settings.
#[derive(Debug, Clone)]
pub struct DownstreamSettings {
    /// Simulated response latency in milliseconds.
    pub latency_ms: u64,
}

impl DownstreamSettings {
    /// Latency as a [`Duration`].
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl Default for DownstreamSettings {
    fn default() -> Self {
        Self { latency_ms: 150 }
    }
}

/// Observability settings.
#[derive(Debug, Clone)]
pub struct ObservabilitySettings {
    /// Emit JSON-formatted logs.
    pub log_json: bool,
    /// Whether to install the Prometheus metrics exporter.
    pub metrics_enabled: bool,
    /// Port for the metrics exporter.
    pub metrics_port: u16,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_json: false,
            metrics_enabled: false,
            metrics_port: 9090,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Audit section.
    pub audit: Option<ConfigFileAudit>,
    /// Breaker section.
    pub breaker: Option<ConfigFileBreaker>,
    /// Downstream section.
    pub downstream: Option<ConfigFileDownstream>,
    /// Observability section.
    pub observability: Option<ConfigFileObservability>,
}

/// Audit section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileAudit {
    /// Audit store path.
    pub store_path: Option<String>,
    /// Base64-encoded HMAC key.
    pub hmac_key: Option<String>,
}

/// Breaker section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileBreaker {
    /// Consecutive failures before opening.
    pub failure_threshold: Option<u32>,
    /// Cooldown in milliseconds.
    pub cooldown_ms: Option<u64>,
    /// Maximum probes while half-open.
    pub half_open_max_calls: Option<u32>,
}

/// Downstream section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDownstream {
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
}

/// Observability section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileObservability {
    /// JSON logs.
    pub log_json: Option<bool>,
    /// Metrics exporter enabled.
    pub metrics_enabled: Option<bool>,
    /// Metrics exporter port.
    pub metrics_port: Option<u16>,
}

impl Default for ScrubgateConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let store_path = data_dir.join("audit.json");
        Self {
            data_dir,
            audit: AuditSettings {
                store_path,
                hmac_key: None,
            },
            breaker: BreakerSettings::default(),
            downstream: DownstreamSettings::default(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl ScrubgateConfig {
    /// Loads configuration: defaults, then the config file (explicit path or
    /// the platform default location), then environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if an explicitly given config file is
    /// missing or malformed. A missing file at the default location is fine.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let file = read_config_file(path)?;
            config.apply_file(&file)?;
        } else if let Some(default_path) = default_config_path() {
            if default_path.exists() {
                let file = read_config_file(&default_path)?;
                config.apply_file(&file)?;
            }
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies config-file values over the defaults.
    fn apply_file(&mut self, file: &ConfigFile) -> Result<()> {
        if let Some(ref data_dir) = file.data_dir {
            self.data_dir = PathBuf::from(data_dir);
            self.audit.store_path = self.data_dir.join("audit.json");
        }

        if let Some(ref audit) = file.audit {
            if let Some(ref store_path) = audit.store_path {
                self.audit.store_path = PathBuf::from(store_path);
            }
            if let Some(ref hmac_key) = audit.hmac_key {
                self.audit.hmac_key = Some(decode_hmac_key(hmac_key)?);
            }
        }

        if let Some(ref breaker) = file.breaker {
            if let Some(threshold) = breaker.failure_threshold {
                self.breaker.failure_threshold = threshold.max(1);
            }
            if let Some(cooldown_ms) = breaker.cooldown_ms {
                self.breaker.cooldown = Duration::from_millis(cooldown_ms);
            }
            if let Some(half_open) = breaker.half_open_max_calls {
                self.breaker.half_open_max_calls = half_open.max(1);
            }
        }

        if let Some(ref downstream) = file.downstream {
            if let Some(latency_ms) = downstream.latency_ms {
                self.downstream.latency_ms = latency_ms;
            }
        }

        if let Some(ref observability) = file.observability {
            if let Some(log_json) = observability.log_json {
                self.observability.log_json = log_json;
            }
            if let Some(enabled) = observability.metrics_enabled {
                self.observability.metrics_enabled = enabled;
            }
            if let Some(port) = observability.metrics_port {
                self.observability.metrics_port = port;
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SCRUBGATE_DATA_DIR") {
            self.data_dir = PathBuf::from(&v);
            self.audit.store_path = self.data_dir.join("audit.json");
        }
        if let Ok(v) = std::env::var("SCRUBGATE_AUDIT_STORE") {
            self.audit.store_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SCRUBGATE_AUDIT_HMAC_KEY") {
            self.audit.hmac_key = Some(decode_hmac_key(&v)?);
        }
        if let Ok(v) = std::env::var("SCRUBGATE_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.breaker.failure_threshold = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("SCRUBGATE_BREAKER_COOLDOWN_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.breaker.cooldown = Duration::from_millis(parsed);
            }
        }
        if let Ok(v) = std::env::var("SCRUBGATE_BREAKER_HALF_OPEN_MAX_CALLS") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.breaker.half_open_max_calls = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("SCRUBGATE_DOWNSTREAM_LATENCY_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.downstream.latency_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("SCRUBGATE_LOG_JSON") {
            self.observability.log_json = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SCRUBGATE_METRICS_ENABLED") {
            self.observability.metrics_enabled = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("SCRUBGATE_METRICS_PORT") {
            if let Ok(parsed) = v.parse::<u16>() {
                self.observability.metrics_port = parsed;
            }
        }

        Ok(())
    }
}

/// Reads and parses a config file.
fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("cannot read config file {}: {e}", path.display()))
    })?;
    toml::from_str(&raw).map_err(|e| {
        Error::InvalidInput(format!("cannot parse config file {}: {e}", path.display()))
    })
}

/// Decodes a base64 HMAC key from config or environment.
fn decode_hmac_key(key_b64: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(key_b64.trim())
        .map_err(|e| Error::InvalidInput(format!("invalid base64 audit HMAC key: {e}")))
}

/// Default data directory: the platform data dir, falling back to a local
/// dot directory.
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "scrubgate").map_or_else(
        || PathBuf::from(".scrubgate"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

/// Default config file location.
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "scrubgate")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Parses a boolean-ish environment value.
fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

//! Configuration for the monitoring engine

use crate::errors::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Definition of a single monitored service. Owned by the config layer,
/// read-only to the engine; immutable within a monitoring cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceDefinition {
    /// Unique service name, used as the state key
    pub name: String,

    /// HTTP(S) URL or bare host for a reachability probe
    pub endpoint: String,

    /// HTTP method for URL endpoints
    #[serde(default)]
    pub method: Option<String>,

    /// Per-service probe timeout override in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Status codes counted as success for HTTP endpoints
    #[serde(default)]
    pub expected_status: Option<Vec<u16>>,

    /// Display category (informational, passed through to events)
    #[serde(default)]
    pub category: Option<String>,
}

impl ServiceDefinition {
    pub fn is_http(&self) -> bool {
        self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")
    }

    pub fn timeout(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(default_ms))
    }

    pub fn accepts_status(&self, code: u16) -> bool {
        match &self.expected_status {
            Some(codes) => codes.contains(&code),
            None => code == 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Monitored services
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,

    /// Interval between monitoring cycles
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    /// Default probe timeout, overridable per service
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Health score gain per successful probe (scaled by response quality)
    #[serde(default = "default_health_recovery_rate")]
    pub health_recovery_rate: f64,

    /// Health score loss per failed probe
    #[serde(default = "default_health_decay_rate")]
    pub health_decay_rate: f64,

    /// Latency history capacity per service
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Rolling window for uptime computation
    #[serde(default = "default_uptime_window_ms")]
    pub uptime_window_ms: u64,

    /// Window inspected for flapping detection
    #[serde(default = "default_flap_window_ms")]
    pub flap_window_ms: u64,

    /// Raw status transitions within the window before a service is flapping
    #[serde(default = "default_flap_threshold")]
    pub flap_threshold: usize,

    /// Stabilization period once flapping is detected
    #[serde(default = "default_flap_cooldown_ms")]
    pub flap_cooldown_ms: u64,

    /// Quiet time required before a status change is accepted while flapping
    #[serde(default = "default_stable_duration_ms")]
    pub stable_duration_ms: u64,

    /// Consecutive failures before a down-notification is requested
    #[serde(default = "default_notification_threshold")]
    pub notification_threshold: u32,

    /// Minimum spacing between down-notifications per service
    #[serde(default = "default_notification_cooldown_ms")]
    pub notification_cooldown_ms: u64,

    /// Minimum spacing between per-service update events
    #[serde(default = "default_status_update_throttle_ms")]
    pub status_update_throttle_ms: u64,
}

fn default_check_interval_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_health_recovery_rate() -> f64 {
    1.0
}

fn default_health_decay_rate() -> f64 {
    0.5
}

fn default_max_history() -> usize {
    100
}

fn default_uptime_window_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_flap_window_ms() -> u64 {
    5 * 60 * 1000
}

fn default_flap_threshold() -> usize {
    3
}

fn default_flap_cooldown_ms() -> u64 {
    15 * 60 * 1000
}

fn default_stable_duration_ms() -> u64 {
    2 * 60 * 1000
}

fn default_notification_threshold() -> u32 {
    2
}

fn default_notification_cooldown_ms() -> u64 {
    30 * 60 * 1000
}

fn default_status_update_throttle_ms() -> u64 {
    250
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            check_interval_ms: default_check_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            health_recovery_rate: default_health_recovery_rate(),
            health_decay_rate: default_health_decay_rate(),
            max_history: default_max_history(),
            uptime_window_ms: default_uptime_window_ms(),
            flap_window_ms: default_flap_window_ms(),
            flap_threshold: default_flap_threshold(),
            flap_cooldown_ms: default_flap_cooldown_ms(),
            stable_duration_ms: default_stable_duration_ms(),
            notification_threshold: default_notification_threshold(),
            notification_cooldown_ms: default_notification_cooldown_ms(),
            status_update_throttle_ms: default_status_update_throttle_ms(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: MonitorConfig = serde_yaml::from_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Override tuning values from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(value) = env::var("CHECK_INTERVAL_MS") {
            if let Ok(ms) = value.parse() {
                self.check_interval_ms = ms;
            }
        }

        if let Ok(value) = env::var("PROBE_TIMEOUT_MS") {
            if let Ok(ms) = value.parse() {
                self.probe_timeout_ms = ms;
            }
        }

        if let Ok(value) = env::var("HEALTH_RECOVERY_RATE") {
            if let Ok(rate) = value.parse() {
                self.health_recovery_rate = rate;
            }
        }

        if let Ok(value) = env::var("HEALTH_DECAY_RATE") {
            if let Ok(rate) = value.parse() {
                self.health_decay_rate = rate;
            }
        }

        if let Ok(value) = env::var("NOTIFICATION_THRESHOLD") {
            if let Ok(threshold) = value.parse() {
                self.notification_threshold = threshold;
            }
        }

        if let Ok(value) = env::var("NOTIFICATION_COOLDOWN_MS") {
            if let Ok(ms) = value.parse() {
                self.notification_cooldown_ms = ms;
            }
        }

        if let Ok(value) = env::var("FLAP_THRESHOLD") {
            if let Ok(threshold) = value.parse() {
                self.flap_threshold = threshold;
            }
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(MonitorError::Config(
                "at least one service must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                return Err(MonitorError::Config("service name cannot be empty".to_string()));
            }
            if service.endpoint.is_empty() {
                return Err(MonitorError::Config(format!(
                    "service {} has no endpoint",
                    service.name
                )));
            }
            if !names.insert(service.name.as_str()) {
                return Err(MonitorError::Config(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
        }

        if self.check_interval_ms == 0 {
            return Err(MonitorError::Config(
                "check_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.max_history == 0 {
            return Err(MonitorError::Config(
                "max_history must be greater than 0".to_string(),
            ));
        }

        if self.health_recovery_rate <= 0.0 || self.health_decay_rate <= 0.0 {
            return Err(MonitorError::Config(
                "health rates must be greater than 0".to_string(),
            ));
        }

        if self.flap_threshold == 0 {
            return Err(MonitorError::Config(
                "flap_threshold must be greater than 0".to_string(),
            ));
        }

        if self.uptime_window_ms == 0 {
            return Err(MonitorError::Config(
                "uptime_window_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

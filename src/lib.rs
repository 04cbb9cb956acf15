//! Service monitoring engine
//!
//! This library probes configured services on a fixed cycle, maintains a
//! health/uptime model per service, suppresses flapping status noise, and
//! publishes throttled status events for external consumers.

pub mod config;
pub mod downtime;
pub mod engine;
pub mod errors;
pub mod events;
pub mod flapping;
pub mod health;
pub mod history;
pub mod notify;
pub mod probe;
pub mod state;

pub use config::{MonitorConfig, ServiceDefinition};
pub use engine::MonitoringEngine;
pub use errors::{MonitorError, Result};
pub use events::{EngineEvent, Notification, ServiceSnapshot, ServiceUpdate, StatsSnapshot};
pub use notify::{LogNotifier, Notifier};
pub use probe::{HttpProber, ProbeResult, Prober};
pub use state::Status;

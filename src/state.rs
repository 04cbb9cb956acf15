//! Per-service runtime state

use crate::config::MonitorConfig;
use crate::downtime::DowntimeInterval;
use crate::flapping::FlapDetector;
use crate::history::BoundedHistory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Externally visible service status. May lag the raw probe result while
/// the service is flapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    Up,
    Down,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Unknown => write!(f, "unknown"),
            Status::Up => write!(f, "up"),
            Status::Down => write!(f, "down"),
        }
    }
}

/// A tracked outage, opened when a down-notification fires and resolved on
/// recovery.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub description: String,
    pub resolution: Option<String>,
}

impl Incident {
    pub fn open(start: DateTime<Utc>, description: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start,
            end: None,
            description,
            resolution: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

/// Mutable monitoring state for one service. Owned exclusively by the
/// engine's cycle loop; external layers only ever see snapshots.
#[derive(Debug)]
pub struct ServiceRuntimeState {
    pub status: Status,
    pub ping_history: BoundedHistory<f64>,
    pub health_score: f64,
    pub downtimes: Vec<DowntimeInterval>,
    pub consecutive_failures: u32,
    pub last_notification_at: Option<i64>,
    pub incidents: Vec<Incident>,
    pub flapping: FlapDetector,
    pub maintenance: bool,
    pub last_check: i64,
}

impl ServiceRuntimeState {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            status: Status::Unknown,
            ping_history: BoundedHistory::new(config.max_history),
            health_score: 100.0,
            downtimes: Vec::new(),
            consecutive_failures: 0,
            last_notification_at: None,
            incidents: Vec::new(),
            flapping: FlapDetector::new(),
            maintenance: false,
            last_check: 0,
        }
    }

    /// Most recent latency sample, offline sentinel included
    pub fn last_response_time(&self) -> f64 {
        self.ping_history.last().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_initial_state() {
        let state = ServiceRuntimeState::new(&MonitorConfig::default());

        assert_eq!(state.status, Status::Unknown);
        assert_eq!(state.health_score, 100.0);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.downtimes.is_empty());
        assert!(!state.flapping.is_flapping);
        assert_eq!(state.last_response_time(), 0.0);
    }

    #[test]
    fn test_incident_lifecycle() {
        let start = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let mut incident = Incident::open(start, "connection refused".to_string());

        assert!(incident.is_open());

        incident.end = Some(Utc.timestamp_millis_opt(2_000_000).unwrap());
        incident.resolution = Some("Service recovered automatically".to_string());
        assert!(!incident.is_open());
    }
}

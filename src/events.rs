//! Event payloads published to external collaborators
//!
//! The engine does not know who consumes these: the dashboard transport
//! drains `EngineEvent`s, the notifier receives `Notification`s. Everything
//! is serializable so transports can forward payloads as-is.

use crate::state::{Incident, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-service update, throttled to at most one per service per
/// `status_update_throttle_ms`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceUpdate {
    pub service: String,
    pub status: Status,
    pub ping_history: Vec<f64>,
    pub uptime_pct: f64,
    pub health_score: f64,
    pub response_time_ms: f64,
    pub last_check: i64,
    pub is_flapping: bool,
    pub stats: StatsSnapshot,
}

/// Aggregate statistics, recomputed once per cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub total_services: usize,
    pub services_up: usize,
    pub services_down: usize,
    pub services_unknown: usize,
    pub services_flapping: usize,
    pub average_ping: f64,
    pub overall_health: f64,
}

/// Emitted once when a service enters the flapping state
#[derive(Debug, Clone, Serialize)]
pub struct FlappingAlert {
    pub service: String,
    pub changes: usize,
    pub flapping_until: i64,
}

/// Escalation request handed to the external notifier. Delivery is
/// fire-and-forget; failures there never touch monitoring state.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub service: String,
    pub status: Status,
    pub time: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
}

/// Read-only view of one service for API-layer consumers
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub status: Status,
    pub uptime_pct: f64,
    pub health_score: f64,
    pub response_time_ms: f64,
    pub last_check: i64,
    pub is_flapping: bool,
    pub maintenance: bool,
    pub incidents: Vec<Incident>,
}

/// Everything the engine publishes on its event channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ServiceUpdate(ServiceUpdate),
    Stats(StatsSnapshot),
    Flapping(FlappingAlert),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = EngineEvent::Stats(StatsSnapshot {
            total_services: 2,
            services_up: 1,
            services_down: 1,
            services_unknown: 0,
            services_flapping: 0,
            average_ping: 42.0,
            overall_health: 87.5,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stats");
        assert_eq!(json["services_up"], 1);
    }

    #[test]
    fn test_notification_omits_absent_fields() {
        let notification = Notification {
            service: "api".to_string(),
            status: Status::Down,
            time: Utc::now(),
            message: "Service api is down".to_string(),
            response_time_ms: None,
            consecutive_failures: Some(3),
        };

        let json = serde_json::to_value(&notification).unwrap();
        assert!(json.get("response_time_ms").is_none());
        assert_eq!(json["consecutive_failures"], 3);
        assert_eq!(json["status"], "down");
    }
}

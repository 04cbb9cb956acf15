//! Notification policy and the notifier seam
//!
//! The policy decides when an outage or recovery is worth escalating; how
//! the escalation is delivered (Discord, email, ...) is entirely the
//! notifier implementation's business, including any reconnect/backoff
//! logic it needs.

use crate::events::Notification;
use crate::state::{Incident, Status};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

/// Delivery seam. Implementations must not block monitoring; the engine
/// dispatches on a separate task and ignores delivery failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Fallback notifier that writes alerts to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        match notification.status {
            Status::Down => warn!(
                service = %notification.service,
                failures = ?notification.consecutive_failures,
                "{}", notification.message
            ),
            _ => info!(service = %notification.service, "{}", notification.message),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPolicy {
    pub threshold: u32,
    pub cooldown_ms: i64,
}

impl NotificationPolicy {
    /// Should a failed probe escalate to a down-notification?
    pub fn should_notify_down(
        &self,
        consecutive_failures: u32,
        last_notification_at: Option<i64>,
        is_flapping: bool,
        now: i64,
    ) -> bool {
        if is_flapping {
            debug!("suppressing down-notification for flapping service");
            return false;
        }

        if consecutive_failures < self.threshold {
            return false;
        }

        match last_notification_at {
            None => true,
            Some(last) => now - last > self.cooldown_ms,
        }
    }

    /// Should a successful probe escalate to a recovery notification?
    pub fn should_notify_recovery(&self, previous_visible: Status, is_flapping: bool) -> bool {
        if is_flapping {
            debug!("suppressing recovery notification for flapping service");
            return false;
        }
        previous_visible == Status::Down
    }
}

/// Open an incident for an ongoing outage unless one is already tracked.
pub fn open_incident(incidents: &mut Vec<Incident>, service: &str, now: i64, error: Option<&str>) {
    if incidents.iter().any(Incident::is_open) {
        return;
    }

    let description = match error {
        Some(detail) => format!("Service is down: {}", detail),
        None => format!("Service {} is currently experiencing issues.", service),
    };

    let start = Utc
        .timestamp_millis_opt(now)
        .single()
        .unwrap_or_else(Utc::now);
    incidents.push(Incident::open(start, description));
}

/// Resolve all open incidents after a recovery.
pub fn resolve_incidents(incidents: &mut [Incident], now: i64) {
    let end = Utc
        .timestamp_millis_opt(now)
        .single()
        .unwrap_or_else(Utc::now);

    for incident in incidents.iter_mut().filter(|i| i.is_open()) {
        incident.end = Some(end);
        incident.resolution = Some("Service recovered automatically".to_string());
    }
}

//! Downtime interval tracking
//!
//! Each service keeps an ordered list of `[start, end]` intervals; at most
//! one interval may be open (`end = None`) at a time.

use serde::Serialize;
use tracing::warn;

use crate::state::Status;

/// A contiguous span during which a service's externally visible status
/// was down. `end = None` denotes an ongoing outage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DowntimeInterval {
    pub start: i64,
    pub end: Option<i64>,
}

/// Record an externally visible status transition.
///
/// Up -> Down opens an interval, Down -> Up closes the open one. The first
/// transition out of Unknown never opens or closes anything. Finding a
/// second open interval on the way down means earlier bookkeeping went
/// wrong; the stale one is closed at `now` and the anomaly logged.
pub fn record_transition(
    downtimes: &mut Vec<DowntimeInterval>,
    service: &str,
    previous: Status,
    new: Status,
    now: i64,
) {
    match (previous, new) {
        (Status::Up, Status::Down) => {
            if let Some(open) = downtimes.iter_mut().find(|d| d.end.is_none()) {
                warn!(
                    service,
                    "closing stale open downtime interval before opening a new one"
                );
                open.end = Some(now);
            }
            downtimes.push(DowntimeInterval {
                start: now,
                end: None,
            });
        }
        (Status::Down, Status::Up) => {
            if let Some(open) = downtimes.iter_mut().rev().find(|d| d.end.is_none()) {
                open.end = Some(now);
            }
        }
        // Unknown means no prior observation; same-status pairs are no-ops
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_to_down_opens_interval() {
        let mut downtimes = Vec::new();

        record_transition(&mut downtimes, "api", Status::Up, Status::Down, 1_000);

        assert_eq!(downtimes.len(), 1);
        assert_eq!(downtimes[0].start, 1_000);
        assert!(downtimes[0].end.is_none());
    }

    #[test]
    fn test_down_to_up_closes_interval() {
        let mut downtimes = vec![DowntimeInterval {
            start: 1_000,
            end: None,
        }];

        record_transition(&mut downtimes, "api", Status::Down, Status::Up, 5_000);

        assert_eq!(downtimes.len(), 1);
        assert_eq!(downtimes[0].end, Some(5_000));
    }

    #[test]
    fn test_same_status_creates_nothing() {
        let mut downtimes = Vec::new();

        record_transition(&mut downtimes, "api", Status::Down, Status::Down, 1_000);
        record_transition(&mut downtimes, "api", Status::Up, Status::Up, 2_000);

        assert!(downtimes.is_empty());
    }

    #[test]
    fn test_repeated_down_does_not_duplicate_interval() {
        let mut downtimes = Vec::new();

        record_transition(&mut downtimes, "api", Status::Up, Status::Down, 1_000);
        record_transition(&mut downtimes, "api", Status::Down, Status::Down, 2_000);
        record_transition(&mut downtimes, "api", Status::Down, Status::Down, 3_000);

        assert_eq!(downtimes.len(), 1);
    }

    #[test]
    fn test_unknown_transitions_are_ignored() {
        let mut downtimes = Vec::new();

        record_transition(&mut downtimes, "api", Status::Unknown, Status::Down, 1_000);
        record_transition(&mut downtimes, "api", Status::Unknown, Status::Up, 2_000);

        assert!(downtimes.is_empty());
    }

    #[test]
    fn test_close_without_open_interval_is_noop() {
        let mut downtimes = vec![DowntimeInterval {
            start: 1_000,
            end: Some(2_000),
        }];

        record_transition(&mut downtimes, "api", Status::Down, Status::Up, 5_000);

        assert_eq!(downtimes[0].end, Some(2_000));
        assert_eq!(downtimes.len(), 1);
    }

    #[test]
    fn test_stale_open_interval_is_self_healed() {
        // Two opens in a row should never happen; the stale one gets closed
        let mut downtimes = vec![DowntimeInterval {
            start: 1_000,
            end: None,
        }];

        record_transition(&mut downtimes, "api", Status::Up, Status::Down, 9_000);

        assert_eq!(downtimes.len(), 2);
        assert_eq!(downtimes[0].end, Some(9_000));
        assert_eq!(downtimes[1].start, 9_000);
        assert!(downtimes[1].end.is_none());
        assert_eq!(downtimes.iter().filter(|d| d.end.is_none()).count(), 1);
    }
}

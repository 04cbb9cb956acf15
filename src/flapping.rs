//! Flapping detection
//!
//! A service that oscillates rapidly between up and down within a short
//! window is noise, not signal. While a service is flapping its externally
//! visible status is frozen; health score and latency history keep tracking
//! raw results so dashboards still show the instability.

use crate::history::BoundedHistory;
use crate::state::Status;
use tracing::{debug, info, warn};

/// Hard cap on retained status samples; time pruning keeps the window far
/// smaller in practice
const STATUS_HISTORY_CAPACITY: usize = 64;

/// Raw probe observation kept for transition counting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSample {
    pub timestamp: i64,
    pub status: Status,
}

/// Detector tuning, sliced out of the engine configuration
#[derive(Debug, Clone, Copy)]
pub struct FlapConfig {
    pub window_ms: i64,
    pub threshold: usize,
    pub cooldown_ms: i64,
    pub stable_duration_ms: i64,
}

/// What the engine should do with the raw status that produced this
/// observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlapDecision {
    /// Status may change normally
    Accept,
    /// Flapping just started; status stays frozen
    Entered { changes: usize },
    /// Mid-cooldown and still unstable; status stays frozen
    Suppress,
}

/// Per-service STABLE / FLAPPING state machine
#[derive(Debug)]
pub struct FlapDetector {
    history: BoundedHistory<StatusSample>,
    pub is_flapping: bool,
    pub flapping_until: Option<i64>,
}

impl FlapDetector {
    pub fn new() -> Self {
        Self {
            history: BoundedHistory::new(STATUS_HISTORY_CAPACITY),
            is_flapping: false,
            flapping_until: None,
        }
    }

    /// Record one raw probe status and decide whether the externally
    /// visible status may follow it.
    pub fn observe(
        &mut self,
        service: &str,
        raw: Status,
        visible: Status,
        now: i64,
        config: &FlapConfig,
    ) -> FlapDecision {
        self.history.push(StatusSample {
            timestamp: now,
            status: raw,
        });
        self.history
            .prune_front_while(|sample| sample.timestamp <= now - config.window_ms);

        if self.is_flapping {
            return self.observe_while_flapping(service, now, config);
        }

        let changes = self.transition_count();
        if changes >= config.threshold && raw != visible {
            warn!(
                service,
                changes, "service detected as flapping, freezing visible status"
            );
            self.is_flapping = true;
            self.flapping_until = Some(now + config.cooldown_ms);
            return FlapDecision::Entered { changes };
        }

        FlapDecision::Accept
    }

    fn observe_while_flapping(
        &mut self,
        service: &str,
        now: i64,
        config: &FlapConfig,
    ) -> FlapDecision {
        let until = self.flapping_until.unwrap_or(now);

        if now >= until {
            info!(service, "flapping cooldown expired, service stable");
            self.exit_flapping();
            return FlapDecision::Accept;
        }

        debug!(service, flapping_until = until, "service in flapping cooldown");

        // Quiet long enough? Let the pending status through, and end the
        // cooldown early once the quiet stretch is substantial.
        match self.last_transition_at() {
            None => {
                info!(service, "no transitions left in window, ending flapping early");
                self.exit_flapping();
                FlapDecision::Accept
            }
            Some(last_change) => {
                let since_last_change = now - last_change;
                if since_last_change > config.stable_duration_ms {
                    if since_last_change > config.cooldown_ms / 2 {
                        info!(service, "service stable, ending flapping early");
                        self.exit_flapping();
                    }
                    FlapDecision::Accept
                } else {
                    FlapDecision::Suppress
                }
            }
        }
    }

    fn exit_flapping(&mut self) {
        self.is_flapping = false;
        self.flapping_until = None;
    }

    /// Number of adjacent status changes in the pruned window
    pub fn transition_count(&self) -> usize {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(a, b)| a.status != b.status)
            .count()
    }

    /// Timestamp of the most recent status change in the window
    fn last_transition_at(&self) -> Option<i64> {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(a, b)| a.status != b.status)
            .map(|(_, b)| b.timestamp)
            .last()
    }
}

impl Default for FlapDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60 * 1000;

    fn config() -> FlapConfig {
        FlapConfig {
            window_ms: 5 * MINUTE_MS,
            threshold: 3,
            cooldown_ms: 15 * MINUTE_MS,
            stable_duration_ms: 2 * MINUTE_MS,
        }
    }

    fn drive(
        detector: &mut FlapDetector,
        statuses: &[Status],
        start: i64,
        step: i64,
        config: &FlapConfig,
    ) -> (Status, Vec<FlapDecision>) {
        // Mimics the engine: visible status follows raw when accepted
        let mut visible = Status::Unknown;
        let mut decisions = Vec::new();
        for (i, raw) in statuses.iter().enumerate() {
            let now = start + i as i64 * step;
            let decision = detector.observe("svc", *raw, visible, now, config);
            if decision == FlapDecision::Accept {
                visible = *raw;
            }
            decisions.push(decision);
        }
        (visible, decisions)
    }

    #[test]
    fn test_flapping_triggers_at_threshold() {
        let config = config();
        let mut detector = FlapDetector::new();

        // up,up,down,up,down,up,down in 5 minutes: third transition lands
        // on the fifth sample, flapping follows and status freezes at up
        use Status::{Down, Up};
        let statuses = [Up, Up, Down, Up, Down, Up, Down];
        let (visible, decisions) = drive(&mut detector, &statuses, 0, 30_000, &config);

        assert!(detector.is_flapping);
        assert!(detector.flapping_until.is_some());
        assert_eq!(visible, Status::Up);
        assert!(matches!(decisions[4], FlapDecision::Entered { changes: 3 }));
        assert_eq!(decisions[5], FlapDecision::Suppress);
        assert_eq!(decisions[6], FlapDecision::Suppress);
    }

    #[test]
    fn test_below_threshold_stays_stable() {
        let config = config();
        let mut detector = FlapDetector::new();

        // Two transitions only
        use Status::{Down, Up};
        let statuses = [Up, Down, Up, Up, Up];
        drive(&mut detector, &statuses, 0, 30_000, &config);

        assert!(!detector.is_flapping);
        assert!(detector.flapping_until.is_none());
        assert_eq!(detector.transition_count(), 2);
    }

    #[test]
    fn test_no_flapping_when_raw_matches_visible() {
        let config = config();
        let mut detector = FlapDetector::new();

        use Status::{Down, Up};
        // Enough transitions, but the final observation agrees with the
        // visible status, so the gate stays open
        for (i, raw) in [Up, Down, Up].iter().enumerate() {
            detector.observe("svc", *raw, *raw, i as i64 * 30_000, &config);
        }
        let decision = detector.observe("svc", Down, Status::Down, 3 * 30_000, &config);

        assert_eq!(decision, FlapDecision::Accept);
        assert!(!detector.is_flapping);
    }

    #[test]
    fn test_cooldown_expiry_unfreezes() {
        let config = config();
        let mut detector = FlapDetector::new();

        use Status::{Down, Up};
        let statuses = [Up, Down, Up, Down, Up];
        drive(&mut detector, &statuses, 0, 10_000, &config);
        assert!(detector.is_flapping);

        let until = detector.flapping_until.unwrap();
        let decision = detector.observe("svc", Status::Down, Status::Up, until, &config);

        assert_eq!(decision, FlapDecision::Accept);
        assert!(!detector.is_flapping);
        assert!(detector.flapping_until.is_none());
    }

    #[test]
    fn test_early_exit_after_long_stability() {
        let config = config();
        let mut detector = FlapDetector::new();

        use Status::{Down, Up};
        let statuses = [Up, Down, Up, Down, Up];
        drive(&mut detector, &statuses, 0, 10_000, &config);
        assert!(detector.is_flapping);

        // Quiet past the window entirely: old transitions pruned away,
        // cooldown ends early
        let later = 4 * 10_000 + config.window_ms + 1;
        assert!(later < detector.flapping_until.unwrap());
        let decision = detector.observe("svc", Status::Down, Status::Up, later, &config);

        assert_eq!(decision, FlapDecision::Accept);
        assert!(!detector.is_flapping);
    }

    #[test]
    fn test_stable_but_short_quiet_accepts_without_exit() {
        let mut config = config();
        // Make the window large so transitions stay visible during cooldown
        config.window_ms = 60 * MINUTE_MS;
        let mut detector = FlapDetector::new();

        use Status::{Down, Up};
        let statuses = [Up, Down, Up, Down, Up];
        drive(&mut detector, &statuses, 0, 10_000, &config);
        assert!(detector.is_flapping);

        // Quiet longer than stable_duration but shorter than cooldown/2:
        // the pending status is let through while flapping continues
        let last_transition = 4 * 10_000;
        let now = last_transition + config.stable_duration_ms + 1_000;
        let decision = detector.observe("svc", Status::Up, Status::Up, now, &config);

        assert_eq!(decision, FlapDecision::Accept);
        assert!(detector.is_flapping);
    }

    #[test]
    fn test_flapping_false_implies_no_deadline() {
        let config = config();
        let mut detector = FlapDetector::new();

        use Status::{Down, Up};
        for (i, raw) in [Up, Down, Up, Down, Up, Down].iter().enumerate() {
            detector.observe("svc", *raw, Status::Up, i as i64 * 10_000, &config);
            if !detector.is_flapping {
                assert!(detector.flapping_until.is_none());
            }
        }
    }
}

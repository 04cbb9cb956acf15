//! Health score and uptime computation
//!
//! The health score is a bounded [0, 100] indicator of recent probe quality.
//! Recovery scales with response quality so a sluggish-but-alive service
//! climbs back slower than a fast one; decay is a flat per-failure step.
//! Uptime is re-derived from the downtime interval list on every read
//! instead of being kept as a running counter, which would drift.

use crate::downtime::DowntimeInterval;
use crate::history::BoundedHistory;
use crate::probe::ProbeResult;

/// Latency sample recorded for offline or timed-out probes
pub const OFFLINE_SENTINEL_MS: f64 = 9999.0;

/// Fold one probe result into the health score and latency history.
pub fn apply_result(
    health_score: &mut f64,
    ping_history: &mut BoundedHistory<f64>,
    result: &ProbeResult,
    recovery_rate: f64,
    decay_rate: f64,
) {
    if result.alive {
        let response_quality = (1.0 - result.latency_ms / 1000.0).clamp(0.0, 1.0);
        let recovery = recovery_rate * (0.5 + 0.5 * response_quality);
        *health_score = (*health_score + recovery).min(100.0);
        ping_history.push(result.latency_ms);
    } else {
        *health_score = (*health_score - decay_rate).max(0.0);
        ping_history.push(OFFLINE_SENTINEL_MS);
    }
}

/// Uptime percentage over the trailing window ending at `now`.
///
/// Sums only the portions of each downtime interval that overlap
/// `[now - window_ms, now]`; an open interval counts up to `now`.
pub fn compute_uptime(downtimes: &[DowntimeInterval], now: i64, window_ms: i64) -> f64 {
    let window_start = now - window_ms;

    let total_downtime: i64 = downtimes
        .iter()
        .map(|interval| {
            let start = interval.start.max(window_start);
            let end = interval.end.unwrap_or(now).min(now);
            (end - start).max(0)
        })
        .sum();

    let uptime_pct = ((window_ms - total_downtime) as f64 / window_ms as f64) * 100.0;
    uptime_pct.clamp(0.0, 100.0)
}

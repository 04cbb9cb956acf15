//! Monitoring cycle orchestration
//!
//! The engine owns every `ServiceRuntimeState` and is the only component
//! that mutates them. Probes fan out as concurrent tasks that send their
//! results into a channel; the engine drains that channel and applies all
//! mutations sequentially, so probe tasks never touch shared state.
//! Cycles are serialized: a new cycle cannot start while one is running.

use crate::config::{MonitorConfig, ServiceDefinition};
use crate::downtime;
use crate::events::{
    EngineEvent, FlappingAlert, Notification, ServiceSnapshot, ServiceUpdate, StatsSnapshot,
};
use crate::flapping::{FlapConfig, FlapDecision};
use crate::health::{self, OFFLINE_SENTINEL_MS};
use crate::notify::{self, NotificationPolicy, Notifier};
use crate::probe::{ProbeResult, Prober};
use crate::state::{ServiceRuntimeState, Status};
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct MonitoringEngine {
    config: MonitorConfig,
    services: HashMap<String, ServiceRuntimeState>,
    prober: Arc<dyn Prober>,
    notifier: Arc<dyn Notifier>,
    events: mpsc::UnboundedSender<EngineEvent>,
    last_update_at: HashMap<String, i64>,
}

impl MonitoringEngine {
    /// Create an engine with runtime state for every configured service.
    /// The returned receiver carries all published events.
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let services = config
            .services
            .iter()
            .map(|def| (def.name.clone(), ServiceRuntimeState::new(&config)))
            .collect();

        let engine = Self {
            config,
            services,
            prober,
            notifier,
            events,
            last_update_at: HashMap::new(),
        };

        (engine, receiver)
    }

    /// Drive monitoring cycles until the shutdown flag flips.
    ///
    /// The interval skips missed ticks, and each cycle is awaited inline,
    /// so an overrunning cycle defers the next one instead of racing it.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            services = self.config.services.len(),
            interval_ms = self.config.check_interval_ms,
            "monitoring started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle(Some(&shutdown)).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("monitoring stopped");
    }

    /// Run one monitoring cycle to completion.
    pub async fn run_cycle(&mut self) {
        self.cycle(None).await;
    }

    async fn cycle(&mut self, shutdown: Option<&watch::Receiver<bool>>) {
        let cycle_start = now_ms();
        let (tx, mut rx) = mpsc::channel(self.config.services.len().max(1));
        let mut probed = 0usize;

        for def in &self.config.services {
            let Some(state) = self.services.get(&def.name) else {
                continue;
            };
            if state.maintenance {
                debug!(service = %def.name, "skipping service in maintenance mode");
                continue;
            }

            let prober = Arc::clone(&self.prober);
            let def = def.clone();
            let tx = tx.clone();
            probed += 1;

            // One task per service; a panicking or hanging probe loses only
            // its own result.
            tokio::spawn(async move {
                let result = prober.probe(&def).await;
                let _ = tx.send((def.name, result)).await;
            });
        }
        drop(tx);

        let mut processed = Vec::with_capacity(probed);
        while let Some((name, result)) = rx.recv().await {
            if shutdown.map(|flag| *flag.borrow()).unwrap_or(false) {
                debug!(service = %name, "shutdown in progress, discarding probe result");
                continue;
            }
            self.process_result(&name, result, now_ms());
            processed.push(name);
        }

        let stats = self.compute_stats();
        let now = now_ms();
        for name in &processed {
            self.publish_update(name, now, &stats);
        }
        let _ = self.events.send(EngineEvent::Stats(stats));

        debug!(
            probed,
            received = processed.len(),
            elapsed_ms = now_ms() - cycle_start,
            "monitoring cycle complete"
        );
    }

    /// Apply one probe result to its service's state.
    fn process_result(&mut self, name: &str, result: ProbeResult, now: i64) {
        let flap_config = self.flap_config();
        let policy = self.policy();

        let mut flapping_alert = None;
        let mut notification = None;

        {
            let Some(state) = self.services.get_mut(name) else {
                // Removed by a config reload while the probe was in flight
                debug!(service = name, "dropping result for unknown service");
                return;
            };

            let raw = if result.alive { Status::Up } else { Status::Down };
            let previous = state.status;

            let decision = state.flapping.observe(name, raw, previous, now, &flap_config);

            // Health score and latency history always follow raw results so
            // dashboards keep showing instability even while status is frozen
            health::apply_result(
                &mut state.health_score,
                &mut state.ping_history,
                &result,
                self.config.health_recovery_rate,
                self.config.health_decay_rate,
            );
            state.last_check = now;

            if let FlapDecision::Entered { changes } = decision {
                flapping_alert = Some(FlappingAlert {
                    service: name.to_string(),
                    changes,
                    flapping_until: state.flapping.flapping_until.unwrap_or(now),
                });
            }

            let accepted = decision == FlapDecision::Accept;
            if accepted && previous != raw {
                state.status = raw;
                downtime::record_transition(&mut state.downtimes, name, previous, raw, now);
                match raw {
                    Status::Down => warn!(service = name, "service is DOWN"),
                    _ => info!(service = name, "service is UP"),
                }
            }

            if result.alive {
                state.consecutive_failures = 0;
                if accepted && policy.should_notify_recovery(previous, state.flapping.is_flapping)
                {
                    notify::resolve_incidents(&mut state.incidents, now);
                    notification = Some(Notification {
                        service: name.to_string(),
                        status: Status::Up,
                        time: timestamp(now),
                        message: format!(
                            "Service {} has recovered ({}ms)",
                            name,
                            result.latency_ms.round()
                        ),
                        response_time_ms: Some(result.latency_ms.round() as u64),
                        consecutive_failures: None,
                    });
                }
            } else {
                state.consecutive_failures += 1;
                if accepted
                    && policy.should_notify_down(
                        state.consecutive_failures,
                        state.last_notification_at,
                        state.flapping.is_flapping,
                        now,
                    )
                {
                    notify::open_incident(&mut state.incidents, name, now, result.error.as_deref());
                    state.last_notification_at = Some(now);
                    let message = match &result.error {
                        Some(err) => format!("Service {} is down! Error: {}", name, err),
                        None => format!("Service {} is down!", name),
                    };
                    notification = Some(Notification {
                        service: name.to_string(),
                        status: Status::Down,
                        time: timestamp(now),
                        message,
                        response_time_ms: None,
                        consecutive_failures: Some(state.consecutive_failures),
                    });
                }
            }
        }

        if let Some(alert) = flapping_alert {
            let _ = self.events.send(EngineEvent::Flapping(alert));
        }
        if let Some(notification) = notification {
            self.dispatch_notification(notification);
        }
    }

    /// Hand a notification to the notifier without blocking the cycle.
    fn dispatch_notification(&self, notification: Notification) {
        // Flapping may have started between the policy decision and this
        // dispatch; check once more right before sending
        let flapping = self
            .services
            .get(&notification.service)
            .map(|state| state.flapping.is_flapping)
            .unwrap_or(false);
        if flapping {
            warn!(
                service = %notification.service,
                "suppressing notification for flapping service"
            );
            return;
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            notifier.notify(notification).await;
        });
    }

    /// Emit a throttled per-service update event.
    fn publish_update(&mut self, name: &str, now: i64, stats: &StatsSnapshot) {
        let last = self.last_update_at.get(name).copied();
        if let Some(last) = last {
            if now - last < self.config.status_update_throttle_ms as i64 {
                return;
            }
        }

        let Some(state) = self.services.get(name) else {
            return;
        };
        self.last_update_at.insert(name.to_string(), now);

        let update = ServiceUpdate {
            service: name.to_string(),
            status: state.status,
            ping_history: state.ping_history.to_vec(),
            uptime_pct: health::compute_uptime(
                &state.downtimes,
                now,
                self.config.uptime_window_ms as i64,
            ),
            health_score: state.health_score,
            response_time_ms: state.last_response_time(),
            last_check: state.last_check,
            is_flapping: state.flapping.is_flapping,
            stats: stats.clone(),
        };
        let _ = self.events.send(EngineEvent::ServiceUpdate(update));
    }

    /// Aggregate statistics across all services, derived on demand.
    pub fn compute_stats(&self) -> StatsSnapshot {
        let mut up = 0;
        let mut down = 0;
        let mut unknown = 0;
        let mut flapping = 0;
        let mut ping_sum = 0.0;
        let mut ping_count = 0usize;
        let mut health_sum = 0.0;

        for state in self.services.values() {
            if state.flapping.is_flapping {
                flapping += 1;
            } else {
                match state.status {
                    Status::Up => up += 1,
                    Status::Down => down += 1,
                    Status::Unknown => unknown += 1,
                }
            }

            // Average ping considers only healthy, non-flapping services and
            // skips offline sentinel samples
            if state.status == Status::Up && !state.flapping.is_flapping {
                for ping in state.ping_history.iter().filter(|p| **p < OFFLINE_SENTINEL_MS) {
                    ping_sum += ping;
                    ping_count += 1;
                }
            }

            health_sum += state.health_score;
        }

        let total = self.services.len();
        StatsSnapshot {
            total_services: self.config.services.len(),
            services_up: up,
            services_down: down,
            services_unknown: unknown,
            services_flapping: flapping,
            average_ping: if ping_count > 0 {
                ping_sum / ping_count as f64
            } else {
                0.0
            },
            overall_health: if total > 0 {
                health_sum / total as f64
            } else {
                0.0
            },
        }
    }

    /// Reconcile runtime state with a reloaded service list: state is added
    /// for new services, dropped for removed ones, and untouched otherwise.
    pub fn sync_services(&mut self, services: Vec<ServiceDefinition>) {
        for def in &services {
            if !self.services.contains_key(&def.name) {
                info!(service = %def.name, "service added");
                self.services
                    .insert(def.name.clone(), ServiceRuntimeState::new(&self.config));
            }
        }

        let active: HashSet<&str> = services.iter().map(|d| d.name.as_str()).collect();
        self.services.retain(|name, _| {
            let keep = active.contains(name.as_str());
            if !keep {
                info!(service = %name, "service removed");
            }
            keep
        });
        self.last_update_at
            .retain(|name, _| active.contains(name.as_str()));

        self.config.services = services;
    }

    /// Flag or unflag a service as under maintenance. Returns false for an
    /// unknown service.
    pub fn set_maintenance(&mut self, name: &str, maintenance: bool) -> bool {
        match self.services.get_mut(name) {
            Some(state) => {
                info!(service = name, maintenance, "maintenance flag updated");
                state.maintenance = maintenance;
                true
            }
            None => false,
        }
    }

    /// Read-only view of one service for API-layer consumers.
    pub fn snapshot(&self, name: &str) -> Option<ServiceSnapshot> {
        let state = self.services.get(name)?;
        let now = now_ms();

        Some(ServiceSnapshot {
            name: name.to_string(),
            status: state.status,
            uptime_pct: health::compute_uptime(
                &state.downtimes,
                now,
                self.config.uptime_window_ms as i64,
            ),
            health_score: state.health_score,
            response_time_ms: state.last_response_time(),
            last_check: state.last_check,
            is_flapping: state.flapping.is_flapping,
            maintenance: state.maintenance,
            incidents: state.incidents.clone(),
        })
    }

    /// Snapshots of every service, in configuration order.
    pub fn snapshots(&self) -> Vec<ServiceSnapshot> {
        self.config
            .services
            .iter()
            .filter_map(|def| self.snapshot(&def.name))
            .collect()
    }

    fn flap_config(&self) -> FlapConfig {
        FlapConfig {
            window_ms: self.config.flap_window_ms as i64,
            threshold: self.config.flap_threshold,
            cooldown_ms: self.config.flap_cooldown_ms as i64,
            stable_duration_ms: self.config.stable_duration_ms as i64,
        }
    }

    fn policy(&self) -> NotificationPolicy {
        NotificationPolicy {
            threshold: self.config.notification_threshold,
            cooldown_ms: self.config.notification_cooldown_ms as i64,
        }
    }
}

fn timestamp(now: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(now).single().unwrap_or_else(Utc::now)
}

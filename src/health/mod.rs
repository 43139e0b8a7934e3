// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Health monitoring - heartbeat supervision and restart policy
//!
//! Components never self-report; the monitor owns every health record and
//! learns about a component only by racing its heartbeat against a bounded
//! timeout. Three consecutive failures trigger exactly one restart. Two or
//! more components failing at once is a cascade: reported as a system
//! alert, never auto-restarted wholesale.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::config::HealthConfig;
use crate::core::EventBus;
use crate::error::EngineError;

/// Async liveness probe; must complete well inside the heartbeat timeout
pub type HeartbeatFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Async restart hook invoked when a component is declared failed
pub type RestartFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Component status as seen by the monitor.
///
/// Within one failure sequence the status only moves forward
/// (healthy → degraded → failing → failed); only a successful heartbeat
/// after a recovery attempt moves it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Failing,
    Failed,
    Recovering,
}

/// Health record for one supervised component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component_id: String,
    pub status: ComponentStatus,
    pub consecutive_failures: u32,
    pub error_count: u64,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
}

impl ComponentHealth {
    fn new(component_id: String) -> Self {
        Self {
            component_id,
            status: ComponentStatus::Healthy,
            consecutive_failures: 0,
            error_count: 0,
            last_heartbeat_at: None,
            restart_count: 0,
        }
    }
}

struct Registered {
    health: ComponentHealth,
    heartbeat: HeartbeatFn,
    restart: RestartFn,
    recent_errors: VecDeque<Instant>,
}

/// Health monitor - supervises all registered components
pub struct HealthMonitor {
    config: HealthConfig,
    components: Mutex<HashMap<String, Registered>>,
    event_bus: Arc<EventBus>,
    cascade_active: Mutex<bool>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            components: Mutex::new(HashMap::new()),
            event_bus,
            cascade_active: Mutex::new(false),
        }
    }

    /// Register a component for supervision
    pub fn register(&self, component_id: &str, heartbeat: HeartbeatFn, restart: RestartFn) {
        let mut components = self.components.lock();
        components.insert(
            component_id.to_string(),
            Registered {
                health: ComponentHealth::new(component_id.to_string()),
                heartbeat,
                restart,
                recent_errors: VecDeque::new(),
            },
        );
        debug!(component_id, "Component registered for health monitoring");
    }

    pub fn unregister(&self, component_id: &str) {
        self.components.lock().remove(component_id);
    }

    /// Mark a component failed outside the heartbeat path (e.g. init error)
    pub fn mark_failed(&self, component_id: &str) {
        let mut components = self.components.lock();
        if let Some(registered) = components.get_mut(component_id) {
            registered.health.status = ComponentStatus::Failed;
            registered.health.consecutive_failures = self.config.failed_threshold;
        }
    }

    /// Current health records for all components
    pub fn summary(&self) -> Vec<ComponentHealth> {
        let components = self.components.lock();
        let mut summary: Vec<ComponentHealth> =
            components.values().map(|r| r.health.clone()).collect();
        summary.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        summary
    }

    /// One supervision cycle over every registered component
    pub async fn run_checks(&self) {
        let probes: Vec<(String, HeartbeatFn)> = {
            let components = self.components.lock();
            components
                .iter()
                .map(|(id, r)| (id.clone(), r.heartbeat.clone()))
                .collect()
        };

        let deadline = Duration::from_millis(self.config.heartbeat_timeout_ms);

        // All probes race at once, so a cycle with several hung components
        // still finishes within a single timeout
        let outcomes = futures::future::join_all(probes.into_iter().map(
            |(component_id, heartbeat)| async move {
                let outcome = timeout(deadline, heartbeat()).await;
                (component_id, outcome)
            },
        ))
        .await;

        let mut restarts: Vec<(String, RestartFn)> = Vec::new();
        for (component_id, outcome) in outcomes {
            let success = matches!(outcome, Ok(Ok(())));

            match &outcome {
                Err(_) => {
                    let err = EngineError::HeartbeatTimeout {
                        component: component_id.clone(),
                        timeout_ms: self.config.heartbeat_timeout_ms,
                    };
                    warn!(%err, "Heartbeat timed out");
                }
                Ok(Err(e)) => warn!(component_id = %component_id, error = %e, "Heartbeat failed"),
                Ok(Ok(())) => {}
            }

            if let Some(restart) = self.apply_outcome(&component_id, success) {
                restarts.push((component_id, restart));
            }
        }

        for (component_id, restart) in restarts {
            info!(component_id = %component_id, "Restarting failed component");
            self.event_bus.publish_component_restart(&component_id);
            match restart().await {
                Ok(()) => self.set_status(&component_id, ComponentStatus::Recovering),
                Err(e) => {
                    // Stays failed; the next heartbeats walk the ladder again
                    error!(component_id = %component_id, error = %e, "Component restart failed");
                }
            }
        }

        self.check_cascade();
    }

    fn set_status(&self, component_id: &str, status: ComponentStatus) {
        if let Some(registered) = self.components.lock().get_mut(component_id) {
            registered.health.status = status;
        }
    }

    /// Update a component's record after a heartbeat; returns the restart
    /// hook when the failed threshold was just crossed
    fn apply_outcome(&self, component_id: &str, success: bool) -> Option<RestartFn> {
        let mut components = self.components.lock();
        let registered = components.get_mut(component_id)?;
        let now = Instant::now();
        let error_window = Duration::from_secs(self.config.error_rate_window_secs);

        while registered
            .recent_errors
            .front()
            .map(|t| now.duration_since(*t) > error_window)
            .unwrap_or(false)
        {
            registered.recent_errors.pop_front();
        }

        let health = &mut registered.health;
        if success {
            health.last_heartbeat_at = Some(Utc::now());
            health.consecutive_failures = 0;
            let error_rate_high =
                registered.recent_errors.len() > self.config.degraded_error_threshold;
            health.status = match health.status {
                ComponentStatus::Recovering | ComponentStatus::Failing | ComponentStatus::Failed
                    if !error_rate_high =>
                {
                    info!(component_id, "Component recovered");
                    ComponentStatus::Healthy
                }
                _ if error_rate_high => ComponentStatus::Degraded,
                _ => ComponentStatus::Healthy,
            };
            None
        } else {
            registered.recent_errors.push_back(now);
            health.error_count += 1;
            health.consecutive_failures += 1;

            if health.consecutive_failures >= self.config.failed_threshold {
                // One restart per failure sequence; the counter resets so a
                // persistent fault must fail through the ladder again. The
                // caller moves the status to recovering once the restart
                // has been dispatched.
                health.status = ComponentStatus::Failed;
                health.consecutive_failures = 0;
                health.restart_count += 1;
                Some(registered.restart.clone())
            } else if health.consecutive_failures >= self.config.failing_threshold {
                health.status = ComponentStatus::Failing;
                None
            } else {
                health.status = ComponentStatus::Degraded;
                None
            }
        }
    }

    /// Raise a system alert when several components are down at once
    fn check_cascade(&self) {
        let down: Vec<String> = {
            let components = self.components.lock();
            components
                .values()
                .filter(|r| {
                    matches!(
                        r.health.status,
                        ComponentStatus::Failing | ComponentStatus::Failed
                    )
                })
                .map(|r| r.health.component_id.clone())
                .collect()
        };

        let mut cascade_active = self.cascade_active.lock();
        if down.len() >= 2 {
            if !*cascade_active {
                *cascade_active = true;
                let err = EngineError::CascadeFailure { components: down };
                error!(%err, "Cascade failure detected");
                self.event_bus.publish_alert("critical", &err.to_string());
            }
        } else {
            *cascade_active = false;
        }
    }

    /// Periodic supervision loop
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut cycle =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));
        cycle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cycle.tick() => {
                    self.run_checks().await;
                }
                _ = shutdown.recv() => {
                    debug!("Health monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn monitor() -> HealthMonitor {
        HealthMonitor::new(HealthConfig::default(), Arc::new(EventBus::new(64)))
    }

    fn flaky(fail: Arc<AtomicBool>) -> HeartbeatFn {
        Arc::new(move || {
            let fail = fail.clone();
            Box::pin(async move {
                if fail.load(Ordering::SeqCst) {
                    anyhow::bail!("probe failed")
                }
                Ok(())
            })
        })
    }

    fn counting_restart(count: Arc<AtomicUsize>) -> RestartFn {
        Arc::new(move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn status_of(monitor: &HealthMonitor, id: &str) -> ComponentHealth {
        monitor
            .summary()
            .into_iter()
            .find(|h| h.component_id == id)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn three_failures_trigger_exactly_one_restart() {
        let monitor = monitor();
        let fail = Arc::new(AtomicBool::new(true));
        let restarts = Arc::new(AtomicUsize::new(0));
        monitor.register("adapter-a", flaky(fail.clone()), counting_restart(restarts.clone()));

        monitor.run_checks().await;
        assert_eq!(status_of(&monitor, "adapter-a").status, ComponentStatus::Degraded);
        monitor.run_checks().await;
        assert_eq!(status_of(&monitor, "adapter-a").status, ComponentStatus::Failing);
        monitor.run_checks().await;

        let health = status_of(&monitor, "adapter-a");
        assert_eq!(health.status, ComponentStatus::Recovering);
        assert_eq!(health.restart_count, 1);
        assert_eq!(restarts.load(Ordering::SeqCst), 1);

        // Recovery: a successful heartbeat resets the record
        fail.store(false, Ordering::SeqCst);
        monitor.run_checks().await;
        let health = status_of(&monitor, "adapter-a");
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_heartbeat_counts_as_failure() {
        let monitor = monitor();
        let restarts = Arc::new(AtomicUsize::new(0));
        let hang: HeartbeatFn = Arc::new(|| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        });
        monitor.register("adapter-slow", hang, counting_restart(restarts.clone()));

        monitor.run_checks().await;
        let health = status_of(&monitor, "adapter-slow");
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_components_share_one_timeout_per_cycle() {
        let monitor = monitor();
        let restarts = Arc::new(AtomicUsize::new(0));
        let hang = || -> HeartbeatFn {
            Arc::new(|| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
            })
        };
        monitor.register("adapter-a", hang(), counting_restart(restarts.clone()));
        monitor.register("adapter-b", hang(), counting_restart(restarts.clone()));
        monitor.register("adapter-c", hang(), counting_restart(restarts.clone()));

        let started = Instant::now();
        monitor.run_checks().await;
        let elapsed = started.elapsed();

        // Probes race concurrently: one 2s deadline, not one per component
        assert!(elapsed < Duration::from_secs(3), "cycle took {:?}", elapsed);
        for id in ["adapter-a", "adapter-b", "adapter-c"] {
            assert_eq!(status_of(&monitor, id).error_count, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_leaves_component_failed() {
        let monitor = monitor();
        let fail = Arc::new(AtomicBool::new(true));
        let refusing_restart: RestartFn =
            Arc::new(|| Box::pin(async { anyhow::bail!("restart refused") }));
        monitor.register("adapter-a", flaky(fail), refusing_restart);

        monitor.run_checks().await;
        monitor.run_checks().await;
        monitor.run_checks().await;

        let health = status_of(&monitor, "adapter-a");
        assert_eq!(health.status, ComponentStatus::Failed);
        assert_eq!(health.restart_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_alert_on_two_failing_components() {
        let bus = Arc::new(EventBus::new(64));
        let monitor = HealthMonitor::new(HealthConfig::default(), bus.clone());
        let mut events = bus.subscribe_events();

        let fail = Arc::new(AtomicBool::new(true));
        let restarts = Arc::new(AtomicUsize::new(0));
        monitor.register("adapter-a", flaky(fail.clone()), counting_restart(restarts.clone()));
        monitor.register("adapter-b", flaky(fail.clone()), counting_restart(restarts.clone()));

        monitor.run_checks().await;
        monitor.run_checks().await;

        let mut saw_cascade = false;
        while let Ok(event) = events.try_recv() {
            if let crate::core::EventPayload::Alert { message, .. } = event.payload {
                if message.contains("cascade") {
                    saw_cascade = true;
                }
            }
        }
        assert!(saw_cascade);
        // Cascade is reported, not blanket-restarted
        assert_eq!(restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_error_rate_keeps_component_degraded() {
        let config = HealthConfig {
            degraded_error_threshold: 2,
            ..Default::default()
        };
        let monitor = HealthMonitor::new(config, Arc::new(EventBus::new(64)));
        let fail = Arc::new(AtomicBool::new(true));
        let restarts = Arc::new(AtomicUsize::new(0));
        monitor.register("adapter-a", flaky(fail.clone()), counting_restart(restarts.clone()));

        // Two failures, recover, fail once more, then succeed: three errors
        // inside the rolling minute
        monitor.run_checks().await;
        monitor.run_checks().await;
        fail.store(false, Ordering::SeqCst);
        monitor.run_checks().await;
        fail.store(true, Ordering::SeqCst);
        monitor.run_checks().await;
        fail.store(false, Ordering::SeqCst);
        monitor.run_checks().await;

        assert_eq!(status_of(&monitor, "adapter-a").status, ComponentStatus::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_failed_is_visible_in_summary() {
        let monitor = monitor();
        let fail = Arc::new(AtomicBool::new(false));
        let restarts = Arc::new(AtomicUsize::new(0));
        monitor.register("adapter-a", flaky(fail), counting_restart(restarts));
        monitor.mark_failed("adapter-a");
        assert_eq!(status_of(&monitor, "adapter-a").status, ComponentStatus::Failed);
    }
}

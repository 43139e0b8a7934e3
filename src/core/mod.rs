//! Core module - the orchestrator composition root

mod event_bus;
mod stats;

pub use event_bus::{Event, EventBus, EventPayload, EventType};
pub use stats::{CategoryStats, PipelineStats, StageStats, StatsSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dedup::{Deduplicator, Warning};
use crate::detectors::{Detection, DetectorAdapter};
use crate::error::EngineError;
use crate::fusion::FusionEngine;
use crate::health::{HealthMonitor, HeartbeatFn, RestartFn};
use crate::perf::{CapabilityProbe, PerformanceController, SysinfoProbe};
use crate::profile::ViewerProfile;

/// Warning consumer callback, invoked synchronously at emission
pub type WarningCallback = Box<dyn Fn(&Warning) + Send + Sync>;

/// Session-level state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    pub adapters_registered: usize,
    pub total_detections: u64,
    pub total_warnings: u64,
    pub last_warning_at: Option<DateTime<Utc>>,
}

/// Orchestrator - registers adapters and subsystems, routes detections
/// through profile filtering, fusion and deduplication, and emits warnings.
///
/// All consume-side processing in `handle` is synchronous and
/// non-blocking; the performance and health control loops run on their own
/// timers and never sit on the detection data path. State is scoped to
/// this instance so multiple sessions can coexist in one process.
pub struct Orchestrator {
    config: Arc<Config>,
    event_bus: Arc<EventBus>,
    fusion: Mutex<FusionEngine>,
    dedup: Mutex<Deduplicator>,
    profile: RwLock<ViewerProfile>,
    stats: PipelineStats,
    perf: Arc<PerformanceController>,
    health: Arc<HealthMonitor>,
    adapters: Mutex<Vec<Arc<dyn DetectorAdapter>>>,
    callbacks: Mutex<Vec<WarningCallback>>,
    /// Latest observed playback position (seconds)
    playhead: Mutex<f64>,
    last_warning_at: Mutex<Option<DateTime<Utc>>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Orchestrator with the host-platform capability probe
    pub fn new(config: Config) -> Self {
        Self::with_probe(config, Arc::new(SysinfoProbe::new()))
    }

    pub fn with_probe(config: Config, probe: Arc<dyn CapabilityProbe>) -> Self {
        let config = Arc::new(config);
        let event_bus = Arc::new(EventBus::new(config.bus_capacity));
        let perf = Arc::new(PerformanceController::new(
            config.performance.clone(),
            probe,
        ));
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            event_bus.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(8);

        Self {
            fusion: Mutex::new(FusionEngine::new(config.fusion.clone())),
            dedup: Mutex::new(Deduplicator::new(config.dedup.clone())),
            profile: RwLock::new(ViewerProfile::default()),
            stats: PipelineStats::new(),
            perf,
            health,
            adapters: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            playhead: Mutex::new(0.0),
            last_warning_at: Mutex::new(None),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            event_bus,
            config,
        }
    }

    /// Register an adapter; takes effect on `initialize`
    pub fn register_adapter(&self, adapter: Arc<dyn DetectorAdapter>) {
        info!(id = adapter.id(), modality = ?adapter.modality(), "Adapter registered");
        self.adapters.lock().push(adapter);
    }

    /// Register a warning consumer
    pub fn on_warning(&self, callback: WarningCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Broadcast feed of emitted warnings
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<Warning> {
        self.event_bus.subscribe_warnings()
    }

    /// Shared event bus (alerts, tier changes, restarts)
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Replace the active viewer profile
    pub fn set_profile(&self, profile: ViewerProfile) {
        *self.profile.write() = profile;
    }

    /// Start adapters and control loops.
    ///
    /// An adapter that fails to initialize is logged and marked failed in
    /// health; the session proceeds with the remaining adapters.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Starting orchestrator...");

        let (detection_tx, mut detection_rx) =
            mpsc::channel::<Detection>(self.config.adapter_channel_capacity);
        let tier_config = self.perf.current_config();

        let adapters: Vec<Arc<dyn DetectorAdapter>> = self.adapters.lock().clone();
        for adapter in adapters {
            let id = adapter.id().to_string();
            self.register_health_hooks(&adapter);

            if let Err(source) = adapter.initialize(&tier_config).await {
                let err = EngineError::AdapterInit {
                    adapter: id.clone(),
                    source,
                };
                error!(id = %id, %err, "Adapter failed to start, continuing without it");
                self.event_bus.publish_error(1, &err.to_string());
                self.health.mark_failed(&id);
                continue;
            }

            let tx = detection_tx.clone();
            let tier_rx = self.perf.subscribe();
            let shutdown = self.shutdown_tx.subscribe();
            let task_adapter = adapter.clone();
            self.spawn(async move {
                if let Err(e) = task_adapter.run(tx, tier_rx, shutdown).await {
                    warn!(id = task_adapter.id(), error = %e, "Adapter run loop ended with error");
                }
            });
        }
        drop(detection_tx);

        // Consume-side pump: all fusion and dedup processing happens
        // synchronously on this single task, preserving per-category
        // ordering and the one-open-window invariant.
        let this = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        self.spawn(async move {
            loop {
                tokio::select! {
                    detection = detection_rx.recv() => {
                        match detection {
                            Some(detection) => this.handle(detection),
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });

        // Maintenance: flush timers and fusion window expiry
        let this = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        let tick = Duration::from_millis(self.config.dedup.maintenance_interval_ms);
        self.spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => this.run_maintenance(),
                    _ = shutdown.recv() => break,
                }
            }
        });

        // Tier-change relay onto the event bus
        let bus = self.event_bus.clone();
        let mut tier_rx = self.perf.subscribe();
        let mut shutdown = self.shutdown_tx.subscribe();
        self.spawn(async move {
            loop {
                tokio::select! {
                    changed = tier_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let tier = tier_rx.borrow_and_update().tier;
                        bus.publish_tier_change(tier);
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });

        let perf = self.perf.clone();
        let shutdown = self.shutdown_tx.subscribe();
        self.spawn(async move { perf.run(shutdown).await });

        let health = self.health.clone();
        let shutdown = self.shutdown_tx.subscribe();
        self.spawn(async move { health.run(shutdown).await });

        info!("Orchestrator started");
        Ok(())
    }

    fn register_health_hooks(&self, adapter: &Arc<dyn DetectorAdapter>) {
        let heartbeat_adapter = adapter.clone();
        let heartbeat: HeartbeatFn = Arc::new(move || {
            let adapter = heartbeat_adapter.clone();
            Box::pin(async move { adapter.heartbeat().await })
        });

        let restart_adapter = adapter.clone();
        let perf = self.perf.clone();
        let restart: RestartFn = Arc::new(move || {
            let adapter = restart_adapter.clone();
            let config = perf.current_config();
            Box::pin(async move { adapter.initialize(&config).await })
        });

        self.health.register(adapter.id(), heartbeat, restart);
    }

    fn spawn(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        self.tasks.lock().push(tokio::spawn(future));
    }

    /// Ingest one detection from an adapter.
    ///
    /// Synchronous: profile filter, fusion, deduplication and emission all
    /// complete before this returns. Never panics or propagates errors to
    /// the caller.
    pub fn handle(&self, detection: Detection) {
        if detection.confidence > 100 {
            let err = EngineError::MalformedDetection(format!(
                "confidence {} out of range for {:?}",
                detection.confidence, detection.category
            ));
            debug!(%err, "Dropping detection");
            self.stats.record_malformed();
            return;
        }

        self.stats.record_received(detection.category);
        {
            let mut playhead = self.playhead.lock();
            *playhead = playhead.max(detection.timestamp);
        }

        let profile_ok = self.profile.read().is_enabled(detection.category);
        if !profile_ok {
            self.stats.record_profile_filtered();
            return;
        }

        self.event_bus.publish_detection(detection.clone());

        let update = match self.fusion.lock().ingest(&detection) {
            Some(update) => update,
            None => return,
        };
        self.stats
            .record_fused(update.score.category, update.used_fallback);

        let category = update.score.category;
        let mut emitted = Vec::new();

        if update.closed_previous {
            emitted.extend(self.dedup.lock().close_category(category));
        }

        let threshold = self
            .profile
            .read()
            .threshold_for(category, self.config.dedup.min_confidence);
        if update.score.confidence < threshold {
            self.stats.record_below_threshold();
        } else {
            emitted.extend(self.dedup.lock().ingest(update.score));
        }

        for warning in emitted {
            self.emit(warning);
        }
    }

    /// Flush due warning groups and expire quiet fusion windows.
    ///
    /// Normally driven by the internal maintenance loop; public so
    /// embedders running their own cadence can drive it directly.
    pub fn run_maintenance(&self) {
        let mut emitted = self.dedup.lock().flush_due();

        let playhead = *self.playhead.lock();
        let closed = self.fusion.lock().expire(playhead);
        if !closed.is_empty() {
            let mut dedup = self.dedup.lock();
            for category in closed {
                emitted.extend(dedup.close_category(category));
            }
        }

        for warning in emitted {
            self.emit(warning);
        }
    }

    fn emit(&self, warning: Warning) {
        info!(
            category = ?warning.category,
            confidence = warning.confidence,
            start = warning.start_time,
            end = warning.end_time,
            "Warning emitted"
        );
        self.stats.record_emitted(warning.category);
        *self.last_warning_at.lock() = Some(Utc::now());

        for callback in self.callbacks.lock().iter() {
            callback(&warning);
        }
        self.event_bus.publish_warning(warning);
    }

    /// Aggregated pipeline statistics and health summary
    pub fn get_stats(&self) -> StatsSnapshot {
        let mut per_stage = self.stats.stage();
        let (open_groups, suppressed) = {
            let dedup = self.dedup.lock();
            (dedup.open_groups(), dedup.suppressed_count())
        };
        per_stage.rate_limited = suppressed;

        StatsSnapshot {
            per_stage,
            per_category: self.stats.categories(),
            health_summary: self.health.summary(),
            current_tier: self.perf.current_tier(),
            open_windows: self.fusion.lock().open_windows(),
            open_groups,
        }
    }

    /// Session state snapshot
    pub fn state(&self) -> SystemState {
        let stage = self.stats.stage();
        SystemState {
            running: self.running.load(Ordering::SeqCst),
            adapters_registered: self.adapters.lock().len(),
            total_detections: stage.received,
            total_warnings: stage.emitted,
            last_warning_at: *self.last_warning_at.lock(),
        }
    }

    /// Stop all loops, dispose adapters and discard open state.
    ///
    /// Open windows and groups are discarded, not flushed: a teardown
    /// must never emit a warning.
    pub async fn dispose(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("Stopping orchestrator...");

        let _ = self.shutdown_tx.send(());
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }

        let adapters: Vec<Arc<dyn DetectorAdapter>> = self.adapters.lock().clone();
        for adapter in adapters {
            if let Err(e) = adapter.dispose().await {
                warn!(id = adapter.id(), error = %e, "Adapter dispose failed");
            }
        }

        self.fusion.lock().clear();
        self.dedup.lock().discard_open();
        info!("Orchestrator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{Category, Modality};
    use crate::perf::FixedProbe;
    use tokio::time::advance;

    fn orchestrator() -> Arc<Orchestrator> {
        Arc::new(Orchestrator::with_probe(
            Config::default(),
            Arc::new(FixedProbe::desktop()),
        ))
    }

    fn collect_warnings(orchestrator: &Orchestrator) -> Arc<Mutex<Vec<Warning>>> {
        let sink: Arc<Mutex<Vec<Warning>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = sink.clone();
        orchestrator.on_warning(Box::new(move |w| captured.lock().push(w.clone())));
        sink
    }

    #[tokio::test(start_paused = true)]
    async fn two_modalities_merge_into_one_confident_warning() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);

        orchestrator.handle(Detection::new(
            Category::Violence,
            70,
            Modality::SubtitleCue,
            10.0,
        ));
        orchestrator.handle(Detection::new(
            Category::Violence,
            80,
            Modality::AudioEnvelope,
            10.3,
        ));

        advance(Duration::from_millis(2500)).await;
        orchestrator.run_maintenance();

        let warnings = sink.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].confidence >= 80);
        assert!(warnings[0].sources.contains(&Modality::SubtitleCue));
        assert!(warnings[0].sources.contains(&Modality::AudioEnvelope));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_detection_yields_one_warning() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);

        let d = Detection::new(Category::Gore, 85, Modality::FrameColor, 42.0);
        orchestrator.handle(d.clone());
        orchestrator.handle(d);

        advance(Duration::from_millis(2500)).await;
        orchestrator.run_maintenance();

        assert_eq!(sink.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_category_is_filtered_before_fusion() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);
        orchestrator.set_profile(ViewerProfile::empty().with_category(Category::Gore));

        orchestrator.handle(Detection::new(
            Category::Violence,
            90,
            Modality::SubtitleCue,
            5.0,
        ));

        advance(Duration::from_secs(3)).await;
        orchestrator.run_maintenance();

        assert!(sink.lock().is_empty());
        let stats = orchestrator.get_stats();
        assert_eq!(stats.per_stage.profile_filtered, 1);
        assert_eq!(stats.per_stage.fused, 0);
        assert_eq!(stats.open_windows, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn profile_threshold_gates_fused_scores() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);
        orchestrator.set_profile(
            ViewerProfile::default().with_threshold(Category::Violence, 95),
        );

        orchestrator.handle(Detection::new(
            Category::Violence,
            80,
            Modality::SubtitleCue,
            5.0,
        ));

        advance(Duration::from_secs(3)).await;
        orchestrator.run_maintenance();

        assert!(sink.lock().is_empty());
        assert_eq!(orchestrator.get_stats().per_stage.below_threshold, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_confidence_is_counted_and_dropped() {
        let orchestrator = orchestrator();
        orchestrator.handle(Detection::new(
            Category::Blood,
            150,
            Modality::FrameColor,
            1.0,
        ));

        let stats = orchestrator.get_stats();
        assert_eq!(stats.per_stage.malformed, 1);
        assert_eq!(stats.per_stage.received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_discards_open_groups_silently() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);

        orchestrator.handle(Detection::new(
            Category::Spiders,
            90,
            Modality::FrameColor,
            7.0,
        ));
        assert_eq!(orchestrator.get_stats().open_groups, 1);

        orchestrator.dispose().await;

        advance(Duration::from_secs(5)).await;
        orchestrator.run_maintenance();
        assert!(sink.lock().is_empty());
        assert_eq!(orchestrator.get_stats().open_groups, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_confidence_stays_in_bounds() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);

        for i in 0..5 {
            orchestrator.handle(Detection::new(
                Category::FlashingLights,
                100,
                Modality::FlashPattern,
                10.0 + f64::from(i) * 0.1,
            ));
        }
        advance(Duration::from_millis(2500)).await;
        orchestrator.run_maintenance();

        let warnings = sink.lock();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].confidence <= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_playhead_gap_closes_window_and_flushes_group() {
        let orchestrator = orchestrator();
        let sink = collect_warnings(&orchestrator);

        orchestrator.handle(Detection::new(
            Category::LoudNoise,
            90,
            Modality::AudioEnvelope,
            10.0,
        ));
        // Playback jumps far past the quiet period
        orchestrator.handle(Detection::new(
            Category::Gore,
            90,
            Modality::FrameColor,
            40.0,
        ));
        orchestrator.run_maintenance();

        let warnings = sink.lock();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].category, Category::LoudNoise);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_snapshot_serializes_to_json() {
        let orchestrator = orchestrator();
        orchestrator.handle(Detection::new(
            Category::Gore,
            85,
            Modality::FrameColor,
            1.0,
        ));

        let text = serde_json::to_string_pretty(&orchestrator.get_stats()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["per_stage"]["received"], 1);
        assert_eq!(value["per_category"]["gore"]["detections"], 1);
        assert_eq!(value["open_windows"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_track_every_stage() {
        let orchestrator = orchestrator();
        let _sink = collect_warnings(&orchestrator);

        orchestrator.handle(Detection::new(
            Category::Violence,
            70,
            Modality::SubtitleCue,
            1.0,
        ));
        orchestrator.handle(Detection::new(
            Category::Violence,
            80,
            Modality::AudioEnvelope,
            1.2,
        ));
        advance(Duration::from_millis(2500)).await;
        orchestrator.run_maintenance();

        let stats = orchestrator.get_stats();
        assert_eq!(stats.per_stage.received, 2);
        assert_eq!(stats.per_stage.fused, 2);
        assert_eq!(stats.per_stage.emitted, 1);
        assert_eq!(stats.per_category[&Category::Violence].detections, 2);
        assert_eq!(stats.per_category[&Category::Violence].warnings, 1);
    }
}

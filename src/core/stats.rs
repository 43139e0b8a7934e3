// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Pipeline statistics - per-stage and per-category counters

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::detectors::Category;
use crate::health::ComponentHealth;
use crate::perf::PerformanceTier;

/// Counters for one warning category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryStats {
    pub detections: u64,
    pub fused_scores: u64,
    pub warnings: u64,
}

/// Per-stage counters across the whole pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageStats {
    /// Detections received from adapters
    pub received: u64,
    /// Dropped: out-of-range confidence
    pub malformed: u64,
    /// Dropped: category disabled by the viewer profile
    pub profile_filtered: u64,
    /// Dropped: fused score under the category threshold
    pub below_threshold: u64,
    /// Fused scores produced
    pub fused: u64,
    /// Fusion fell back to the best individual contribution
    pub fusion_fallbacks: u64,
    /// Warnings emitted to consumers
    pub emitted: u64,
    /// Warnings suppressed by the rate limiter
    pub rate_limited: u64,
}

/// Snapshot returned by `Orchestrator::get_stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub per_stage: StageStats,
    pub per_category: HashMap<Category, CategoryStats>,
    pub health_summary: Vec<ComponentHealth>,
    pub current_tier: PerformanceTier,
    pub open_windows: usize,
    pub open_groups: usize,
}

/// Shared mutable counters for the orchestrated session
#[derive(Default)]
pub struct PipelineStats {
    stage: RwLock<StageStats>,
    categories: RwLock<HashMap<Category, CategoryStats>>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, category: Category) {
        self.stage.write().received += 1;
        self.categories.write().entry(category).or_default().detections += 1;
    }

    pub fn record_malformed(&self) {
        self.stage.write().malformed += 1;
    }

    pub fn record_profile_filtered(&self) {
        self.stage.write().profile_filtered += 1;
    }

    pub fn record_below_threshold(&self) {
        self.stage.write().below_threshold += 1;
    }

    pub fn record_fused(&self, category: Category, used_fallback: bool) {
        let mut stage = self.stage.write();
        stage.fused += 1;
        if used_fallback {
            stage.fusion_fallbacks += 1;
        }
        drop(stage);
        self.categories
            .write()
            .entry(category)
            .or_default()
            .fused_scores += 1;
    }

    pub fn record_emitted(&self, category: Category) {
        self.stage.write().emitted += 1;
        self.categories.write().entry(category).or_default().warnings += 1;
    }

    pub fn stage(&self) -> StageStats {
        self.stage.read().clone()
    }

    pub fn categories(&self) -> HashMap<Category, CategoryStats> {
        self.categories.read().clone()
    }
}

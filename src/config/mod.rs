// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Configuration module
//!
//! Every empirically-derived tunable in the engine (quiet periods, merge
//! windows, rate ceilings, tier thresholds, correlation bonuses) lives here
//! so deployments can adjust them without a rebuild.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::detectors::Category;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (simulated detector adapters)
    pub demo_mode: bool,

    /// Event bus channel capacity
    pub bus_capacity: usize,

    /// Bounded adapter-to-orchestrator channel capacity
    pub adapter_channel_capacity: usize,

    /// Fusion configuration
    pub fusion: FusionConfig,

    /// Deduplication configuration
    pub dedup: DedupConfig,

    /// Performance controller configuration
    pub performance: PerformanceConfig,

    /// Health monitor configuration
    pub health: HealthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "MediaGuard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            demo_mode: false,
            bus_capacity: 1000,
            adapter_channel_capacity: 256,
            fusion: FusionConfig::default(),
            dedup: DedupConfig::default(),
            performance: PerformanceConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("mediaguard"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Fusion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Quiet period (playback seconds) after which a fusion window closes
    pub quiet_period_secs: f64,

    /// Base rate used as the starting posterior for every category
    pub prior: f64,

    /// Per-category prior overrides
    pub category_priors: HashMap<Category, f64>,

    /// Likelihood discount for detections from a non-primary modality
    pub secondary_modality_weight: f64,

    /// Multiplier applied when two distinct modalities agree in a window
    pub two_modality_bonus: f64,

    /// Additional multiplier at three or more modalities
    pub three_modality_bonus: f64,

    /// Window span (seconds) below which corroboration counts as tight
    pub tight_span_secs: f64,

    /// Window span (seconds) above which corroboration counts as loose
    pub wide_span_secs: f64,

    /// Additive posterior adjustment for tightly-clustered windows
    pub tight_adjustment: f64,

    /// Additive posterior penalty for loosely-related windows
    pub wide_adjustment: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            quiet_period_secs: 10.0,
            prior: 0.10,
            category_priors: HashMap::new(),
            secondary_modality_weight: 0.85,
            two_modality_bonus: 1.25,
            three_modality_bonus: 1.15,
            tight_span_secs: 2.0,
            wide_span_secs: 8.0,
            tight_adjustment: 0.05,
            wide_adjustment: 0.05,
        }
    }
}

impl FusionConfig {
    /// Prior for a category, falling back to the global base rate
    pub fn prior_for(&self, category: Category) -> f64 {
        self.category_priors
            .get(&category)
            .copied()
            .unwrap_or(self.prior)
    }
}

/// Deduplication and rate-limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Merge strategy for warning groups
    pub strategy: MergeStrategy,

    /// Default quiet window (ms) before an open group flushes
    pub merge_window_ms: u64,

    /// Per-category merge window overrides (ms)
    pub category_merge_windows: HashMap<Category, u64>,

    /// Sliding rate-limit window in seconds
    pub rate_window_secs: u64,

    /// Maximum warnings per category inside the sliding window
    pub rate_ceiling: usize,

    /// Minimum gap (ms) between consecutive emissions of one category
    pub min_gap_ms: u64,

    /// Fused-score floor applied when the viewer profile has no
    /// per-category threshold
    pub min_confidence: u8,

    /// Orchestrator maintenance tick driving flush timers (ms)
    pub maintenance_interval_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::MergeAll,
            merge_window_ms: 2000,
            category_merge_windows: HashMap::new(),
            rate_window_secs: 60,
            rate_ceiling: 10,
            min_gap_ms: 3000,
            min_confidence: 50,
            maintenance_interval_ms: 250,
        }
    }
}

impl DedupConfig {
    /// Merge window for a category, falling back to the default
    pub fn merge_window_for(&self, category: Category) -> u64 {
        self.category_merge_windows
            .get(&category)
            .copied()
            .unwrap_or(self.merge_window_ms)
    }
}

/// How same-category fused scores collapse into warnings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Union spans, sources and evidence into one warning per group (default)
    MergeAll,
    /// Emit only the single best-confidence score per group
    KeepHighest,
    /// Emit the first score per group immediately, swallow the rest
    SuppressDuplicates,
    /// No grouping, one warning per incoming score (diagnostic only)
    ShowAll,
}

/// Performance controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Evaluation cycle interval in seconds
    pub eval_interval_secs: u64,

    /// Pressure above this for a sustained period triggers a downgrade
    pub pressure_high: f64,

    /// Pressure below this for a sustained period triggers an upgrade
    pub pressure_low: f64,

    /// Sustain duration (seconds) before a hysteresis transition fires
    pub sustain_secs: u64,

    /// Battery percentage at which the emergency override engages
    pub battery_critical_pct: u8,

    /// Battery percentage at which the emergency override clears
    pub battery_recover_pct: u8,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            eval_interval_secs: 5,
            pressure_high: 0.85,
            pressure_low: 0.50,
            sustain_secs: 60,
            battery_critical_pct: 20,
            battery_recover_pct: 30,
        }
    }
}

impl PerformanceConfig {
    /// Number of consecutive cycles a pressure condition must hold
    pub fn sustain_cycles(&self) -> u32 {
        (self.sustain_secs / self.eval_interval_secs.max(1)).max(1) as u32
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Heartbeat cycle interval in seconds
    pub check_interval_secs: u64,

    /// Per-heartbeat deadline in milliseconds
    pub heartbeat_timeout_ms: u64,

    /// Consecutive failures at which a component is failing
    pub failing_threshold: u32,

    /// Consecutive failures at which a component is failed and restarted
    pub failed_threshold: u32,

    /// Rolling error-rate window in seconds
    pub error_rate_window_secs: u64,

    /// Errors inside the rolling window that keep a component degraded
    pub degraded_error_threshold: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            heartbeat_timeout_ms: 2000,
            failing_threshold: 2,
            failed_threshold: 3,
            error_rate_window_secs: 60,
            degraded_error_threshold: 3,
        }
    }
}

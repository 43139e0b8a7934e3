// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! MediaGuard - Real-Time Content Warning Engine
//!
//! Watches a media playback timeline and fuses independent perceptual
//! signals (subtitle cues, audio envelope, frame color, flash patterns)
//! into confident, deduplicated, rate-limited content warnings:
//! - Per-category confidence fusion with cross-modality correlation bonuses
//! - Warning grouping, merge strategies and sliding-window rate limits
//! - Adaptive performance tiers driven by live resource pressure
//! - Heartbeat supervision with automatic component restart
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    MediaGuard Orchestrator                   │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌─────────┐  ┌────────┐  ┌───────────────┐   │
//! │  │ Detector │→ │ Profile │→ │ Fusion │→ │ Deduplicator  │   │
//! │  │ Adapters │  │ Filter  │  │ Engine │  │ + Rate Limits │   │
//! │  └──────────┘  └─────────┘  └────────┘  └───────────────┘   │
//! │       ↑                                        ↓             │
//! │  ┌───────────────┐   ┌───────────────┐   ┌──────────┐      │
//! │  │ Performance   │   │    Health     │   │ Warning  │      │
//! │  │ Controller    │   │    Monitor    │   │ Consumer │      │
//! │  └───────────────┘   └───────────────┘   └──────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The performance controller and health monitor are control loops beside
//! the data path: they configure and supervise, never route detections.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod config;
pub mod core;
pub mod dedup;
pub mod detectors;
pub mod error;
pub mod fusion;
pub mod health;
pub mod perf;
pub mod profile;

// Re-exports for convenience
pub use config::{Config, MergeStrategy};
pub use core::{EventBus, Orchestrator, StatsSnapshot, SystemState};
pub use dedup::{Deduplicator, Warning};
pub use detectors::{Category, Detection, DetectorAdapter, Modality, SimulatedAdapter};
pub use error::EngineError;
pub use fusion::{FusedScore, FusionEngine};
pub use health::{ComponentHealth, ComponentStatus, HealthMonitor};
pub use perf::{PerformanceController, PerformanceTier, TierConfig};
pub use profile::ViewerProfile;

/// MediaGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MediaGuard name
pub const NAME: &str = "MediaGuard";

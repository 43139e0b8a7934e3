// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Detector adapter interface and detection event types

mod simulator;

pub use simulator::SimulatedAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use anyhow::Result;

use crate::perf::TierConfig;

/// Content warning categories the engine can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Violence,
    Gore,
    Blood,
    FlashingLights,
    Jumpscare,
    SexualContent,
    SelfHarm,
    Needles,
    Vomit,
    Spiders,
    Snakes,
    LoudNoise,
}

impl Category {
    /// All known categories, in a stable order
    pub const ALL: [Category; 12] = [
        Category::Violence,
        Category::Gore,
        Category::Blood,
        Category::FlashingLights,
        Category::Jumpscare,
        Category::SexualContent,
        Category::SelfHarm,
        Category::Needles,
        Category::Vomit,
        Category::Spiders,
        Category::Snakes,
        Category::LoudNoise,
    ];

    /// Which signal family leads for this category.
    ///
    /// Resolved once here as a lookup, not through trait objects; the
    /// fusion engine reads it when weighting modalities.
    pub fn routing(self) -> RoutingStrategy {
        match self {
            Category::FlashingLights => RoutingStrategy::VisualPrimary,
            Category::Gore
            | Category::Blood
            | Category::Needles
            | Category::Vomit
            | Category::Spiders
            | Category::Snakes => RoutingStrategy::VisualPrimary,
            Category::Jumpscare | Category::LoudNoise => RoutingStrategy::AudioPrimary,
            Category::Violence | Category::SexualContent | Category::SelfHarm => {
                RoutingStrategy::TextPrimary
            }
        }
    }
}

/// Primary signal family for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStrategy {
    VisualPrimary,
    AudioPrimary,
    TextPrimary,
}

impl RoutingStrategy {
    /// True when the given modality is the lead signal for this strategy
    pub fn is_primary(self, modality: Modality) -> bool {
        matches!(
            (self, modality),
            (RoutingStrategy::VisualPrimary, Modality::FrameColor)
                | (RoutingStrategy::VisualPrimary, Modality::FlashPattern)
                | (RoutingStrategy::AudioPrimary, Modality::AudioEnvelope)
                | (RoutingStrategy::TextPrimary, Modality::SubtitleCue)
        )
    }
}

/// Perceptual signal sources feeding the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    SubtitleCue,
    AudioEnvelope,
    FrameColor,
    FlashPattern,
}

impl Modality {
    /// All modalities, in a stable order
    pub const ALL: [Modality; 4] = [
        Modality::SubtitleCue,
        Modality::AudioEnvelope,
        Modality::FrameColor,
        Modality::FlashPattern,
    ];
}

/// A single categorized signal event from one detector adapter.
///
/// Timestamps are playback seconds, not wall clock. Immutable once created;
/// never persisted beyond the fusion window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub category: Category,
    /// Heuristic confidence, 0..=100
    pub confidence: u8,
    pub modality: Modality,
    /// Playback position in seconds
    pub timestamp: f64,
    /// Duration of the detected span in seconds, if known
    pub span: Option<f64>,
    /// Human-readable evidence, e.g. the matched cue text
    pub evidence: String,
}

impl Detection {
    pub fn new(category: Category, confidence: u8, modality: Modality, timestamp: f64) -> Self {
        Self {
            category,
            confidence,
            modality,
            timestamp,
            span: None,
            evidence: String::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn with_span(mut self, span: f64) -> Self {
        self.span = Some(span);
        self
    }

    /// End of the detected span (start when no span is known)
    pub fn end(&self) -> f64 {
        self.timestamp + self.span.unwrap_or(0.0)
    }
}

/// Trait for all detector adapters.
///
/// Adapters are free to use any sensing strategy internally; the
/// orchestrator depends only on this triad plus a heartbeat probe for the
/// health monitor. Detections flow through the bounded channel handed to
/// `run`, which makes backpressure and shutdown ordering explicit.
#[async_trait]
pub trait DetectorAdapter: Send + Sync {
    /// Unique adapter identifier
    fn id(&self) -> &str;

    /// The modality this adapter produces
    fn modality(&self) -> Modality;

    /// Prepare the adapter for the given tier configuration
    async fn initialize(&self, config: &TierConfig) -> Result<()>;

    /// Release adapter resources
    async fn dispose(&self) -> Result<()>;

    /// Produce detections until shutdown.
    ///
    /// `tier_rx` carries live tier reconfiguration; adapters disabled by the
    /// current tier should idle rather than return.
    async fn run(
        &self,
        tx: mpsc::Sender<Detection>,
        tier_rx: watch::Receiver<TierConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;

    /// Liveness probe for the health monitor; must return promptly
    async fn heartbeat(&self) -> Result<()>;
}

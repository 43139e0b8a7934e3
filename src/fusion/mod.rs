// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Confidence fusion - combines per-category detections into fused scores
//!
//! One open window per category. Each ingest reruns the sequential
//! posterior update over the window, applies correlation bonuses when
//! independent modalities agree, then a temporal-consistency adjustment.
//! The scores are auditable heuristics, not calibrated probabilities.

use std::collections::{BTreeSet, HashMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FusionConfig;
use crate::detectors::{Category, Detection, Modality};
use crate::error::EngineError;

const EVIDENCE_EPSILON: f64 = 1e-10;

/// Fused confidence for one category window, recomputed on every update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedScore {
    pub category: Category,
    /// Combined confidence, 0..=100
    pub confidence: u8,
    /// Modalities that contributed to this score
    pub sources: BTreeSet<Modality>,
    /// Earliest contributing playback position (seconds)
    pub start: f64,
    /// Latest contributing playback position (seconds)
    pub end: f64,
    /// Evidence strings from the contributing detections, in arrival order
    pub evidence: Vec<String>,
}

/// Result of ingesting one detection
#[derive(Debug, Clone)]
pub struct FusionUpdate {
    /// The previous window for this category closed on this ingest
    /// (quiet period elapsed between it and the new detection)
    pub closed_previous: bool,
    /// The fused heuristic arithmetic went non-finite and the score fell
    /// back to the best individual contribution
    pub used_fallback: bool,
    pub score: FusedScore,
}

/// Per-category accumulator of temporally-adjacent detections
#[derive(Debug)]
struct FusionWindow {
    detections: Vec<Detection>,
    last_at: f64,
}

impl FusionWindow {
    fn new(detection: Detection) -> Self {
        let last_at = detection.timestamp;
        Self {
            detections: vec![detection],
            last_at,
        }
    }

    fn push(&mut self, detection: Detection) {
        self.last_at = self.last_at.max(detection.timestamp);
        self.detections.push(detection);
    }
}

/// Fusion engine - one open window per category
pub struct FusionEngine {
    config: FusionConfig,
    windows: HashMap<Category, FusionWindow>,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    /// Ingest one detection and recompute its category's fused score.
    ///
    /// Returns `None` when the detection carries no signal (confidence 0);
    /// no window is created or touched in that case.
    pub fn ingest(&mut self, detection: &Detection) -> Option<FusionUpdate> {
        if detection.confidence == 0 {
            debug!(
                category = ?detection.category,
                "Dropping zero-confidence detection"
            );
            return None;
        }

        let category = detection.category;
        let quiet = self.config.quiet_period_secs;

        let mut closed_previous = false;
        let stale = self
            .windows
            .get(&category)
            .map(|w| detection.timestamp - w.last_at > quiet)
            .unwrap_or(false);
        if stale {
            self.windows.remove(&category);
            closed_previous = true;
        }

        match self.windows.get_mut(&category) {
            Some(window) => window.push(detection.clone()),
            None => {
                self.windows
                    .insert(category, FusionWindow::new(detection.clone()));
            }
        }

        let window = &self.windows[&category];
        let (score, used_fallback) = self.compute_score(category, window);

        Some(FusionUpdate {
            closed_previous,
            used_fallback,
            score,
        })
    }

    /// Close windows whose last detection is older than the quiet period.
    ///
    /// Driven by the orchestrator's maintenance tick with the latest
    /// observed playback position. Returns the categories closed.
    pub fn expire(&mut self, playhead: f64) -> Vec<Category> {
        let quiet = self.config.quiet_period_secs;
        let closed: Vec<Category> = self
            .windows
            .iter()
            .filter(|(_, w)| playhead - w.last_at > quiet)
            .map(|(c, _)| *c)
            .collect();
        for category in &closed {
            self.windows.remove(category);
            debug!(?category, "Fusion window closed after quiet period");
        }
        closed
    }

    /// Number of currently open windows
    pub fn open_windows(&self) -> usize {
        self.windows.len()
    }

    /// Discard all open windows without emitting anything
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    fn compute_score(&self, category: Category, window: &FusionWindow) -> (FusedScore, bool) {
        let routing = category.routing();
        let mut posterior = self.config.prior_for(category).clamp(0.0, 1.0);
        let mut max_individual = 0.0_f64;

        // Sequential heuristic update in arrival order
        for detection in &window.detections {
            let raw = f64::from(detection.confidence.min(100)) / 100.0;
            max_individual = max_individual.max(raw);

            let weight = if routing.is_primary(detection.modality) {
                1.0
            } else {
                self.config.secondary_modality_weight
            };
            let likelihood = raw * weight;

            let evidence = likelihood * posterior + (1.0 - likelihood) * (1.0 - posterior);
            if evidence > EVIDENCE_EPSILON {
                posterior = (likelihood * posterior) / evidence;
            }
        }

        let sources: BTreeSet<Modality> =
            window.detections.iter().map(|d| d.modality).collect();

        // Correlation bonuses only when independent modalities corroborate
        if sources.len() >= 2 {
            posterior *= self.config.two_modality_bonus;
        }
        if sources.len() >= 3 {
            posterior *= self.config.three_modality_bonus;
        }
        // Comparison-based clamp: min/max would silently eat a NaN before
        // the fallback check below can see it
        if posterior > 1.0 {
            posterior = 1.0;
        }

        let start = window
            .detections
            .iter()
            .map(|d| d.timestamp)
            .fold(f64::INFINITY, f64::min);
        let end = window
            .detections
            .iter()
            .map(|d| d.end())
            .fold(f64::NEG_INFINITY, f64::max);

        // Tight clustering is corroboration, loose spread is coincidence
        let span = end - start;
        if window.detections.len() >= 2 {
            if span < self.config.tight_span_secs {
                posterior += self.config.tight_adjustment;
            } else if span > self.config.wide_span_secs {
                posterior -= self.config.wide_adjustment;
            }
        }

        // Corroboration never lowers a score below its best input
        if posterior < max_individual {
            posterior = max_individual;
        }

        let mut used_fallback = false;
        if !posterior.is_finite() {
            posterior = max_individual;
            used_fallback = true;
            let err = EngineError::FusionComputation {
                category,
                fallback: (max_individual * 100.0).round() as u8,
            };
            warn!(%err, "Falling back to best contribution");
        }

        let confidence = (posterior.clamp(0.0, 1.0) * 100.0).round() as u8;

        let evidence = window
            .detections
            .iter()
            .filter(|d| !d.evidence.is_empty())
            .map(|d| d.evidence.clone())
            .collect();

        (
            FusedScore {
                category,
                confidence,
                sources,
                start,
                end,
                evidence,
            },
            used_fallback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> FusionEngine {
        FusionEngine::new(FusionConfig::default())
    }

    #[test]
    fn zero_confidence_creates_no_window() {
        let mut fusion = engine();
        let d = Detection::new(Category::Gore, 0, Modality::FrameColor, 5.0);
        assert!(fusion.ingest(&d).is_none());
        assert_eq!(fusion.open_windows(), 0);
    }

    #[test]
    fn score_stays_in_bounds() {
        let mut fusion = engine();
        for (conf, ts) in [(100u8, 1.0), (100, 1.1), (100, 1.2), (100, 1.3)] {
            let d = Detection::new(Category::Violence, conf, Modality::SubtitleCue, ts);
            let update = fusion.ingest(&d).unwrap();
            assert!(update.score.confidence <= 100);
        }
    }

    #[test]
    fn corroborating_modalities_raise_confidence() {
        let a = Detection::new(Category::Violence, 70, Modality::SubtitleCue, 10.0);
        let b = Detection::new(Category::Violence, 80, Modality::AudioEnvelope, 10.3);

        let mut fusion = engine();
        fusion.ingest(&a).unwrap();
        let update = fusion.ingest(&b).unwrap();

        assert!(update.score.confidence >= 80);
        assert!(update.score.sources.contains(&Modality::SubtitleCue));
        assert!(update.score.sources.contains(&Modality::AudioEnvelope));
        assert!(!update.closed_previous);
    }

    #[test]
    fn fused_never_below_best_input() {
        // A small prior drags the posterior down; the floor keeps the
        // output monotone in its strongest contribution.
        let mut fusion = engine();
        let d = Detection::new(Category::Spiders, 90, Modality::FrameColor, 3.0);
        let update = fusion.ingest(&d).unwrap();
        assert!(update.score.confidence >= 90);
    }

    #[test]
    fn single_source_gets_no_correlation_bonus() {
        let mut single = engine();
        single
            .ingest(&Detection::new(
                Category::Violence,
                90,
                Modality::SubtitleCue,
                1.0,
            ))
            .unwrap();
        let single_score = single
            .ingest(&Detection::new(
                Category::Violence,
                90,
                Modality::SubtitleCue,
                1.2,
            ))
            .unwrap()
            .score
            .confidence;

        let mut multi = engine();
        multi
            .ingest(&Detection::new(
                Category::Violence,
                90,
                Modality::SubtitleCue,
                1.0,
            ))
            .unwrap();
        let multi_score = multi
            .ingest(&Detection::new(
                Category::Violence,
                90,
                Modality::AudioEnvelope,
                1.2,
            ))
            .unwrap()
            .score
            .confidence;

        assert!(multi_score > single_score);
    }

    #[test]
    fn wide_spread_is_penalized() {
        let mut tight = engine();
        tight
            .ingest(&Detection::new(
                Category::Violence,
                60,
                Modality::SubtitleCue,
                10.0,
            ))
            .unwrap();
        let tight_score = tight
            .ingest(&Detection::new(
                Category::Violence,
                60,
                Modality::AudioEnvelope,
                10.5,
            ))
            .unwrap()
            .score
            .confidence;

        let mut wide = engine();
        wide.ingest(&Detection::new(
            Category::Violence,
            60,
            Modality::SubtitleCue,
            10.0,
        ))
        .unwrap();
        let wide_score = wide
            .ingest(&Detection::new(
                Category::Violence,
                60,
                Modality::AudioEnvelope,
                19.0,
            ))
            .unwrap()
            .score
            .confidence;

        assert!(tight_score >= wide_score);
    }

    #[test]
    fn quiet_period_closes_previous_window() {
        let mut fusion = engine();
        fusion
            .ingest(&Detection::new(
                Category::Gore,
                70,
                Modality::FrameColor,
                10.0,
            ))
            .unwrap();

        // 15s later, past the 10s quiet period
        let update = fusion
            .ingest(&Detection::new(
                Category::Gore,
                70,
                Modality::FrameColor,
                25.0,
            ))
            .unwrap();

        assert!(update.closed_previous);
        assert_eq!(update.score.sources.len(), 1);
        assert!((update.score.start - 25.0).abs() < 1e-9);
    }

    #[test]
    fn one_open_window_per_category() {
        let mut fusion = engine();
        for ts in [1.0, 1.5, 2.0, 2.5] {
            fusion
                .ingest(&Detection::new(
                    Category::Blood,
                    50,
                    Modality::FrameColor,
                    ts,
                ))
                .unwrap();
        }
        fusion
            .ingest(&Detection::new(
                Category::LoudNoise,
                50,
                Modality::AudioEnvelope,
                2.0,
            ))
            .unwrap();
        assert_eq!(fusion.open_windows(), 2);
    }

    #[test]
    fn expire_closes_stale_windows() {
        let mut fusion = engine();
        fusion
            .ingest(&Detection::new(
                Category::Blood,
                50,
                Modality::FrameColor,
                1.0,
            ))
            .unwrap();
        fusion
            .ingest(&Detection::new(
                Category::LoudNoise,
                50,
                Modality::AudioEnvelope,
                8.0,
            ))
            .unwrap();

        let closed = fusion.expire(14.0);
        assert_eq!(closed, vec![Category::Blood]);
        assert_eq!(fusion.open_windows(), 1);
    }

    #[test]
    fn non_finite_prior_falls_back_to_best_contribution() {
        let config = FusionConfig {
            prior: f64::NAN,
            ..Default::default()
        };
        let mut fusion = FusionEngine::new(config);
        let update = fusion
            .ingest(&Detection::new(
                Category::Needles,
                65,
                Modality::FrameColor,
                2.0,
            ))
            .unwrap();
        assert!(update.used_fallback);
        assert_eq!(update.score.confidence, 65);
    }
}

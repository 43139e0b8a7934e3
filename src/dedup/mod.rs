// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Deduplication - collapses fused scores into rate-limited warnings
//!
//! One open group per category. The flush timer restarts on every merge;
//! the orchestrator's maintenance tick drives `flush_due`. Rate limiting is
//! independent of grouping: a sliding per-category window plus a minimum
//! gap between consecutive emissions.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{DedupConfig, MergeStrategy};
use crate::detectors::{Category, Modality};
use crate::fusion::FusedScore;

/// Externally visible warning, read-only once emitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub category: Category,
    /// Playback seconds
    pub start_time: f64,
    /// Playback seconds
    pub end_time: f64,
    /// Combined confidence, 0..=100
    pub confidence: u8,
    pub sources: BTreeSet<Modality>,
    pub description: String,
    pub group_id: Uuid,
}

/// Time-bounded cluster of fused scores destined for one warning
#[derive(Debug)]
struct WarningGroup {
    id: Uuid,
    category: Category,
    group_start: f64,
    group_end: f64,
    best_confidence: u8,
    sources: BTreeSet<Modality>,
    merged_evidence: Vec<String>,
    /// Best single score seen, kept for the keep-highest strategy
    best_score: FusedScore,
    emitted: bool,
    last_update: Instant,
}

impl WarningGroup {
    fn new(score: FusedScore) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: score.category,
            group_start: score.start,
            group_end: score.end,
            best_confidence: score.confidence,
            sources: score.sources.clone(),
            merged_evidence: score.evidence.clone(),
            best_score: score,
            emitted: false,
            last_update: Instant::now(),
        }
    }

    fn merge(&mut self, score: FusedScore) {
        self.group_start = self.group_start.min(score.start);
        self.group_end = self.group_end.max(score.end);
        self.best_confidence = self.best_confidence.max(score.confidence);
        self.sources.extend(score.sources.iter().copied());
        for evidence in &score.evidence {
            if !self.merged_evidence.contains(evidence) {
                self.merged_evidence.push(evidence.clone());
            }
        }
        if score.confidence > self.best_score.confidence {
            self.best_score = score;
        }
        self.last_update = Instant::now();
    }
}

/// Per-category sliding-window rate limiter with a minimum emission gap
struct RateLimiter {
    window: Duration,
    ceiling: usize,
    min_gap: Duration,
    emissions: HashMap<Category, VecDeque<Instant>>,
    last_emit: HashMap<Category, Instant>,
}

impl RateLimiter {
    fn new(config: &DedupConfig) -> Self {
        Self {
            window: Duration::from_secs(config.rate_window_secs),
            ceiling: config.rate_ceiling,
            min_gap: Duration::from_millis(config.min_gap_ms),
            emissions: HashMap::new(),
            last_emit: HashMap::new(),
        }
    }

    /// True when a warning for this category may be emitted now; records
    /// the emission when allowed
    fn try_emit(&mut self, category: Category) -> bool {
        let now = Instant::now();

        if let Some(last) = self.last_emit.get(&category) {
            if now.duration_since(*last) < self.min_gap {
                return false;
            }
        }

        let emissions = self.emissions.entry(category).or_default();
        while emissions
            .front()
            .map(|t| now.duration_since(*t) > self.window)
            .unwrap_or(false)
        {
            emissions.pop_front();
        }

        if emissions.len() >= self.ceiling {
            return false;
        }

        emissions.push_back(now);
        self.last_emit.insert(category, now);
        true
    }
}

/// Deduplicator - groups fused scores and enforces the warning budget
pub struct Deduplicator {
    config: DedupConfig,
    groups: HashMap<Category, WarningGroup>,
    limiter: RateLimiter,
    emitted_count: u64,
    suppressed_count: u64,
}

impl Deduplicator {
    pub fn new(config: DedupConfig) -> Self {
        let limiter = RateLimiter::new(&config);
        Self {
            config,
            groups: HashMap::new(),
            limiter,
            emitted_count: 0,
            suppressed_count: 0,
        }
    }

    /// Ingest one fused score; may emit immediately depending on strategy
    pub fn ingest(&mut self, score: FusedScore) -> Vec<Warning> {
        let category = score.category;

        if self.config.strategy == MergeStrategy::ShowAll {
            let warning = warning_from_score(&score, Uuid::new_v4());
            return self.gate(warning);
        }

        match self.groups.get_mut(&category) {
            Some(group) => {
                group.merge(score);
                Vec::new()
            }
            None => {
                let mut group = WarningGroup::new(score);
                let mut out = Vec::new();
                if self.config.strategy == MergeStrategy::SuppressDuplicates {
                    // Emit the first score of the burst, swallow the rest
                    let warning = warning_from_group(&group);
                    group.emitted = true;
                    out = self.gate(warning);
                }
                self.groups.insert(category, group);
                out
            }
        }
    }

    /// Flush every group whose merge window has gone quiet
    pub fn flush_due(&mut self) -> Vec<Warning> {
        let now = Instant::now();
        let due: Vec<Category> = self
            .groups
            .iter()
            .filter(|(category, group)| {
                let window = Duration::from_millis(self.config.merge_window_for(**category));
                now.duration_since(group.last_update) >= window
            })
            .map(|(c, _)| *c)
            .collect();

        let mut out = Vec::new();
        for category in due {
            out.extend(self.flush(category));
        }
        out
    }

    /// Flush the open group for a category (fusion-window close signal)
    pub fn close_category(&mut self, category: Category) -> Vec<Warning> {
        self.flush(category)
    }

    /// Discard all open groups without emitting
    pub fn discard_open(&mut self) {
        if !self.groups.is_empty() {
            debug!(count = self.groups.len(), "Discarding open warning groups");
        }
        self.groups.clear();
    }

    /// Open (unflushed) group count
    pub fn open_groups(&self) -> usize {
        self.groups.len()
    }

    /// Warnings emitted since creation
    pub fn emitted_count(&self) -> u64 {
        self.emitted_count
    }

    /// Warnings suppressed by the rate limiter since creation
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count
    }

    fn flush(&mut self, category: Category) -> Vec<Warning> {
        let Some(mut group) = self.groups.remove(&category) else {
            return Vec::new();
        };

        if group.emitted {
            // suppress-duplicates already surfaced this group
            return Vec::new();
        }
        group.emitted = true;

        let warning = match self.config.strategy {
            MergeStrategy::KeepHighest => warning_from_score(&group.best_score, group.id),
            _ => warning_from_group(&group),
        };
        self.gate(warning)
    }

    fn gate(&mut self, warning: Warning) -> Vec<Warning> {
        if self.limiter.try_emit(warning.category) {
            self.emitted_count += 1;
            vec![warning]
        } else {
            self.suppressed_count += 1;
            warn!(
                category = ?warning.category,
                confidence = warning.confidence,
                "Warning suppressed by rate limit"
            );
            Vec::new()
        }
    }
}

fn warning_from_group(group: &WarningGroup) -> Warning {
    Warning {
        category: group.category,
        start_time: group.group_start,
        end_time: group.group_end,
        confidence: group.best_confidence,
        sources: group.sources.clone(),
        description: describe(group.category, &group.merged_evidence),
        group_id: group.id,
    }
}

fn warning_from_score(score: &FusedScore, group_id: Uuid) -> Warning {
    Warning {
        category: score.category,
        start_time: score.start,
        end_time: score.end,
        confidence: score.confidence,
        sources: score.sources.clone(),
        description: describe(score.category, &score.evidence),
        group_id,
    }
}

fn describe(category: Category, evidence: &[String]) -> String {
    if evidence.is_empty() {
        format!("{:?} content detected", category)
    } else {
        format!("{:?}: {}", category, evidence.join("; "))
    }
}

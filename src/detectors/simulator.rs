// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Detector simulator for demo/testing
//!
//! Emits plausible detections for one modality, either from a fixed script
//! or randomly, while honoring the sampling interval the current tier
//! assigns to it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use super::{Category, Detection, DetectorAdapter, Modality};
use crate::perf::TierConfig;

/// Simulated detector adapter for one modality
pub struct SimulatedAdapter {
    id: String,
    modality: Modality,
    initialized: AtomicBool,
    /// Scripted detections, drained in order; empty means random mode
    script: Mutex<VecDeque<Detection>>,
    /// Per-tick emission probability in random mode
    emit_probability: f64,
    /// Simulated playback clock (seconds)
    playhead: Mutex<f64>,
}

impl SimulatedAdapter {
    pub fn new(id: &str, modality: Modality) -> Self {
        Self {
            id: id.to_string(),
            modality,
            initialized: AtomicBool::new(false),
            script: Mutex::new(VecDeque::new()),
            emit_probability: 0.15,
            playhead: Mutex::new(0.0),
        }
    }

    /// Adapter that replays a fixed detection sequence
    pub fn scripted(id: &str, modality: Modality, detections: Vec<Detection>) -> Self {
        let adapter = Self::new(id, modality);
        *adapter.script.lock() = detections.into();
        adapter
    }

    fn categories_for(modality: Modality) -> &'static [Category] {
        match modality {
            Modality::SubtitleCue => &[
                Category::Violence,
                Category::SexualContent,
                Category::SelfHarm,
            ],
            Modality::AudioEnvelope => &[Category::Jumpscare, Category::LoudNoise],
            Modality::FrameColor => &[
                Category::Gore,
                Category::Blood,
                Category::Needles,
                Category::Vomit,
                Category::Spiders,
                Category::Snakes,
            ],
            Modality::FlashPattern => &[Category::FlashingLights],
        }
    }

    fn next_detection(&self, tick_secs: f64) -> Option<Detection> {
        if let Some(scripted) = self.script.lock().pop_front() {
            return Some(scripted);
        }

        let playhead = {
            let mut playhead = self.playhead.lock();
            *playhead += tick_secs;
            *playhead
        };

        let mut rng = rand::thread_rng();
        if rng.gen::<f64>() >= self.emit_probability {
            return None;
        }

        let categories = Self::categories_for(self.modality);
        let category = categories[rng.gen_range(0..categories.len())];
        let confidence = rng.gen_range(40..=95);

        Some(
            Detection::new(category, confidence, self.modality, playhead)
                .with_span(rng.gen_range(0.2..2.0))
                .with_evidence(format!("simulated {:?} signal", self.modality)),
        )
    }
}

#[async_trait]
impl DetectorAdapter for SimulatedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    async fn initialize(&self, config: &TierConfig) -> Result<()> {
        debug!(id = %self.id, tier = ?config.tier, "Simulated adapter initialized");
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn run(
        &self,
        tx: mpsc::Sender<Detection>,
        tier_rx: watch::Receiver<TierConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            // Re-read each tick: the tier can change under us
            let interval = {
                let config = tier_rx.borrow();
                if config.is_enabled(self.modality) {
                    config
                        .interval_for(self.modality)
                        .unwrap_or(Duration::from_millis(1000))
                } else {
                    // Disabled at this tier: idle and re-check
                    Duration::from_millis(500)
                }
            };
            let enabled = tier_rx.borrow().is_enabled(self.modality);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if !enabled {
                        continue;
                    }
                    if let Some(detection) = self.next_detection(interval.as_secs_f64()) {
                        if tx.send(detection).await.is_err() {
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    async fn heartbeat(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            anyhow::bail!("adapter '{}' not initialized", self.id)
        }
    }
}

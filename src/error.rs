// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Engine error taxonomy
//!
//! All per-detection and per-component errors are recovered locally; the
//! orchestrator's public API never propagates these to its warning consumer.
//! They exist so recovery paths can log and count precisely what went wrong.

use thiserror::Error;

use crate::detectors::Category;

/// Errors raised inside the detection pipeline and its control loops
#[derive(Debug, Error)]
pub enum EngineError {
    /// An adapter failed to start; the orchestrator proceeds without it
    #[error("adapter '{adapter}' failed to initialize: {source}")]
    AdapterInit {
        adapter: String,
        #[source]
        source: anyhow::Error,
    },

    /// Out-of-range confidence or otherwise unusable detection; dropped and counted
    #[error("malformed detection: {0}")]
    MalformedDetection(String),

    /// Fusion arithmetic produced a non-finite result; the engine falls back
    /// to the maximum individual contributing confidence
    #[error("fusion computation for {category:?} was non-finite, fell back to {fallback}")]
    FusionComputation { category: Category, fallback: u8 },

    /// A component heartbeat did not complete within its deadline
    #[error("heartbeat for '{component}' timed out after {timeout_ms}ms")]
    HeartbeatTimeout { component: String, timeout_ms: u64 },

    /// Two or more supervised components are failing at once; reported, never
    /// auto-restarted system-wide
    #[error("cascade failure: {} components down: {components:?}", components.len())]
    CascadeFailure { components: Vec<String> },
}

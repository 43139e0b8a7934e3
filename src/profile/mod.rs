// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Viewer profile - which categories to warn about, and how confidently
//!
//! Profiles are external collaborator data; the orchestrator reads them as
//! configuration and never mutates them.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::detectors::Category;

/// Read-only per-viewer warning preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerProfile {
    pub enabled_categories: BTreeSet<Category>,
    /// Minimum fused confidence per category; categories absent here use
    /// the engine-wide default
    pub thresholds: HashMap<Category, u8>,
}

impl Default for ViewerProfile {
    fn default() -> Self {
        Self {
            enabled_categories: Category::ALL.into_iter().collect(),
            thresholds: HashMap::new(),
        }
    }
}

impl ViewerProfile {
    /// Profile warning about nothing; useful as an opt-in baseline
    pub fn empty() -> Self {
        Self {
            enabled_categories: BTreeSet::new(),
            thresholds: HashMap::new(),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.enabled_categories.insert(category);
        self
    }

    pub fn with_threshold(mut self, category: Category, threshold: u8) -> Self {
        self.thresholds.insert(category, threshold);
        self
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.enabled_categories.contains(&category)
    }

    /// Threshold for a category, falling back to the supplied default
    pub fn threshold_for(&self, category: Category, default: u8) -> u8 {
        self.thresholds.get(&category).copied().unwrap_or(default)
    }
}

// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Event bus for inter-component communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::dedup::Warning;
use crate::detectors::Detection;
use crate::perf::PerformanceTier;

/// Event types in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventType {
    Detection,
    Warning,
    Alert,
    TierChange,
    ComponentRestart,
    SystemStatus,
    Error,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Detection(Detection),
    Warning(Warning),
    Alert { level: String, message: String },
    TierChange { tier: PerformanceTier },
    ComponentRestart { component_id: String },
    Status { key: String, value: String },
    Error { code: u32, message: String },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    detection_tx: broadcast::Sender<Detection>,
    warning_tx: broadcast::Sender<Warning>,
    event_tx: broadcast::Sender<Event>,
    event_counter: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (detection_tx, _) = broadcast::channel(capacity);
        let (warning_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            detection_tx,
            warning_tx,
            event_tx,
            event_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn publish_detection(&self, detection: Detection) {
        let _ = self.detection_tx.send(detection.clone());
        self.publish_event(EventType::Detection, EventPayload::Detection(detection));
    }

    pub fn publish_warning(&self, warning: Warning) {
        let _ = self.warning_tx.send(warning.clone());
        self.publish_event(EventType::Warning, EventPayload::Warning(warning));
    }

    pub fn publish_alert(&self, level: &str, message: &str) {
        self.publish_event(
            EventType::Alert,
            EventPayload::Alert {
                level: level.to_string(),
                message: message.to_string(),
            },
        );
    }

    pub fn publish_tier_change(&self, tier: PerformanceTier) {
        self.publish_event(EventType::TierChange, EventPayload::TierChange { tier });
    }

    pub fn publish_component_restart(&self, component_id: &str) {
        self.publish_event(
            EventType::ComponentRestart,
            EventPayload::ComponentRestart {
                component_id: component_id.to_string(),
            },
        );
    }

    pub fn publish_error(&self, code: u32, message: &str) {
        self.publish_event(
            EventType::Error,
            EventPayload::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self
            .event_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_detections(&self) -> broadcast::Receiver<Detection> {
        self.detection_tx.subscribe()
    }

    pub fn subscribe_warnings(&self) -> broadcast::Receiver<Warning> {
        self.warning_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}

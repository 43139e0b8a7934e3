// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Adaptive performance control - tier selection under resource pressure
//!
//! The controller samples a capability probe on a fixed cycle and moves the
//! active tier at most one step per cycle, with a dead band between the up
//! and down pressure thresholds so adjacent tiers cannot oscillate. A
//! critical-battery override bypasses hysteresis and jumps straight to
//! battery saver.

mod probe;

pub use probe::{CapabilityProbe, DeviceCapability, FixedProbe, ResourcePressure, SysinfoProbe};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::PerformanceConfig;
use crate::detectors::Modality;

/// Discrete resource budgets, ordered from most to least frugal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceTier {
    BatterySaver,
    Low,
    Medium,
    High,
    Ultra,
}

impl PerformanceTier {
    pub fn step_down(self) -> Self {
        match self {
            PerformanceTier::Ultra => PerformanceTier::High,
            PerformanceTier::High => PerformanceTier::Medium,
            PerformanceTier::Medium => PerformanceTier::Low,
            _ => PerformanceTier::BatterySaver,
        }
    }

    pub fn step_up(self) -> Self {
        match self {
            PerformanceTier::BatterySaver => PerformanceTier::Low,
            PerformanceTier::Low => PerformanceTier::Medium,
            PerformanceTier::Medium => PerformanceTier::High,
            _ => PerformanceTier::Ultra,
        }
    }
}

/// Analysis fidelity given to detector adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisResolution {
    Low,
    Medium,
    High,
    Full,
}

/// Published detector budget for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub tier: PerformanceTier,
    pub enabled_modalities: BTreeSet<Modality>,
    pub sample_interval_ms: BTreeMap<Modality, u64>,
    pub analysis_resolution: AnalysisResolution,
}

impl TierConfig {
    /// Budget table for each tier
    pub fn for_tier(tier: PerformanceTier) -> Self {
        let (modalities, interval_ms, resolution): (&[Modality], u64, AnalysisResolution) =
            match tier {
                PerformanceTier::BatterySaver => {
                    (&[Modality::SubtitleCue], 2000, AnalysisResolution::Low)
                }
                PerformanceTier::Low => (
                    &[Modality::SubtitleCue, Modality::AudioEnvelope],
                    1000,
                    AnalysisResolution::Low,
                ),
                PerformanceTier::Medium => (
                    &[
                        Modality::SubtitleCue,
                        Modality::AudioEnvelope,
                        Modality::FrameColor,
                    ],
                    500,
                    AnalysisResolution::Medium,
                ),
                PerformanceTier::High => (&Modality::ALL, 250, AnalysisResolution::High),
                PerformanceTier::Ultra => (&Modality::ALL, 100, AnalysisResolution::Full),
            };

        Self {
            tier,
            enabled_modalities: modalities.iter().copied().collect(),
            sample_interval_ms: modalities.iter().map(|m| (*m, interval_ms)).collect(),
            analysis_resolution: resolution,
        }
    }

    pub fn is_enabled(&self, modality: Modality) -> bool {
        self.enabled_modalities.contains(&modality)
    }

    pub fn interval_for(&self, modality: Modality) -> Option<Duration> {
        self.sample_interval_ms
            .get(&modality)
            .map(|ms| Duration::from_millis(*ms))
    }
}

#[derive(Debug)]
struct ControllerState {
    tier: PerformanceTier,
    high_cycles: u32,
    low_cycles: u32,
    override_active: bool,
}

/// Performance controller - owns the tier ladder
pub struct PerformanceController {
    config: PerformanceConfig,
    probe: Arc<dyn CapabilityProbe>,
    capability: DeviceCapability,
    ceiling: PerformanceTier,
    state: Mutex<ControllerState>,
    tier_tx: watch::Sender<TierConfig>,
}

impl PerformanceController {
    pub fn new(config: PerformanceConfig, probe: Arc<dyn CapabilityProbe>) -> Self {
        let capability = probe.capability();
        let ceiling = Self::ceiling_for(&capability);
        // Start one notch under the ceiling (never below Low); sustained
        // low pressure earns the rest back.
        let initial = if ceiling > PerformanceTier::Low {
            ceiling.step_down()
        } else {
            ceiling
        };

        info!(
            cores = capability.cores,
            memory_mb = capability.memory_mb,
            mobile = capability.mobile,
            ?ceiling,
            ?initial,
            "Performance controller initialized"
        );

        let (tier_tx, _) = watch::channel(TierConfig::for_tier(initial));

        Self {
            config,
            probe,
            capability,
            ceiling,
            state: Mutex::new(ControllerState {
                tier: initial,
                high_cycles: 0,
                low_cycles: 0,
                override_active: false,
            }),
            tier_tx,
        }
    }

    fn ceiling_for(capability: &DeviceCapability) -> PerformanceTier {
        if capability.mobile {
            if capability.cores <= 2 {
                PerformanceTier::Low
            } else {
                PerformanceTier::Medium
            }
        } else if capability.cores < 4 {
            PerformanceTier::Medium
        } else if capability.cores < 8 {
            PerformanceTier::High
        } else {
            PerformanceTier::Ultra
        }
    }

    /// Live tier configuration feed; publishes only on change
    pub fn subscribe(&self) -> watch::Receiver<TierConfig> {
        self.tier_tx.subscribe()
    }

    /// Current published configuration
    pub fn current_config(&self) -> TierConfig {
        self.tier_tx.borrow().clone()
    }

    pub fn current_tier(&self) -> PerformanceTier {
        self.state.lock().tier
    }

    pub fn capability(&self) -> &DeviceCapability {
        &self.capability
    }

    /// One evaluation cycle; returns the new tier on change.
    ///
    /// Hysteresis moves at most one step per cycle. The critical-battery
    /// override is the only multi-step path.
    pub fn evaluate(&self) -> Option<PerformanceTier> {
        let pressure = self.probe.pressure();
        let mut state = self.state.lock();
        let previous = state.tier;

        let battery_critical = pressure
            .battery_pct
            .map(|b| b < self.config.battery_critical_pct && !pressure.charging)
            .unwrap_or(false);
        let battery_recovered = pressure.charging
            || pressure
                .battery_pct
                .map(|b| b > self.config.battery_recover_pct)
                .unwrap_or(true);

        if battery_critical {
            if !state.override_active || state.tier != PerformanceTier::BatterySaver {
                warn!(
                    battery = ?pressure.battery_pct,
                    "Critical battery, forcing battery saver tier"
                );
            }
            state.override_active = true;
            state.tier = PerformanceTier::BatterySaver;
            state.high_cycles = 0;
            state.low_cycles = 0;
        } else if state.override_active {
            if battery_recovered {
                info!("Battery recovered, clearing emergency override");
                state.override_active = false;
            }
            // While the override holds, hysteresis is suspended
        } else {
            let sustain = self.config.sustain_cycles();
            if pressure.load > self.config.pressure_high {
                state.high_cycles += 1;
                state.low_cycles = 0;
            } else if pressure.load < self.config.pressure_low {
                state.low_cycles += 1;
                state.high_cycles = 0;
            } else {
                // Dead band: no pressure evidence either way
                state.high_cycles = 0;
                state.low_cycles = 0;
            }

            if state.high_cycles >= sustain && state.tier > PerformanceTier::BatterySaver {
                state.tier = state.tier.step_down();
                state.high_cycles = 0;
            } else if state.low_cycles >= sustain && state.tier < self.ceiling {
                state.tier = state.tier.step_up();
                state.low_cycles = 0;
            }
        }

        let tier = state.tier;
        drop(state);

        if tier != previous {
            info!(from = ?previous, to = ?tier, "Performance tier changed");
            self.tier_tx.send_replace(TierConfig::for_tier(tier));
            Some(tier)
        } else {
            debug!(?tier, load = pressure.load, "Tier unchanged");
            None
        }
    }

    /// Periodic evaluation loop
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut cycle = tokio::time::interval(Duration::from_secs(self.config.eval_interval_secs));
        cycle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cycle.tick() => {
                    self.evaluate();
                }
                _ = shutdown.recv() => {
                    debug!("Performance controller shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(probe: Arc<FixedProbe>) -> PerformanceController {
        // Short sustain for tests: 2 cycles
        let config = PerformanceConfig {
            eval_interval_secs: 5,
            sustain_secs: 10,
            ..Default::default()
        };
        PerformanceController::new(config, probe)
    }

    #[test]
    fn desktop_starts_below_ceiling() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe);
        assert_eq!(ctl.current_tier(), PerformanceTier::High);
    }

    #[test]
    fn sustained_pressure_moves_one_step_per_period() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe.clone());
        probe.set_pressure(ResourcePressure {
            load: 0.95,
            battery_pct: None,
            charging: false,
        });

        assert!(ctl.evaluate().is_none());
        assert_eq!(ctl.evaluate(), Some(PerformanceTier::Medium));
        assert!(ctl.evaluate().is_none());
        assert_eq!(ctl.evaluate(), Some(PerformanceTier::Low));
    }

    #[test]
    fn dead_band_never_transitions() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe.clone());
        probe.set_pressure(ResourcePressure {
            load: 0.7,
            battery_pct: None,
            charging: false,
        });

        for _ in 0..20 {
            assert!(ctl.evaluate().is_none());
        }
    }

    #[test]
    fn sustained_idle_upgrades_to_ceiling_and_stops() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe.clone());
        probe.set_pressure(ResourcePressure {
            load: 0.1,
            battery_pct: None,
            charging: false,
        });

        assert!(ctl.evaluate().is_none());
        assert_eq!(ctl.evaluate(), Some(PerformanceTier::Ultra));
        for _ in 0..10 {
            assert!(ctl.evaluate().is_none());
        }
    }

    #[test]
    fn critical_battery_jumps_to_battery_saver() {
        let probe = Arc::new(FixedProbe::new(
            DeviceCapability {
                cores: 2,
                memory_mb: 2048,
                mobile: true,
            },
            ResourcePressure {
                load: 0.3,
                battery_pct: Some(15),
                charging: false,
            },
        ));
        let ctl = controller(probe);

        assert_eq!(ctl.evaluate(), Some(PerformanceTier::BatterySaver));
        assert_eq!(
            ctl.current_config().enabled_modalities,
            BTreeSet::from([Modality::SubtitleCue])
        );
    }

    #[test]
    fn override_clears_when_charging_begins() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe.clone());

        probe.set_pressure(ResourcePressure {
            load: 0.1,
            battery_pct: Some(10),
            charging: false,
        });
        assert_eq!(ctl.evaluate(), Some(PerformanceTier::BatterySaver));

        // Still critical: held at battery saver despite idle load
        assert!(ctl.evaluate().is_none());

        probe.set_pressure(ResourcePressure {
            load: 0.1,
            battery_pct: Some(10),
            charging: true,
        });
        // Override clears this cycle; hysteresis resumes the next
        assert!(ctl.evaluate().is_none());
        assert!(ctl.evaluate().is_none());
        assert_eq!(ctl.evaluate(), Some(PerformanceTier::Low));
    }

    #[test]
    fn publishes_only_on_change() {
        let probe = Arc::new(FixedProbe::desktop());
        let ctl = controller(probe.clone());
        let mut rx = ctl.subscribe();
        assert!(!rx.has_changed().unwrap());

        probe.set_pressure(ResourcePressure {
            load: 0.7,
            battery_pct: None,
            charging: false,
        });
        ctl.evaluate();
        assert!(!rx.has_changed().unwrap());

        probe.set_pressure(ResourcePressure {
            load: 0.95,
            battery_pct: None,
            charging: false,
        });
        ctl.evaluate();
        ctl.evaluate();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().tier, PerformanceTier::Medium);
    }

    #[test]
    fn tier_table_tightens_with_budget() {
        let saver = TierConfig::for_tier(PerformanceTier::BatterySaver);
        let ultra = TierConfig::for_tier(PerformanceTier::Ultra);
        assert_eq!(saver.enabled_modalities.len(), 1);
        assert_eq!(ultra.enabled_modalities.len(), 4);
        assert!(
            saver.interval_for(Modality::SubtitleCue).unwrap()
                > ultra.interval_for(Modality::SubtitleCue).unwrap()
        );
        assert!(!saver.is_enabled(Modality::FlashPattern));
    }
}

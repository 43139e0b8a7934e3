// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/mediaguard

//! Device capability and resource-pressure probes
//!
//! Probing is platform-specific and approximate, so it sits behind a small
//! trait; the tier logic never talks to the platform directly.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Static device capability, probed once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapability {
    pub cores: usize,
    pub memory_mb: u64,
    /// Phone/tablet class device
    pub mobile: bool,
}

/// Dynamic resource pressure, sampled every controller cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePressure {
    /// Approximate processing load, 0.0..=1.0
    pub load: f64,
    /// Battery percentage when the platform exposes one
    pub battery_pct: Option<u8>,
    pub charging: bool,
}

/// Capability/pressure source for the performance controller
pub trait CapabilityProbe: Send + Sync {
    /// Static capability; called once at controller startup
    fn capability(&self) -> DeviceCapability;

    /// Current pressure sample; called every evaluation cycle
    fn pressure(&self) -> ResourcePressure;
}

/// sysinfo-backed probe for desktop-class hosts.
///
/// sysinfo exposes no battery information, so hosts that need the
/// critical-battery override supply their own probe.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityProbe for SysinfoProbe {
    fn capability(&self) -> DeviceCapability {
        let system = self.system.lock();
        DeviceCapability {
            cores: system.cpus().len().max(1),
            memory_mb: system.total_memory() / (1024 * 1024),
            mobile: false,
        }
    }

    fn pressure(&self) -> ResourcePressure {
        let mut system = self.system.lock();
        system.refresh_cpu();
        let load = f64::from(system.global_cpu_info().cpu_usage()) / 100.0;
        ResourcePressure {
            load: load.clamp(0.0, 1.0),
            battery_pct: None,
            charging: false,
        }
    }
}

/// Fixed probe for tests and scripted demo runs
pub struct FixedProbe {
    capability: DeviceCapability,
    pressure: Mutex<ResourcePressure>,
}

impl FixedProbe {
    pub fn new(capability: DeviceCapability, pressure: ResourcePressure) -> Self {
        Self {
            capability,
            pressure: Mutex::new(pressure),
        }
    }

    /// Desktop-class probe with idle pressure
    pub fn desktop() -> Self {
        Self::new(
            DeviceCapability {
                cores: 8,
                memory_mb: 16384,
                mobile: false,
            },
            ResourcePressure {
                load: 0.2,
                battery_pct: None,
                charging: false,
            },
        )
    }

    pub fn set_pressure(&self, pressure: ResourcePressure) {
        *self.pressure.lock() = pressure;
    }
}

impl CapabilityProbe for FixedProbe {
    fn capability(&self) -> DeviceCapability {
        self.capability.clone()
    }

    fn pressure(&self) -> ResourcePressure {
        self.pressure.lock().clone()
    }
}

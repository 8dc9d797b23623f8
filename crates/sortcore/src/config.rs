// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration snapshot.
//!
//! Loading this from disk, the UI, or the command line is an external
//! collaborator's job; the core only ever sees an already-parsed,
//! already-validated snapshot and swaps it in atomically on reload.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which physical trigger starts the entry-recognition pipeline. Mutually
/// exclusive: exactly one worker set runs for the lifetime of a
/// configuration generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    CameraTrigger,
    GantryTrigger,
}

/// Static description of one lane. A lane is sorting iff both `push_pin`
/// and `pull_pin` are set; otherwise it is pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    pub id: String,
    pub name: String,
    pub sensor_pin: Option<u32>,
    pub push_pin: Option<u32>,
    pub pull_pin: Option<u32>,
}

impl LaneConfig {
    pub fn is_sorting(&self) -> bool {
        self.push_pin.is_some() && self.pull_pin.is_some()
    }

    /// A lane is misconfigured if exactly one of push/pull is set: neither
    /// purely pass-through nor fully actuating.
    pub fn is_misconfigured(&self) -> bool {
        self.push_pin.is_some() != self.pull_pin.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub cycle_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub sensor_debounce_ms: u64,
    pub stability_delay_ms: u64,
    pub queue_head_timeout_ms: u64,
    pub qr_debounce_ms: u64,
    pub stop_conveyor_on_qr: bool,
    pub conveyor_stop_delay_qr_ms: u64,
    pub stop_conveyor_on_entry: bool,
    pub conveyor_stop_delay_ms: u64,
}

impl TimingConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
    pub fn sensor_debounce(&self) -> Duration {
        Duration::from_millis(self.sensor_debounce_ms)
    }
    pub fn stability_delay(&self) -> Duration {
        Duration::from_millis(self.stability_delay_ms)
    }
    pub fn queue_head_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_head_timeout_ms)
    }
    /// Lower-bounded at 1.0s per the entry-recognizer spec.
    pub fn qr_debounce(&self) -> Duration {
        Duration::from_millis(self.qr_debounce_ms.max(1000))
    }
    pub fn conveyor_stop_delay_qr(&self) -> Duration {
        Duration::from_millis(self.conveyor_stop_delay_qr_ms)
    }
    pub fn conveyor_stop_delay(&self) -> Duration {
        Duration::from_millis(self.conveyor_stop_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 400,
            settle_delay_ms: 150,
            sensor_debounce_ms: 200,
            stability_delay_ms: 100,
            queue_head_timeout_ms: 15_000,
            qr_debounce_ms: 3_000,
            stop_conveyor_on_qr: false,
            conveyor_stop_delay_qr_ms: 2_000,
            stop_conveyor_on_entry: false,
            conveyor_stop_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub enable_ai: bool,
    pub ai_priority: bool,
    pub min_confidence: f32,
    pub class_to_lane: HashMap<String, usize>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enable_ai: false,
            ai_priority: false,
            min_confidence: 0.5,
            class_to_lane: HashMap::new(),
        }
    }
}

/// Read-mostly snapshot, replaced atomically on reload. Never parsed from a
/// file by this crate — the loader is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub entry_mode: EntryMode,
    pub lanes: Vec<LaneConfig>,
    pub timing: TimingConfig,
    pub classifier: ClassifierConfig,
    pub frame_poll_interval_ms: u64,
    pub max_consecutive_frame_failures: u32,
    pub conveyor_pin: Option<u32>,
    /// Entry sensor pin, used only in `GantryTrigger` mode.
    pub entry_sensor_pin: Option<u32>,
}

impl ConfigSnapshot {
    /// Index of the lane whose canonical id is `NG`, if any.
    pub fn ng_lane_index(&self) -> Option<usize> {
        self.lanes.iter().position(|l| crate::canon::canon_id(&l.id) == "NG")
    }

    pub fn frame_poll_interval(&self) -> Duration {
        Duration::from_millis(self.frame_poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

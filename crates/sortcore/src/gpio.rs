// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Digital I/O abstraction, with a real backend and a mock backend for tests.
//!
//! Relays are active-low: [`Level::On`] drives the physical pin low. A `None`
//! pin is always a no-op, matching the behavior of a lane with no pusher
//! wired up.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    On,
    Off,
}

/// Uniform digital I/O contract. Implementations must never panic; I/O
/// failures are reported as `Err` and escalated into the error envelope by
/// the caller.
pub trait Gpio: Send + Sync {
    fn setup_output(&self, pin: u32) -> anyhow::Result<()>;
    fn setup_input(&self, pin: u32) -> anyhow::Result<()>;
    fn write(&self, pin: Option<u32>, level: Level) -> anyhow::Result<()>;
    fn read(&self, pin: u32) -> anyhow::Result<Level>;
    fn cleanup(&self);
}

/// Real hardware backend. This crate never links a concrete hardware
/// library; a host binary supplies one behind this same trait. Here the
/// adapter exists only so `sortcore-sim` has something that compiles without
/// hardware present — every call fails, which is correct off-hardware.
#[derive(Debug, Default)]
pub struct RealGpio;

impl Gpio for RealGpio {
    fn setup_output(&self, _pin: u32) -> anyhow::Result<()> {
        anyhow::bail!("no hardware GPIO backend linked into this build")
    }

    fn setup_input(&self, _pin: u32) -> anyhow::Result<()> {
        anyhow::bail!("no hardware GPIO backend linked into this build")
    }

    fn write(&self, _pin: Option<u32>, _level: Level) -> anyhow::Result<()> {
        anyhow::bail!("no hardware GPIO backend linked into this build")
    }

    fn read(&self, _pin: u32) -> anyhow::Result<Level> {
        anyhow::bail!("no hardware GPIO backend linked into this build")
    }

    fn cleanup(&self) {}
}

/// In-memory backend. Reads are externally settable via [`MockGpio::set_input`]
/// so tests can script sensor edges; writes are recorded for assertions.
#[derive(Debug, Default)]
pub struct MockGpio {
    inputs: Mutex<HashMap<u32, Level>>,
    outputs: Mutex<HashMap<u32, Level>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&self, pin: u32, level: Level) {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.insert(pin, level);
        }
    }

    pub fn output_level(&self, pin: u32) -> Option<Level> {
        self.outputs.lock().ok().and_then(|o| o.get(&pin).copied())
    }
}

impl Gpio for MockGpio {
    fn setup_output(&self, pin: u32) -> anyhow::Result<()> {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.entry(pin).or_insert(Level::Off);
        }
        Ok(())
    }

    fn setup_input(&self, pin: u32) -> anyhow::Result<()> {
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.entry(pin).or_insert(Level::Off);
        }
        Ok(())
    }

    fn write(&self, pin: Option<u32>, level: Level) -> anyhow::Result<()> {
        let Some(pin) = pin else { return Ok(()) };
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.insert(pin, level);
        }
        Ok(())
    }

    fn read(&self, pin: u32) -> anyhow::Result<Level> {
        Ok(self.inputs.lock().ok().and_then(|i| i.get(&pin).copied()).unwrap_or(Level::Off))
    }

    fn cleanup(&self) {
        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.clear();
        }
    }
}

#[cfg(test)]
#[path = "gpio_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared system state: lane table, queues, and the locks guarding them.
//!
//! Lock order, when more than one is held at once, is strictly
//! `processing_queue` → `qr_queue` → `lanes`. No worker holds any of these
//! across an `.await` that can suspend for an unbounded time (a sleep, a
//! frame grab) — recognizer work always operates on a snapshot taken under
//! the lock and released immediately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigSnapshot;
use crate::envelope::ErrorEnvelope;
use crate::events::{DayCounter, EventSink, StateSink};
use crate::frame::FrameBuffer;
use crate::gpio::{Gpio, Level};
use crate::job::ProcessingQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Ready,
    WaitingItem,
    Sorting,
    PassThrough,
    ConfigError,
}

/// Runtime state for one lane, layered over its static configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Lane {
    pub id: String,
    pub name: String,
    pub status: LaneStatus,
    pub count: u64,
    pub push_state: Level,
    pub pull_state: Level,
}

/// Conveyor belt relay handle, shared by the entry recognizer and the sort
/// cycle executor. Both call `run`/`stop` directly with no intermediate
/// owner task — the underlying relay write is idempotent and race-tolerant,
/// so funneling through a single owner would only add a channel hop without
/// changing observable behavior.
pub struct Belt {
    gpio: Arc<dyn Gpio>,
    pin: Option<u32>,
}

impl Belt {
    pub fn new(gpio: Arc<dyn Gpio>, pin: Option<u32>) -> Self {
        Self { gpio, pin }
    }

    pub fn run(&self) {
        if let Err(e) = self.gpio.write(self.pin, Level::On) {
            tracing::warn!(err = %e, "failed to start conveyor");
        }
    }

    pub fn stop(&self) {
        if let Err(e) = self.gpio.write(self.pin, Level::Off) {
            tracing::warn!(err = %e, "failed to stop conveyor");
        }
    }
}

/// Top-level orchestrator. Owns every lock named in the concurrency model
/// and the collaborator handles workers call through.
pub struct SortSystem {
    pub config: RwLock<Arc<ConfigSnapshot>>,
    pub lanes: RwLock<Vec<Lane>>,
    pub processing_queue: Mutex<ProcessingQueue>,
    pub qr_queue: Mutex<VecDeque<usize>>,
    pub frame_buffer: Arc<FrameBuffer>,
    pub envelope: Arc<ErrorEnvelope>,
    pub gpio: Arc<dyn Gpio>,
    pub event_sink: Arc<dyn EventSink>,
    pub state_sink: Arc<dyn StateSink>,
    pub day_counter: Arc<dyn DayCounter>,
    pub belt: Belt,
    pub shutdown: CancellationToken,
    pub auto_test: AtomicBool,
    pub sequential_test_running: AtomicBool,
}

impl SortSystem {
    pub fn new(
        config: ConfigSnapshot,
        gpio: Arc<dyn Gpio>,
        event_sink: Arc<dyn EventSink>,
        state_sink: Arc<dyn StateSink>,
        day_counter: Arc<dyn DayCounter>,
        shutdown: CancellationToken,
    ) -> Self {
        let lanes = config
            .lanes
            .iter()
            .map(|lc| Lane {
                id: lc.id.clone(),
                name: lc.name.clone(),
                status: if lc.is_misconfigured() {
                    LaneStatus::ConfigError
                } else if lc.is_sorting() {
                    LaneStatus::Ready
                } else {
                    LaneStatus::PassThrough
                },
                count: 0,
                push_state: Level::Off,
                pull_state: Level::On,
            })
            .collect();
        let belt = Belt::new(Arc::clone(&gpio), config.conveyor_pin);
        let envelope = Arc::new(ErrorEnvelope::new(Arc::clone(&event_sink)));

        Self {
            config: RwLock::new(Arc::new(config)),
            lanes: RwLock::new(lanes),
            processing_queue: Mutex::new(ProcessingQueue::new()),
            qr_queue: Mutex::new(VecDeque::new()),
            frame_buffer: Arc::new(FrameBuffer::new()),
            envelope,
            gpio,
            event_sink,
            state_sink,
            day_counter,
            belt,
            shutdown,
            auto_test: AtomicBool::new(false),
            sequential_test_running: AtomicBool::new(false),
        }
    }

    /// Reset every relay to its default idle state (pull on, push off) and
    /// run the conveyor. Called on startup and after any aborted manual
    /// diagnostic test.
    pub async fn reset_all_relays_to_default(&self) {
        let config = Arc::clone(&*self.config.read().await);
        let mut lanes = self.lanes.write().await;
        for (lc, lane) in config.lanes.iter().zip(lanes.iter_mut()) {
            if !lc.is_sorting() {
                continue;
            }
            let _ = self.gpio.write(lc.push_pin, Level::Off);
            let _ = self.gpio.write(lc.pull_pin, Level::On);
            lane.push_state = Level::Off;
            lane.pull_state = Level::On;
        }
        self.belt.run();
    }

    /// Explicit external request: clear maintenance mode, reset every lane
    /// to `Ready`/`PassThrough`, and empty both queues.
    pub async fn reset_maintenance(&self) {
        self.envelope.reset();
        self.reset_queues().await;
    }

    /// Explicit external request to empty both queues and reset lane
    /// statuses, independent of maintenance mode.
    pub async fn reset_queues(&self) {
        self.processing_queue.lock().await.drain_all();
        self.qr_queue.lock().await.clear();
        let config = Arc::clone(&*self.config.read().await);
        let mut lanes = self.lanes.write().await;
        for (lc, lane) in config.lanes.iter().zip(lanes.iter_mut()) {
            lane.status = if lc.is_misconfigured() {
                LaneStatus::ConfigError
            } else if lc.is_sorting() {
                LaneStatus::Ready
            } else {
                LaneStatus::PassThrough
            };
        }
    }

    /// Full observable snapshot, published periodically to the state sink.
    pub async fn snapshot(&self) -> serde_json::Value {
        let lanes = self.lanes.read().await.clone();
        let queue_len = self.processing_queue.lock().await.len();
        let qr_queue_len = self.qr_queue.lock().await.len();
        serde_json::json!({
            "maintenance": self.envelope.is_maintenance(),
            "last_error": self.envelope.last_error(),
            "lanes": lanes,
            "queue_len": queue_len,
            "qr_queue_len": qr_queue_len,
            "auto_test": self.auto_test.load(Ordering::SeqCst),
        })
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

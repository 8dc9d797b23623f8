// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaborator interfaces the core talks to but never implements itself.
//!
//! The UI, telemetry upload, and day-count log all live outside this crate.
//! What lives here is the shape of the calls the core makes into them, so a
//! host binary can supply real sinks while tests supply recording ones.

use std::sync::{Arc, Mutex};

use serde::Serialize;

/// Category tag attached to every emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Warn,
    Error,
    Success,
    Qr,
    QrNg,
    UnknownQr,
    Sort,
    Pass,
}

/// Fire-and-forget log/event sink. Implementations must never block the
/// caller on a slow downstream (UI socket, telemetry upload, ...); callers
/// treat every `emit` as best-effort.
pub trait EventSink: Send + Sync {
    fn emit(&self, kind: EventKind, message: &str, payload: serde_json::Value);
}

/// An `EventSink` that drops everything. Useful as a default and in tests
/// that only care about queue/lane behavior.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _kind: EventKind, _message: &str, _payload: serde_json::Value) {}
}

/// An `EventSink` that records everything it receives, for assertions in
/// tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    pub events: Arc<Mutex<Vec<(EventKind, String)>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, kind: EventKind, message: &str, _payload: serde_json::Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push((kind, message.to_owned()));
        }
    }
}

/// Periodic full-state snapshot push to the UI collaborator. The core calls
/// this on a timer and only when the snapshot differs from the last one
/// sent (mirrors the dedup guard the original broadcaster used).
pub trait StateSink: Send + Sync {
    fn publish(&self, snapshot: serde_json::Value);
}

/// A `StateSink` that drops everything.
#[derive(Debug, Default)]
pub struct NullStateSink;

impl StateSink for NullStateSink {
    fn publish(&self, _snapshot: serde_json::Value) {}
}

/// A `DayCounter` that drops everything.
#[derive(Debug, Default)]
pub struct NullDayCounter;

impl DayCounter for NullDayCounter {
    fn record(&self, _date: &str, _lane_name: &str) {}
}

/// Daily per-lane item counter. `record` increments the count for the given
/// calendar day (as `YYYY-MM-DD`) and lane name by one; calling it once per
/// completed sort cycle is the caller's responsibility, so this trait makes
/// no idempotency guarantee of its own.
pub trait DayCounter: Send + Sync {
    fn record(&self, date: &str, lane_name: &str);
}

/// Epoch seconds, used for diagnostic timestamps on persisted/displayed
/// records. Internal timeout and debounce arithmetic uses `Instant` instead,
/// so a system clock step never corrupts it (see design notes).
pub fn epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

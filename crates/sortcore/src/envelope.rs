// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Latched maintenance-mode error envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SortFault;
use crate::events::{EventKind, EventSink};

/// System-wide pause latch. Any worker may [`trigger`](Self::trigger) it;
/// while latched, the entry recognizer, lane consumer, and auto-test
/// submode all short-circuit to idle. Only an explicit [`reset`](Self::reset)
/// clears it.
pub struct ErrorEnvelope {
    maintenance: AtomicBool,
    last_error: Mutex<Option<String>>,
    sink: Arc<dyn EventSink>,
}

impl ErrorEnvelope {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { maintenance: AtomicBool::new(false), last_error: Mutex::new(None), sink }
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance.load(Ordering::SeqCst)
    }

    /// Latch maintenance mode. Idempotent: retriggering while already
    /// latched still records the newest reason but doesn't re-emit noise
    /// beyond the one event.
    pub fn trigger(&self, fault: SortFault, reason: &str) {
        let was_latched = self.maintenance.swap(true, Ordering::SeqCst);
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(reason.to_owned());
        }
        if !was_latched {
            tracing::error!(fault = %fault, reason, "maintenance mode triggered");
            self.sink.emit(EventKind::Error, reason, serde_json::json!({ "fault": fault.as_str() }));
        }
    }

    /// Clear maintenance mode. Callers are expected to also reset lane
    /// statuses and both queues (see `SortSystem::reset_maintenance`).
    pub fn reset(&self) {
        self.maintenance.store(false, Ordering::SeqCst);
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = None;
        }
        self.sink.emit(EventKind::Success, "maintenance mode cleared", serde_json::Value::Null);
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

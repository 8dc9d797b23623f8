// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-slot frame buffer fed by an external frame source.
//!
//! Readers always observe the freshest frame; there is no queueing. On
//! sustained acquisition failure the supervisor loop raises into the error
//! envelope exactly once and keeps retrying — there is nothing else useful to
//! do with a frozen camera.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::envelope::ErrorEnvelope;
use crate::error::SortFault;

/// A single decoded camera frame. Opaque to the core beyond luminance and
/// byte access — actual decoding (QR, classifier) is delegated to the
/// [`crate::qr::QrDecoder`] and [`crate::classifier::Classifier`] traits.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Arc<Vec<u8>>,
    pub mean_luminance: f32,
}

/// External collaborator that hands back the most recent camera frame.
pub trait FrameSource: Send + Sync {
    fn try_latest_frame(&self) -> anyhow::Result<Option<Frame>>;
}

/// Single-slot buffer the supervisor loop keeps fresh.
#[derive(Default)]
pub struct FrameBuffer {
    slot: RwLock<Option<Frame>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Option<Frame> {
        self.slot.read().await.clone()
    }

    async fn set(&self, frame: Frame) {
        *self.slot.write().await = Some(frame);
    }
}

/// Pull frames from `source` into `buffer` in a loop until `shutdown` fires.
/// After `max_consecutive_failures` failed grabs in a row (default 5), the
/// supervisor raises a fatal fault into `envelope`; it keeps trying
/// afterward in case the camera recovers, since the envelope already
/// short-circuits recognizers while latched.
pub async fn run_frame_supervisor(
    source: Arc<dyn FrameSource>,
    buffer: Arc<FrameBuffer>,
    envelope: Arc<ErrorEnvelope>,
    shutdown: CancellationToken,
    poll_interval: Duration,
    max_consecutive_failures: u32,
) {
    let backoff = Duration::from_secs(1);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match source.try_latest_frame() {
            Ok(Some(frame)) => {
                consecutive_failures = 0;
                buffer.set(frame).await;
            }
            Ok(None) => {
                // No frame available yet (e.g. camera still warming up); not
                // itself a failure.
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::debug!(err = %e, consecutive_failures, "frame grab failed");
                if consecutive_failures >= max_consecutive_failures {
                    envelope.trigger(SortFault::FrameSource, &format!("frame source failed: {e}"));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;

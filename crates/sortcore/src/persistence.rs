// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue state across restarts: one JSON file, written tmp-then-
//! rename so a crash mid-write never corrupts the next startup's read.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::state::{LaneStatus, SortSystem};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    qr_queue: Vec<usize>,
    processing_queue: Vec<Job>,
}

/// Save both queues to `path` if either is non-empty; otherwise remove any
/// existing file. Called once, on orderly shutdown.
pub async fn save_on_shutdown(system: &SortSystem, path: &Path) -> anyhow::Result<()> {
    let qr_queue: Vec<usize> = system.qr_queue.lock().await.iter().copied().collect();
    let processing_queue: Vec<Job> = system.processing_queue.lock().await.iter().cloned().collect();

    if qr_queue.is_empty() && processing_queue.is_empty() {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        return Ok(());
    }

    let state = PersistedState { qr_queue, processing_queue };
    let contents = serde_json::to_string_pretty(&state)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Restore both queues from `path` on startup. A missing, unreadable, or
/// corrupt file is non-fatal: the system starts empty and the corrupt file
/// (if any) is deleted after logging. On success, restored lanes are marked
/// `WaitingItem` and the file is deleted so a crash doesn't replay it twice.
pub async fn load_on_startup(system: &Arc<SortSystem>, path: &Path) {
    if !path.exists() {
        return;
    }

    let loaded = std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<PersistedState>(&contents).ok());

    match loaded {
        Some(state) => {
            let restored_lanes: Vec<usize> =
                state.processing_queue.iter().map(|j| j.lane_index).collect();

            {
                let mut processing_queue = system.processing_queue.lock().await;
                processing_queue.restore(state.processing_queue);
            }
            {
                let mut qr_queue = system.qr_queue.lock().await;
                *qr_queue = VecDeque::from(state.qr_queue);
            }

            let mut lanes = system.lanes.write().await;
            for lane_index in restored_lanes {
                if let Some(lane) = lanes.get_mut(lane_index) {
                    lane.status = LaneStatus::WaitingItem;
                }
            }

            tracing::info!("restored processing queue from {}", path.display());
        }
        None => {
            tracing::warn!("failed to parse persisted queue file at {}, starting empty", path.display());
        }
    }

    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;

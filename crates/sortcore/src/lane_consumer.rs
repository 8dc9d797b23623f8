// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane consumer: reacts to lane-sensor edges and either launches the sort
//! cycle for a head-matched job (normal submode) or fires directly on every
//! edge (auto-test submode, diagnostic wiring verification only).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::events::EventKind;
use crate::gpio::Level;
use crate::sort_cycle::run_sort_cycle;
use crate::state::{LaneStatus, SortSystem};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One long-lived worker per sorting lane, watching its sensor pin.
pub async fn run_lane_consumer(system: Arc<SortSystem>, lane_index: usize) {
    let mut last_state = Level::Off;
    let mut last_edge_time = Instant::now() - Duration::from_secs(3600);
    let mut primed = false;

    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        check_head_timeout(&system).await;

        if system.envelope.is_maintenance() {
            continue;
        }

        let config = Arc::clone(&*system.config.read().await);
        let Some(lane_config) = config.lanes.get(lane_index) else { continue };
        let Some(sensor_pin) = lane_config.sensor_pin else { continue };

        let current = match system.gpio.read(sensor_pin) {
            Ok(level) => level,
            Err(e) => {
                tracing::debug!(err = %e, lane_index, "lane sensor read failed");
                continue;
            }
        };

        if !primed {
            primed = true;
            last_state = current;
            continue;
        }

        let active_going = matches!((last_state, current), (Level::Off, Level::On));
        last_state = current;
        if !active_going {
            continue;
        }

        let now = Instant::now();
        if now.duration_since(last_edge_time) < config.timing.sensor_debounce() {
            continue;
        }
        last_edge_time = now;

        if system.auto_test.load(Ordering::SeqCst) {
            if lane_config.is_sorting() {
                handle_auto_test_edge(&system, lane_index).await;
            }
            continue;
        }

        handle_normal_edge(&system, lane_index).await;
    }
}

async fn handle_auto_test_edge(system: &Arc<SortSystem>, lane_index: usize) {
    let dummy_job = crate::job::Job::new(lane_index, crate::job::JobStatus::QrMatched, None);
    tokio::spawn(run_sort_cycle(Arc::clone(system), lane_index, dummy_job));
}

/// Normal submode: consult the queue head. Matches on the target lane, pops
/// and skips any NG items ahead of it, and otherwise logs an out-of-order
/// event without mutating the queue.
async fn handle_normal_edge(system: &Arc<SortSystem>, lane_index: usize) {
    let config = Arc::clone(&*system.config.read().await);
    let ng_lane = config.ng_lane_index();

    loop {
        let mut queue = system.processing_queue.lock().await;
        let Some(head) = queue.peek_head() else { return };
        let head_lane = head.lane_index;

        if head_lane == lane_index {
            let Some(job) = queue.pop_head() else { return };
            drop(queue);
            tokio::spawn(run_sort_cycle(Arc::clone(system), lane_index, job));
            return;
        }

        if Some(head_lane) == ng_lane {
            queue.pop_head();
            continue;
        }

        drop(queue);
        system.event_sink.emit(
            EventKind::Warn,
            &format!("out-of-order sensor edge on lane {lane_index}, head is lane {head_lane}"),
            serde_json::Value::Null,
        );
        return;
    }
}

/// Evict a head job that has outlived `queue_head_timeout`, resetting its
/// target lane to `Ready`.
async fn check_head_timeout(system: &Arc<SortSystem>) {
    let config = Arc::clone(&*system.config.read().await);
    let timeout = config.timing.queue_head_timeout();

    let evicted = {
        let mut queue = system.processing_queue.lock().await;
        match queue.head_since() {
            Some(since) if since.elapsed() > timeout => queue.pop_head(),
            _ => None,
        }
    };

    let Some(job) = evicted else { return };

    {
        let mut lanes = system.lanes.write().await;
        if let Some(lane) = lanes.get_mut(job.lane_index) {
            lane.status = LaneStatus::Ready;
        }
    }

    system.event_sink.emit(
        EventKind::Warn,
        &format!("job {} timed out at queue head, lane {} reset", job.job_id, job.lane_index),
        serde_json::json!({ "job_id": job.job_id, "lane_index": job.lane_index }),
    );
}

#[cfg(test)]
#[path = "lane_consumer_tests.rs"]
mod tests;

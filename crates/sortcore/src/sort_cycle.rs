// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The relay push/pull state machine, plus the manual diagnostic relay
//! tests used during commissioning (neither touches the processing queue).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EntryMode, LaneConfig};
use crate::error::SortFault;
use crate::events::EventKind;
use crate::gpio::Level;
use crate::job::Job;
use crate::state::{LaneStatus, SortSystem};

/// Drive the push/pull relay sequence for one completed job and update
/// lane bookkeeping. For a pass-through lane, no actuation happens but the
/// lane is still counted.
///
/// ```text
/// pull_off -> settle_delay -> push_on -> cycle_delay -> push_off -> settle_delay -> pull_on
/// ```
///
/// Interruptible: if shutdown is observed between steps, no further relay
/// transition is attempted, but steps already taken are not rolled back.
pub async fn run_sort_cycle(system: Arc<SortSystem>, lane_index: usize, job: Job) {
    let config = Arc::clone(&*system.config.read().await);
    let Some(lane_config) = config.lanes.get(lane_index) else {
        tracing::warn!(lane_index, "sort cycle requested for unknown lane");
        return;
    };

    if lane_config.is_misconfigured() {
        system.envelope.trigger(
            SortFault::ConfigError,
            &format!("lane {} has only one of push/pull pin set", lane_config.id),
        );
        return;
    }

    let is_sorting = lane_config.is_sorting();
    if is_sorting {
        set_status(&system, lane_index, LaneStatus::Sorting).await;

        for step in relay_steps() {
            if system.shutdown.is_cancelled() {
                break;
            }
            apply_step(&system, lane_index, lane_config, step).await;
        }
    } else {
        set_status(&system, lane_index, LaneStatus::PassThrough).await;
    }

    finish_cycle(&system, lane_index, lane_config, &job).await;

    if config.timing.stop_conveyor_on_entry && config.entry_mode == EntryMode::GantryTrigger {
        maybe_resume_belt(&system).await;
    }
}

async fn finish_cycle(system: &Arc<SortSystem>, lane_index: usize, lane_config: &LaneConfig, job: &Job) {
    let (count, name) = {
        let mut lanes = system.lanes.write().await;
        let Some(lane) = lanes.get_mut(lane_index) else { return };
        lane.count += 1;
        lane.status = LaneStatus::Ready;
        (lane.count, lane.name.clone())
    };

    let kind = if lane_config.is_sorting() { EventKind::Sort } else { EventKind::Pass };
    system.event_sink.emit(
        kind,
        &format!("{name} counted (job {})", job.job_id),
        serde_json::json!({ "lane_index": lane_index, "count": count, "job_id": job.job_id }),
    );

    let date = crate::daycounter::today_utc();
    system.day_counter.record(&date, &name);
}

/// Post-cycle belt restart decision (Gantry mode only): resume iff both
/// queues are empty.
async fn maybe_resume_belt(system: &Arc<SortSystem>) {
    let queue_empty = system.processing_queue.lock().await.is_empty();
    let qr_queue_empty = system.qr_queue.lock().await.is_empty();
    if queue_empty && qr_queue_empty {
        system.belt.run();
    }
}

#[derive(Debug, Clone, Copy)]
enum RelayStep {
    PullOff,
    PushOn,
    PushOff,
    PullOn,
}

fn relay_steps() -> [RelayStep; 4] {
    [RelayStep::PullOff, RelayStep::PushOn, RelayStep::PushOff, RelayStep::PullOn]
}

async fn apply_step(system: &Arc<SortSystem>, lane_index: usize, lane_config: &LaneConfig, step: RelayStep) {
    let config = Arc::clone(&*system.config.read().await);
    let (level, delay) = match step {
        RelayStep::PullOff => (Level::Off, config.timing.settle_delay()),
        RelayStep::PushOn => (Level::On, config.timing.cycle_delay()),
        RelayStep::PushOff => (Level::Off, config.timing.settle_delay()),
        RelayStep::PullOn => (Level::On, Duration::ZERO),
    };
    let pin = match step {
        RelayStep::PullOff | RelayStep::PullOn => lane_config.pull_pin,
        RelayStep::PushOn | RelayStep::PushOff => lane_config.push_pin,
    };

    if let Err(e) = system.gpio.write(pin, level) {
        system.envelope.trigger(SortFault::GpioIo, &format!("relay write failed: {e}"));
        return;
    }

    {
        let mut lanes = system.lanes.write().await;
        if let Some(lane) = lanes.get_mut(lane_index) {
            match step {
                RelayStep::PullOff | RelayStep::PullOn => lane.pull_state = level,
                RelayStep::PushOn | RelayStep::PushOff => lane.push_state = level,
            }
        }
    }

    if delay > Duration::ZERO {
        tokio::select! {
            _ = system.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn set_status(system: &Arc<SortSystem>, lane_index: usize, status: LaneStatus) {
    let mut lanes = system.lanes.write().await;
    if let Some(lane) = lanes.get_mut(lane_index) {
        lane.status = status;
    }
}

/// Schedule an unconditional belt restart after `delay`, cancellable by
/// shutdown. Used by the entry recognizer's belt-stop-on-QR/entry paths.
pub fn schedule_belt_restart(system: Arc<SortSystem>, delay: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = system.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => system.belt.run(),
        }
    });
}

// -- Manual diagnostic relay tests (commissioning only) ----------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayAction {
    Push,
    Grab,
}

/// Drive a single relay transition without touching the queue or the
/// lane's count. Rejects pass-through and misconfigured lanes.
pub async fn run_relay_test(system: Arc<SortSystem>, lane_index: usize, action: RelayAction) -> anyhow::Result<()> {
    let config = Arc::clone(&*system.config.read().await);
    let Some(lane_config) = config.lanes.get(lane_index) else {
        anyhow::bail!("unknown lane index {lane_index}");
    };
    if lane_config.is_misconfigured() {
        anyhow::bail!("lane {} is misconfigured", lane_config.id);
    }
    if !lane_config.is_sorting() {
        system.event_sink.emit(
            EventKind::Warn,
            &format!("relay test skipped: lane {} is pass-through", lane_config.id),
            serde_json::Value::Null,
        );
        anyhow::bail!("lane {} has no actuator", lane_config.id);
    }

    let steps: [RelayStep; 2] = match action {
        RelayAction::Push => [RelayStep::PullOff, RelayStep::PushOn],
        RelayAction::Grab => [RelayStep::PushOff, RelayStep::PullOn],
    };

    for step in steps {
        apply_step(&system, lane_index, lane_config, step).await;
    }
    Ok(())
}

/// Sequentially cycle every sorting lane, skipping pass-through lanes.
/// Single-flight: a second call while one is running is rejected. Always
/// resets every relay to its default state when it ends, succeeds, or is
/// aborted by shutdown.
pub async fn run_sequential_relay_test(system: Arc<SortSystem>) -> anyhow::Result<()> {
    if system.sequential_test_running.swap(true, Ordering::SeqCst) {
        anyhow::bail!("a sequential relay test is already running");
    }

    let result = sequential_relay_test_inner(&system).await;
    system.reset_all_relays_to_default().await;
    system.sequential_test_running.store(false, Ordering::SeqCst);
    result
}

async fn sequential_relay_test_inner(system: &Arc<SortSystem>) -> anyhow::Result<()> {
    let config = Arc::clone(&*system.config.read().await);
    for (lane_index, lane_config) in config.lanes.iter().enumerate() {
        if system.shutdown.is_cancelled() {
            break;
        }
        if !lane_config.is_sorting() {
            continue;
        }
        for step in relay_steps() {
            if system.shutdown.is_cancelled() {
                break;
            }
            apply_step(system, lane_index, lane_config, step).await;
        }
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(config.timing.settle_delay()) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "sort_cycle_tests.rs"]
mod tests;

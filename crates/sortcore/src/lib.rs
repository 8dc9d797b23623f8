// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sort coordination engine for a conveyor-belt sorting machine: QR and
//! visual-classifier item routing, a FIFO job queue with strict ordering and
//! timeout rules, lane-sensor-driven actuation, and an error/maintenance
//! envelope, with durable queue state across restarts.
//!
//! The camera, GPIO hardware, UI, and telemetry are all external
//! collaborators reached through the traits in [`gpio`], [`frame`], [`qr`],
//! [`classifier`], and [`events`] — this crate never links a vision or
//! hardware library itself.

pub mod canon;
pub mod classifier;
pub mod config;
pub mod entry;
pub mod envelope;
pub mod error;
pub mod events;
pub mod frame;
pub mod gpio;
pub mod job;
pub mod lane_consumer;
pub mod persistence;
pub mod qr;
pub mod sort_cycle;
pub mod state;

mod daycounter;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::classifier::Classifier;
use crate::config::{ConfigSnapshot, EntryMode};
use crate::entry::{run_camera_trigger_loop, run_gantry_trigger_loop, run_qr_prequeue_scanner};
use crate::events::{DayCounter, EventSink, StateSink};
use crate::frame::{run_frame_supervisor, FrameSource};
use crate::gpio::Gpio;
use crate::lane_consumer::run_lane_consumer;
use crate::qr::QrDecoder;
use crate::state::SortSystem;

/// External collaborators the core needs to run. Everything here is
/// implemented outside this crate (hardware, vision, UI, storage).
pub struct SortDeps {
    pub gpio: Arc<dyn Gpio>,
    pub frame_source: Arc<dyn FrameSource>,
    pub qr_decoder: Arc<dyn QrDecoder>,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub event_sink: Arc<dyn EventSink>,
    pub state_sink: Arc<dyn StateSink>,
    pub day_counter: Arc<dyn DayCounter>,
    pub persist_path: PathBuf,
}

/// Run the sort coordination engine until shutdown is requested (Ctrl-C or
/// an externally cancelled token). On the way out, persists in-flight
/// queues to `deps.persist_path`.
pub async fn run(config: ConfigSnapshot, deps: SortDeps) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let system = Arc::new(SortSystem::new(
        config,
        deps.gpio,
        deps.event_sink,
        deps.state_sink,
        deps.day_counter,
        shutdown.clone(),
    ));

    persistence::load_on_startup(&system, &deps.persist_path).await;
    system.reset_all_relays_to_default().await;

    spawn_workers(Arc::clone(&system), deps.frame_source, deps.qr_decoder, deps.classifier).await;

    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(err = %e, "failed to listen for ctrl-c");
            }
            shutdown.cancel();
        }
    }

    tracing::info!("shutting down, persisting queues");
    if let Err(e) = persistence::save_on_shutdown(&system, &deps.persist_path).await {
        tracing::error!(err = %e, "failed to persist queues on shutdown");
    }

    Ok(())
}

async fn spawn_workers(
    system: Arc<SortSystem>,
    frame_source: Arc<dyn FrameSource>,
    qr_decoder: Arc<dyn QrDecoder>,
    classifier: Option<Arc<dyn Classifier>>,
) {
    let config = Arc::clone(&*system.config.read().await);

    tokio::spawn(run_frame_supervisor(
        frame_source,
        Arc::clone(&system.frame_buffer),
        Arc::clone(&system.envelope),
        system.shutdown.clone(),
        config.frame_poll_interval(),
        config.max_consecutive_frame_failures,
    ));

    for lane_index in 0..config.lanes.len() {
        if config.lanes[lane_index].sensor_pin.is_some() {
            tokio::spawn(run_lane_consumer(Arc::clone(&system), lane_index));
        }
    }

    match config.entry_mode {
        EntryMode::CameraTrigger => {
            tokio::spawn(run_camera_trigger_loop(Arc::clone(&system), qr_decoder, classifier));
        }
        EntryMode::GantryTrigger => {
            tokio::spawn(run_qr_prequeue_scanner(Arc::clone(&system), Arc::clone(&qr_decoder)));
            tokio::spawn(run_gantry_trigger_loop(Arc::clone(&system), classifier));
        }
    }

    tokio::spawn(run_state_broadcaster(system));
}

const STATE_BROADCAST_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);

/// Periodically push the full state snapshot, skipping pushes where nothing
/// changed since the last one sent.
async fn run_state_broadcaster(system: Arc<SortSystem>) {
    let mut last_sent: Option<String> = None;
    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(STATE_BROADCAST_INTERVAL) => {}
        }

        let snapshot = system.snapshot().await;
        let serialized = snapshot.to_string();
        if last_sent.as_deref() != Some(serialized.as_str()) {
            system.state_sink.publish(snapshot);
            last_sent = Some(serialized);
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry recognizer: the two mutually-exclusive operating modes that turn a
//! physical arrival into a [`Job`] on the processing queue, and the
//! two-modality pairing policy shared by both.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::canon::canon_id;
use crate::classifier::{classify, AiEvidence, Classifier};
use crate::events::EventKind;
use crate::gpio::Level;
use crate::job::{Job, JobStatus};
use crate::qr::{scan_qr_from_frame, QrDecoder};
use crate::sort_cycle::schedule_belt_restart;
use crate::state::{LaneStatus, SortSystem};

const SCAN_INTERVAL: Duration = Duration::from_millis(100);
const IDLE_INTERVAL: Duration = Duration::from_millis(200);
const NO_LANES_INTERVAL: Duration = Duration::from_millis(500);
const NO_FRAME_INTERVAL: Duration = Duration::from_millis(100);
const PREQUEUE_DEBOUNCE: Duration = Duration::from_secs(3);

/// Resolve the two-modality pairing policy (see the component design's
/// pairing table). Returns the destination lane (the NG lane when nothing
/// matched) and the job status to record.
pub fn decide_pairing(
    ai_enabled: bool,
    ai_priority: bool,
    qr_lane: Option<usize>,
    ai: Option<&AiEvidence>,
    ng_lane: usize,
) -> (usize, JobStatus) {
    if ai_enabled && ai_priority {
        if let Some(ai) = ai {
            return (ai.lane_index, JobStatus::AiMatched(ai.class_name.clone()));
        }
        if let Some(qr_lane) = qr_lane {
            return (qr_lane, JobStatus::QrMatchedAiFallback);
        }
        return (ng_lane, JobStatus::AllFailed);
    }

    if let Some(qr_lane) = qr_lane {
        return (qr_lane, JobStatus::QrMatched);
    }
    if ai_enabled {
        if let Some(ai) = ai {
            return (ai.lane_index, JobStatus::AiMatchedQrFallback(ai.class_name.clone()));
        }
    }
    (ng_lane, JobStatus::AllFailed)
}

async fn lane_canon_map(system: &SortSystem) -> (HashMap<String, usize>, usize) {
    let config = Arc::clone(&*system.config.read().await);
    let map = config.lanes.iter().enumerate().map(|(i, l)| (canon_id(&l.id), i)).collect();
    let ng = config.ng_lane_index().unwrap_or(usize::MAX);
    (map, ng)
}

async fn run_ai_evidence(
    system: &SortSystem,
    classifier: Option<&Arc<dyn Classifier>>,
) -> Option<AiEvidence> {
    let classifier = classifier?;
    let config = Arc::clone(&*system.config.read().await);
    if !config.classifier.enable_ai {
        return None;
    }
    let frame = system.frame_buffer.latest().await?;
    classify(&frame, classifier.as_ref(), config.classifier.min_confidence, &config.classifier.class_to_lane)
}

async fn commit_job(system: &Arc<SortSystem>, lane_index: usize, ng_lane: usize, status: JobStatus, track_id: Option<u32>) -> Job {
    let job = Job::new(lane_index, status, track_id);

    {
        let mut queue = system.processing_queue.lock().await;
        queue.append(job.clone());
    }

    if lane_index != ng_lane {
        let mut lanes = system.lanes.write().await;
        if let Some(lane) = lanes.get_mut(lane_index) {
            lane.status = LaneStatus::WaitingItem;
        }
    }

    system.event_sink.emit(
        EventKind::Info,
        &format!("job {} paired: {} -> lane {lane_index}", job.job_id, job.status.label()),
        serde_json::json!({ "job_id": job.job_id, "lane_index": lane_index }),
    );

    job
}

/// Mode 1: decode QR from the live frame, edge-triggered on first appearance
/// of a novel payload. AI evidence is only considered alongside an actual
/// QR hit, since in this mode the QR read is itself the entry trigger — an
/// unrecognized code is ignored outright rather than routed to NG.
pub async fn run_camera_trigger_loop(
    system: Arc<SortSystem>,
    qr_decoder: Arc<dyn QrDecoder>,
    classifier: Option<Arc<dyn Classifier>>,
) {
    let mut last_qr: Option<String> = None;
    let mut last_time = Instant::now();

    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(SCAN_INTERVAL) => {}
        }

        if system.envelope.is_maintenance() || system.auto_test.load(std::sync::atomic::Ordering::SeqCst) {
            tokio::time::sleep(IDLE_INTERVAL).await;
            continue;
        }

        let (lane_map, ng_lane) = lane_canon_map(&system).await;
        if lane_map.is_empty() {
            tokio::time::sleep(NO_LANES_INTERVAL).await;
            continue;
        }

        let Some(frame) = system.frame_buffer.latest().await else {
            tokio::time::sleep(NO_FRAME_INTERVAL).await;
            continue;
        };

        let Some(scan) = scan_qr_from_frame(&frame, qr_decoder.as_ref()) else { continue };
        let now = Instant::now();

        if last_qr.as_deref() != Some(scan.raw.as_str()) {
            last_qr = Some(scan.raw.clone());
            last_time = now;

            let Some(&qr_lane) = lane_map.get(&scan.canonical) else { continue };

            let config = Arc::clone(&*system.config.read().await);
            let ai_evidence = run_ai_evidence(&system, classifier.as_ref()).await;
            let (lane_index, status) = decide_pairing(
                config.classifier.enable_ai,
                config.classifier.ai_priority,
                Some(qr_lane),
                ai_evidence.as_ref(),
                ng_lane,
            );
            let track_id = ai_evidence.and_then(|e| e.track_id);
            commit_job(&system, lane_index, ng_lane, status, track_id).await;

            if config.timing.stop_conveyor_on_qr {
                system.belt.stop();
                schedule_belt_restart(Arc::clone(&system), config.timing.conveyor_stop_delay_qr());
            }
        } else if now.duration_since(last_time) < {
            let config = Arc::clone(&*system.config.read().await);
            config.timing.qr_debounce()
        } {
            // same payload, still within the debounce window: suppress.
        } else {
            last_qr = None;
        }
    }
}

/// Mode 2: a dedicated entry sensor, edge-triggered on the active-going
/// transition with a primed first reading so a sensor that boots active
/// never fires a spurious job.
pub async fn run_gantry_trigger_loop(
    system: Arc<SortSystem>,
    classifier: Option<Arc<dyn Classifier>>,
) {
    let mut primed = false;
    let mut last_state = Level::Off;
    let mut last_edge_time = Instant::now() - Duration::from_secs(3600);

    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(SCAN_INTERVAL) => {}
        }

        if system.envelope.is_maintenance() || system.auto_test.load(std::sync::atomic::Ordering::SeqCst) {
            continue;
        }

        let config = Arc::clone(&*system.config.read().await);
        let Some(entry_pin) = config.entry_sensor_pin else { continue };

        let current = match system.gpio.read(entry_pin) {
            Ok(level) => level,
            Err(e) => {
                tracing::debug!(err = %e, "entry sensor read failed");
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

        tokio::time::sleep(config.timing.stability_delay()).await;
        match system.gpio.read(entry_pin) {
            Ok(Level::On) => {}
            _ => continue, // no longer active, or read failed: discard as noise
        }

        let qr_lane = system.qr_queue.lock().await.pop_front();
        let (_, ng_lane) = lane_canon_map(&system).await;
        let ai_evidence = run_ai_evidence(&system, classifier.as_ref()).await;
        let (lane_index, status) = decide_pairing(
            config.classifier.enable_ai,
            config.classifier.ai_priority,
            qr_lane,
            ai_evidence.as_ref(),
            ng_lane,
        );
        let track_id = ai_evidence.and_then(|e| e.track_id);
        let all_failed = matches!(status, JobStatus::AllFailed);
        commit_job(&system, lane_index, ng_lane, status, track_id).await;

        if config.timing.stop_conveyor_on_entry && all_failed {
            system.belt.stop();
            schedule_belt_restart(Arc::clone(&system), config.timing.conveyor_stop_delay());
        }
    }
}

/// Mode 2's auxiliary QR reader: continuously decodes QR and pushes the
/// resolved lane index onto the pre-queue for the gantry loop to consume.
pub async fn run_qr_prequeue_scanner(system: Arc<SortSystem>, qr_decoder: Arc<dyn QrDecoder>) {
    let mut last_qr: Option<String> = None;
    let mut last_time = Instant::now() - PREQUEUE_DEBOUNCE;

    loop {
        tokio::select! {
            _ = system.shutdown.cancelled() => break,
            _ = tokio::time::sleep(SCAN_INTERVAL) => {}
        }

        if system.envelope.is_maintenance() || system.auto_test.load(std::sync::atomic::Ordering::SeqCst) {
            continue;
        }

        let (lane_map, _ng_lane) = lane_canon_map(&system).await;
        let Some(frame) = system.frame_buffer.latest().await else { continue };
        let Some(scan) = scan_qr_from_frame(&frame, qr_decoder.as_ref()) else { continue };

        let now = Instant::now();
        if last_qr.as_deref() == Some(scan.raw.as_str())
            && now.duration_since(last_time) < PREQUEUE_DEBOUNCE
        {
            continue;
        }
        last_qr = Some(scan.raw.clone());
        last_time = now;

        if let Some(&idx) = lane_map.get(&scan.canonical) {
            system.qr_queue.lock().await.push_back(idx);
            system.event_sink.emit(
                EventKind::Qr,
                &format!("qr detected: lane {idx}"),
                serde_json::json!({ "raw": scan.raw, "canonical": scan.canonical }),
            );
        } else if scan.canonical == "NG" {
            system.event_sink.emit(
                EventKind::QrNg,
                &format!("ng code: {}", scan.raw),
                serde_json::json!({ "raw": scan.raw }),
            );
        } else {
            system.event_sink.emit(
                EventKind::UnknownQr,
                &format!("unknown code: {}", scan.canonical),
                serde_json::json!({ "raw": scan.raw, "canonical": scan.canonical }),
            );
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;

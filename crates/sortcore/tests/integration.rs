// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenario tests driving the sort engine the way the real
//! hardware would: through [`sortcore::gpio::MockGpio`] pin edges and
//! fake frame/QR/classifier collaborators, never through private helpers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sortcore::classifier::{Classifier, Detection};
use sortcore::config::{ClassifierConfig, ConfigSnapshot, EntryMode, LaneConfig, TimingConfig};
use sortcore::entry::{run_camera_trigger_loop, run_gantry_trigger_loop};
use sortcore::events::{NullDayCounter, NullEventSink, NullStateSink};
use sortcore::frame::{run_frame_supervisor, Frame, FrameSource};
use sortcore::gpio::{Gpio, Level, MockGpio};
use sortcore::job::{Job, JobStatus};
use sortcore::lane_consumer::run_lane_consumer;
use sortcore::qr::QrDecoder;
use sortcore::state::{LaneStatus, SortSystem};

fn fast_timing() -> TimingConfig {
    TimingConfig {
        cycle_delay_ms: 5,
        settle_delay_ms: 5,
        sensor_debounce_ms: 5,
        stability_delay_ms: 50,
        queue_head_timeout_ms: 300,
        qr_debounce_ms: 1, // clamped up to 1000ms by TimingConfig::qr_debounce()
        stop_conveyor_on_qr: false,
        conveyor_stop_delay_qr_ms: 1,
        stop_conveyor_on_entry: false,
        conveyor_stop_delay_ms: 1,
    }
}

fn three_lane_config(entry_mode: EntryMode) -> ConfigSnapshot {
    ConfigSnapshot {
        entry_mode,
        lanes: vec![
            LaneConfig { id: "A".into(), name: "Lane A".into(), sensor_pin: Some(5), push_pin: Some(12), pull_pin: Some(11) },
            LaneConfig { id: "B".into(), name: "Lane B".into(), sensor_pin: Some(16), push_pin: Some(13), pull_pin: Some(8) },
            LaneConfig { id: "NG".into(), name: "Reject".into(), sensor_pin: Some(17), push_pin: None, pull_pin: None },
        ],
        timing: fast_timing(),
        classifier: ClassifierConfig::default(),
        frame_poll_interval_ms: 10,
        max_consecutive_frame_failures: 10,
        conveyor_pin: Some(20),
        entry_sensor_pin: Some(4),
    }
}

/// Build a system alongside the concrete `MockGpio` handle used to drive pin
/// edges directly from the test (the system only ever sees it behind
/// `Arc<dyn Gpio>`).
fn new_system(config: ConfigSnapshot) -> (Arc<SortSystem>, Arc<MockGpio>) {
    let gpio = Arc::new(MockGpio::new());
    let gpio_dyn: Arc<dyn Gpio> = Arc::clone(&gpio) as Arc<dyn Gpio>;
    let system = Arc::new(SortSystem::new(
        config,
        gpio_dyn,
        Arc::new(NullEventSink),
        Arc::new(NullStateSink),
        Arc::new(NullDayCounter),
        CancellationToken::new(),
    ));
    (system, gpio)
}

/// A frame source that is always "present" at a luminance well above the QR
/// scanner's minimum gate.
struct LitFrameSource;

impl FrameSource for LitFrameSource {
    fn try_latest_frame(&self) -> anyhow::Result<Option<Frame>> {
        Ok(Some(Frame { data: Arc::new(Vec::new()), mean_luminance: 100.0 }))
    }
}

/// Decoder whose current payload is externally settable, mimicking a code
/// that stays visible under the camera until changed.
#[derive(Default)]
struct SettableDecoder {
    current: Mutex<Option<String>>,
}

impl SettableDecoder {
    fn set(&self, code: Option<&str>) {
        *self.current.lock().expect("lock") = code.map(str::to_owned);
    }
}

impl QrDecoder for SettableDecoder {
    fn decode_primary(&self, _frame: &Frame) -> Option<String> {
        self.current.lock().expect("lock").clone()
    }
    fn decode_secondary(&self, _frame: &Frame) -> Option<String> {
        None
    }
}

/// Classifier returning a fixed single detection on every call.
struct FixedClassifier {
    class_name: String,
    confidence: f32,
    track_id: u32,
}

impl Classifier for FixedClassifier {
    fn detect(&self, _frame: &Frame) -> Vec<Detection> {
        vec![Detection { class_name: self.class_name.clone(), confidence: self.confidence, track_id: Some(self.track_id) }]
    }
}

async fn queue_len(system: &SortSystem) -> usize {
    system.processing_queue.lock().await.len()
}

async fn wait_for<F>(mut pred: F, timeout: Duration)
where
    F: FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// S1 — happy path, camera-trigger mode, QR only.
#[tokio::test]
async fn s1_happy_path_camera_trigger_qr_only() {
    let (system, gpio) = new_system(three_lane_config(EntryMode::CameraTrigger));
    let decoder = Arc::new(SettableDecoder::default());
    decoder.set(Some("loai-A!"));

    tokio::spawn(run_camera_trigger_loop(Arc::clone(&system), decoder, None));
    tokio::spawn(run_lane_consumer(Arc::clone(&system), 0));

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 1 }) }, Duration::from_secs(2)).await;

    {
        let queue = system.processing_queue.lock().await;
        let head = queue.peek_head().expect("job appended");
        assert_eq!(head.lane_index, 0);
        assert_eq!(head.status, JobStatus::QrMatched);
    }

    // Fire the lane-0 sensor pulse: Off then On is the active-going edge.
    gpio.set_input(5, Level::Off);
    tokio::time::sleep(Duration::from_millis(30)).await;
    gpio.set_input(5, Level::On);

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { system.lanes.read().await[0].count == 1 }) }, Duration::from_secs(2)).await;

    assert_eq!(system.lanes.read().await[0].status, LaneStatus::Ready);
    assert_eq!(queue_len(&system).await, 0);
}

// S2 — QR debounce: the same payload re-seen inside the debounce window
// does not create a second job; re-seen after it elapses does.
#[tokio::test]
async fn s2_qr_debounce_suppresses_then_allows_repeat() {
    let (system, _gpio) = new_system(three_lane_config(EntryMode::CameraTrigger));
    let decoder = Arc::new(SettableDecoder::default());
    decoder.set(Some("A"));

    tokio::spawn(run_camera_trigger_loop(Arc::clone(&system), decoder, None));

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 1 }) }, Duration::from_secs(2)).await;

    // Still within the (1s-floor) debounce window: no second job.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(queue_len(&system).await, 1);

    // Past the debounce floor: the same payload creates a second job.
    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 2 }) }, Duration::from_secs(2)).await;
}

// S3 — out-of-order sensor edge leaves the queue untouched; the matching
// edge then pops and actuates.
#[tokio::test]
async fn s3_out_of_order_sensor_then_match() {
    let (system, gpio) = new_system(three_lane_config(EntryMode::CameraTrigger));
    system.processing_queue.lock().await.append(Job::new(0, JobStatus::QrMatched, None));

    tokio::spawn(run_lane_consumer(Arc::clone(&system), 0));
    tokio::spawn(run_lane_consumer(Arc::clone(&system), 1));

    // Fire lane 1's sensor first: head is lane 0, so nothing pops.
    gpio.set_input(16, Level::Off);
    tokio::time::sleep(Duration::from_millis(30)).await;
    gpio.set_input(16, Level::On);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(queue_len(&system).await, 1);
    assert_eq!(system.processing_queue.lock().await.peek_head().unwrap().lane_index, 0);

    // Now fire lane 0's sensor: head matches, pops and actuates.
    gpio.set_input(5, Level::Off);
    tokio::time::sleep(Duration::from_millis(30)).await;
    gpio.set_input(5, Level::On);

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 0 }) }, Duration::from_secs(2)).await;
    assert_eq!(system.lanes.read().await[0].count, 1);
}

// S4 — an NG head is silently absorbed before a matching lane job is
// reached.
#[tokio::test]
async fn s4_ng_absorption_before_match() {
    let (system, gpio) = new_system(three_lane_config(EntryMode::CameraTrigger));
    {
        let mut queue = system.processing_queue.lock().await;
        queue.append(Job::new(2, JobStatus::AllFailed, None)); // NG is lane index 2
        queue.append(Job::new(0, JobStatus::QrMatched, None));
    }

    tokio::spawn(run_lane_consumer(Arc::clone(&system), 0));

    gpio.set_input(5, Level::Off);
    tokio::time::sleep(Duration::from_millis(30)).await;
    gpio.set_input(5, Level::On);

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 0 }) }, Duration::from_secs(2)).await;
    assert_eq!(system.lanes.read().await[0].count, 1);
}

// S5 — a head job that outlives queue_head_timeout is evicted and its lane
// reset to Ready.
#[tokio::test]
async fn s5_head_timeout_evicts_and_resets_lane() {
    let (system, _gpio) = new_system(three_lane_config(EntryMode::CameraTrigger));
    system.processing_queue.lock().await.append(Job::new(0, JobStatus::QrMatched, None));
    system.lanes.write().await[0].status = LaneStatus::WaitingItem;

    tokio::spawn(run_lane_consumer(Arc::clone(&system), 0));

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 0 }) }, Duration::from_secs(2)).await;
    assert_eq!(system.lanes.read().await[0].status, LaneStatus::Ready);
}

// S6 — gantry mode, AI priority, QR pre-queue empty: a stable entry-sensor
// pulse produces an AI-matched job; a bouncing pulse shorter than the
// stability delay produces none.
#[tokio::test]
async fn s6_gantry_ai_priority_qr_miss() {
    let mut config = three_lane_config(EntryMode::GantryTrigger);
    config.classifier = ClassifierConfig {
        enable_ai: true,
        ai_priority: true,
        min_confidence: 0.5,
        class_to_lane: HashMap::from([("APPLE".to_owned(), 0)]),
    };
    let (system, gpio) = new_system(config);
    let classifier: Arc<dyn Classifier> = Arc::new(FixedClassifier { class_name: "APPLE".into(), confidence: 0.9, track_id: 7 });

    tokio::spawn(run_frame_supervisor(
        Arc::new(LitFrameSource),
        Arc::clone(&system.frame_buffer),
        Arc::clone(&system.envelope),
        system.shutdown.clone(),
        Duration::from_millis(10),
        10,
    ));
    tokio::spawn(run_gantry_trigger_loop(Arc::clone(&system), Some(classifier)));

    // Bouncing pulse: rises, but bounces back low before stability_delay
    // elapses, so the re-check discards it as noise.
    gpio.set_input(4, Level::Off);
    tokio::time::sleep(Duration::from_millis(150)).await;
    gpio.set_input(4, Level::On);
    tokio::time::sleep(Duration::from_millis(10)).await;
    gpio.set_input(4, Level::Off);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queue_len(&system).await, 0);

    // Stable pulse: rises and stays high through stability_delay.
    gpio.set_input(4, Level::On);

    let probe = Arc::clone(&system);
    wait_for(move || { let system = Arc::clone(&probe); Box::pin(async move { queue_len(&system).await == 1 }) }, Duration::from_secs(2)).await;

    let queue = system.processing_queue.lock().await;
    let job = queue.peek_head().expect("job appended");
    assert_eq!(job.lane_index, 0);
    assert_eq!(job.status, JobStatus::AiMatched("APPLE".into()));
    assert_eq!(job.track_id, Some(7));
}

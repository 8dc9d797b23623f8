// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardware-absent demo binary: runs the sort coordination engine against a
//! mock GPIO backend and a stdin-driven QR source, so the engine can be
//! exercised end to end without a camera or relay board attached.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::error;

use sortcore::classifier::{Classifier, Detection};
use sortcore::config::{ClassifierConfig, ConfigSnapshot, EntryMode, LaneConfig, TimingConfig};
use sortcore::events::{EventKind, EventSink};
use sortcore::frame::{Frame, FrameSource};
use sortcore::gpio::MockGpio;
use sortcore::qr::QrDecoder;
use sortcore::{run, SortDeps};

#[derive(Parser, Debug)]
#[command(name = "sortcore-sim", about = "run the sort engine against mocked hardware")]
struct SimArgs {
    /// Path to a JSON ConfigSnapshot. Falls back to a small built-in demo
    /// layout (two sorting lanes plus NG, camera-trigger mode) if unset.
    #[arg(long, env = "SORTCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Where to persist queue state across restarts.
    #[arg(long, env = "SORTCORE_STATE_FILE", default_value = "sortcore-state.json")]
    state_file: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = SimArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    let qr_source = Arc::new(StdinQrSource::default());
    spawn_stdin_reader(Arc::clone(&qr_source));

    let deps = SortDeps {
        gpio: Arc::new(MockGpio::new()),
        frame_source: Arc::new(AlwaysLitFrameSource),
        qr_decoder: qr_source,
        classifier: Some(Arc::new(NoopClassifier)),
        event_sink: Arc::new(ConsoleEventSink),
        state_sink: Arc::new(ConsoleStateSink),
        day_counter: Arc::new(sortcore::events::NullDayCounter),
        persist_path: args.state_file,
    };

    if let Err(e) = run(config, deps).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ConfigSnapshot> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        }
        None => Ok(demo_config()),
    }
}

fn demo_config() -> ConfigSnapshot {
    let mut class_to_lane = HashMap::new();
    class_to_lane.insert("APPLE".to_owned(), 0);
    class_to_lane.insert("BANANA".to_owned(), 1);

    ConfigSnapshot {
        entry_mode: EntryMode::CameraTrigger,
        lanes: vec![
            LaneConfig {
                id: "LANE_A".into(),
                name: "Lane A".into(),
                sensor_pin: Some(5),
                push_pin: Some(12),
                pull_pin: Some(11),
            },
            LaneConfig {
                id: "LANE_B".into(),
                name: "Lane B".into(),
                sensor_pin: Some(6),
                push_pin: Some(13),
                pull_pin: Some(8),
            },
            LaneConfig { id: "NG".into(), name: "Reject".into(), sensor_pin: Some(7), push_pin: None, pull_pin: None },
        ],
        timing: TimingConfig::default(),
        classifier: ClassifierConfig { enable_ai: true, ai_priority: false, min_confidence: 0.5, class_to_lane },
        frame_poll_interval_ms: 50,
        max_consecutive_frame_failures: 10,
        conveyor_pin: Some(20),
        entry_sensor_pin: Some(4),
    }
}

/// Every poll returns the same bright, empty frame; the simulated item
/// identity comes from stdin via [`StdinQrSource`] instead of pixel content.
struct AlwaysLitFrameSource;

impl FrameSource for AlwaysLitFrameSource {
    fn try_latest_frame(&self) -> anyhow::Result<Option<Frame>> {
        Ok(Some(Frame { data: Arc::new(Vec::new()), mean_luminance: 128.0 }))
    }
}

/// QR decoder backed by operator-typed lines on stdin: type a lane id
/// (e.g. `LANE_A`) and press enter to simulate a QR read on the next frame.
#[derive(Default)]
struct StdinQrSource {
    pending: Mutex<Option<String>>,
}

impl QrDecoder for StdinQrSource {
    fn decode_primary(&self, _frame: &Frame) -> Option<String> {
        self.pending.lock().ok()?.take()
    }

    fn decode_secondary(&self, _frame: &Frame) -> Option<String> {
        None
    }
}

fn spawn_stdin_reader(source: Arc<StdinQrSource>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim().to_owned();
            if line.is_empty() {
                continue;
            }
            if let Ok(mut pending) = source.pending.lock() {
                *pending = Some(line);
            }
        }
    });
}

/// No detections: lets AI-enabled configs exercise the QR-fallback path
/// without a real model linked in.
struct NoopClassifier;

impl Classifier for NoopClassifier {
    fn detect(&self, _frame: &Frame) -> Vec<Detection> {
        Vec::new()
    }
}

struct ConsoleEventSink;

impl EventSink for ConsoleEventSink {
    fn emit(&self, kind: EventKind, message: &str, payload: serde_json::Value) {
        tracing::info!(?kind, payload = %payload, "{message}");
    }
}

struct ConsoleStateSink;

impl sortcore::events::StateSink for ConsoleStateSink {
    fn publish(&self, snapshot: serde_json::Value) {
        tracing::debug!("state: {snapshot}");
    }
}

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::{ClassifierConfig, ConfigSnapshot, EntryMode, LaneConfig, TimingConfig};
use crate::events::{NullDayCounter, NullEventSink, NullStateSink};
use crate::gpio::MockGpio;
use crate::job::JobStatus;

fn test_config() -> ConfigSnapshot {
    ConfigSnapshot {
        entry_mode: EntryMode::CameraTrigger,
        lanes: vec![
            LaneConfig { id: "A".into(), name: "Lane A".into(), sensor_pin: Some(5), push_pin: Some(12), pull_pin: Some(11) },
            LaneConfig { id: "NG".into(), name: "Reject".into(), sensor_pin: None, push_pin: None, pull_pin: None },
        ],
        timing: TimingConfig::default(),
        classifier: ClassifierConfig::default(),
        frame_poll_interval_ms: 16,
        max_consecutive_frame_failures: 5,
        conveyor_pin: Some(20),
        entry_sensor_pin: None,
    }
}

fn test_system() -> Arc<SortSystem> {
    Arc::new(SortSystem::new(
        test_config(),
        Arc::new(MockGpio::new()),
        Arc::new(NullEventSink),
        Arc::new(NullStateSink),
        Arc::new(NullDayCounter),
        CancellationToken::new(),
    ))
}

#[tokio::test]
async fn empty_queues_remove_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queues.json");
    std::fs::write(&path, "{}").unwrap();

    let system = test_system();
    save_on_shutdown(&system, &path).await.unwrap();

    assert!(!path.exists());
}

#[tokio::test]
async fn nonempty_queue_round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queues.json");

    let system = test_system();
    system.processing_queue.lock().await.append(Job::new(0, JobStatus::QrMatched, None));
    system.qr_queue.lock().await.push_back(0);
    save_on_shutdown(&system, &path).await.unwrap();
    assert!(path.exists());

    let restored = test_system();
    load_on_startup(&restored, &path).await;

    assert_eq!(restored.processing_queue.lock().await.len(), 1);
    assert_eq!(restored.qr_queue.lock().await.len(), 1);
    assert_eq!(restored.lanes.read().await[0].status, LaneStatus::WaitingItem);
    assert!(!path.exists(), "file should be deleted after a successful load");
}

#[tokio::test]
async fn corrupt_file_is_non_fatal_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queues.json");
    std::fs::write(&path, "not json").unwrap();

    let system = test_system();
    load_on_startup(&system, &path).await;

    assert!(system.processing_queue.lock().await.is_empty());
    assert!(!path.exists());
}

#[tokio::test]
async fn missing_file_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.json");

    let system = test_system();
    load_on_startup(&system, &path).await;

    assert!(system.processing_queue.lock().await.is_empty());
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::events::NullEventSink;

struct FlakySource {
    calls: AtomicU32,
    fail_first_n: u32,
}

impl FrameSource for FlakySource {
    fn try_latest_frame(&self) -> anyhow::Result<Option<Frame>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first_n {
            anyhow::bail!("camera busy")
        }
        Ok(Some(Frame { data: Arc::new(vec![1, 2, 3]), mean_luminance: 128.0 }))
    }
}

#[tokio::test]
async fn buffer_holds_latest_successful_frame() {
    let source: Arc<dyn FrameSource> = Arc::new(FlakySource { calls: AtomicU32::new(0), fail_first_n: 0 });
    let buffer = Arc::new(FrameBuffer::new());
    let envelope = Arc::new(ErrorEnvelope::new(Arc::new(NullEventSink)));
    let shutdown = CancellationToken::new();

    let handle = {
        let buffer = Arc::clone(&buffer);
        let shutdown = shutdown.clone();
        tokio::spawn(run_frame_supervisor(
            source,
            buffer,
            envelope,
            shutdown,
            Duration::from_millis(5),
            5,
        ))
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(buffer.latest().await.is_some());
}

#[tokio::test]
async fn sustained_failure_latches_maintenance() {
    let source: Arc<dyn FrameSource> =
        Arc::new(FlakySource { calls: AtomicU32::new(0), fail_first_n: 1000 });
    let buffer = Arc::new(FrameBuffer::new());
    let envelope = Arc::new(ErrorEnvelope::new(Arc::new(NullEventSink)));
    let shutdown = CancellationToken::new();

    let handle = {
        let envelope = Arc::clone(&envelope);
        let shutdown = shutdown.clone();
        tokio::spawn(run_frame_supervisor(
            source,
            buffer,
            envelope,
            shutdown,
            Duration::from_millis(2),
            3,
        ))
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    handle.await.unwrap();

    assert!(envelope.is_maintenance());
}

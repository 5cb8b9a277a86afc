//! The capture loop: owns a [`Detector`] and forwards its frames to the
//! recognition ingester, unchanged. Normalization and lane mapping happen
//! downstream in the ingester, not here.

use std::sync::Arc;

use sorter_core::handle::SorterHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::detector::Detector;

/// Drive `detector` until cancelled, submitting every recognized frame to
/// `handle`. A real camera-backed detector would track its own reconnect
/// attempts and call into the maintenance latch after repeated failures;
/// [`crate::detector::NullDetector`] and [`crate::detector::ScriptedDetector`]
/// never fail that way, since neither owns a hardware connection.
pub async fn run<D: Detector>(mut detector: D, handle: Arc<SorterHandle>, cancel: CancellationToken) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = detector.next_frame() => frame,
        };

        let Some(frame) = frame else {
            continue;
        };
        debug!(raw = %frame.raw, source = frame.source, "detector frame captured");
        handle.submit_frame(frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{ScriptedDetector, ScriptedFrame};
    use sorter_common::config::TimingConfig;
    use sorter_core::executor::SortExecutorPool;
    use sorter_core::maintenance::MaintenanceController;
    use sorter_core::qr_queue::QrQueue;
    use sorter_core::state_store::StateStore;
    use sorter_core::token_queue::TokenQueue;
    use sorter_core::types::DetectorFrame;
    use sorter_hal::MockGpio;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};

    fn build_handle() -> (Arc<SorterHandle>, mpsc::Receiver<DetectorFrame>) {
        let state = Arc::new(StateStore::new(TimingConfig::default(), &[]));
        let qr_queue = Arc::new(QrQueue::new(Arc::clone(&state)));
        let token_queue = Arc::new(TokenQueue::new());
        let maintenance = Arc::new(MaintenanceController::new());
        let gpio: sorter_core::gpio_shared::SharedGpio =
            Arc::new(parking_lot::Mutex::new(Box::new(MockGpio::new())));
        let (events, _rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let executor = SortExecutorPool::spawn(
            1,
            Arc::clone(&state),
            Arc::clone(&gpio),
            Arc::clone(&maintenance),
            events.clone(),
            cancel.clone(),
        );
        let (frame_tx, frame_rx) = mpsc::channel(16);
        let handle = Arc::new(SorterHandle::new(
            state,
            qr_queue,
            token_queue,
            maintenance,
            gpio,
            executor,
            events,
            cancel,
            frame_tx,
        ));
        (handle, frame_rx)
    }

    #[tokio::test]
    async fn forwards_every_scripted_frame_to_the_handle() {
        let (handle, mut frame_rx) = build_handle();
        let cancel = handle.cancel.clone();
        let script = vec![ScriptedFrame {
            delay: Duration::ZERO,
            frame: DetectorFrame {
                raw: "A".to_string(),
                source: "test",
            },
        }];
        let detector = ScriptedDetector::new(script);

        let loop_cancel = cancel.clone();
        let runner = tokio::spawn(run(detector, Arc::clone(&handle), loop_cancel));

        let received = frame_rx.recv().await.unwrap();
        assert_eq!(received.raw, "A");
        cancel.cancel();
        runner.await.unwrap();
    }
}

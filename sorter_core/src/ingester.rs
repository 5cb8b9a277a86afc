//! The recognition ingester: turns raw detector frames into QR-queue items.
//!
//! Maps a recognized code to a lane by canonical key, drops anything that
//! maps to no configured lane, and suppresses an immediate repeat of the
//! same key within a short window (the camera re-reads the same code on
//! consecutive frames far faster than the belt moves it out of view).

use std::sync::Arc;
use std::time::{Duration, Instant};

use sorter_common::canonical_key;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::qr_queue::QrQueue;
use crate::state_store::StateStore;
use crate::types::{DetectorFrame, Event, LaneStatus, LogEvent, QrQueueItem};

/// A repeat of the same canonical key inside this window is dropped rather
/// than enqueued a second time.
const DUPLICATE_SUPPRESSION_WINDOW: Duration = Duration::from_secs(3);

pub struct Ingester {
    state: Arc<StateStore>,
    qr_queue: Arc<QrQueue>,
    events: broadcast::Sender<Event>,
    last_key: Option<String>,
    last_time: Option<Instant>,
}

impl Ingester {
    pub fn new(state: Arc<StateStore>, qr_queue: Arc<QrQueue>, events: broadcast::Sender<Event>) -> Self {
        Self {
            state,
            qr_queue,
            events,
            last_key: None,
            last_time: None,
        }
    }

    pub async fn run(mut self, mut frames: mpsc::Receiver<DetectorFrame>, cancel: CancellationToken) {
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            self.ingest(frame);
        }
    }

    fn ingest(&mut self, frame: DetectorFrame) {
        let key = canonical_key(&frame.raw);
        if key.is_empty() {
            debug!(raw = %frame.raw, "empty canonical key, dropping frame");
            return;
        }

        if self.is_duplicate(&key) {
            debug!(key = %key, "duplicate recognition within suppression window, dropping");
            return;
        }
        self.last_key = Some(key.clone());
        self.last_time = Some(Instant::now());

        let lanes = self.state.lane_configs();
        let Some(lane_index) = lanes.iter().position(|l| canonical_key(&l.id) == key) else {
            debug!(key = %key, "no lane matches canonical key, dropping");
            let _ = self.events.send(Event::Log(LogEvent::message(
                "unmapped_recognition",
                format!("recognized '{key}' maps to no configured lane"),
            )));
            return;
        };
        let lane_id = lanes[lane_index].id.clone();

        self.qr_queue.push_back(QrQueueItem {
            lane_index,
            qr_key: key,
            lane_id,
            timestamp: Instant::now(),
            data_raw: frame.raw,
            source: frame.source.to_string(),
        });
        self.state
            .update_lane_runtime(lane_index, |rt| rt.status = LaneStatus::WaitingForItem);
    }

    fn is_duplicate(&self, key: &str) -> bool {
        match (&self.last_key, self.last_time) {
            (Some(last), Some(at)) => last == key && at.elapsed() <= DUPLICATE_SUPPRESSION_WINDOW,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_common::config::{LaneConfig, TimingConfig};

    fn lane(id: &str) -> LaneConfig {
        LaneConfig {
            id: id.to_string(),
            name: format!("Lane {id}"),
            sensor_pin: 1,
            push_pin: Some(2),
            pull_pin: Some(3),
        }
    }

    fn setup() -> (Ingester, Arc<StateStore>, Arc<QrQueue>) {
        let state = Arc::new(StateStore::new(TimingConfig::default(), &[lane("A"), lane("B")]));
        let qr_queue = Arc::new(QrQueue::new(Arc::clone(&state)));
        let (tx, _rx) = broadcast::channel(16);
        let ingester = Ingester::new(Arc::clone(&state), Arc::clone(&qr_queue), tx);
        (ingester, state, qr_queue)
    }

    fn frame(raw: &str) -> DetectorFrame {
        DetectorFrame {
            raw: raw.to_string(),
            source: "test",
        }
    }

    #[test]
    fn recognized_code_maps_to_matching_lane() {
        let (mut ingester, state, qr_queue) = setup();
        ingester.ingest(frame("LOAI_A"));
        assert_eq!(qr_queue.len(), 1);
        let status = state.lane(0).unwrap().runtime.status;
        assert_eq!(status, LaneStatus::WaitingForItem);
    }

    #[test]
    fn unmapped_code_is_dropped() {
        let (mut ingester, _state, qr_queue) = setup();
        ingester.ingest(frame("ZZZ"));
        assert!(qr_queue.is_empty());
    }

    #[test]
    fn immediate_repeat_of_same_key_is_suppressed() {
        let (mut ingester, _state, qr_queue) = setup();
        ingester.ingest(frame("A"));
        ingester.ingest(frame("A"));
        assert_eq!(qr_queue.len(), 1);
    }

    #[test]
    fn different_key_is_never_suppressed() {
        let (mut ingester, _state, qr_queue) = setup();
        ingester.ingest(frame("A"));
        ingester.ingest(frame("B"));
        assert_eq!(qr_queue.len(), 2);
    }

    #[test]
    fn repeat_after_window_elapses_is_accepted() {
        let (mut ingester, _state, qr_queue) = setup();
        ingester.ingest(frame("A"));
        ingester.last_time = Some(Instant::now() - Duration::from_secs(4));
        ingester.ingest(frame("A"));
        assert_eq!(qr_queue.len(), 2);
    }
}

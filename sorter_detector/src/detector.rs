//! The `Detector` trait and the two implementations that ship without a
//! real camera backend (out of scope per the core's non-goals).

use std::time::Duration;

use sorter_core::types::DetectorFrame;
use tokio::time::Instant;

/// Per-frame code recognizer. At most one recognition per call; `None` means
/// no code was found in this frame, which is the common case and not an
/// error. Implementations that talk to real hardware are expected to retry
/// their own reconnects internally and only ever surface frames or `None`
/// through this method.
pub trait Detector: Send {
    async fn next_frame(&mut self) -> Option<DetectorFrame>;
}

/// Used when no camera is configured. Sleeps briefly and always yields
/// nothing, so the capture loop that owns it behaves like any other
/// long-lived task rather than busy-spinning.
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    async fn next_frame(&mut self) -> Option<DetectorFrame> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        None
    }
}

/// One scripted emission: fire `frame` once at least `delay` after the
/// previous call returned.
#[derive(Debug, Clone)]
pub struct ScriptedFrame {
    pub delay: Duration,
    pub frame: DetectorFrame,
}

/// Replays a fixed, timed sequence of frames, then behaves like
/// [`NullDetector`]. Used by integration tests and the mock bootstrapping
/// path in place of a real camera.
#[derive(Debug)]
pub struct ScriptedDetector {
    script: std::vec::IntoIter<ScriptedFrame>,
    exhausted: NullDetector,
}

impl ScriptedDetector {
    pub fn new(script: Vec<ScriptedFrame>) -> Self {
        Self {
            script: script.into_iter(),
            exhausted: NullDetector,
        }
    }
}

impl Detector for ScriptedDetector {
    async fn next_frame(&mut self) -> Option<DetectorFrame> {
        match self.script.next() {
            Some(step) => {
                let deadline = Instant::now() + step.delay;
                tokio::time::sleep_until(deadline).await;
                Some(step.frame)
            }
            None => self.exhausted.next_frame().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_detector_never_yields_a_frame() {
        let mut d = NullDetector;
        assert!(d.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn scripted_detector_replays_frames_in_order() {
        let script = vec![
            ScriptedFrame {
                delay: Duration::ZERO,
                frame: DetectorFrame {
                    raw: "A".to_string(),
                    source: "test",
                },
            },
            ScriptedFrame {
                delay: Duration::ZERO,
                frame: DetectorFrame {
                    raw: "B".to_string(),
                    source: "test",
                },
            },
        ];
        let mut d = ScriptedDetector::new(script);
        assert_eq!(d.next_frame().await.unwrap().raw, "A");
        assert_eq!(d.next_frame().await.unwrap().raw, "B");
    }

    #[tokio::test]
    async fn scripted_detector_falls_back_to_none_once_exhausted() {
        let mut d = ScriptedDetector::new(vec![]);
        assert!(d.next_frame().await.is_none());
    }
}

use crate::annotate::Annotator;
use crate::config::{CameraConfig, DetectionConfig};
use crate::detect::{DetectionOutcome, Detector};
use crate::frame::FrameHolder;
use crate::record::Recorder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-camera analysis loop: consumes the newest raw frame, invokes the
/// detection engine, drives the recording state machine and publishes the
/// newest annotated frame for streaming.
///
/// The recorder is owned exclusively by this unit; no other unit mutates
/// session state.
pub struct AnalysisUnit {
    camera: CameraConfig,
    config: DetectionConfig,
    raw: Arc<FrameHolder>,
    annotated: Arc<FrameHolder>,
    detector: Arc<dyn Detector>,
    annotator: Annotator,
    recorder: Recorder,
    shutdown: CancellationToken,
}

impl AnalysisUnit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: CameraConfig,
        config: DetectionConfig,
        raw: Arc<FrameHolder>,
        annotated: Arc<FrameHolder>,
        detector: Arc<dyn Detector>,
        annotator: Annotator,
        recorder: Recorder,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            camera,
            config,
            raw,
            annotated,
            detector,
            annotator,
            recorder,
            shutdown,
        }
    }

    /// Run the analysis loop until shutdown. Blocking; intended for a
    /// dedicated thread. On exit any open recording session is force-closed
    /// and handed to the upload dispatcher.
    pub fn run(mut self) {
        info!(camera = %self.camera.id, "Analysis unit started");
        let idle = Duration::from_millis(self.config.idle_poll_ms);

        while !self.shutdown.is_cancelled() {
            if !self.run_cycle(Instant::now()) {
                std::thread::sleep(idle);
            }
        }

        self.recorder.force_close();
        info!(camera = %self.camera.id, "Analysis unit ended");
    }

    /// One detection cycle. Returns false when the loop should back off
    /// briefly: no frame available yet, or a transient inference failure.
    fn run_cycle(&mut self, now: Instant) -> bool {
        let Some(mut frame) = self.raw.fetch() else {
            return false;
        };

        let detections = match self.detector.detect(&frame, &self.config.classes) {
            Ok(detections) => detections,
            Err(e) => {
                // Transient: a failed inference on one frame never stops
                // the loop
                warn!(camera = %self.camera.id, "Detection failed: {}", e);
                return false;
            }
        };

        let outcome = DetectionOutcome::classify(
            &detections,
            self.config.confidence,
            self.config.notify_confidence,
        );

        if !detections.is_empty() {
            self.annotator.draw(&mut frame, &detections);
        }

        if outcome.detection_found {
            debug!(
                camera = %self.camera.id,
                detections = detections.len(),
                "qualifying detection"
            );
        }

        self.annotated.publish(frame.clone());
        self.recorder.observe(outcome, &frame, now);

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipFactory, ClipWriter};
    use crate::config::RecordingConfig;
    use crate::detect::{BoundingBox, Detection};
    use crate::error::{Result, SentinelError};
    use crate::frame::Frame;
    use crate::notify::AlertSender;
    use crate::record::RecorderState;
    use crate::upload::UploadQueue;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::time::SystemTime;
    use tokio::sync::mpsc;

    struct FakeClip {
        path: PathBuf,
        finished: Arc<Mutex<usize>>,
    }

    impl ClipWriter for FakeClip {
        fn path(&self) -> &Path {
            &self.path
        }

        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<PathBuf> {
            *self.finished.lock() += 1;
            Ok(self.path)
        }
    }

    #[derive(Default)]
    struct FakeClipFactory {
        opened: Mutex<usize>,
        finished: Arc<Mutex<usize>>,
    }

    impl ClipFactory for FakeClipFactory {
        fn open(&self, camera_id: &str, _started_at: SystemTime) -> Result<Box<dyn ClipWriter>> {
            *self.opened.lock() += 1;
            Ok(Box::new(FakeClip {
                path: PathBuf::from(format!("videos/{}/clip.mp4", camera_id)),
                finished: Arc::clone(&self.finished),
            }))
        }
    }

    /// Detector playing back a scripted sequence; cancels the shared token
    /// once the script runs out.
    struct ScriptedDetector {
        script: Mutex<VecDeque<Result<Vec<Detection>>>>,
        shutdown: CancellationToken,
    }

    impl Detector for ScriptedDetector {
        fn detect(&self, _frame: &Frame, _class_filter: &[u32]) -> Result<Vec<Detection>> {
            match self.script.lock().pop_front() {
                Some(result) => result,
                None => {
                    self.shutdown.cancel();
                    Ok(Vec::new())
                }
            }
        }
    }

    fn detection(confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 1,
                y1: 1,
                x2: 6,
                y2: 6,
            },
            class_id: 0,
            label: "person".to_string(),
            confidence,
        }
    }

    struct Rig {
        unit: AnalysisUnit,
        raw: Arc<FrameHolder>,
        annotated: Arc<FrameHolder>,
        factory: Arc<FakeClipFactory>,
        shutdown: CancellationToken,
    }

    fn rig(script: Vec<Result<Vec<Detection>>>, tmp: &tempfile::TempDir) -> Rig {
        let camera = CameraConfig {
            id: "cam1".to_string(),
            name: "Camera 1".to_string(),
            source_url: "http://test/cam1".to_string(),
            stream_url: "rtsp://test/cam1".to_string(),
        };
        let detection_config = DetectionConfig {
            endpoint: String::new(),
            classes: vec![0],
            confidence: 0.7,
            notify_confidence: 0.7,
            idle_poll_ms: 1,
        };
        let recording_config = RecordingConfig {
            grace_seconds: 5,
            video_dir: tmp.path().join("videos").to_string_lossy().into_owned(),
            snapshot_dir: tmp.path().join("snapshots").to_string_lossy().into_owned(),
            jpeg_quality: 85,
            font_path: String::new(),
            font_size: 18.0,
        };

        let raw = Arc::new(FrameHolder::new());
        let annotated = Arc::new(FrameHolder::new());
        let factory = Arc::new(FakeClipFactory::default());
        let shutdown = CancellationToken::new();
        let (upload_tx, _upload_rx) = mpsc::channel(32);
        let (alert_tx, _alert_rx) = mpsc::channel(32);

        let recorder = Recorder::new(
            camera.clone(),
            recording_config,
            Arc::clone(&factory) as Arc<dyn ClipFactory>,
            UploadQueue::new(upload_tx),
            AlertSender::new(alert_tx),
        );

        let detector = Arc::new(ScriptedDetector {
            script: Mutex::new(script.into()),
            shutdown: shutdown.clone(),
        });

        Rig {
            unit: AnalysisUnit::new(
                camera,
                detection_config,
                Arc::clone(&raw),
                Arc::clone(&annotated),
                detector,
                Annotator::boxless(),
                recorder,
                shutdown.clone(),
            ),
            raw,
            annotated,
            factory,
            shutdown,
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, SystemTime::now())
    }

    #[test]
    fn test_no_frame_available_backs_off() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rig = rig(vec![], &tmp);

        assert!(!rig.unit.run_cycle(Instant::now()));
        assert!(rig.annotated.fetch().is_none());
    }

    #[test]
    fn test_clean_frame_is_forwarded_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rig = rig(vec![Ok(Vec::new())], &tmp);
        rig.raw.publish(frame());

        assert!(rig.unit.run_cycle(Instant::now()));

        let published = rig.annotated.fetch().unwrap();
        assert_eq!(published.data, frame().data);
        assert_eq!(rig.unit.recorder.state(), RecorderState::Idle);
        assert_eq!(*rig.factory.opened.lock(), 0);
    }

    #[test]
    fn test_detection_annotates_and_starts_recording() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rig = rig(vec![Ok(vec![detection(0.9)])], &tmp);
        rig.raw.publish(frame());

        assert!(rig.unit.run_cycle(Instant::now()));

        let published = rig.annotated.fetch().unwrap();
        assert_ne!(published.data, frame().data, "boxes were drawn");
        assert_eq!(rig.unit.recorder.state(), RecorderState::Active);
        assert_eq!(*rig.factory.opened.lock(), 1);
    }

    #[test]
    fn test_below_threshold_detection_does_not_record() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rig = rig(vec![Ok(vec![detection(0.3)])], &tmp);
        rig.raw.publish(frame());

        assert!(rig.unit.run_cycle(Instant::now()));

        // Annotated (a detection exists) but no session
        assert_ne!(rig.annotated.fetch().unwrap().data, frame().data);
        assert_eq!(rig.unit.recorder.state(), RecorderState::Idle);
    }

    #[test]
    fn test_inference_error_is_transient() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rig = rig(
            vec![
                Err(SentinelError::detection("engine hiccup")),
                Ok(vec![detection(0.9)]),
            ],
            &tmp,
        );
        rig.raw.publish(frame());

        // Failed cycle backs off but does not stop the unit
        assert!(!rig.unit.run_cycle(Instant::now()));
        assert!(rig.unit.run_cycle(Instant::now()));
        assert_eq!(rig.unit.recorder.state(), RecorderState::Active);
    }

    #[test]
    fn test_run_force_closes_session_on_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let rig = rig(vec![Ok(vec![detection(0.9)])], &tmp);
        rig.raw.publish(frame());

        // Script: one detection opens a session, then exhaustion cancels
        // the token and run() exits, force-closing the session.
        let factory = Arc::clone(&rig.factory);
        rig.unit.run();

        assert!(rig.shutdown.is_cancelled());
        assert_eq!(*factory.finished.lock(), 1);
    }
}

use crate::clip::{ClipFactory, ClipWriter};
use crate::config::{CameraConfig, RecordingConfig};
use crate::detect::DetectionOutcome;
use crate::error::Result;
use crate::frame::Frame;
use crate::notify::{Alert, AlertSender};
use crate::upload::{UploadQueue, UploadTask};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Recording state for one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No active session
    Idle,
    /// Session open, detection present within the last cycle
    Active,
    /// Session open, detection absent but within the retention window
    Grace,
}

/// One open recording: from first qualifying detection to grace expiry
struct RecordingSession {
    id: String,
    clip: Box<dyn ClipWriter>,
    started_at: SystemTime,
    last_detection: Instant,
    snapshot_taken: bool,
    notification_sent: bool,
}

/// Per-camera recording state machine.
///
/// Owned exclusively by the camera's analysis unit; transitions are strictly
/// sequential. At most one session is open at any instant. Snapshot and
/// notification side effects fire at most once per session.
pub struct Recorder {
    camera: CameraConfig,
    config: RecordingConfig,
    clips: Arc<dyn ClipFactory>,
    uploads: UploadQueue,
    alerts: AlertSender,
    session: Option<RecordingSession>,
    state: RecorderState,
}

impl Recorder {
    pub fn new(
        camera: CameraConfig,
        config: RecordingConfig,
        clips: Arc<dyn ClipFactory>,
        uploads: UploadQueue,
        alerts: AlertSender,
    ) -> Self {
        Self {
            camera,
            config,
            clips,
            uploads,
            alerts,
            session: None,
            state: RecorderState::Idle,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Feed one detection cycle into the state machine.
    ///
    /// `frame` is the frame the analysis unit published for this cycle
    /// (annotated when any detection exists); it is written to the open clip
    /// and used for the session snapshot. `now` is the cycle's monotonic
    /// timestamp and drives the grace window.
    pub fn observe(&mut self, outcome: DetectionOutcome, frame: &Frame, now: Instant) {
        if outcome.detection_found {
            self.on_detection(outcome, frame, now);
        } else {
            self.on_absence(frame, now);
        }
    }

    fn on_detection(&mut self, outcome: DetectionOutcome, frame: &Frame, now: Instant) {
        if self.session.is_none() {
            let clip = match self.clips.open(&self.camera.id, frame.timestamp) {
                Ok(clip) => clip,
                Err(e) => {
                    error!(camera = %self.camera.id, "Failed to open recording clip: {}", e);
                    return;
                }
            };

            let session = RecordingSession {
                id: Uuid::new_v4().to_string(),
                clip,
                started_at: frame.timestamp,
                last_detection: now,
                snapshot_taken: false,
                notification_sent: false,
            };
            info!(
                camera = %self.camera.id,
                session = %session.id,
                clip = %session.clip.path().display(),
                "Recording started (IDLE -> ACTIVE)"
            );
            self.session = Some(session);
            self.state = RecorderState::Active;
        } else if self.state == RecorderState::Grace {
            info!(camera = %self.camera.id, "Detection resumed (GRACE -> ACTIVE)");
            self.state = RecorderState::Active;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.last_detection = now;

        if !session.snapshot_taken {
            match save_snapshot(&self.camera, &self.config, frame) {
                Ok((local, remote)) => {
                    info!(
                        camera = %self.camera.id,
                        session = %session.id,
                        path = %local.display(),
                        "Saved session snapshot"
                    );
                    self.uploads.enqueue(UploadTask { local, remote });
                    session.snapshot_taken = true;
                }
                Err(e) => {
                    error!(camera = %self.camera.id, "Failed to save snapshot: {}", e);
                }
            }
        }

        if outcome.high_confidence && !session.notification_sent {
            info!(
                camera = %self.camera.id,
                session = %session.id,
                "High-confidence detection, dispatching alert"
            );
            self.alerts.send(Alert {
                camera_name: self.camera.name.clone(),
            });
            session.notification_sent = true;
        }

        if let Err(e) = session.clip.write_frame(frame) {
            warn!(camera = %self.camera.id, "Failed to write frame to clip: {}", e);
        }
    }

    fn on_absence(&mut self, frame: &Frame, now: Instant) {
        let grace = Duration::from_secs(self.config.grace_seconds);

        let expired = match self.session.as_ref() {
            None => return,
            Some(session) => now.duration_since(session.last_detection) > grace,
        };

        if expired {
            info!(
                camera = %self.camera.id,
                "Grace period expired after {}s without detection (GRACE -> IDLE)",
                self.config.grace_seconds
            );
            self.close_session();
            return;
        }

        if self.state != RecorderState::Grace {
            info!(camera = %self.camera.id, "No detection, entering grace period (ACTIVE -> GRACE)");
            self.state = RecorderState::Grace;
        }

        if let Some(session) = self.session.as_mut() {
            debug!(camera = %self.camera.id, session = %session.id, "writing grace frame");
            if let Err(e) = session.clip.write_frame(frame) {
                warn!(camera = %self.camera.id, "Failed to write frame to clip: {}", e);
            }
        }
    }

    /// Close any open session, finalize its clip and hand it to the upload
    /// dispatcher. Used on shutdown so a session in flight is never dropped.
    pub fn force_close(&mut self) {
        if self.session.is_some() {
            info!(
                camera = %self.camera.id,
                "Closing open recording session on shutdown"
            );
            self.close_session();
        }
    }

    fn close_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.state = RecorderState::Idle;

        let duration = session
            .started_at
            .elapsed()
            .unwrap_or_default()
            .as_secs_f64();

        match session.clip.finish() {
            Ok(path) => {
                info!(
                    camera = %self.camera.id,
                    session = %session.id,
                    clip = %path.display(),
                    duration_secs = duration,
                    "Recording closed, enqueueing for upload"
                );
                let remote = clip_remote_path(&self.camera.id, &path);
                self.uploads.enqueue(UploadTask {
                    local: path,
                    remote,
                });
            }
            Err(e) => {
                error!(
                    camera = %self.camera.id,
                    session = %session.id,
                    "Failed to finalize clip: {}",
                    e
                );
            }
        }
    }
}

fn clip_remote_path(camera_id: &str, local: &Path) -> String {
    let filename = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip.mp4".to_string());
    format!("videos/{}/{}", camera_id, filename)
}

/// Persist one annotated frame as the session snapshot and derive its
/// remote path.
fn save_snapshot(
    camera: &CameraConfig,
    config: &RecordingConfig,
    frame: &Frame,
) -> Result<(PathBuf, String)> {
    let dir = Path::new(&config.snapshot_dir).join(&camera.id);
    std::fs::create_dir_all(&dir)?;

    let stamp = DateTime::<Utc>::from(frame.timestamp).format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.jpg", camera.id, stamp);
    let path = dir.join(&filename);

    let jpeg = frame.encode_jpeg(config.jpeg_quality)?;
    std::fs::write(&path, jpeg)?;

    Ok((path, format!("snapshots/{}/{}", camera.id, filename)))
}

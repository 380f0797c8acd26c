use crate::config::CameraConfig;
use crate::frame::FrameHolder;
use crate::source::SourceFactory;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backoff between retries after a transient read failure
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Per-camera capture loop: pulls frames from the camera's source at its
/// native rate and publishes the newest frame to the raw holder.
///
/// Failure is camera-scoped. An unopenable source or an empty first read is
/// fatal for this unit only; intermittent read failures are expected from
/// network cameras and tolerated with a brief backoff.
pub struct CaptureUnit {
    camera: CameraConfig,
    raw: Arc<FrameHolder>,
    sources: Arc<dyn SourceFactory>,
    shutdown: CancellationToken,
}

impl CaptureUnit {
    pub fn new(
        camera: CameraConfig,
        raw: Arc<FrameHolder>,
        sources: Arc<dyn SourceFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            camera,
            raw,
            sources,
            shutdown,
        }
    }

    /// Run the capture loop until shutdown. Blocking; intended for a
    /// dedicated thread.
    pub fn run(self) {
        let camera_id = self.camera.id.clone();

        let mut source = match self.sources.open(&self.camera) {
            Ok(source) => source,
            Err(e) => {
                error!(camera = %camera_id, "Unable to open capture source: {}", e);
                return;
            }
        };

        // An empty first read means the source address is wrong or the feed
        // is dead, not a transient hiccup.
        match source.read_frame() {
            Ok(frame) => self.raw.publish(frame),
            Err(e) => {
                error!(camera = %camera_id, "No frames from source on first read: {}", e);
                return;
            }
        }

        info!(camera = %camera_id, "Capture unit started");

        while !self.shutdown.is_cancelled() {
            match source.read_frame() {
                Ok(frame) => {
                    debug!(camera = %camera_id, "captured frame");
                    self.raw.publish(frame);
                }
                Err(e) => {
                    warn!(camera = %camera_id, "Failed to capture a frame: {}", e);
                    std::thread::sleep(READ_RETRY_DELAY);
                }
            }
        }

        info!(camera = %camera_id, "Capture unit ended");
    }
}

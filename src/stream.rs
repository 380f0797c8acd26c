use crate::config::{CameraConfig, VideoConfig};
use crate::error::{Result, SentinelError};
use crate::frame::{Frame, FrameHolder};
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Wait when neither an annotated nor a raw frame is available yet
const IDLE_DELAY: Duration = Duration::from_millis(50);
/// Pacing between pipe writes
const PACE_DELAY: Duration = Duration::from_millis(10);

/// Live-streaming sink boundary: an external encoder consuming raw pixel
/// bytes on its input pipe
pub trait StreamSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Close the input pipe and wait for the sink to exit, discarding its
    /// result
    fn shutdown(&mut self);
}

/// Opens streaming sinks for cameras
pub trait StreamSinkFactory: Send + Sync {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn StreamSink>>;
}

/// Long-lived ffmpeg child encoding BGR24 frames from stdin and publishing
/// RTSP with a low-latency preset.
pub struct FfmpegStreamSink {
    camera_id: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegStreamSink {
    pub fn open(camera: &CameraConfig, video: &VideoConfig) -> Result<Self> {
        let size = format!("{}x{}", video.width, video.height);
        let filter = format!(
            "scale={}:{},fps={},format=yuv420p",
            video.width, video.height, video.fps
        );

        let mut child = Command::new("ffmpeg")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-s")
            .arg(&size)
            .arg("-i")
            .arg("pipe:0")
            .arg("-vf")
            .arg(&filter)
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("ultrafast")
            .arg("-tune")
            .arg("zerolatency")
            .arg("-f")
            .arg("rtsp")
            .arg(&camera.stream_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SentinelError::Stream {
                camera: camera.id.clone(),
                message: format!("failed to spawn ffmpeg publisher: {}", e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| SentinelError::Stream {
            camera: camera.id.clone(),
            message: "ffmpeg stdin unavailable".to_string(),
        })?;

        debug!(camera = %camera.id, url = %camera.stream_url, "opened stream sink");

        Ok(Self {
            camera_id: camera.id.clone(),
            child,
            stdin: Some(stdin),
        })
    }
}

impl StreamSink for FfmpegStreamSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| SentinelError::Stream {
            camera: self.camera_id.clone(),
            message: "sink already shut down".to_string(),
        })?;
        stdin.write_all(&frame.data).map_err(|e| SentinelError::Stream {
            camera: self.camera_id.clone(),
            message: format!("pipe write failed: {}", e),
        })
    }

    fn shutdown(&mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.wait() {
            warn!(camera = %self.camera_id, "failed to reap stream encoder: {}", e);
        }
    }
}

impl Drop for FfmpegStreamSink {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            self.shutdown();
        }
    }
}

/// Factory producing `FfmpegStreamSink`s at the configured geometry
pub struct FfmpegStreamSinkFactory {
    video: VideoConfig,
}

impl FfmpegStreamSinkFactory {
    pub fn new(video: VideoConfig) -> Self {
        Self { video }
    }
}

impl StreamSinkFactory for FfmpegStreamSinkFactory {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn StreamSink>> {
        Ok(Box::new(FfmpegStreamSink::open(camera, &self.video)?))
    }
}

/// Per-camera streaming loop: feeds the newest annotated frame (raw as
/// fallback) to the camera's long-lived encoder subprocess.
///
/// A write failure terminates this unit for this camera only; there is no
/// automatic restart.
pub struct StreamUnit {
    camera: CameraConfig,
    raw: Arc<FrameHolder>,
    annotated: Arc<FrameHolder>,
    sinks: Arc<dyn StreamSinkFactory>,
    shutdown: CancellationToken,
}

impl StreamUnit {
    pub fn new(
        camera: CameraConfig,
        raw: Arc<FrameHolder>,
        annotated: Arc<FrameHolder>,
        sinks: Arc<dyn StreamSinkFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            camera,
            raw,
            annotated,
            sinks,
            shutdown,
        }
    }

    /// Run the streaming loop until shutdown or sink failure. Blocking;
    /// intended for a dedicated thread.
    pub fn run(self) {
        let camera_id = self.camera.id.clone();

        let mut sink = match self.sinks.open(&self.camera) {
            Ok(sink) => sink,
            Err(e) => {
                error!(camera = %camera_id, "Unable to open stream sink: {}", e);
                return;
            }
        };

        info!(camera = %camera_id, "Streaming unit started");

        while !self.shutdown.is_cancelled() {
            let frame = self.annotated.fetch().or_else(|| self.raw.fetch());
            let Some(frame) = frame else {
                std::thread::sleep(IDLE_DELAY);
                continue;
            };

            if let Err(e) = sink.write_frame(&frame) {
                error!(
                    camera = %camera_id,
                    "Stream sink write failed, terminating streaming unit: {}",
                    e
                );
                break;
            }

            std::thread::sleep(PACE_DELAY);
        }

        sink.shutdown();
        info!(camera = %camera_id, "Streaming unit ended");
    }
}

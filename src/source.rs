use crate::config::{CameraConfig, VideoConfig};
use crate::error::{Result, SentinelError};
use crate::frame::Frame;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::SystemTime;
use tracing::{debug, warn};

/// A readable frame stream opened from a camera's source address
pub trait VideoSource: Send {
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Opens frame streams for cameras
pub trait SourceFactory: Send + Sync {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn VideoSource>>;
}

/// Frame source backed by an ffmpeg child process decoding the camera URL to
/// rawvideo BGR24 on stdout. Each read pulls exactly one frame's worth of
/// bytes from the pipe.
pub struct FfmpegSource {
    camera_id: String,
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FfmpegSource {
    pub fn open(camera: &CameraConfig, video: &VideoConfig) -> Result<Self> {
        let scale = format!("scale={}:{}", video.width, video.height);

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&camera.source_url)
            .arg("-vf")
            .arg(&scale)
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SentinelError::Capture {
                camera: camera.id.clone(),
                message: format!("failed to spawn ffmpeg for '{}': {}", camera.source_url, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SentinelError::Capture {
            camera: camera.id.clone(),
            message: "ffmpeg stdout unavailable".to_string(),
        })?;

        debug!(
            camera = %camera.id,
            url = %camera.source_url,
            "opened ffmpeg capture source"
        );

        Ok(Self {
            camera_id: camera.id.clone(),
            child,
            stdout,
            width: video.width,
            height: video.height,
        })
    }
}

impl VideoSource for FfmpegSource {
    fn read_frame(&mut self) -> Result<Frame> {
        let mut data = vec![0u8; Frame::expected_len(self.width, self.height)];
        self.stdout
            .read_exact(&mut data)
            .map_err(|e| SentinelError::Capture {
                camera: self.camera_id.clone(),
                message: format!("frame read failed: {}", e),
            })?;

        Ok(Frame::new(data, self.width, self.height, SystemTime::now()))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            warn!(camera = %self.camera_id, "failed to kill capture child: {}", e);
        }
        if let Err(e) = self.child.wait() {
            warn!(camera = %self.camera_id, "failed to reap capture child: {}", e);
        }
    }
}

/// Factory producing `FfmpegSource` streams at the configured resolution
pub struct FfmpegSourceFactory {
    video: VideoConfig,
}

impl FfmpegSourceFactory {
    pub fn new(video: VideoConfig) -> Self {
        Self { video }
    }
}

impl SourceFactory for FfmpegSourceFactory {
    fn open(&self, camera: &CameraConfig) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegSource::open(camera, &self.video)?))
    }
}

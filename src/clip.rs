use crate::config::VideoConfig;
use crate::error::{Result, SentinelError};
use crate::frame::Frame;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::SystemTime;
use tracing::{debug, warn};

/// An open recording file accepting raw frames
pub trait ClipWriter: Send {
    fn path(&self) -> &Path;
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    /// Close the file and return its final path
    fn finish(self: Box<Self>) -> Result<PathBuf>;
}

/// Opens recording files for cameras
pub trait ClipFactory: Send + Sync {
    fn open(&self, camera_id: &str, started_at: SystemTime) -> Result<Box<dyn ClipWriter>>;
}

/// Clip writer piping BGR24 frames into an ffmpeg child encoding H.264 MP4.
/// The encode rate matches the live-stream rate so clips play back at real
/// speed.
pub struct FfmpegClipWriter {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegClipWriter {
    pub fn open(path: PathBuf, video: &VideoConfig) -> Result<Self> {
        let size = format!("{}x{}", video.width, video.height);
        let fps = video.fps.to_string();

        let mut child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-s")
            .arg(&size)
            .arg("-r")
            .arg(&fps)
            .arg("-i")
            .arg("pipe:0")
            .arg("-c:v")
            .arg("libx264")
            .arg("-preset")
            .arg("fast")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-y")
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SentinelError::component("clip_writer", &format!("failed to spawn ffmpeg: {}", e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            SentinelError::component("clip_writer", "ffmpeg stdin unavailable")
        })?;

        debug!(path = %path.display(), "opened clip writer");

        Ok(Self {
            path,
            child,
            stdin: Some(stdin),
        })
    }
}

impl ClipWriter for FfmpegClipWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            SentinelError::component("clip_writer", "clip already finished")
        })?;
        stdin.write_all(&frame.data)?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<PathBuf> {
        // Closing stdin signals end-of-stream so ffmpeg finalizes the file
        drop(self.stdin.take());

        let status = self.child.wait()?;
        if !status.success() {
            return Err(SentinelError::component(
                "clip_writer",
                &format!("ffmpeg exited with {} for {}", status, self.path.display()),
            ));
        }

        Ok(self.path.clone())
    }
}

impl Drop for FfmpegClipWriter {
    fn drop(&mut self) {
        // finish() already reaped the child; this only runs on abandon
        if self.stdin.is_some() {
            drop(self.stdin.take());
            if let Err(e) = self.child.wait() {
                warn!("failed to reap abandoned clip encoder: {}", e);
            }
        }
    }
}

/// Factory producing `FfmpegClipWriter`s under `<base_dir>/<camera_id>/`
pub struct FfmpegClipFactory {
    base_dir: PathBuf,
    video: VideoConfig,
}

impl FfmpegClipFactory {
    pub fn new(base_dir: PathBuf, video: VideoConfig) -> Self {
        Self { base_dir, video }
    }
}

impl ClipFactory for FfmpegClipFactory {
    fn open(&self, camera_id: &str, started_at: SystemTime) -> Result<Box<dyn ClipWriter>> {
        let dir = self.base_dir.join(camera_id);
        std::fs::create_dir_all(&dir)?;

        let stamp = DateTime::<Utc>::from(started_at).format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{}.mp4", camera_id, stamp));

        Ok(Box::new(FfmpegClipWriter::open(path, &self.video)?))
    }
}

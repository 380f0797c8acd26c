use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SentinelConfig {
    /// Monitored camera feeds
    pub cameras: Vec<CameraConfig>,
    pub video: VideoConfig,
    pub detection: DetectionConfig,
    pub recording: RecordingConfig,
    pub upload: UploadConfig,
    pub notify: NotifyConfig,
}

/// Static description of one camera feed. Immutable after startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Short identifier used in file names and remote paths (e.g. "cam1")
    pub id: String,

    /// Human-readable name used in alerts and logs
    pub name: String,

    /// Capture source address (HTTP/RTSP stream URL)
    pub source_url: String,

    /// RTSP address the annotated live feed is published to
    pub stream_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoConfig {
    /// Frame width in pixels, shared by capture, recording and streaming
    #[serde(default = "default_video_width")]
    pub width: u32,

    /// Frame height in pixels
    #[serde(default = "default_video_height")]
    pub height: u32,

    /// Frames per second for recorded clips and the live stream
    #[serde(default = "default_video_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Inference service endpoint
    #[serde(default = "default_detection_endpoint")]
    pub endpoint: String,

    /// Class filter passed to the detection engine (0 = person)
    #[serde(default = "default_detection_classes")]
    pub classes: Vec<u32>,

    /// Minimum confidence for a detection to start/extend a recording
    #[serde(default = "default_detection_confidence")]
    pub confidence: f32,

    /// Minimum confidence for a detection to trigger an alert.
    /// Independent from `confidence`: record on lower, alert only on higher.
    #[serde(default = "default_notify_confidence")]
    pub notify_confidence: f32,

    /// Idle sleep in milliseconds when no new frame is available
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    /// Seconds a session stays open after the last qualifying detection
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,

    /// Base directory for transient video clips
    #[serde(default = "default_video_dir")]
    pub video_dir: String,

    /// Base directory for transient snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// JPEG quality for snapshots (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Path to TrueType font file for annotation labels
    #[serde(default = "default_font_path")]
    pub font_path: String,

    /// Font size for annotation labels
    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    /// Remote storage endpoint files are PUT to
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,

    /// Number of concurrent upload workers
    #[serde(default = "default_upload_workers")]
    pub workers: usize,

    /// Bounded queue capacity; tasks are dropped with an error when full
    #[serde(default = "default_upload_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    /// Push notification service endpoint
    #[serde(default = "default_notify_endpoint")]
    pub endpoint: String,

    /// Topic all alert subscribers listen on
    #[serde(default = "default_notify_topic")]
    pub topic: String,

    /// Bounded alert queue capacity
    #[serde(default = "default_notify_queue_capacity")]
    pub queue_capacity: usize,
}

impl SentinelConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sentinel.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("video.width", default_video_width())?
            .set_default("video.height", default_video_height())?
            .set_default("video.fps", default_video_fps())?
            .set_default("detection.endpoint", default_detection_endpoint())?
            .set_default(
                "detection.classes",
                default_detection_classes()
                    .into_iter()
                    .map(i64::from)
                    .collect::<Vec<i64>>(),
            )?
            .set_default("detection.confidence", default_detection_confidence() as f64)?
            .set_default(
                "detection.notify_confidence",
                default_notify_confidence() as f64,
            )?
            .set_default("detection.idle_poll_ms", default_idle_poll_ms())?
            .set_default("recording.grace_seconds", default_grace_seconds())?
            .set_default("recording.video_dir", default_video_dir())?
            .set_default("recording.snapshot_dir", default_snapshot_dir())?
            .set_default("recording.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("recording.font_path", default_font_path())?
            .set_default("recording.font_size", default_font_size() as f64)?
            .set_default("upload.endpoint", default_upload_endpoint())?
            .set_default("upload.workers", default_upload_workers() as i64)?
            .set_default(
                "upload.queue_capacity",
                default_upload_queue_capacity() as i64,
            )?
            .set_default("notify.endpoint", default_notify_endpoint())?
            .set_default("notify.topic", default_notify_topic())?
            .set_default(
                "notify.queue_capacity",
                default_notify_queue_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with SENTINEL_ prefix
            .add_source(Environment::with_prefix("SENTINEL").separator("_"))
            .build()?;

        let config: SentinelConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera must be configured".to_string(),
            ));
        }

        for camera in &self.cameras {
            if camera.id.is_empty() {
                return Err(ConfigError::Message(
                    "Camera id must not be empty".to_string(),
                ));
            }
            if camera.source_url.is_empty() || camera.stream_url.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Camera '{}' must have source_url and stream_url",
                    camera.id
                )));
            }
        }

        let mut ids: Vec<&str> = self.cameras.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.cameras.len() {
            return Err(ConfigError::Message(
                "Camera ids must be unique".to_string(),
            ));
        }

        if self.video.width == 0 || self.video.height == 0 {
            return Err(ConfigError::Message(
                "Video resolution must be greater than 0".to_string(),
            ));
        }

        if self.video.fps == 0 {
            return Err(ConfigError::Message(
                "Video fps must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(ConfigError::Message(
                "Detection confidence must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.notify_confidence) {
            return Err(ConfigError::Message(
                "Notification confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.upload.workers == 0 {
            return Err(ConfigError::Message(
                "Upload worker count must be greater than 0".to_string(),
            ));
        }

        if self.upload.queue_capacity == 0 || self.notify.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Queue capacities must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            cameras: vec![CameraConfig {
                id: "cam1".to_string(),
                name: "Camera 1".to_string(),
                source_url: "http://127.0.0.1:8080/video".to_string(),
                stream_url: "rtsp://127.0.0.1:8554/cam1".to_string(),
            }],
            video: VideoConfig {
                width: default_video_width(),
                height: default_video_height(),
                fps: default_video_fps(),
            },
            detection: DetectionConfig {
                endpoint: default_detection_endpoint(),
                classes: default_detection_classes(),
                confidence: default_detection_confidence(),
                notify_confidence: default_notify_confidence(),
                idle_poll_ms: default_idle_poll_ms(),
            },
            recording: RecordingConfig {
                grace_seconds: default_grace_seconds(),
                video_dir: default_video_dir(),
                snapshot_dir: default_snapshot_dir(),
                jpeg_quality: default_jpeg_quality(),
                font_path: default_font_path(),
                font_size: default_font_size(),
            },
            upload: UploadConfig {
                endpoint: default_upload_endpoint(),
                workers: default_upload_workers(),
                queue_capacity: default_upload_queue_capacity(),
            },
            notify: NotifyConfig {
                endpoint: default_notify_endpoint(),
                topic: default_notify_topic(),
                queue_capacity: default_notify_queue_capacity(),
            },
        }
    }
}

// Default value functions
fn default_video_width() -> u32 {
    1280
}
fn default_video_height() -> u32 {
    720
}
fn default_video_fps() -> u32 {
    15
}

fn default_detection_endpoint() -> String {
    "http://127.0.0.1:9090/detect".to_string()
}
fn default_detection_classes() -> Vec<u32> {
    vec![0]
}
fn default_detection_confidence() -> f32 {
    0.7
}
fn default_notify_confidence() -> f32 {
    0.7
}
fn default_idle_poll_ms() -> u64 {
    50
}

fn default_grace_seconds() -> u64 {
    5
}
fn default_video_dir() -> String {
    "./videos".to_string()
}
fn default_snapshot_dir() -> String {
    "./snapshots".to_string()
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    18.0
}

fn default_upload_endpoint() -> String {
    "http://127.0.0.1:9000/storage".to_string()
}
fn default_upload_workers() -> usize {
    4
}
fn default_upload_queue_capacity() -> usize {
    64
}

fn default_notify_endpoint() -> String {
    "http://127.0.0.1:9001/push".to_string()
}
fn default_notify_topic() -> String {
    "person-alerts".to_string()
}
fn default_notify_queue_capacity() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SentinelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.video.width, 1280);
        assert_eq!(config.video.height, 720);
        assert_eq!(config.video.fps, 15);
        assert_eq!(config.recording.grace_seconds, 5);
        assert_eq!(config.upload.workers, 4);
    }

    #[test]
    fn test_thresholds_are_independent() {
        let mut config = SentinelConfig::default();
        config.detection.confidence = 0.5;
        config.detection.notify_confidence = 0.9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SentinelConfig::default();

        config.cameras.clear();
        assert!(config.validate().is_err());

        config = SentinelConfig::default();
        config.cameras.push(config.cameras[0].clone());
        assert!(config.validate().is_err(), "duplicate ids must be rejected");

        config = SentinelConfig::default();
        config.video.width = 0;
        assert!(config.validate().is_err());

        config = SentinelConfig::default();
        config.detection.confidence = 1.5;
        assert!(config.validate().is_err());

        config = SentinelConfig::default();
        config.upload.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults_without_cameras() {
        // No file and no cameras key: deserialization of `cameras` fails,
        // which surfaces as a configuration error rather than a panic.
        let result = SentinelConfig::load_from_file("definitely-missing.toml");
        assert!(result.is_err());
    }
}

pub mod analysis;
pub mod annotate;
pub mod capture;
pub mod clip;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod notify;
pub mod record;
pub mod source;
pub mod stream;
pub mod supervisor;
pub mod upload;

pub use analysis::AnalysisUnit;
pub use annotate::Annotator;
pub use capture::CaptureUnit;
pub use clip::{ClipFactory, ClipWriter, FfmpegClipFactory, FfmpegClipWriter};
pub use config::{CameraConfig, SentinelConfig};
pub use detect::{BoundingBox, Detection, DetectionOutcome, Detector, HttpDetector};
pub use error::{Result, SentinelError};
pub use frame::{Frame, FrameHolder};
pub use notify::{Alert, AlertDispatcher, AlertSender, Notifier, PushNotifier};
pub use record::{Recorder, RecorderState};
pub use source::{FfmpegSource, FfmpegSourceFactory, SourceFactory, VideoSource};
pub use stream::{FfmpegStreamSink, FfmpegStreamSinkFactory, StreamSink, StreamSinkFactory, StreamUnit};
pub use supervisor::{CameraContext, Collaborators, Supervisor};
pub use upload::{HttpObjectStore, ObjectStore, UploadDispatcher, UploadQueue, UploadTask};

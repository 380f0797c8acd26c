use crate::analysis::AnalysisUnit;
use crate::annotate::Annotator;
use crate::capture::CaptureUnit;
use crate::clip::{ClipFactory, FfmpegClipFactory};
use crate::config::{CameraConfig, SentinelConfig};
use crate::detect::{Detector, HttpDetector};
use crate::error::Result;
use crate::frame::FrameHolder;
use crate::notify::{AlertDispatcher, Notifier, PushNotifier};
use crate::record::Recorder;
use crate::source::{FfmpegSourceFactory, SourceFactory};
use crate::stream::{FfmpegStreamSinkFactory, StreamSinkFactory, StreamUnit};
use crate::upload::{HttpObjectStore, ObjectStore, UploadDispatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The full set of state owned by one camera's pipeline: the static camera
/// description and the two single-slot frame holders its units communicate
/// through. Nothing is shared across camera boundaries.
pub struct CameraContext {
    pub camera: CameraConfig,
    pub raw: Arc<FrameHolder>,
    pub annotated: Arc<FrameHolder>,
}

impl CameraContext {
    pub fn new(camera: CameraConfig) -> Self {
        Self {
            camera,
            raw: Arc::new(FrameHolder::new()),
            annotated: Arc::new(FrameHolder::new()),
        }
    }
}

/// External collaborators the pipeline drives. Swappable at the trait seams
/// for testing.
pub struct Collaborators {
    pub sources: Arc<dyn SourceFactory>,
    pub detector: Arc<dyn Detector>,
    pub clips: Arc<dyn ClipFactory>,
    pub sinks: Arc<dyn StreamSinkFactory>,
    pub store: Arc<dyn ObjectStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Handles for a launched pipeline: one blocking task per unit plus the
/// cross-camera dispatchers.
pub struct Running {
    handles: Vec<(String, JoinHandle<()>)>,
    uploads: UploadDispatcher,
    alerts: AlertDispatcher,
}

/// Starts and supervises 3 units per camera (capture, analysis, streaming)
/// plus the shared upload worker pool and the alert dispatcher, all wired to
/// one process-wide cancellation token.
pub struct Supervisor {
    config: SentinelConfig,
    collaborators: Collaborators,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Supervisor with the production collaborators (ffmpeg capture and
    /// encoding, HTTP inference, HTTP storage and push services).
    pub fn new(config: SentinelConfig) -> Self {
        let collaborators = Collaborators {
            sources: Arc::new(FfmpegSourceFactory::new(config.video.clone())),
            detector: Arc::new(HttpDetector::new(
                &config.detection.endpoint,
                config.recording.jpeg_quality,
            )),
            clips: Arc::new(FfmpegClipFactory::new(
                PathBuf::from(&config.recording.video_dir),
                config.video.clone(),
            )),
            sinks: Arc::new(FfmpegStreamSinkFactory::new(config.video.clone())),
            store: Arc::new(HttpObjectStore::new(&config.upload.endpoint)),
            notifier: Arc::new(PushNotifier::new(&config.notify.endpoint)),
        };
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: SentinelConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every unit for every configured camera.
    pub fn launch(&self) -> Result<Running> {
        self.prepare_directories()?;

        let uploads = UploadDispatcher::spawn(
            Arc::clone(&self.collaborators.store),
            self.config.upload.workers,
            self.config.upload.queue_capacity,
        );
        let alerts = AlertDispatcher::spawn(
            Arc::clone(&self.collaborators.notifier),
            self.config.notify.topic.clone(),
            self.config.notify.queue_capacity,
        );

        let mut handles = Vec::new();

        for camera in &self.config.cameras {
            let ctx = CameraContext::new(camera.clone());

            let capture = CaptureUnit::new(
                ctx.camera.clone(),
                Arc::clone(&ctx.raw),
                Arc::clone(&self.collaborators.sources),
                self.shutdown.clone(),
            );
            handles.push((
                format!("capture:{}", camera.id),
                tokio::task::spawn_blocking(move || capture.run()),
            ));

            let recorder = Recorder::new(
                ctx.camera.clone(),
                self.config.recording.clone(),
                Arc::clone(&self.collaborators.clips),
                uploads.queue(),
                alerts.sender(),
            );
            let annotator = Annotator::new(
                &self.config.recording.font_path,
                self.config.recording.font_size,
            );
            let analysis = AnalysisUnit::new(
                ctx.camera.clone(),
                self.config.detection.clone(),
                Arc::clone(&ctx.raw),
                Arc::clone(&ctx.annotated),
                Arc::clone(&self.collaborators.detector),
                annotator,
                recorder,
                self.shutdown.clone(),
            );
            handles.push((
                format!("analysis:{}", camera.id),
                tokio::task::spawn_blocking(move || analysis.run()),
            ));

            let stream = StreamUnit::new(
                ctx.camera.clone(),
                Arc::clone(&ctx.raw),
                Arc::clone(&ctx.annotated),
                Arc::clone(&self.collaborators.sinks),
                self.shutdown.clone(),
            );
            handles.push((
                format!("stream:{}", camera.id),
                tokio::task::spawn_blocking(move || stream.run()),
            ));

            info!(camera = %camera.id, name = %camera.name, "Camera pipeline started");
        }

        info!(cameras = self.config.cameras.len(), "All camera pipelines started");

        Ok(Running {
            handles,
            uploads,
            alerts,
        })
    }

    /// Join every unit, then stop the dispatchers. The upload dispatcher is
    /// stopped last so clips force-closed during shutdown still drain to
    /// remote storage.
    pub async fn wind_down(running: Running) {
        for (name, handle) in running.handles {
            if let Err(e) = handle.await {
                error!("Unit {} terminated abnormally: {}", name, e);
            }
        }

        running.alerts.shutdown().await;
        running.uploads.shutdown().await;

        info!("All units stopped");
    }

    /// Run the whole system until an interrupt signal arrives, then shut
    /// down cooperatively. Returns only after every unit has been joined.
    pub async fn run(self) -> Result<()> {
        let running = self.launch()?;

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => error!("Failed to listen for interrupt signal: {}", e),
        }

        self.shutdown.cancel();
        Self::wind_down(running).await;

        Ok(())
    }

    /// Create the per-camera directories transient artifacts land in
    fn prepare_directories(&self) -> Result<()> {
        for camera in &self.config.cameras {
            std::fs::create_dir_all(Path::new(&self.config.recording.video_dir).join(&camera.id))?;
            std::fs::create_dir_all(
                Path::new(&self.config.recording.snapshot_dir).join(&camera.id),
            )?;
        }
        Ok(())
    }
}

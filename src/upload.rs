use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A queued request to move a local artifact to remote storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub local: PathBuf,
    pub remote: String,
}

/// Remote storage boundary
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, local: &Path, remote: &str) -> Result<()>;
}

/// Object store PUTting file bytes to an HTTP endpoint
pub struct HttpObjectStore {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, local: &Path, remote: &str) -> Result<()> {
        let bytes = tokio::fs::read(local).await?;
        let url = format!("{}/{}", self.endpoint, remote.trim_start_matches('/'));

        let response = self.client.put(&url).body(bytes).send().await?;
        if !response.status().is_success() {
            return Err(SentinelError::component(
                "object_store",
                &format!("remote storage returned {} for {}", response.status(), url),
            ));
        }

        Ok(())
    }
}

/// Producer handle for the upload dispatcher.
///
/// Enqueueing never blocks: a full queue drops the task with a logged error
/// so the analysis loop is never held up by slow network I/O.
#[derive(Clone)]
pub struct UploadQueue {
    tx: mpsc::Sender<UploadTask>,
}

impl UploadQueue {
    pub fn new(tx: mpsc::Sender<UploadTask>) -> Self {
        Self { tx }
    }

    pub fn enqueue(&self, task: UploadTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                error!(
                    "Upload queue full, dropping '{}' (file retained locally)",
                    task.local.display()
                );
            }
            Err(TrySendError::Closed(task)) => {
                warn!(
                    "Upload dispatcher stopped, dropping '{}' (file retained locally)",
                    task.local.display()
                );
            }
        }
    }
}

/// Fixed-size worker pool shipping completed files to remote storage.
///
/// Tasks are independent and may complete out of order. The local file is
/// deleted only after a confirmed remote write; a failed upload is logged
/// and dropped, leaving the file in place for manual recovery.
pub struct UploadDispatcher {
    tx: mpsc::Sender<UploadTask>,
    workers: Vec<JoinHandle<()>>,
}

impl UploadDispatcher {
    pub fn spawn(store: Arc<dyn ObjectStore>, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let store = Arc::clone(&store);
                tokio::spawn(upload_worker(worker_id, rx, store))
            })
            .collect();

        Self {
            tx,
            workers: handles,
        }
    }

    pub fn queue(&self) -> UploadQueue {
        UploadQueue::new(self.tx.clone())
    }

    /// Close the queue and join all workers, draining queued tasks first
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!("Upload worker terminated abnormally: {}", e);
            }
        }
        info!("Upload dispatcher stopped");
    }
}

async fn upload_worker(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<UploadTask>>>,
    store: Arc<dyn ObjectStore>,
) {
    debug!(worker = worker_id, "Upload worker started");

    loop {
        // The receiver lock is only held while waiting; the upload itself
        // runs unlocked so workers proceed concurrently.
        let task = rx.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        match store.put(&task.local, &task.remote).await {
            Ok(()) => {
                info!(
                    "Uploaded '{}' to '{}'",
                    task.local.display(),
                    task.remote
                );
                match tokio::fs::remove_file(&task.local).await {
                    Ok(()) => debug!("Removed local file '{}'", task.local.display()),
                    Err(e) => warn!(
                        "Failed to remove local file '{}' after upload: {}",
                        task.local.display(),
                        e
                    ),
                }
            }
            Err(e) => {
                error!(
                    "Upload of '{}' failed: {} (file retained locally, no retry)",
                    task.local.display(),
                    e
                );
            }
        }
    }

    debug!(worker = worker_id, "Upload worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeStore {
        fail: bool,
        uploads: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put(&self, _local: &Path, remote: &str) -> Result<()> {
            if self.fail {
                return Err(SentinelError::component("fake_store", "simulated outage"));
            }
            self.uploads.lock().push(remote.to_string());
            Ok(())
        }
    }

    fn temp_artifact(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"clip-bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_successful_upload_removes_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_artifact(&dir, "clip.mp4");

        let store = Arc::new(FakeStore::default());
        let dispatcher = UploadDispatcher::spawn(Arc::clone(&store) as _, 2, 8);

        dispatcher.queue().enqueue(UploadTask {
            local: path.clone(),
            remote: "videos/cam1/clip.mp4".to_string(),
        });
        dispatcher.shutdown().await;

        assert!(!path.exists());
        assert_eq!(
            store.uploads.lock().as_slice(),
            &["videos/cam1/clip.mp4".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_upload_retains_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_artifact(&dir, "snap.jpg");

        let store = Arc::new(FakeStore::failing());
        let dispatcher = UploadDispatcher::spawn(store as _, 2, 8);

        dispatcher.queue().enqueue(UploadTask {
            local: path.clone(),
            remote: "snapshots/cam1/snap.jpg".to_string(),
        });
        dispatcher.shutdown().await;

        // Never silently removed on failure
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = (0..5)
            .map(|i| temp_artifact(&dir, &format!("clip{}.mp4", i)))
            .collect();

        let store = Arc::new(FakeStore::default());
        let dispatcher = UploadDispatcher::spawn(Arc::clone(&store) as _, 4, 16);

        let queue = dispatcher.queue();
        for (i, path) in paths.iter().enumerate() {
            queue.enqueue(UploadTask {
                local: path.clone(),
                remote: format!("videos/cam1/clip{}.mp4", i),
            });
        }
        dispatcher.shutdown().await;

        assert_eq!(store.uploads.lock().len(), 5);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_full_queue_drops_task_without_blocking() {
        // No workers are draining this channel
        let (tx, mut rx) = mpsc::channel(1);
        let queue = UploadQueue::new(tx);

        queue.enqueue(UploadTask {
            local: PathBuf::from("a.mp4"),
            remote: "a.mp4".to_string(),
        });
        queue.enqueue(UploadTask {
            local: PathBuf::from("b.mp4"),
            remote: "b.mp4".to_string(),
        });

        // Only the first task was accepted; the second was dropped
        assert_eq!(rx.try_recv().unwrap().remote, "a.mp4");
        assert!(rx.try_recv().is_err());
    }
}

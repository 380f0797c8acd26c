use crate::error::{Result, SentinelError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One alert naming the camera that saw a high-confidence detection
#[derive(Debug, Clone)]
pub struct Alert {
    pub camera_name: String,
}

/// Push notification boundary: fire-and-forget, topic-based fan-out
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, title: &str, body: &str, topic: &str) -> Result<()>;
}

/// Notifier POSTing a JSON payload to a topic-based push endpoint
pub struct PushNotifier {
    endpoint: String,
    client: reqwest::Client,
}

impl PushNotifier {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for PushNotifier {
    async fn publish(&self, title: &str, body: &str, topic: &str) -> Result<()> {
        let payload = json!({
            "topic": topic,
            "title": title,
            "message": body,
        });

        let response = self.client.post(&self.endpoint).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(SentinelError::component(
                "notifier",
                &format!("push service returned {}", response.status()),
            ));
        }

        Ok(())
    }
}

/// Producer handle for the alert dispatcher. Sending never blocks; a full
/// queue drops the alert with a warning (alerts are best effort).
#[derive(Clone)]
pub struct AlertSender {
    tx: mpsc::Sender<Alert>,
}

impl AlertSender {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        Self { tx }
    }

    pub fn send(&self, alert: Alert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                warn!("Alert queue full, dropping alert for {}", alert.camera_name);
            }
            Err(TrySendError::Closed(alert)) => {
                warn!(
                    "Alert dispatcher stopped, dropping alert for {}",
                    alert.camera_name
                );
            }
        }
    }
}

/// Single async worker draining the alert queue and publishing to the
/// notification service, decoupling the analysis loops from network I/O.
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
    worker: JoinHandle<()>,
}

impl AlertDispatcher {
    pub fn spawn(notifier: Arc<dyn Notifier>, topic: String, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Alert>(queue_capacity);

        let worker = tokio::spawn(async move {
            debug!("Alert dispatcher started");
            while let Some(alert) = rx.recv().await {
                let title = format!("Activity Detected - {}", alert.camera_name);
                let body = format!("Activity detected on {}.", alert.camera_name);

                match notifier.publish(&title, &body, &topic).await {
                    Ok(()) => info!("Notification sent for {}", alert.camera_name),
                    Err(e) => error!("Notification error for {}: {}", alert.camera_name, e),
                }
            }
            debug!("Alert dispatcher stopped");
        });

        Self { tx, worker }
    }

    pub fn sender(&self) -> AlertSender {
        AlertSender::new(self.tx.clone())
    }

    /// Close the queue and join the worker, draining queued alerts first
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!("Alert dispatcher terminated abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeNotifier {
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn publish(&self, title: &str, _body: &str, topic: &str) -> Result<()> {
            if self.fail {
                return Err(SentinelError::component("fake_notifier", "simulated outage"));
            }
            self.published
                .lock()
                .push((title.to_string(), topic.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_alert_is_published_with_camera_name_and_topic() {
        let notifier = Arc::new(FakeNotifier::default());
        let dispatcher = AlertDispatcher::spawn(
            Arc::clone(&notifier) as _,
            "person-alerts".to_string(),
            4,
        );

        dispatcher.sender().send(Alert {
            camera_name: "Front Door".to_string(),
        });
        dispatcher.shutdown().await;

        let published = notifier.published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "Activity Detected - Front Door");
        assert_eq!(published[0].1, "person-alerts");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let notifier = Arc::new(FakeNotifier {
            fail: true,
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::spawn(notifier as _, "t".to_string(), 4);

        dispatcher.sender().send(Alert {
            camera_name: "Cam".to_string(),
        });
        // Best effort: the failure is logged, never propagated
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_alert() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = AlertSender::new(tx);

        sender.send(Alert {
            camera_name: "a".to_string(),
        });
        sender.send(Alert {
            camera_name: "b".to_string(),
        });

        assert_eq!(rx.try_recv().unwrap().camera_name, "a");
        assert!(rx.try_recv().is_err());
    }
}

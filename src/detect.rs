use crate::error::{Result, SentinelError};
use crate::frame::Frame;
use serde::Deserialize;
use tracing::debug;

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// One detected object. Ephemeral: derived per analysis cycle, not persisted.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// Object-detection engine boundary.
///
/// Synchronous and potentially slow; treated as a pure function with no side
/// effects on the frame. Implementations must tolerate being called from a
/// dedicated blocking thread.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame, class_filter: &[u32]) -> Result<Vec<Detection>>;
}

/// Classification of one detection cycle against the two configured
/// thresholds. The thresholds are independent: a deployment may record on
/// lower confidence while alerting only on higher confidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionOutcome {
    /// Any detection at or above the recording threshold
    pub detection_found: bool,
    /// Any detection at or above the notification threshold
    pub high_confidence: bool,
}

impl DetectionOutcome {
    pub fn classify(detections: &[Detection], confidence: f32, notify_confidence: f32) -> Self {
        Self {
            detection_found: detections.iter().any(|d| d.confidence >= confidence),
            high_confidence: detections.iter().any(|d| d.confidence >= notify_confidence),
        }
    }

    /// Highest confidence among the detections, if any
    pub fn peak(detections: &[Detection]) -> Option<f32> {
        detections
            .iter()
            .map(|d| d.confidence)
            .max_by(|a, b| a.total_cmp(b))
    }
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    class_id: u32,
    label: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<WireDetection>,
}

/// Detector backed by an external HTTP inference service.
///
/// Frames are JPEG-encoded and POSTed to the service; the class filter is
/// passed as a query parameter. No request timeout is imposed: a stuck
/// inference call stalls only the calling camera's analysis unit.
pub struct HttpDetector {
    endpoint: String,
    jpeg_quality: u8,
    // Initialized on first use from the analysis unit's blocking thread;
    // blocking clients must not be built on an async runtime thread.
    client: std::sync::OnceLock<reqwest::blocking::Client>,
}

impl HttpDetector {
    pub fn new(endpoint: &str, jpeg_quality: u8) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            jpeg_quality,
            client: std::sync::OnceLock::new(),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.client.get_or_init(reqwest::blocking::Client::new)
    }
}

impl Detector for HttpDetector {
    fn detect(&self, frame: &Frame, class_filter: &[u32]) -> Result<Vec<Detection>> {
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        let classes = class_filter
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client()
            .post(&self.endpoint)
            .query(&[("classes", classes.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()?;

        if !response.status().is_success() {
            return Err(SentinelError::detection(format!(
                "inference service returned {}",
                response.status()
            )));
        }

        let parsed: DetectResponse = response.json()?;
        debug!(count = parsed.detections.len(), "inference response");

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| Detection {
                bbox: BoundingBox {
                    x1: d.x1,
                    y1: d.y1,
                    x2: d.x2,
                    y2: d.y2,
                },
                class_id: d.class_id,
                label: d.label,
                confidence: d.confidence,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 0,
                y1: 0,
                x2: 10,
                y2: 10,
            },
            class_id: 0,
            label: "person".to_string(),
            confidence,
        }
    }

    #[test]
    fn test_classify_empty() {
        let outcome = DetectionOutcome::classify(&[], 0.7, 0.7);
        assert!(!outcome.detection_found);
        assert!(!outcome.high_confidence);
    }

    #[test]
    fn test_classify_below_threshold() {
        let outcome = DetectionOutcome::classify(&[detection(0.3)], 0.7, 0.7);
        assert!(!outcome.detection_found);
        assert!(!outcome.high_confidence);
    }

    #[test]
    fn test_classify_at_threshold() {
        // Threshold comparisons are inclusive
        let outcome = DetectionOutcome::classify(&[detection(0.7)], 0.7, 0.7);
        assert!(outcome.detection_found);
        assert!(outcome.high_confidence);
    }

    #[test]
    fn test_independent_thresholds() {
        // Record on lower confidence, alert only on higher
        let outcome = DetectionOutcome::classify(&[detection(0.6)], 0.5, 0.9);
        assert!(outcome.detection_found);
        assert!(!outcome.high_confidence);

        let outcome = DetectionOutcome::classify(&[detection(0.95)], 0.5, 0.9);
        assert!(outcome.detection_found);
        assert!(outcome.high_confidence);
    }

    #[test]
    fn test_peak_confidence() {
        assert_eq!(DetectionOutcome::peak(&[]), None);
        let peak = DetectionOutcome::peak(&[detection(0.4), detection(0.8), detection(0.6)]);
        assert_eq!(peak, Some(0.8));
    }
}

use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use parking_lot::Mutex;
use std::time::SystemTime;

/// A single raster frame in BGR24 pixel order plus its capture timestamp.
///
/// Frames are owned exclusively by whichever stage currently holds them and
/// are cloned, never shared by reference, when handed across a stage boundary.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw BGR24 pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp: SystemTime) -> Self {
        Self {
            data,
            width,
            height,
            timestamp,
        }
    }

    /// Expected byte length for the frame's resolution
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Validate frame data size against the resolution
    pub fn validate_size(&self) -> bool {
        self.data.len() == Self::expected_len(self.width, self.height)
    }

    /// Encode the frame as a JPEG image.
    ///
    /// The BGR byte order is swapped to RGB before encoding.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(3) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }

        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode(&rgb, self.width, self.height, image::ColorType::Rgb8)?;
        Ok(buf)
    }
}

/// Single-slot, lock-guarded latest-frame cache.
///
/// `publish` overwrites the slot; `fetch` returns a private copy. There is no
/// queue: a slow reader observes the newest frame only, which bounds memory
/// and sheds load when the consumer is slower than the producer. The lock is
/// held only for the O(1) copy-in/copy-out, never across I/O or inference.
#[derive(Debug, Default)]
pub struct FrameHolder {
    slot: Mutex<Option<Frame>>,
}

impl FrameHolder {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the slot's content with the given frame
    pub fn publish(&self, frame: Frame) {
        *self.slot.lock() = Some(frame);
    }

    /// Return a copy of the current content, if any
    pub fn fetch(&self) -> Option<Frame> {
        self.slot.lock().clone()
    }
}

use crate::detect::Detection;
use crate::frame::Frame;
use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use tracing::warn;

// Pixel values in BGR byte order to match the frame layout
const BOX_COLOR: Rgb<u8> = Rgb([0, 220, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws detection boxes and labels directly into BGR24 frame buffers.
///
/// The label font is loaded once at startup; if it cannot be loaded the
/// annotator degrades to boxes-only output.
pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl Annotator {
    pub fn new(font_path: &str, font_size: f32) -> Self {
        let font = match fs::read(font_path) {
            Ok(data) => match Font::try_from_vec(data) {
                Some(font) => Some(font),
                None => {
                    warn!("Failed to parse font file '{}', labels disabled", font_path);
                    None
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read font file '{}': {}, labels disabled",
                    font_path, e
                );
                None
            }
        };

        Self {
            font,
            scale: Scale::uniform(font_size),
        }
    }

    /// Annotator without label text, used where no font is configured
    pub fn boxless() -> Self {
        Self {
            font: None,
            scale: Scale::uniform(0.0),
        }
    }

    /// Draw all detections onto the frame in place
    pub fn draw(&self, frame: &mut Frame, detections: &[Detection]) {
        let (width, height) = (frame.width, frame.height);
        if width == 0 || height == 0 {
            return;
        }
        let Some(mut canvas) =
            ImageBuffer::<Rgb<u8>, &mut [u8]>::from_raw(width, height, frame.data.as_mut_slice())
        else {
            warn!("Frame buffer does not match its resolution, skipping annotation");
            return;
        };

        for det in detections {
            let x1 = det.bbox.x1.min(width.saturating_sub(1));
            let y1 = det.bbox.y1.min(height.saturating_sub(1));
            let x2 = det.bbox.x2.clamp(x1 + 1, width);
            let y2 = det.bbox.y2.clamp(y1 + 1, height);
            let (w, h) = (x2 - x1, y2 - y1);

            let rect = Rect::at(x1 as i32, y1 as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            // Second rectangle one pixel in for a 2px border
            if w > 2 && h > 2 {
                let inner = Rect::at(x1 as i32 + 1, y1 as i32 + 1).of_size(w - 2, h - 2);
                draw_hollow_rect_mut(&mut canvas, inner, BOX_COLOR);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.label, det.confidence);
                let text_y = y1.saturating_sub(self.scale.y as u32 + 2);
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    x1 as i32,
                    text_y as i32,
                    self.scale,
                    font,
                    &text,
                );
            }
        }
    }
}

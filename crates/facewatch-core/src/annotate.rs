//! Drawing detected faces onto frames for display.

use crate::types::{Decision, FaceOutcome, FaceRegion};
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 16.0;
const LABEL_PAD: u32 = 2;
const LABEL_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("annotation output failed: {0}")]
    Output(String),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

/// Renders every face of a frame, whatever its decision.
pub trait FrameAnnotator: Send {
    fn annotate(&mut self, frame: &mut RgbImage, faces: &[FaceOutcome]) -> Result<(), AnnotateError>;
}

/// Box colour for a face decision.
pub fn decision_colour(decision: Decision) -> Rgb<u8> {
    match decision {
        Decision::Accepted => Rgb([0, 255, 0]),
        Decision::Suppressed => Rgb([255, 200, 0]),
        Decision::Unknown => Rgb([255, 0, 0]),
    }
}

/// Draw a hollow rectangle along `region`, clipped to the frame.
pub fn draw_box(frame: &mut RgbImage, region: &FaceRegion, colour: Rgb<u8>, thickness: u32) {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let left = region.left.min(w - 1);
    let right = region.right.min(w - 1);
    let top = region.top.min(h - 1);
    let bottom = region.bottom.min(h - 1);
    if left > right || top > bottom {
        return;
    }

    for t in 0..thickness {
        for x in left..=right {
            for y in [top.saturating_add(t), bottom.saturating_sub(t)] {
                if y >= top && y <= bottom {
                    frame.put_pixel(x, y, colour);
                }
            }
        }
        for y in top..=bottom {
            for x in [left.saturating_add(t), right.saturating_sub(t)] {
                if x >= left && x <= right {
                    frame.put_pixel(x, y, colour);
                }
            }
        }
    }
}

/// Draw `label` on a filled band in `colour`, just above `region` when it
/// fits, otherwise inside the top of the box.
pub fn draw_label(
    frame: &mut RgbImage,
    region: &FaceRegion,
    label: &str,
    colour: Rgb<u8>,
    font: &FontRef<'_>,
) {
    let scale = PxScale::from(LABEL_SCALE);
    let (text_w, text_h) = text_size(scale, font, label);
    let band_w = text_w + 2 * LABEL_PAD;
    let band_h = text_h + 2 * LABEL_PAD;
    let y = if region.top >= band_h {
        region.top - band_h
    } else {
        region.top
    };
    let (x, y) = (region.left as i32, y as i32);

    draw_filled_rect_mut(frame, Rect::at(x, y).of_size(band_w.max(1), band_h.max(1)), colour);
    draw_text_mut(
        frame,
        Rgb([0, 0, 0]),
        x + LABEL_PAD as i32,
        y + LABEL_PAD as i32,
        scale,
        font,
        label,
    );
}

/// Draws a coloured box per face with its `"name (NN.NN%)"` label.
pub struct BoxAnnotator {
    font: Option<FontRef<'static>>,
    last_labels: Vec<String>,
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxAnnotator {
    pub fn new() -> Self {
        let font = FontRef::try_from_slice(LABEL_FONT)
            .map_err(|e| tracing::warn!(error = %e, "label font unusable; drawing boxes only"))
            .ok();
        Self {
            font,
            last_labels: Vec::new(),
        }
    }

    /// Labels rendered for the most recent frame.
    pub fn last_labels(&self) -> &[String] {
        &self.last_labels
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(&mut self, frame: &mut RgbImage, faces: &[FaceOutcome]) -> Result<(), AnnotateError> {
        self.last_labels.clear();
        for face in faces {
            let colour = decision_colour(face.decision);
            draw_box(frame, &face.region, colour, BOX_THICKNESS);
            let label = face.result.label();
            if let Some(font) = &self.font {
                draw_label(frame, &face.region, &label, colour, font);
            }
            tracing::trace!(
                label = %label,
                top = face.region.top,
                left = face.region.left,
                "annotated face"
            );
            self.last_labels.push(label);
        }
        Ok(())
    }
}

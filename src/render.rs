//! Draw instructions for the overlay renderer.
//!
//! Rendering itself happens outside this crate; pipelines only describe what
//! to draw, in order.

use serde::Serialize;

use crate::observation::BBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const GREEN: Rgb = Rgb(0, 255, 0);
pub const RED: Rgb = Rgb(255, 0, 0);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DrawInstruction {
    pub bbox: BBox,
    pub color: Rgb,
    pub label: String,
}

impl DrawInstruction {
    pub fn new(bbox: BBox, color: Rgb, label: impl Into<String>) -> Self {
        Self {
            bbox,
            color,
            label: label.into(),
        }
    }
}

//! Multi-output compositing into one virtual-desktop image
//!
//! Each output arrives in its own buffer in the orientation the compositor
//! scans it out. Rotated outputs are turned back upright and every output is
//! painted at its logical position relative to the requested rectangle.

use image::{RgbaImage, imageops};

use crate::model::Geometry;

/// Rotation part of a `wl_output` transform
///
/// Flipped transforms map to their rotation-only counterparts; mirrored
/// monitors come out rotated but not mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Normal,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Maps a raw `wl_output.transform` value (flips are dropped)
    pub fn from_wl_transform(raw: u32) -> Self {
        match raw & 3 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Normal,
        }
    }

    /// Rotates `image` clockwise by this amount
    pub fn apply(self, image: &RgbaImage) -> Option<RgbaImage> {
        match self {
            Rotation::Normal => None,
            Rotation::Deg90 => Some(imageops::rotate90(image)),
            Rotation::Deg180 => Some(imageops::rotate180(image)),
            Rotation::Deg270 => Some(imageops::rotate270(image)),
        }
    }
}

/// One captured output ready to be painted
#[derive(Debug, Clone)]
pub struct OutputLayer {
    /// Logical top-left corner in global coordinates
    pub x:        i32,
    pub y:        i32,
    pub rotation: Rotation,
    /// Decoded pixels in scan-out orientation
    pub image:    RgbaImage,
}

/// Paints every layer onto a transparent canvas the size of `desktop`.
///
/// Later layers win where outputs overlap. Pixels outside the canvas are
/// clipped.
pub fn composite_outputs(desktop: Geometry, layers: &[OutputLayer]) -> RgbaImage {
    let mut canvas = RgbaImage::new(desktop.width, desktop.height);

    for layer in layers {
        let dx = i64::from(layer.x) - i64::from(desktop.x);
        let dy = i64::from(layer.y) - i64::from(desktop.y);

        match layer.rotation.apply(&layer.image) {
            Some(upright) => imageops::replace(&mut canvas, &upright, dx, dy),
            None => imageops::replace(&mut canvas, &layer.image, dx, dy),
        }
    }

    canvas
}

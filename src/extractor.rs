//! CPU-side multi-planar reformation.

use crate::enums::{Orientation, RenderMode};
use crate::volume::Volume;
use crate::windowing::Window;

/// A 2D cross-section of a volume, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub pixels: Vec<u16>,
    pub width: usize,
    pub height: usize,
    /// Physical width divided by physical height.
    pub aspect: f32,
}

impl Plane {
    pub fn pixel(&self, col: usize, row: usize) -> u16 {
        self.pixels[row * self.width + col]
    }

    pub fn windowed(&self, window: &Window) -> Vec<u8> {
        window.apply(&self.pixels)
    }
}

pub struct SliceExtractor;

impl SliceExtractor {
    /// Clamp `index` into `[0, extent - 1]` for `mode`.
    pub fn clamp_index(volume: &Volume, mode: RenderMode, index: i64) -> usize {
        let extent = mode.extent(volume.dim());
        if extent == 0 {
            return 0;
        }
        index.clamp(0, extent as i64 - 1) as usize
    }

    /// Extract the plane `index` along the axis of `mode`. Out-of-range
    /// indices are clamped. Non-planar modes yield a blank width x height
    /// plane.
    pub fn extract(volume: &Volume, mode: RenderMode, index: i64) -> Plane {
        match mode.orientation() {
            Some(orientation) => Self::extract_planar(volume, orientation, index),
            None => Self::blank(volume),
        }
    }

    fn extract_planar(volume: &Volume, orientation: Orientation, index: i64) -> Plane {
        let (width, height) = orientation.plane_dimensions(volume.dim());
        let aspect = Self::aspect(volume, orientation, width, height);
        let fixed = Self::clamp_index(volume, orientation.into(), index);

        // Views come out as (row, col) = (y, x), (z, x) or (z, y), matching
        // `plane_dimensions` in logical iteration order.
        let pixels = match volume.get_slice_from_axis(fixed, &orientation) {
            Some(view) => view.iter().copied().collect(),
            None => vec![0; width * height],
        };

        Plane {
            pixels,
            width,
            height,
            aspect,
        }
    }

    fn blank(volume: &Volume) -> Plane {
        let (width, height) = (volume.width(), volume.height());
        Plane {
            pixels: vec![0; width * height],
            width,
            height,
            aspect: Self::aspect(volume, Orientation::Axial, width, height),
        }
    }

    fn aspect(volume: &Volume, orientation: Orientation, width: usize, height: usize) -> f32 {
        let (col_spacing, row_spacing) = orientation.plane_spacing(volume.spacing());
        let physical_height = height as f32 * row_spacing;
        if physical_height <= 0.0 {
            return 1.0;
        }
        width as f32 * col_spacing / physical_height
    }
}

use crate::enums::Orientation;
use crate::slice_stack::{Slice, SliceStack};
use crate::windowing::Window;

use log::debug;
use ndarray::{Array3, ArrayView2, ShapeError, s};
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("No slices to build a volume from")]
    EmptyInput,

    #[error("Unsupported sample depth: {0} bits allocated")]
    UnsupportedSampleDepth(u16),

    #[error("Inconsistent slice dimensions at slice {0}")]
    InconsistentDimensions(usize),

    #[error("Slice {slice} holds {actual} bytes, expected {expected}")]
    TruncatedPixelData {
        slice: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
}

/// Dense voxel grid of a series, indexed `[z, y, x]`.
#[derive(Debug, Default)]
pub struct Volume {
    data: Array3<u16>,
    spacing: (f32, f32, f32),
}

impl Volume {
    pub fn new(data: Array3<u16>, spacing: (f32, f32, f32)) -> Self {
        // Force standard layout so the flat `z * w * h + y * w + x` indexing holds.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        Self { data, spacing }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn width(&self) -> usize {
        self.data.dim().2
    }

    pub fn height(&self) -> usize {
        self.data.dim().1
    }

    pub fn depth(&self) -> usize {
        self.data.dim().0
    }

    /// Voxel spacing (x, y, z) in mm
    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u16> {
        &self.data
    }

    /// Samples in `z * (width * height) + y * width + x` order.
    pub fn voxels(&self) -> &[u16] {
        self.data
            .as_slice()
            .expect("volume data is kept in standard layout")
    }

    pub fn sample(&self, x: usize, y: usize, z: usize) -> u16 {
        self.data[[z, y, x]]
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, u16>> {
        if index >= orientation.extent(self.dim()) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice_result)
    }

    /// Smallest and largest sample, `None` for an empty volume.
    pub fn value_range(&self) -> Option<(u16, u16)> {
        self.data.iter().fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
    }

    /// Window covering every sample of the volume.
    pub fn full_range_window(&self) -> Window {
        let (min, max) = self.value_range().unwrap_or((0, u16::MAX));
        Window::from_range(min, max)
    }
}

pub struct VolumeBuilder;

impl VolumeBuilder {
    /// Build a volume from a stack that is already ordered along z.
    ///
    /// # Errors
    ///
    /// Returns error if the stack is empty, a slice uses a bit depth other
    /// than 8 or 16, slice dimensions disagree, or a pixel buffer is short.
    pub fn build(stack: &SliceStack) -> Result<Volume, VolumeError> {
        let started = Instant::now();
        let first = stack.first().ok_or(VolumeError::EmptyInput)?;
        Self::validate_slices(stack.slices(), first)?;

        let (height, width) = (first.rows as usize, first.columns as usize);
        let depth = stack.len();
        let layer_len = width * height;

        let mut voxels = vec![0u16; depth * layer_len];
        if layer_len > 0 {
            voxels
                .par_chunks_mut(layer_len)
                .zip(stack.slices().par_iter())
                .enumerate()
                .try_for_each(|(index, (layer, slice))| Self::decode_into(index, slice, layer))?;
        }

        let data = Array3::from_shape_vec((depth, height, width), voxels)?;
        let volume = Volume::new(data, Self::get_spacing(stack, first));

        debug!(
            "built {}x{}x{} volume with spacing {:?} in {:?}",
            width,
            height,
            depth,
            volume.spacing(),
            started.elapsed()
        );
        Ok(volume)
    }

    fn validate_slices(slices: &[Slice], first: &Slice) -> Result<(), VolumeError> {
        for (index, slice) in slices.iter().enumerate() {
            if !matches!(slice.bits_allocated, 8 | 16) {
                return Err(VolumeError::UnsupportedSampleDepth(slice.bits_allocated));
            }
            if slice.rows != first.rows
                || slice.columns != first.columns
                || slice.bits_allocated != first.bits_allocated
            {
                return Err(VolumeError::InconsistentDimensions(index));
            }
        }
        Ok(())
    }

    /// Decode one slice into its z-layer. Signed samples keep their bit
    /// pattern.
    fn decode_into(index: usize, slice: &Slice, layer: &mut [u16]) -> Result<(), VolumeError> {
        let expected = layer.len() * slice.bytes_per_sample();
        if slice.pixels.len() < expected {
            return Err(VolumeError::TruncatedPixelData {
                slice: index,
                expected,
                actual: slice.pixels.len(),
            });
        }

        match slice.bits_allocated {
            8 => layer
                .iter_mut()
                .zip(&slice.pixels)
                .for_each(|(out, &byte)| *out = byte as u16),
            16 => layer
                .iter_mut()
                .zip(slice.pixels.chunks_exact(2))
                .for_each(|(out, pair)| *out = u16::from_le_bytes([pair[0], pair[1]])),
            bits => return Err(VolumeError::UnsupportedSampleDepth(bits)),
        }
        Ok(())
    }

    /// Spacing (x, y, z): column spacing, row spacing and slice thickness,
    /// with z falling back to the slice interval.
    fn get_spacing(stack: &SliceStack, first: &Slice) -> (f32, f32, f32) {
        let (row_spacing, column_spacing) = first.pixel_spacing;
        let z = first
            .slice_thickness
            .filter(|t| *t > 0.0)
            .or_else(|| {
                stack
                    .slice_interval()
                    .map(|d| d as f32)
                    .filter(|d| *d > 0.0)
            })
            .unwrap_or(1.0);
        (
            Self::positive_or_one(column_spacing),
            Self::positive_or_one(row_spacing),
            z,
        )
    }

    fn positive_or_one(value: f32) -> f32 {
        if value > 0.0 { value } else { 1.0 }
    }
}

use crate::windowing::Window;

/// One 2D image of a series together with the metadata needed to place it
/// in a volume.
#[derive(Clone, Debug, Default)]
pub struct Slice {
    /// Raw samples, row-major, `rows * columns * bits_allocated / 8` bytes.
    pub pixels: Vec<u8>,
    pub rows: u32,
    pub columns: u32,
    /// (row spacing, column spacing) in mm
    pub pixel_spacing: (f32, f32),
    pub slice_thickness: Option<f32>,
    pub bits_allocated: u16,
    pub signed: bool,
    /// Position along the slice normal (third component of the image position).
    pub position: f64,
    pub default_window: Option<Window>,
}

impl Slice {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_allocated as usize).div_ceil(8)
    }

    pub fn sample_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }
}

/// Slices ordered by ascending position along the through-plane axis.
#[derive(Clone, Debug, Default)]
pub struct SliceStack {
    slices: Vec<Slice>,
}

impl SliceStack {
    /// Wrap slices that the caller has already ordered.
    pub fn new(slices: Vec<Slice>) -> Self {
        Self { slices }
    }

    /// Order slices by ascending position.
    pub fn sorted(mut slices: Vec<Slice>) -> Self {
        slices.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { slices }
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn first(&self) -> Option<&Slice> {
        self.slices.first()
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Distance between the first two slices, if there are two.
    pub fn slice_interval(&self) -> Option<f64> {
        match self.slices.as_slice() {
            [first, second, ..] => Some((second.position - first.position).abs()),
            _ => None,
        }
    }
}

impl FromIterator<Slice> for SliceStack {
    fn from_iter<I: IntoIterator<Item = Slice>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

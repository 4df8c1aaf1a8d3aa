#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Number of slices along the fixed axis for a volume of
    /// `(depth, height, width)`.
    pub fn extent(&self, dim: (usize, usize, usize)) -> usize {
        let (depth, height, width) = dim;
        match self {
            Orientation::Axial => depth,
            Orientation::Coronal => height,
            Orientation::Sagittal => width,
        }
    }

    /// Plane size as (width, height) - standard image convention
    pub fn plane_dimensions(&self, dim: (usize, usize, usize)) -> (usize, usize) {
        let (depth, height, width) = dim;
        match self {
            // Looking down Z-axis: X is width, Y is height
            Orientation::Axial => (width, height),
            // Looking down Y-axis: X is width, Z is height
            Orientation::Coronal => (width, depth),
            // Looking down X-axis: Y is width, Z is height
            Orientation::Sagittal => (height, depth),
        }
    }

    /// Map a plane pixel `(col, row)` on slice `fixed` back to volume
    /// coordinates `(x, y, z)`.
    pub fn voxel_at(&self, col: usize, row: usize, fixed: usize) -> (usize, usize, usize) {
        match self {
            Orientation::Axial => (col, row, fixed),
            Orientation::Coronal => (col, fixed, row),
            Orientation::Sagittal => (fixed, col, row),
        }
    }

    /// Physical pixel size of the plane as (column spacing, row spacing),
    /// given the volume spacing `(x, y, z)`.
    pub fn plane_spacing(&self, spacing: (f32, f32, f32)) -> (f32, f32) {
        let (x, y, z) = spacing;
        match self {
            Orientation::Axial => (x, y),
            Orientation::Coronal => (x, z),
            Orientation::Sagittal => (y, z),
        }
    }
}

/// What a single viewport shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMode {
    #[default]
    None,
    Axial,
    Coronal,
    Sagittal,
    Volume3D,
}

impl RenderMode {
    /// The planar orientation behind this mode, if it has one.
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            RenderMode::Axial => Some(Orientation::Axial),
            RenderMode::Coronal => Some(Orientation::Coronal),
            RenderMode::Sagittal => Some(Orientation::Sagittal),
            RenderMode::None | RenderMode::Volume3D => None,
        }
    }

    /// Extent that bounds the slice index in this mode. Non-planar modes
    /// fall back to the axial extent.
    pub fn extent(&self, dim: (usize, usize, usize)) -> usize {
        self.orientation().unwrap_or(Orientation::Axial).extent(dim)
    }
}

impl From<Orientation> for RenderMode {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Axial => RenderMode::Axial,
            Orientation::Coronal => RenderMode::Coronal,
            Orientation::Sagittal => RenderMode::Sagittal,
        }
    }
}

#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

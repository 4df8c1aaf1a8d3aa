//! # DICOM-MPR library
//!
//! This crate turns a stack of DICOM slices into a volume and displays
//! cross-sections of it through wgpu.
//!
//! A [`SliceStack`] (usually produced by [`StackLoader`]) is built into a
//! dense [`Volume`] by [`VolumeBuilder`]. [`SliceExtractor`] cuts planes out
//! of the volume in the three medical axes:
//!  - Axial
//!  - Coronal
//!  - Sagittal
//!
//! Planes are mapped to 8-bit grey with a window (center/width) and handed
//! to a [`RenderLoop`], which uploads them through a [`GpuResourceManager`]
//! and presents them once per host frame. One render loop drives one
//! viewport; a four-view layout runs four independent loops.
//!
//! DICOM files are assumed to have the following attributes:
//!   - Axial data set
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series and acquisition
//!
//! # Examples
//!
//! ## Extracting a windowed plane on the CPU
//!
//! ```no_run
//! # use dicom_mpr::{SliceExtractor, StackLoader, VolumeBuilder, RenderMode, SortBy, windowing};
//! let stack = StackLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded files from directory");
//! let volume = VolumeBuilder::build(&stack).expect("should have built a volume");
//! let plane = SliceExtractor::extract(&volume, RenderMode::Coronal, volume.height() as i64 / 2);
//! let grey = windowing::apply(&plane.pixels, 40.0, 400.0).expect("window is valid");
//! image::GrayImage::from_raw(plane.width as u32, plane.height as u32, grey)
//!     .expect("plane size matches")
//!     .save("coronal.png")
//!     .expect("should have written image");
//! ```
//!
//! ## Driving a viewport
//!
//! ```no_run
//! # use dicom_mpr::{GpuResourceManager, RenderLoop, RenderMode, RendererConfig, SliceStack};
//! # async fn run(window: impl Into<wgpu::SurfaceTarget<'static>>, stack: SliceStack) {
//! let config = RendererConfig::default();
//! let gpu = GpuResourceManager::create_device(window, 512, 512, &config)
//!     .await
//!     .expect("should have found a GPU");
//! let mut viewport = RenderLoop::new(gpu);
//! viewport.initialize().await.expect("shaders should compile");
//! viewport.set_series(&stack, RenderMode::Axial).expect("stack should build");
//! // Once per host frame:
//! viewport.tick().expect("frame should render");
//! # }
//! ```

pub mod config;
pub mod enums;
pub mod extractor;
pub mod renderer;
pub mod slice_stack;
pub mod stack_loader;
pub mod volume;
pub mod windowing;

pub use config::RendererConfig;
pub use enums::{Orientation, RenderMode, SortBy};
pub use extractor::{Plane, SliceExtractor};
pub use renderer::{
    GpuError, GpuResourceManager, RenderBackend, RenderError, RenderLoop, RenderState,
};
pub use slice_stack::{Slice, SliceStack};
pub use stack_loader::{StackLoader, StackLoaderError};
pub use volume::{Volume, VolumeBuilder, VolumeError};
pub use windowing::{Window, WindowError};

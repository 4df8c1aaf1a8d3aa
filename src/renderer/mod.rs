//! GPU display of extracted planes.
//!
//! [`GpuResourceManager`] owns the wgpu objects of one viewport and
//! [`RenderLoop`] drives it once per host frame. The loop only talks to the
//! GPU through [`RenderBackend`], so the state machine can run against any
//! backend that can take a plane and present it.

use std::future::Future;

use crate::volume::Volume;

pub mod gpu;
pub mod render_loop;
pub mod viewport;

pub use gpu::{GpuError, GpuResourceManager};
pub use render_loop::{RenderError, RenderLoop, RenderState};
pub use viewport::{Viewport, fit_viewport};

pub trait RenderBackend {
    /// Compile shaders and build the quad pipeline and sampler.
    fn create_pipeline(&mut self) -> impl Future<Output = Result<(), GpuError>>;

    /// Replace the displayed plane with `width` x `height` grey samples.
    fn upload_plane(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), GpuError>;

    /// Make the whole volume resident as a 3D texture.
    fn upload_volume(&mut self, volume: &Volume) -> Result<(), GpuError>;

    /// Drop the resident 3D texture, if any.
    fn release_volume(&mut self);

    /// Physical aspect of the displayed plane, `None` to stretch.
    fn set_aspect(&mut self, aspect: Option<f32>);

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError>;

    /// Draw the current plane and present.
    fn present(&mut self) -> Result<(), GpuError>;

    /// Present a frame holding only the background colour.
    fn present_idle(&mut self) -> Result<(), GpuError>;

    fn dispose(&mut self);
}

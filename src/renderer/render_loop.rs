use log::{debug, info, warn};
use thiserror::Error;

use crate::enums::RenderMode;
use crate::extractor::SliceExtractor;
use crate::renderer::{GpuError, RenderBackend};
use crate::slice_stack::SliceStack;
use crate::volume::{Volume, VolumeBuilder, VolumeError};
use crate::windowing::{Window, WindowError};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("Renderer has not been initialized")]
    NotInitialized,

    #[error("Renderer has been disposed")]
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderState {
    Uninitialized,
    Ready,
    Rendering,
    Disposed,
}

/// Everything derived from one loaded series. Replaced as a whole.
struct Scene {
    volume: Volume,
    default_window: Window,
}

/// Per-viewport frame driver.
pub struct RenderLoop<B: RenderBackend> {
    backend: B,
    state: RenderState,
    mode: RenderMode,
    scene: Option<Scene>,
    window_override: Option<Window>,
    slice_index: usize,
    // Plane on the GPU is out of date
    dirty: bool,
}

impl<B: RenderBackend> RenderLoop<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: RenderState::Uninitialized,
            mode: RenderMode::None,
            scene: None,
            window_override: None,
            slice_index: 0,
            dirty: true,
        }
    }

    /// Build the backend pipeline and move to [`RenderState::Ready`].
    pub async fn initialize(&mut self) -> Result<(), RenderError> {
        match self.state {
            RenderState::Uninitialized => {
                self.backend.create_pipeline().await?;
                self.state = RenderState::Ready;
                info!("renderer ready");
                Ok(())
            }
            RenderState::Disposed => Err(RenderError::Disposed),
            RenderState::Ready | RenderState::Rendering => Ok(()),
        }
    }

    /// Rebuild the volume from `stack` and show it in `mode`.
    ///
    /// # Errors
    ///
    /// Propagates [`VolumeError`] from the build; the previously loaded
    /// series stays on screen in that case.
    pub fn set_series(&mut self, stack: &SliceStack, mode: RenderMode) -> Result<(), RenderError> {
        if self.state == RenderState::Disposed {
            return Err(RenderError::Disposed);
        }

        let volume = VolumeBuilder::build(stack)?;
        let default_window = match stack.first().and_then(|slice| slice.default_window) {
            Some(window) => window,
            None => {
                let window = volume.full_range_window();
                warn!(
                    "series carries no window, using full range (center {}, width {})",
                    window.center(),
                    window.width()
                );
                window
            }
        };
        if mode == RenderMode::Volume3D {
            self.backend.upload_volume(&volume)?;
        } else {
            self.backend.release_volume();
        }

        let (depth, height, width) = volume.dim();
        self.scene = Some(Scene {
            volume,
            default_window,
        });
        self.mode = mode;
        self.clamp_slice_index();
        self.dirty = true;
        info!(
            "loaded {}x{}x{} series in {:?} mode at slice {}",
            width, height, depth, mode, self.slice_index
        );
        Ok(())
    }

    pub fn set_mode(&mut self, mode: RenderMode) -> Result<(), RenderError> {
        if self.state == RenderState::Disposed {
            return Err(RenderError::Disposed);
        }
        if mode == RenderMode::Volume3D && self.mode != mode {
            if let Some(scene) = &self.scene {
                self.backend.upload_volume(&scene.volume)?;
            }
        }
        self.mode = mode;
        self.clamp_slice_index();
        self.dirty = true;
        Ok(())
    }

    /// Select the slice along the current axis, clamped to the volume.
    pub fn set_slice(&mut self, index: i64) {
        let clamped = match &self.scene {
            Some(scene) => SliceExtractor::clamp_index(&scene.volume, self.mode, index),
            None => index.max(0) as usize,
        };
        if clamped != self.slice_index {
            self.slice_index = clamped;
            self.dirty = true;
        }
    }

    /// Override the series window.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::InvalidWindow`] for a non-positive width and
    /// keeps the current window.
    pub fn set_window(&mut self, center: f64, width: f64) -> Result<(), RenderError> {
        let window = Window::new(center, width)?;
        self.window_override = Some(window);
        self.dirty = true;
        Ok(())
    }

    /// Drop the override and go back to the series default window.
    pub fn reset_window(&mut self) {
        if self.window_override.take().is_some() {
            self.dirty = true;
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.state == RenderState::Disposed {
            debug!("resize after dispose ignored");
            return Ok(());
        }
        self.backend.resize(width, height)?;
        Ok(())
    }

    /// Render one frame.
    pub fn tick(&mut self) -> Result<(), RenderError> {
        match self.state {
            RenderState::Uninitialized => return Err(RenderError::NotInitialized),
            RenderState::Disposed => return Err(RenderError::Disposed),
            RenderState::Ready | RenderState::Rendering => {}
        }
        self.state = RenderState::Rendering;

        let Some(scene) = &self.scene else {
            self.backend.present_idle()?;
            return Ok(());
        };

        if self.dirty {
            let plane = SliceExtractor::extract(&scene.volume, self.mode, self.slice_index as i64);
            let window = self.window_override.unwrap_or(scene.default_window);
            let bytes = plane.windowed(&window);
            self.backend
                .upload_plane(&bytes, plane.width as u32, plane.height as u32)?;
            self.backend.set_aspect(Some(plane.aspect));
            self.dirty = false;
        }
        self.backend.present()?;
        Ok(())
    }

    /// Release the backend. Terminal; later ticks are rejected.
    pub fn dispose(&mut self) {
        if self.state == RenderState::Disposed {
            return;
        }
        self.backend.dispose();
        self.scene = None;
        self.state = RenderState::Disposed;
        info!("renderer disposed");
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    /// Window in effect: the override if set, else the series default.
    pub fn window(&self) -> Option<Window> {
        self.window_override
            .or_else(|| self.scene.as_ref().map(|scene| scene.default_window))
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.scene.as_ref().map(|scene| &scene.volume)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn clamp_slice_index(&mut self) {
        if let Some(scene) = &self.scene {
            self.slice_index =
                SliceExtractor::clamp_index(&scene.volume, self.mode, self.slice_index as i64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice_stack::Slice;

    #[derive(Debug, PartialEq)]
    enum Call {
        CreatePipeline,
        UploadPlane(Vec<u8>, u32, u32),
        UploadVolume((usize, usize, usize)),
        ReleaseVolume,
        Resize(u32, u32),
        Present,
        PresentIdle,
        Dispose,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        fail_pipeline: bool,
        // (depth, height, width, first sample) of the resident 3D texture
        resident_volume: Option<(usize, usize, usize, u16)>,
    }

    impl Recorder {
        fn uploads(&self) -> Vec<&Vec<u8>> {
            self.calls
                .iter()
                .filter_map(|call| match call {
                    Call::UploadPlane(bytes, ..) => Some(bytes),
                    _ => None,
                })
                .collect()
        }
    }

    impl RenderBackend for Recorder {
        async fn create_pipeline(&mut self) -> Result<(), GpuError> {
            if self.fail_pipeline {
                return Err(GpuError::PipelineBuild("vertex shader: broken".to_string()));
            }
            self.calls.push(Call::CreatePipeline);
            Ok(())
        }

        fn upload_plane(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), GpuError> {
            self.calls.push(Call::UploadPlane(bytes.to_vec(), width, height));
            Ok(())
        }

        fn upload_volume(&mut self, volume: &Volume) -> Result<(), GpuError> {
            self.calls.push(Call::UploadVolume(volume.dim()));
            let (depth, height, width) = volume.dim();
            self.resident_volume = Some((depth, height, width, volume.sample(0, 0, 0)));
            Ok(())
        }

        fn release_volume(&mut self) {
            self.calls.push(Call::ReleaseVolume);
            self.resident_volume = None;
        }

        fn set_aspect(&mut self, _aspect: Option<f32>) {}

        fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
            self.calls.push(Call::Resize(width, height));
            Ok(())
        }

        fn present(&mut self) -> Result<(), GpuError> {
            self.calls.push(Call::Present);
            Ok(())
        }

        fn present_idle(&mut self) -> Result<(), GpuError> {
            self.calls.push(Call::PresentIdle);
            Ok(())
        }

        fn dispose(&mut self) {
            self.calls.push(Call::Dispose);
        }
    }

    /// `depth` 8-bit slices of 2x2, every sample of slice z equal to `base + z`.
    fn stack(depth: u8, base: u8, window: Option<Window>) -> SliceStack {
        (0..depth)
            .map(|z| Slice {
                pixels: vec![base + z; 4],
                rows: 2,
                columns: 2,
                pixel_spacing: (1.0, 1.0),
                slice_thickness: Some(1.0),
                bits_allocated: 8,
                position: z as f64,
                default_window: window,
                ..Default::default()
            })
            .collect()
    }

    async fn ready_loop() -> RenderLoop<Recorder> {
        let mut render_loop = RenderLoop::new(Recorder::default());
        render_loop.initialize().await.unwrap();
        render_loop
    }

    #[tokio::test]
    async fn initialize_moves_to_ready() {
        let mut render_loop = RenderLoop::new(Recorder::default());
        assert_eq!(render_loop.state(), RenderState::Uninitialized);
        assert!(matches!(render_loop.tick(), Err(RenderError::NotInitialized)));

        render_loop.initialize().await.unwrap();
        assert_eq!(render_loop.state(), RenderState::Ready);
        render_loop.initialize().await.unwrap();
        assert_eq!(render_loop.backend().calls, vec![Call::CreatePipeline]);
    }

    #[tokio::test]
    async fn pipeline_failure_keeps_uninitialized() {
        let mut render_loop = RenderLoop::new(Recorder {
            fail_pipeline: true,
            ..Default::default()
        });
        let result = render_loop.initialize().await;
        assert!(matches!(result, Err(RenderError::Gpu(GpuError::PipelineBuild(_)))));
        assert_eq!(render_loop.state(), RenderState::Uninitialized);
    }

    #[tokio::test]
    async fn idle_frame_without_series() {
        let mut render_loop = ready_loop().await;
        render_loop.tick().unwrap();
        assert_eq!(render_loop.state(), RenderState::Rendering);
        assert_eq!(render_loop.backend().calls.last(), Some(&Call::PresentIdle));
    }

    #[tokio::test]
    async fn plane_is_uploaded_once_until_changed() {
        let mut render_loop = ready_loop().await;
        let window = Window::new(127.5, 255.0).ok();
        render_loop
            .set_series(&stack(3, 10, window), RenderMode::Axial)
            .unwrap();
        render_loop.tick().unwrap();
        render_loop.tick().unwrap();
        assert_eq!(render_loop.backend().uploads().len(), 1);

        render_loop.set_slice(2);
        render_loop.tick().unwrap();
        let uploads = render_loop.backend().uploads();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1], &vec![12; 4]);
        assert_eq!(render_loop.backend().calls.last(), Some(&Call::Present));
    }

    #[tokio::test]
    async fn slice_index_is_clamped() {
        let mut render_loop = ready_loop().await;
        render_loop.set_slice(40);
        render_loop
            .set_series(&stack(3, 0, None), RenderMode::Axial)
            .unwrap();
        assert_eq!(render_loop.slice_index(), 2);
        render_loop.set_slice(-4);
        assert_eq!(render_loop.slice_index(), 0);
        render_loop.set_slice(7);
        render_loop.set_mode(RenderMode::Sagittal).unwrap();
        assert_eq!(render_loop.slice_index(), 1);
    }

    #[tokio::test]
    async fn invalid_window_keeps_previous() {
        let mut render_loop = ready_loop().await;
        render_loop.set_window(40.0, 400.0).unwrap();
        let result = render_loop.set_window(40.0, 0.0);
        assert!(matches!(result, Err(RenderError::Window(_))));
        assert_eq!(render_loop.window(), Window::new(40.0, 400.0).ok());

        render_loop
            .set_series(&stack(1, 0, Window::new(5.0, 10.0).ok()), RenderMode::Axial)
            .unwrap();
        assert_eq!(render_loop.window(), Window::new(40.0, 400.0).ok());
        render_loop.reset_window();
        assert_eq!(render_loop.window(), Window::new(5.0, 10.0).ok());
    }

    #[tokio::test]
    async fn missing_window_falls_back_to_range() {
        let mut render_loop = ready_loop().await;
        render_loop
            .set_series(&stack(4, 100, None), RenderMode::Axial)
            .unwrap();
        assert_eq!(render_loop.window().map(|w| w.bounds()), Some((100.0, 103.0)));
    }

    #[tokio::test]
    async fn failed_series_keeps_previous_volume() {
        let mut render_loop = ready_loop().await;
        render_loop
            .set_series(&stack(2, 0, None), RenderMode::Axial)
            .unwrap();
        let result = render_loop.set_series(&SliceStack::default(), RenderMode::Coronal);
        assert!(matches!(result, Err(RenderError::Volume(VolumeError::EmptyInput))));
        assert_eq!(render_loop.mode(), RenderMode::Axial);
        assert_eq!(render_loop.volume().map(Volume::dim), Some((2, 2, 2)));
    }

    #[tokio::test]
    async fn second_series_replaces_first() {
        let mut render_loop = ready_loop().await;
        let window = Window::new(127.5, 255.0).ok();
        render_loop
            .set_series(&stack(2, 50, window), RenderMode::Axial)
            .unwrap();
        render_loop.tick().unwrap();
        render_loop
            .set_series(&stack(2, 200, window), RenderMode::Axial)
            .unwrap();
        render_loop.tick().unwrap();
        let uploads = render_loop.backend().uploads();
        assert_eq!(uploads.last(), Some(&&vec![200; 4]));
        assert_eq!(render_loop.volume().map(|v| v.sample(0, 0, 0)), Some(200));
    }

    #[tokio::test]
    async fn volume_mode_uploads_3d_texture() {
        let mut render_loop = ready_loop().await;
        render_loop
            .set_series(&stack(3, 0, None), RenderMode::Volume3D)
            .unwrap();
        render_loop.tick().unwrap();
        let calls = &render_loop.backend().calls;
        assert!(calls.contains(&Call::UploadVolume((3, 2, 2))));
        assert!(calls.contains(&Call::UploadPlane(vec![0; 4], 2, 2)));
    }

    #[tokio::test]
    async fn planar_series_frees_previous_volume() {
        let mut render_loop = ready_loop().await;
        render_loop
            .set_series(&stack(3, 7, None), RenderMode::Volume3D)
            .unwrap();
        assert_eq!(render_loop.backend().resident_volume, Some((3, 2, 2, 7)));

        render_loop
            .set_series(&stack(3, 99, None), RenderMode::Axial)
            .unwrap();
        render_loop.tick().unwrap();
        assert_eq!(render_loop.backend().resident_volume, None);
        assert!(render_loop.backend().calls.contains(&Call::ReleaseVolume));
    }

    #[tokio::test]
    async fn resize_leaves_state_alone() {
        let mut render_loop = ready_loop().await;
        render_loop.resize(640, 480).unwrap();
        assert_eq!(render_loop.state(), RenderState::Ready);
        assert_eq!(render_loop.backend().calls.last(), Some(&Call::Resize(640, 480)));
    }

    #[tokio::test]
    async fn dispose_is_terminal_and_idempotent() {
        let mut render_loop = ready_loop().await;
        render_loop
            .set_series(&stack(2, 0, None), RenderMode::Axial)
            .unwrap();
        render_loop.dispose();
        render_loop.dispose();
        assert_eq!(render_loop.state(), RenderState::Disposed);
        assert!(render_loop.volume().is_none());
        assert!(matches!(render_loop.tick(), Err(RenderError::Disposed)));
        assert!(matches!(render_loop.initialize().await, Err(RenderError::Disposed)));
        let disposals = render_loop
            .backend()
            .calls
            .iter()
            .filter(|call| **call == Call::Dispose)
            .count();
        assert_eq!(disposals, 1);
    }
}

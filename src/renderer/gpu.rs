use std::borrow::Cow;

use log::{debug, info, warn};
use thiserror::Error;
use wgpu::{PollType, util::DeviceExt};

use crate::config::RendererConfig;
use crate::renderer::viewport::{Viewport, fit_viewport};
use crate::volume::Volume;

const QUAD_SHADER: &str = include_str!("shaders/quad.wgsl");
const PLANE_SHADER: &str = include_str!("shaders/plane.wgsl");

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No compatible hardware GPU: {0}")]
    DeviceInit(String),

    #[error("Shader pipeline failed to build:\n{0}")]
    PipelineBuild(String),

    #[error("Plane buffer holds {actual} bytes, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Render pipeline has not been created")]
    PipelineMissing,

    #[error("GPU resources have been disposed")]
    Disposed,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

// Triangle strip over the NDC corners, uv origin at the top left
const QUAD: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
];

impl QuadVertex {
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }
    }
}

struct GpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

enum Presentation {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        width: u32,
        height: u32,
    },
}

impl Presentation {
    fn format(&self) -> wgpu::TextureFormat {
        match self {
            Presentation::Surface { config, .. } => config.format,
            Presentation::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            Presentation::Surface { config, .. } => (config.width, config.height),
            Presentation::Offscreen { width, height, .. } => (*width, *height),
        }
    }
}

// Fields drop in declaration order: pipeline objects before their inputs.
struct PlanePipeline {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
}

impl PlanePipeline {
    fn release(self) {
        let PlanePipeline {
            pipeline,
            bind_group_layout,
            sampler,
            quad,
        } = self;
        drop(pipeline);
        drop(bind_group_layout);
        drop(sampler);
        quad.destroy();
    }
}

struct DisplayTexture {
    bind_group: wgpu::BindGroup,
    view: wgpu::TextureView,
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

impl DisplayTexture {
    fn release(self) {
        let DisplayTexture {
            bind_group,
            view,
            texture,
            ..
        } = self;
        drop(bind_group);
        drop(view);
        texture.destroy();
    }
}

struct VolumeTexture {
    view: wgpu::TextureView,
    texture: wgpu::Texture,
    dimensions: (u32, u32, u32), // (depth, height, width)
}

impl VolumeTexture {
    fn release(self) {
        drop(self.view);
        self.texture.destroy();
    }
}

/// Owns every GPU object of one viewport: device, presentation chain,
/// render target, display and volume textures, shaders and sampler.
pub struct GpuResourceManager {
    display: Option<DisplayTexture>,
    volume: Option<VolumeTexture>,
    pipeline: Option<PlanePipeline>,
    target_view: Option<wgpu::TextureView>,
    presentation: Option<Presentation>,
    gpu: Option<GpuContext>,
    clear_color: wgpu::Color,
    preserve_aspect: bool,
    aspect: Option<f32>,
}

impl GpuResourceManager {
    /// Acquire a hardware device bound to `target` and configure its
    /// presentation chain for `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::DeviceInit`] if the surface cannot be created or no
    /// compatible hardware adapter exists.
    pub async fn create_device(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(target)
            .map_err(|err| GpuError::DeviceInit(err.to_string()))?;
        let gpu = Self::request_gpu(&instance, Some(&surface), config, false).await?;

        let caps = surface.get_capabilities(&gpu.adapter);
        // Linear format so windowed grey values reach the screen unchanged
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| GpuError::DeviceInit("surface reports no formats".to_string()))?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: config.frame_latency(),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&gpu.device, &surface_config);
        debug!(
            "configured surface {}x{} {:?}, {} frames latency",
            surface_config.width,
            surface_config.height,
            format,
            surface_config.desired_maximum_frame_latency
        );

        Ok(Self::with_presentation(
            gpu,
            Presentation::Surface {
                surface,
                config: surface_config,
            },
            None,
            config,
        ))
    }

    /// Like [`create_device`](Self::create_device) but renders into an
    /// offscreen RGBA8 target that can be read back. Software adapters are
    /// accepted when `config.allow_software_adapter` is set.
    pub async fn create_headless(
        width: u32,
        height: u32,
        config: &RendererConfig,
    ) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let gpu =
            Self::request_gpu(&instance, None, config, config.allow_software_adapter).await?;
        let (width, height) = (width.max(1), height.max(1));
        let texture = Self::create_target_texture(&gpu.device, width, height);
        let target_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self::with_presentation(
            gpu,
            Presentation::Offscreen {
                texture,
                width,
                height,
            },
            Some(target_view),
            config,
        ))
    }

    fn with_presentation(
        gpu: GpuContext,
        presentation: Presentation,
        target_view: Option<wgpu::TextureView>,
        config: &RendererConfig,
    ) -> Self {
        Self {
            display: None,
            volume: None,
            pipeline: None,
            target_view,
            presentation: Some(presentation),
            gpu: Some(gpu),
            clear_color: config.clear_color(),
            preserve_aspect: config.preserve_aspect,
            aspect: None,
        }
    }

    async fn request_gpu(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        config: &RendererConfig,
        allow_software: bool,
    ) -> Result<GpuContext, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.into(),
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| GpuError::DeviceInit(err.to_string()))?;

        let adapter_info = adapter.get_info();
        if adapter_info.device_type == wgpu::DeviceType::Cpu && !allow_software {
            return Err(GpuError::DeviceInit(format!(
                "only software adapter {} is available",
                adapter_info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("MPR Device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(|err| GpuError::DeviceInit(err.to_string()))?;

        info!(
            "using adapter {} ({:?}, {:?})",
            adapter_info.name, adapter_info.device_type, adapter_info.backend
        );
        Ok(GpuContext {
            adapter,
            device,
            queue,
        })
    }

    fn create_target_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Render Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    /// Build the quad pipeline from the bundled shaders.
    pub async fn create_pipeline(&mut self) -> Result<(), GpuError> {
        self.create_pipeline_from_sources(QUAD_SHADER, PLANE_SHADER)
            .await
    }

    /// Build the quad pipeline from WGSL sources. The vertex source must
    /// provide `vs_main`, the fragment source `fs_main`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::PipelineBuild`] carrying the diagnostics of both
    /// stages if either fails to compile or the pipeline fails validation.
    pub async fn create_pipeline_from_sources(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<(), GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        let format = self
            .presentation
            .as_ref()
            .ok_or(GpuError::Disposed)?
            .format();
        let device = &gpu.device;

        let (vertex_module, vertex_error) =
            Self::compile_stage(device, "Quad Vertex Shader", vertex_source).await;
        let (fragment_module, fragment_error) =
            Self::compile_stage(device, "Plane Fragment Shader", fragment_source).await;

        let mut report = Vec::new();
        if let Some(error) = vertex_error {
            report.push(Self::stage_report("vertex", &vertex_module, &error).await);
        }
        if let Some(error) = fragment_error {
            report.push(Self::stage_report("fragment", &fragment_module, &error).await);
        }
        if !report.is_empty() {
            return Err(GpuError::PipelineBuild(report.join("\n")));
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Plane Bind Group Layout"),
            entries: &[
                // Display texture
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Plane Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Plane Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(GpuError::PipelineBuild(error.to_string()));
        }

        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });

        // Linear filtering, clamped at the plane border
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        if let Some(old) = self.pipeline.replace(PlanePipeline {
            pipeline,
            bind_group_layout,
            sampler,
            quad,
        }) {
            old.release();
        }
        // Bind groups belong to the old layout
        if let Some(display) = self.display.take() {
            display.release();
        }
        debug!("plane pipeline ready for {:?}", format);
        Ok(())
    }

    async fn compile_stage(
        device: &wgpu::Device,
        label: &str,
        source: &str,
    ) -> (wgpu::ShaderModule, Option<wgpu::Error>) {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let error = device.pop_error_scope().await;
        (module, error)
    }

    /// Compiler messages of one failed stage, prefixed with the stage name.
    async fn stage_report(stage: &str, module: &wgpu::ShaderModule, error: &wgpu::Error) -> String {
        let compilation_info = module.get_compilation_info().await;
        let lines: Vec<String> = compilation_info
            .messages
            .iter()
            .filter(|message| matches!(message.message_type, wgpu::CompilationMessageType::Error))
            .map(|message| match &message.location {
                Some(location) => format!(
                    "{stage} shader {}:{}: {}",
                    location.line_number, location.line_position, message.message
                ),
                None => format!("{stage} shader: {}", message.message),
            })
            .collect();
        if lines.is_empty() {
            format!("{stage} shader: {error}")
        } else {
            lines.join("\n")
        }
    }

    /// Copy a `width` x `height` single-channel plane into the display
    /// texture, recreating the texture when its size changes.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::SizeMismatch`] if `bytes` does not hold exactly
    /// `width * height` samples.
    pub fn upload_plane(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), GpuError> {
        if bytes.len() != width as usize * height as usize {
            return Err(GpuError::SizeMismatch {
                width,
                height,
                actual: bytes.len(),
            });
        }
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        let pipeline = self.pipeline.as_ref().ok_or(GpuError::PipelineMissing)?;
        if width == 0 || height == 0 {
            if let Some(display) = self.display.take() {
                display.release();
            }
            return Ok(());
        }

        let stale = self
            .display
            .as_ref()
            .is_none_or(|display| display.width != width || display.height != height);
        if stale {
            if let Some(old) = self.display.take() {
                old.release();
            }
            self.display = Some(Self::create_display_texture(
                &gpu.device,
                pipeline,
                width,
                height,
            ));
            debug!("created {}x{} display texture", width, height);
        }

        let Some(display) = self.display.as_ref() else {
            return Err(GpuError::PipelineMissing);
        };
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &display.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_display_texture(
        device: &wgpu::Device,
        pipeline: &PlanePipeline,
        width: u32,
        height: u32,
    ) -> DisplayTexture {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Plane Display Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Plane Bind Group"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
            ],
        });
        DisplayTexture {
            bind_group,
            view,
            texture,
            width,
            height,
        }
    }

    /// Upload the whole volume as an `R16Uint` 3D texture, replacing the
    /// previous one. Volumes beyond the device's 3D limit are skipped.
    pub fn upload_volume(&mut self, volume: &Volume) -> Result<(), GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        if let Some(old) = self.volume.take() {
            old.release();
        }

        let (depth, height, width) = volume.dim();
        if depth == 0 || height == 0 || width == 0 {
            return Ok(());
        }
        let max_dimension = gpu.device.limits().max_texture_dimension_3d as usize;
        if depth.max(height).max(width) > max_dimension {
            warn!(
                "volume {}x{}x{} exceeds the 3D texture limit of {}, not uploading",
                width, height, depth, max_dimension
            );
            return Ok(());
        }
        let (depth, height, width) = (depth as u32, height as u32, width as u32);

        let texture_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume 3D Texture"),
            size: texture_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R16Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(volume.voxels()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * std::mem::size_of::<u16>() as u32),
                rows_per_image: Some(height),
            },
            texture_size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.volume = Some(VolumeTexture {
            view,
            texture,
            dimensions: (depth, height, width),
        });
        debug!("uploaded {}x{}x{} volume texture", width, height, depth);
        Ok(())
    }

    /// Free the 3D texture of the previous series.
    pub fn release_volume(&mut self) {
        if let Some(volume) = self.volume.take() {
            volume.release();
            debug!("released volume texture");
        }
    }

    /// Physical aspect of the current plane, `None` to stretch.
    pub fn set_aspect(&mut self, aspect: Option<f32>) {
        self.aspect = aspect;
    }

    /// Resize the presentation chain. Zero dimensions are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if width == 0 || height == 0 {
            debug!("ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        let presentation = self.presentation.as_mut().ok_or(GpuError::Disposed)?;

        // Views go before the buffers they point at
        self.target_view = None;
        match presentation {
            Presentation::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&gpu.device, config);
            }
            Presentation::Offscreen {
                texture,
                width: target_width,
                height: target_height,
            } => {
                texture.destroy();
                *texture = Self::create_target_texture(&gpu.device, width, height);
                *target_width = width;
                *target_height = height;
                self.target_view =
                    Some(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            }
        }
        debug!("resized render target to {}x{}", width, height);
        Ok(())
    }

    /// Draw the display texture over the full-screen quad and present with
    /// vsync.
    pub fn present(&mut self) -> Result<(), GpuError> {
        if self.pipeline.is_none() {
            return Err(if self.gpu.is_none() {
                GpuError::Disposed
            } else {
                GpuError::PipelineMissing
            });
        }
        self.render_frame(true)
    }

    /// Clear to the background colour and present.
    pub fn present_idle(&mut self) -> Result<(), GpuError> {
        self.render_frame(false)
    }

    fn render_frame(&mut self, draw_plane: bool) -> Result<(), GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        let presentation = self.presentation.as_ref().ok_or(GpuError::Disposed)?;
        let (target_width, target_height) = presentation.size();

        let frame = match presentation {
            Presentation::Surface { surface, config } => match surface.get_current_texture() {
                Ok(frame) => Some(frame),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    warn!("surface lost, reconfiguring and skipping frame");
                    surface.configure(&gpu.device, config);
                    return Ok(());
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("timed out acquiring frame");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            },
            Presentation::Offscreen { .. } => None,
        };

        let frame_view = frame
            .as_ref()
            .map(|frame| frame.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let Some(view) = frame_view.as_ref().or(self.target_view.as_ref()) else {
            return Err(GpuError::Disposed);
        };

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Plane Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Plane Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (true, Some(pipeline), Some(display)) =
                (draw_plane, self.pipeline.as_ref(), self.display.as_ref())
            {
                let viewport = self.plane_viewport(target_width, target_height);
                render_pass.set_viewport(
                    viewport.x,
                    viewport.y,
                    viewport.width,
                    viewport.height,
                    0.0,
                    1.0,
                );
                render_pass.set_pipeline(&pipeline.pipeline);
                render_pass.set_bind_group(0, &display.bind_group, &[]);
                render_pass.set_vertex_buffer(0, pipeline.quad.slice(..));
                render_pass.draw(0..QUAD.len() as u32, 0..1);
            }
        }
        gpu.queue.submit(Some(encoder.finish()));

        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn plane_viewport(&self, target_width: u32, target_height: u32) -> Viewport {
        match self.aspect {
            Some(aspect) if self.preserve_aspect => {
                fit_viewport(target_width, target_height, aspect)
            }
            _ => Viewport::full(target_width, target_height),
        }
    }

    /// Read the offscreen render target back as tightly packed RGBA8 rows.
    pub async fn read_back(&self) -> Result<Vec<u8>, GpuError> {
        let gpu = self.gpu.as_ref().ok_or(GpuError::Disposed)?;
        let Some(Presentation::Offscreen {
            texture,
            width,
            height,
        }) = self.presentation.as_ref()
        else {
            return Err(GpuError::Readback(
                "only offscreen targets can be read back".to_string(),
            ));
        };
        let (width, height) = (*width, *height);

        let unpadded_bytes_per_row = width * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|err| GpuError::Readback(err.to_string()))?;
        receiver
            .await
            .map_err(|err| GpuError::Readback(err.to_string()))?
            .map_err(|err| GpuError::Readback(err.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let pixels: Vec<u8> = data
            .chunks_exact(padded_bytes_per_row as usize)
            .flat_map(|row| &row[..unpadded_bytes_per_row as usize])
            .copied()
            .collect();
        drop(data);
        staging_buffer.unmap();
        Ok(pixels)
    }

    /// Current render target size.
    pub fn target_size(&self) -> Option<(u32, u32)> {
        self.presentation.as_ref().map(Presentation::size)
    }

    /// Size of the display texture, if one has been uploaded.
    pub fn display_size(&self) -> Option<(u32, u32)> {
        self.display
            .as_ref()
            .map(|display| (display.width, display.height))
    }

    /// (depth, height, width) of the resident volume texture.
    pub fn volume_dimensions(&self) -> Option<(u32, u32, u32)> {
        self.volume.as_ref().map(|volume| volume.dimensions)
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.gpu.is_none()
    }

    /// Release every GPU object, views before resources and resources before
    /// the device. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(display) = self.display.take() {
            display.release();
        }
        if let Some(volume) = self.volume.take() {
            volume.release();
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.release();
        }
        self.target_view = None;
        if let Some(presentation) = self.presentation.take() {
            if let Presentation::Offscreen { texture, .. } = &presentation {
                texture.destroy();
            }
            drop(presentation);
        }
        if let Some(gpu) = self.gpu.take() {
            gpu.device.destroy();
            info!("released GPU device");
        }
    }
}

impl Drop for GpuResourceManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl super::RenderBackend for GpuResourceManager {
    async fn create_pipeline(&mut self) -> Result<(), GpuError> {
        Self::create_pipeline(self).await
    }

    fn upload_plane(&mut self, bytes: &[u8], width: u32, height: u32) -> Result<(), GpuError> {
        Self::upload_plane(self, bytes, width, height)
    }

    fn upload_volume(&mut self, volume: &Volume) -> Result<(), GpuError> {
        Self::upload_volume(self, volume)
    }

    fn release_volume(&mut self) {
        Self::release_volume(self)
    }

    fn set_aspect(&mut self, aspect: Option<f32>) {
        Self::set_aspect(self, aspect)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        Self::resize(self, width, height)
    }

    fn present(&mut self) -> Result<(), GpuError> {
        Self::present(self)
    }

    fn present_idle(&mut self) -> Result<(), GpuError> {
        Self::present_idle(self)
    }

    fn dispose(&mut self) {
        Self::dispose(self)
    }
}

//! The single native-target implementation of the backend operation table.

mod blit;
mod draw;
mod frame;
mod memory;
mod pipeline;
mod readback;
mod shader;
mod texture;
mod translate;

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::Path;

use tracing::{debug, warn};

use glaze_gpu::DeviceCaps;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::handle::{Handle, HandleTable, NONE_HANDLE};
use crate::ops::GlesBackend;
use crate::types::*;

use blit::MipBlitter;
use frame::{FaultFlag, FrameScheduler};
use memory::MemoryRegions;
use pipeline::PipelineCache;
use shader::{ProgramRecord, ShaderRecord, UniformBlock};
use texture::{RenderbufferRecord, TextureRecord};

/// Fixed maximum number of vertex attributes the draw assembler consolidates.
pub const MAX_VERTEX_ATTRIBS: usize = 16;
/// Sampling units for 2D textures.
pub const MAX_TEXTURE_UNITS: usize = 8;
/// Sampling units for cubemaps.
pub const MAX_CUBE_UNITS: usize = 2;

/// A buffer object: a byte range inside the static sub-range of the data
/// region plus a CPU shadow. Ranges are never individually freed; re-upload
/// allocates a fresh range and the old one is released in bulk at shutdown.
#[derive(Debug)]
pub(crate) struct BufferRecord {
    pub gpu_offset: Option<u64>,
    pub shadow: Vec<u8>,
}

pub(crate) struct SwapchainImage {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_view: wgpu::TextureView,
}

/// Currently active render target. Handle 0 maps to the current swapchain
/// image, which always carries a depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FramebufferBinding {
    pub color: Handle,
    pub depth: Handle,
}

pub(crate) struct DrawState {
    pub viewport: Option<Viewport>,
    pub scissor_enabled: bool,
    pub scissor: ScissorRect,
    pub blend: BlendState,
    pub depth: DepthState,
    pub stencil: StencilState,
    pub raster: RasterState,
    pub color_mask: ColorMask,
    pub bias: DepthBias,
    pub program: Handle,
    pub vs_uniform: Handle,
    pub fs_uniform: Handle,
    pub attribs: [Option<VertexAttrib>; MAX_VERTEX_ATTRIBS],
    pub attrib_constants: [[f32; 4]; MAX_VERTEX_ATTRIBS],
    pub units: [Handle; MAX_TEXTURE_UNITS],
    pub framebuffer: FramebufferBinding,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            viewport: None,
            scissor_enabled: false,
            scissor: ScissorRect {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            },
            blend: BlendState::default(),
            depth: DepthState::default(),
            stencil: StencilState::default(),
            raster: RasterState::default(),
            color_mask: ColorMask::all(),
            bias: DepthBias::default(),
            program: NONE_HANDLE,
            vs_uniform: NONE_HANDLE,
            fs_uniform: NONE_HANDLE,
            attribs: [None; MAX_VERTEX_ATTRIBS],
            attrib_constants: [[0.0, 0.0, 0.0, 1.0]; MAX_VERTEX_ATTRIBS],
            units: [NONE_HANDLE; MAX_TEXTURE_UNITS],
            framebuffer: FramebufferBinding {
                color: NONE_HANDLE,
                depth: NONE_HANDLE,
            },
        }
    }
}

pub struct GlesRuntime {
    pub(crate) config: RuntimeConfig,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) caps: DeviceCaps,

    pub(crate) regions: MemoryRegions,
    pub(crate) frames: FrameScheduler,

    pub(crate) textures: HandleTable<TextureRecord>,
    pub(crate) buffers: HandleTable<BufferRecord>,
    pub(crate) shaders: HandleTable<ShaderRecord>,
    pub(crate) programs: HandleTable<ProgramRecord>,
    pub(crate) renderbuffers: HandleTable<RenderbufferRecord>,
    pub(crate) uniform_blocks: HandleTable<UniformBlock>,
    pub(crate) client_arrays: HashMap<u32, Vec<u8>>,

    pub(crate) state: DrawState,
    pub(crate) pipelines: PipelineCache,

    pub(crate) uniform_bgl: wgpu::BindGroupLayout,
    pub(crate) tex2d_bgl: wgpu::BindGroupLayout,
    pub(crate) cube_bgl: wgpu::BindGroupLayout,
    pub(crate) pipeline_layout: wgpu::PipelineLayout,
    pub(crate) uniform_bind_group: wgpu::BindGroup,
    pub(crate) tex2d_bind_group: Option<wgpu::BindGroup>,
    pub(crate) cube_bind_group: Option<wgpu::BindGroup>,
    /// Set whenever the command buffer was cleared: clearing it invalidates
    /// previously bound descriptor sets.
    pub(crate) descriptors_dirty: bool,

    pub(crate) default_sampler: wgpu::Sampler,
    pub(crate) default_view_2d: wgpu::TextureView,
    pub(crate) default_view_cube: wgpu::TextureView,

    pub(crate) mip_blit: MipBlitter,

    pub(crate) swapchain: Vec<SwapchainImage>,
    pub(crate) presented: Option<u32>,
    /// Permanently zeroed uniform slice for stages with no bound block.
    pub(crate) zero_uniform_offset: u32,
}

impl GlesRuntime {
    pub async fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(RuntimeError::AdapterNotFound)?;

        // Compressed texture support is optional; uploads degrade without it.
        let mut features = wgpu::Features::empty();
        if adapter
            .features()
            .contains(wgpu::Features::TEXTURE_COMPRESSION_BC)
        {
            features |= wgpu::Features::TEXTURE_COMPRESSION_BC;
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("glaze.device"),
                    required_features: features,
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|err| RuntimeError::RequestDevice(err.to_string()))?;

        Self::with_device(config, device, queue)
    }

    pub fn new_blocking(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        pollster::block_on(Self::new(config))
    }

    /// Build the runtime on an already-acquired device/queue.
    pub fn with_device(
        config: RuntimeConfig,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Result<Self, RuntimeError> {
        let fault = FaultFlag::new();
        {
            let fault = fault.clone();
            device.on_uncaptured_error(Box::new(move |error| {
                tracing::error!(%error, "native queue entered error state");
                fault.set();
            }));
        }

        let caps = DeviceCaps::from_device(&device);
        let mut regions = MemoryRegions::new(&device, &config.memory, config.frames_in_flight);
        let frames = FrameScheduler::new(&device, config.frames_in_flight, fault.clone());

        let max_block = config.max_uniform_block_size as u64;
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glaze.uniforms.bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(max_block),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(max_block),
                    },
                    count: None,
                },
            ],
        });

        let mut tex_entries = Vec::with_capacity(MAX_TEXTURE_UNITS * 2);
        for unit in 0..MAX_TEXTURE_UNITS {
            tex_entries.push(wgpu::BindGroupLayoutEntry {
                binding: (unit * 2) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            tex_entries.push(wgpu::BindGroupLayoutEntry {
                binding: (unit * 2 + 1) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let tex2d_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glaze.textures2d.bgl"),
            entries: &tex_entries,
        });

        let mut cube_entries = Vec::with_capacity(MAX_CUBE_UNITS * 2);
        for unit in 0..MAX_CUBE_UNITS {
            cube_entries.push(wgpu::BindGroupLayoutEntry {
                binding: (unit * 2) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            cube_entries.push(wgpu::BindGroupLayoutEntry {
                binding: (unit * 2 + 1) as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::Cube,
                    multisampled: false,
                },
                count: None,
            });
        }
        let cube_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glaze.cubemaps.bgl"),
            entries: &cube_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glaze.pipeline-layout"),
            bind_group_layouts: &[&uniform_bgl, &tex2d_bgl, &cube_bgl],
            push_constant_ranges: &[],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glaze.uniforms.bg"),
            layout: &uniform_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &regions.data,
                        offset: 0,
                        size: NonZeroU64::new(max_block),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &regions.data,
                        offset: 0,
                        size: NonZeroU64::new(max_block),
                    }),
                },
            ],
        });

        let default_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glaze.default-sampler"),
            ..Default::default()
        });

        let default_2d = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.default-texture-2d"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &default_2d,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &[0xFF; 4],
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let default_view_2d = default_2d.create_view(&wgpu::TextureViewDescriptor::default());

        let default_cube = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.default-texture-cube"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for layer in 0..6 {
            queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &default_cube,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: layer,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                &[0xFF; 4],
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4),
                    rows_per_image: Some(1),
                },
                wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
            );
        }
        let default_view_cube = default_cube.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let mip_blit = MipBlitter::new(&device);

        let mut swapchain = Vec::with_capacity(config.frames_in_flight);
        for slot in 0..config.frames_in_flight {
            swapchain.push(Self::create_swapchain_image(
                &device,
                slot,
                config.swapchain_width,
                config.swapchain_height,
            ));
        }

        // Stages without a bound uniform block bind this permanently zeroed
        // slice.
        let zeroes = vec![0u8; config.max_uniform_block_size as usize];
        let zero_uniform_offset = regions
            .alloc_static(&queue, &zeroes)
            .and_then(|offset| u32::try_from(offset).ok())
            .unwrap_or(0);

        let tables = &config.tables;
        Ok(Self {
            caps,
            regions,
            frames,
            textures: HandleTable::new("texture", tables.textures),
            buffers: HandleTable::new("buffer", tables.buffers),
            shaders: HandleTable::new("shader", tables.shaders),
            programs: HandleTable::new("program", tables.programs),
            renderbuffers: HandleTable::new("renderbuffer", tables.renderbuffers),
            uniform_blocks: HandleTable::new("uniform-block", tables.uniform_blocks),
            client_arrays: HashMap::new(),
            state: DrawState::default(),
            pipelines: PipelineCache::new(),
            uniform_bgl,
            tex2d_bgl,
            cube_bgl,
            pipeline_layout,
            uniform_bind_group,
            tex2d_bind_group: None,
            cube_bind_group: None,
            descriptors_dirty: true,
            default_sampler,
            default_view_2d,
            default_view_cube,
            mip_blit,
            swapchain,
            presented: None,
            zero_uniform_offset,
            config,
            device,
            queue,
        })
    }

    fn create_swapchain_image(
        device: &wgpu::Device,
        slot: usize,
        width: u32,
        height: u32,
    ) -> SwapchainImage {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.swapchain.color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.swapchain.depth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth24PlusStencil8,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        debug!(slot, width, height, "swapchain image created");
        SwapchainImage {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }

    /// Diagnostic hook: force the sticky native-queue fault, as if the
    /// uncaptured-error callback had fired.
    pub fn mark_device_faulted(&self) {
        self.frames.fault().set();
    }

    pub fn device_faulted(&self) -> bool {
        self.frames.fault().is_set()
    }

    /// Number of cached native pipeline objects (diagnostics).
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn frame_slot_state(&self, slot: u32) -> frame::SlotState {
        self.frames.slot_state(slot as usize)
    }

    /// The slot most recently handed to `present`.
    pub fn last_presented(&self) -> Option<u32> {
        self.presented
    }

    /// Re-establish the recording context after a mid-frame submit-and-wait:
    /// fresh command buffer, invalidated descriptor bindings. The render
    /// target is rebound from retained state at the next pass. Idempotent.
    pub(crate) fn reprime_recording(&mut self) {
        self.frames.reprime_recording(&self.device);
        self.descriptors_dirty = true;
        self.tex2d_bind_group = None;
        self.cube_bind_group = None;
    }

    /// Submit the current command buffer, wait for it to complete, then
    /// re-prime. This is the single mid-frame coherency point used by
    /// uploads, `flush`/`finish`, `barrier`, and readback.
    pub(crate) fn submit_wait_reprime(&mut self) {
        self.frames.submit_and_wait_current(&self.device, &self.queue);
        self.reprime_recording();
    }

    /// Resolve the bound color target: view, dimensions, format, and the
    /// texture handle backing it (0 for the swapchain image).
    pub(crate) fn color_target(
        &self,
    ) -> Result<(&wgpu::TextureView, u32, u32, wgpu::TextureFormat, Handle), RuntimeError> {
        resolve_color_target(
            self.state.framebuffer,
            &self.textures,
            &self.swapchain,
            self.frames.current(),
            &self.config,
        )
    }

    /// Resolve the bound depth/stencil target, if any.
    pub(crate) fn depth_target(&self) -> Option<&wgpu::TextureView> {
        resolve_depth_target(
            self.state.framebuffer,
            &self.renderbuffers,
            &self.swapchain,
            self.frames.current(),
        )
    }
}

/// Field-disjoint form of target resolution, so callers can hold the views
/// while mutably borrowing the frame scheduler for the encoder.
pub(crate) fn resolve_color_target<'a>(
    binding: FramebufferBinding,
    textures: &'a HandleTable<TextureRecord>,
    swapchain: &'a [SwapchainImage],
    current_slot: usize,
    config: &RuntimeConfig,
) -> Result<(&'a wgpu::TextureView, u32, u32, wgpu::TextureFormat, Handle), RuntimeError> {
    if binding.color == NONE_HANDLE {
        let image = &swapchain[current_slot];
        return Ok((
            &image.color_view,
            config.swapchain_width,
            config.swapchain_height,
            wgpu::TextureFormat::Rgba8Unorm,
            NONE_HANDLE,
        ));
    }
    let record = textures.get(binding.color)?;
    let view = record
        .render_view
        .as_ref()
        .ok_or(RuntimeError::UnknownHandle {
            table: "texture",
            handle: binding.color,
        })?;
    Ok((view, record.width, record.height, record.format, binding.color))
}

pub(crate) fn resolve_depth_target<'a>(
    binding: FramebufferBinding,
    renderbuffers: &'a HandleTable<RenderbufferRecord>,
    swapchain: &'a [SwapchainImage],
    current_slot: usize,
) -> Option<&'a wgpu::TextureView> {
    if binding.color == NONE_HANDLE {
        return Some(&swapchain[current_slot].depth_view);
    }
    if binding.depth == NONE_HANDLE {
        return None;
    }
    renderbuffers.lookup(binding.depth).map(|record| &record.view)
}

impl GlesBackend for GlesRuntime {
    fn acquire_image(&mut self) -> u32 {
        let slot = self.frames.next_slot();
        // The slot's sub-ranges must not be rewritten until its previous use
        // has drained.
        if self.frames.pending_fence(slot) {
            self.wait_fence(slot as u32);
        }
        slot as u32
    }

    fn begin_frame(&mut self, slot: u32) {
        self.frames.begin_frame(&self.device, slot as usize);
        self.regions.reset_client(slot as usize);
        self.descriptors_dirty = true;
    }

    fn end_frame(&mut self, slot: u32) {
        self.frames.end_frame(&self.queue, slot as usize);
    }

    fn present(&mut self, slot: u32) {
        self.presented = Some(slot);
    }

    fn wait_fence(&mut self, slot: u32) {
        if self.frames.wait_fence(&self.device, slot as usize) {
            // Uniform bytes were snapshotted at record time, so the slot's
            // snapshot range is safe to reuse now.
            self.regions.reset_uniform(slot as usize);
            if slot as usize == self.frames.current() {
                self.reprime_recording();
            }
        }
    }

    fn apply_viewport(&mut self, viewport: Viewport) {
        self.state.viewport = Some(viewport);
    }

    fn apply_scissor(&mut self, enabled: bool, rect: ScissorRect) {
        self.state.scissor_enabled = enabled;
        self.state.scissor = rect;
    }

    fn apply_blend(&mut self, state: BlendState) {
        self.state.blend = state;
    }

    fn apply_depth(&mut self, state: DepthState) {
        let stencil = self.state.stencil;
        self.apply_depth_stencil(state, stencil);
    }

    fn apply_stencil(&mut self, state: StencilState) {
        let depth = self.state.depth;
        self.apply_depth_stencil(depth, state);
    }

    fn apply_depth_stencil(&mut self, depth: DepthState, stencil: StencilState) {
        self.state.depth = depth;
        self.state.stencil = stencil;
    }

    fn apply_raster(&mut self, state: RasterState) {
        self.state.raster = state;
    }

    fn apply_color_mask(&mut self, mask: ColorMask) {
        self.state.color_mask = mask;
    }

    fn apply_depth_bias(&mut self, bias: DepthBias) {
        self.state.bias = bias;
    }

    fn clear(&mut self, mask: ClearMask, color: [f32; 4], depth: f32, stencil: u32) {
        if let Err(err) = self.try_clear(mask, color, depth, stencil) {
            warn!(error = %err, "clear skipped");
        }
    }

    fn create_buffer(&mut self, buffer: Handle) {
        if let Err(err) = self.buffers.put(
            buffer,
            BufferRecord {
                gpu_offset: None,
                shadow: Vec::new(),
            },
        ) {
            warn!(error = %err, "create_buffer skipped");
        }
    }

    fn delete_buffer(&mut self, buffer: Handle) {
        // The GPU range is not reclaimed; only the table entry goes away.
        self.buffers.remove(buffer);
    }

    fn buffer_data(&mut self, buffer: Handle, data: &[u8]) {
        if let Err(err) = self.try_buffer_data(buffer, data) {
            warn!(error = %err, "buffer_data skipped");
        }
    }

    fn buffer_sub_data(&mut self, buffer: Handle, offset: u32, data: &[u8]) {
        if let Err(err) = self.try_buffer_sub_data(buffer, offset, data) {
            warn!(error = %err, "buffer_sub_data skipped");
        }
    }

    fn tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    ) {
        if let Err(err) = self.try_tex_image_2d(texture, width, height, format, pixels) {
            warn!(error = %err, "tex_image_2d skipped");
        }
    }

    fn tex_sub_image_2d(
        &mut self,
        texture: Handle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    ) {
        if let Err(err) = self.try_tex_sub_image_2d(texture, x, y, width, height, format, pixels) {
            warn!(error = %err, "tex_sub_image_2d skipped");
        }
    }

    fn tex_image_cube_face(
        &mut self,
        texture: Handle,
        face: CubeFace,
        size: u32,
        format: TexFormat,
        pixels: &[u8],
    ) {
        if let Err(err) = self.try_tex_image_cube_face(texture, face, size, format, pixels) {
            warn!(error = %err, "tex_image_cube_face skipped");
        }
    }

    fn compressed_tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: CompressedFormat,
        data: &[u8],
    ) {
        if let Err(err) = self.try_compressed_tex_image_2d(texture, width, height, format, data) {
            warn!(error = %err, "compressed_tex_image_2d skipped");
        }
    }

    fn tex_parameter(&mut self, texture: Handle, params: SamplerParams) {
        if let Err(err) = self.try_tex_parameter(texture, params) {
            warn!(error = %err, "tex_parameter skipped");
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Handle) {
        if unit as usize >= MAX_TEXTURE_UNITS {
            warn!(unit, "bind_texture: unit out of range; ignoring");
            return;
        }
        self.state.units[unit as usize] = texture;
        self.descriptors_dirty = true;
    }

    fn generate_mipmaps(&mut self, texture: Handle) {
        if let Err(err) = self.try_generate_mipmaps(texture) {
            warn!(error = %err, "generate_mipmaps skipped");
        }
    }

    fn copy_tex_image_2d(&mut self, texture: Handle, width: u32, height: u32) {
        if let Err(err) = self.try_copy_tex_image_2d(texture, width, height) {
            warn!(error = %err, "copy_tex_image_2d skipped");
        }
    }

    fn copy_tex_sub_image_2d(
        &mut self,
        texture: Handle,
        dst_x: u32,
        dst_y: u32,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    ) {
        if let Err(err) =
            self.try_copy_tex_sub_image_2d(texture, dst_x, dst_y, src_x, src_y, width, height)
        {
            warn!(error = %err, "copy_tex_sub_image_2d skipped");
        }
    }

    fn load_shader(&mut self, shader: Handle, stage: ShaderStage, path: &Path) {
        if let Err(err) = self.try_load_shader(shader, stage, path) {
            warn!(error = %err, "load_shader skipped");
        }
    }

    fn delete_shader(&mut self, shader: Handle) {
        // Programs copied the compiled representation at link time, so this
        // cannot invalidate them.
        self.shaders.remove(shader);
    }

    fn link_program(&mut self, program: Handle, vertex: Handle, fragment: Handle) {
        if let Err(err) = self.try_link_program(program, vertex, fragment) {
            warn!(error = %err, "link_program skipped");
        }
    }

    fn delete_program(&mut self, program: Handle) {
        if self.programs.remove(program).is_some() {
            self.pipelines.remove_program(program);
        }
        if self.state.program == program {
            self.state.program = NONE_HANDLE;
        }
    }

    fn bind_program(&mut self, program: Handle) {
        if program != NONE_HANDLE && !self.programs.contains(program) {
            warn!(program, "bind_program: unknown program; ignoring");
            return;
        }
        self.state.program = program;
    }

    fn uniform_alloc(&mut self, block: Handle, size: u32) {
        if let Err(err) = self.try_uniform_alloc(block, size) {
            warn!(error = %err, "uniform_alloc skipped");
        }
    }

    fn uniform_write(&mut self, block: Handle, offset: u32, data: &[u8]) {
        if let Err(err) = self.try_uniform_write(block, offset, data) {
            warn!(error = %err, "uniform_write skipped");
        }
    }

    fn bind_uniforms(&mut self, vertex: Handle, fragment: Handle) {
        self.state.vs_uniform = vertex;
        self.state.fs_uniform = fragment;
    }

    fn set_vertex_attrib(&mut self, index: u32, attrib: Option<VertexAttrib>) {
        if index as usize >= MAX_VERTEX_ATTRIBS {
            warn!(index, "set_vertex_attrib: index out of range; ignoring");
            return;
        }
        self.state.attribs[index as usize] = attrib;
    }

    fn set_attrib_constant(&mut self, index: u32, value: [f32; 4]) {
        if index as usize >= MAX_VERTEX_ATTRIBS {
            warn!(index, "set_attrib_constant: index out of range; ignoring");
            return;
        }
        self.state.attrib_constants[index as usize] = value;
    }

    fn supply_client_array(&mut self, array: u32, data: &[u8]) {
        self.client_arrays.insert(array, data.to_vec());
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        if let Err(err) = self.try_draw(primitive, DrawKind::Arrays { first, count }) {
            warn!(error = %err, "draw_arrays skipped");
        }
    }

    fn draw_elements(
        &mut self,
        primitive: Primitive,
        count: u32,
        index_type: IndexType,
        source: IndexSource,
    ) {
        if let Err(err) = self.try_draw(
            primitive,
            DrawKind::Elements {
                count,
                index_type,
                source,
            },
        ) {
            warn!(error = %err, "draw_elements skipped");
        }
    }

    fn bind_framebuffer(&mut self, color: Handle, depth: Handle) {
        if color != NONE_HANDLE {
            // Binding a non-existent render target is a silent no-op.
            match self.textures.lookup(color) {
                Some(record) if record.render_view.is_some() => {}
                _ => {
                    warn!(color, "bind_framebuffer: target not renderable; ignoring");
                    return;
                }
            }
        }
        if color != NONE_HANDLE && depth != NONE_HANDLE {
            let color_dims = self
                .textures
                .lookup(color)
                .map(|record| (record.width, record.height));
            let depth_dims = self
                .renderbuffers
                .lookup(depth)
                .map(|record| (record.width, record.height));
            if let (Some(c), Some(d)) = (color_dims, depth_dims) {
                if c != d {
                    warn!(?c, ?d, "bind_framebuffer: attachment dimensions differ");
                }
            }
        }
        self.state.framebuffer = FramebufferBinding { color, depth };
        if color != NONE_HANDLE {
            if let Ok(record) = self.textures.get_mut(color) {
                record.used_as_render_target = true;
            }
        }
    }

    fn renderbuffer_storage(&mut self, renderbuffer: Handle, width: u32, height: u32) {
        if let Err(err) = self.try_renderbuffer_storage(renderbuffer, width, height) {
            warn!(error = %err, "renderbuffer_storage skipped");
        }
    }

    fn delete_renderbuffer(&mut self, renderbuffer: Handle) {
        if let Some(record) = self.renderbuffers.remove(renderbuffer) {
            debug!(
                renderbuffer,
                image_offset = record.image_offset,
                "renderbuffer deleted; region bytes remain until shutdown"
            );
        }
        if self.state.framebuffer.depth == renderbuffer {
            self.state.framebuffer.depth = NONE_HANDLE;
        }
    }

    fn read_pixels(&mut self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        self.read_pixels_impl(x, y, width, height)
    }

    fn flush(&mut self) {
        self.submit_wait_reprime();
    }

    fn finish(&mut self) {
        self.submit_wait_reprime();
        if !self.device_faulted() {
            self.device.poll(wgpu::Maintain::Wait);
        }
    }

    fn barrier(&mut self) {
        self.submit_wait_reprime();
    }

    fn shutdown(&mut self) {
        self.frames.release_all();
        self.pipelines.clear();
        self.textures.clear();
        self.buffers.clear();
        self.shaders.clear();
        self.programs.clear();
        self.renderbuffers.clear();
        self.uniform_blocks.clear();
        self.client_arrays.clear();
        self.tex2d_bind_group = None;
        self.cube_bind_group = None;
        self.state = DrawState::default();
        self.regions.release_all();
        debug!(
            pipelines_empty = self.pipelines.is_empty(),
            "backend shut down; all regions released"
        );
    }
}

pub(crate) use draw::DrawKind;
pub use frame::SlotState;

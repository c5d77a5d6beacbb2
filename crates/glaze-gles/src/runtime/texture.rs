//! The resource upload pipeline: staged texture uploads, cubemap assembly,
//! compressed data, sampler parameters, mip generation, renderbuffer storage,
//! and framebuffer→texture copies.
//!
//! Every upload goes buffer→image through an explicitly staged copy, then
//! submits and waits; clearing the command buffer afterwards invalidates
//! previously bound descriptor sets, so the recording context is re-primed
//! each time. No vertical flip happens on upload: row 0 of the source lands
//! at row 0 of native storage, and upload and sample time agree on that.

use tracing::debug;

use glaze_gpu::layout::{full_mip_count, linear_copy_layout, mip_dim};
use glaze_gpu::rows;

use crate::error::RuntimeError;
use crate::handle::Handle;
use crate::types::{
    CompressedFormat, CubeFace, CubeFaces, SamplerParams, TexFilter, TexFormat, TexWrap,
};

use super::frame::FrameScheduler;
use super::GlesRuntime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureKind {
    Tex2d,
    Cube,
}

pub(crate) struct TextureRecord {
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub format: wgpu::TextureFormat,
    pub texture: wgpu::Texture,
    /// Sampling descriptor; exists only once the image is fully populated
    /// (the single 2D image, or all six cubemap faces).
    pub sample_view: Option<wgpu::TextureView>,
    /// Mip-0 view used when the texture is bound as a render target.
    pub render_view: Option<wgpu::TextureView>,
    pub faces: CubeFaces,
    pub params: SamplerParams,
    pub sampler: Option<wgpu::Sampler>,
    /// Set when the copy path bypassed the 3D engine's sampling caches;
    /// cleared by the full barrier inserted at the first sampling bind.
    pub needs_coherency_barrier: bool,
    pub used_as_render_target: bool,
    /// Accounting offset inside the image region.
    pub image_offset: u64,
}

pub(crate) struct RenderbufferRecord {
    pub width: u32,
    pub height: u32,
    pub view: wgpu::TextureView,
    pub image_offset: u64,
}

fn native_format(format: TexFormat) -> wgpu::TextureFormat {
    match format {
        TexFormat::Rgba8 | TexFormat::Rgb8 => wgpu::TextureFormat::Rgba8Unorm,
        TexFormat::Alpha8 => wgpu::TextureFormat::R8Unorm,
    }
}

fn compressed_format(format: CompressedFormat) -> wgpu::TextureFormat {
    match format {
        CompressedFormat::Bc1 => wgpu::TextureFormat::Bc1RgbaUnorm,
        CompressedFormat::Bc2 => wgpu::TextureFormat::Bc2RgbaUnorm,
        CompressedFormat::Bc3 => wgpu::TextureFormat::Bc3RgbaUnorm,
    }
}

/// Byte budget of a full mip chain in the image region.
fn image_region_bytes(width: u32, height: u32, mips: u32, texel_bytes: u32, layers: u32) -> u64 {
    let mut total = 0u64;
    for level in 0..mips {
        let w = mip_dim(width, level) as u64;
        let h = mip_dim(height, level) as u64;
        total += w * h * texel_bytes as u64;
    }
    total * layers as u64
}

fn filter_mode(filter: TexFilter) -> wgpu::FilterMode {
    match filter {
        TexFilter::Nearest | TexFilter::NearestMipNearest | TexFilter::NearestMipLinear => {
            wgpu::FilterMode::Nearest
        }
        TexFilter::Linear | TexFilter::LinearMipNearest | TexFilter::LinearMipLinear => {
            wgpu::FilterMode::Linear
        }
    }
}

fn mip_filter_mode(filter: TexFilter) -> wgpu::FilterMode {
    match filter {
        TexFilter::NearestMipLinear | TexFilter::LinearMipLinear => wgpu::FilterMode::Linear,
        _ => wgpu::FilterMode::Nearest,
    }
}

fn address_mode(wrap: TexWrap) -> wgpu::AddressMode {
    match wrap {
        TexWrap::Repeat => wgpu::AddressMode::Repeat,
        TexWrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        TexWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn create_sampler(
    device: &wgpu::Device,
    params: SamplerParams,
    mip_count: u32,
) -> wgpu::Sampler {
    // A non-mipmapped filter must not read levels that were never uploaded.
    let lod_max = if params.min_filter.uses_mipmaps() && mip_count > 1 {
        mip_count as f32
    } else {
        0.0
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("glaze.texture.sampler"),
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter_mode(params.mag_filter),
        min_filter: filter_mode(params.min_filter),
        mipmap_filter: mip_filter_mode(params.min_filter),
        lod_min_clamp: 0.0,
        lod_max_clamp: lod_max,
        ..Default::default()
    })
}

/// Stage tightly packed rows into a transient staging buffer and record one
/// buffer→image copy into the current command buffer.
fn stage_and_copy(
    device: &wgpu::Device,
    frames: &mut FrameScheduler,
    texture: &wgpu::Texture,
    mip_level: u32,
    origin: wgpu::Origin3d,
    extent: wgpu::Extent3d,
    unpadded_bytes_per_row: u32,
    row_count: u32,
    data: &[u8],
) {
    let padded = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let staging_size = padded as u64 * row_count as u64;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("glaze.upload.staging"),
        size: staging_size.max(wgpu::COPY_BUFFER_ALIGNMENT),
        usage: wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: true,
    });
    {
        let mut mapped = staging.slice(..).get_mapped_range_mut();
        let mut packed = Vec::new();
        rows::pack_rows_padded(
            data,
            unpadded_bytes_per_row as usize,
            row_count as usize,
            padded as usize,
            &mut packed,
        );
        mapped[..packed.len()].copy_from_slice(&packed);
    }
    staging.unmap();

    frames.encoder(device).copy_buffer_to_texture(
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(row_count),
            },
        },
        wgpu::ImageCopyTexture {
            texture,
            mip_level,
            origin,
            aspect: wgpu::TextureAspect::All,
        },
        extent,
    );
}

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT);

impl GlesRuntime {
    /// Convert caller pixels into the native channel layout.
    fn native_pixels<'a>(format: TexFormat, pixels: &'a [u8], scratch: &'a mut Vec<u8>) -> &'a [u8] {
        match format {
            TexFormat::Rgb8 => {
                rows::expand_rgb8_to_rgba8(pixels, scratch);
                scratch
            }
            TexFormat::Rgba8 | TexFormat::Alpha8 => pixels,
        }
    }

    pub(crate) fn try_tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    ) -> Result<(), RuntimeError> {
        let native = native_format(format);
        let texel_bytes = format.native_texel_bytes();
        let mip_count = full_mip_count(width, height);
        let layout = linear_copy_layout(width, height, texel_bytes)
            .map_err(|_| RuntimeError::DrawSkipped("zero-sized texture upload"))?;

        let budget = image_region_bytes(width, height, mip_count, texel_bytes, 1);
        let image_offset = self
            .regions
            .alloc_image(budget)
            .ok_or(RuntimeError::RegionExhausted {
                region: "image-storage",
                requested: budget,
            })?;
        if !self.regions.image_desc_budget.take() {
            return Err(RuntimeError::DescriptorBudgetExhausted {
                region: "image-descriptors",
            });
        }

        let native_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.texture2d"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: native,
            usage: TEXTURE_USAGE,
            view_formats: &[],
        });

        let mut scratch = Vec::new();
        let data = Self::native_pixels(format, pixels, &mut scratch);
        stage_and_copy(
            &self.device,
            &mut self.frames,
            &native_texture,
            0,
            wgpu::Origin3d::ZERO,
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            layout.unpadded_bytes_per_row,
            height,
            data,
        );
        self.submit_wait_reprime();

        // A single 2D image is fully populated after one upload, so its
        // sampling descriptor exists from here on.
        let sample_view = native_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let render_view = native_texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: 0,
            mip_level_count: Some(1),
            ..Default::default()
        });

        // Re-created, never freed: a previous record's region bytes stay
        // allocated until shutdown.
        let params = match self.textures.lookup(texture) {
            Some(old) => {
                debug!(
                    texture,
                    prior_offset = old.image_offset,
                    "re-creating texture storage; prior region bytes remain allocated"
                );
                old.params
            }
            None => SamplerParams::default(),
        };
        let sampler = create_sampler(&self.device, params, mip_count);

        self.textures.put(
            texture,
            TextureRecord {
                kind: TextureKind::Tex2d,
                width,
                height,
                mip_count,
                format: native,
                texture: native_texture,
                sample_view: Some(sample_view),
                render_view: Some(render_view),
                faces: CubeFaces::empty(),
                params,
                sampler: Some(sampler),
                needs_coherency_barrier: true,
                used_as_render_target: false,
                image_offset,
            },
        )?;
        debug!(texture, width, height, mip_count, image_offset, "2D texture uploaded");
        Ok(())
    }

    pub(crate) fn try_tex_sub_image_2d(
        &mut self,
        texture: Handle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: TexFormat,
        pixels: &[u8],
    ) -> Result<(), RuntimeError> {
        let texel_bytes = format.native_texel_bytes();
        let layout = linear_copy_layout(width, height, texel_bytes)
            .map_err(|_| RuntimeError::DrawSkipped("zero-sized texture upload"))?;
        let mut scratch = Vec::new();
        let data = Self::native_pixels(format, pixels, &mut scratch);
        {
            let record = self.textures.get(texture)?;
            if record.kind != TextureKind::Tex2d
                || record.format != native_format(format)
                || x + width > record.width
                || y + height > record.height
            {
                return Err(RuntimeError::DrawSkipped("sub-image does not fit target"));
            }
            stage_and_copy(
                &self.device,
                &mut self.frames,
                &record.texture,
                0,
                wgpu::Origin3d { x, y, z: 0 },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                layout.unpadded_bytes_per_row,
                height,
                data,
            );
        }
        self.submit_wait_reprime();
        if let Ok(record) = self.textures.get_mut(texture) {
            record.needs_coherency_barrier = true;
        }
        Ok(())
    }

    pub(crate) fn try_tex_image_cube_face(
        &mut self,
        texture: Handle,
        face: CubeFace,
        size: u32,
        format: TexFormat,
        pixels: &[u8],
    ) -> Result<(), RuntimeError> {
        let native = native_format(format);
        let texel_bytes = format.native_texel_bytes();
        let layout = linear_copy_layout(size, size, texel_bytes)
            .map_err(|_| RuntimeError::DrawSkipped("zero-sized cubemap face"))?;

        // First face upload for this handle creates the native cubemap image.
        let reuse = matches!(
            self.textures.lookup(texture),
            Some(record)
                if record.kind == TextureKind::Cube
                    && record.width == size
                    && record.format == native
        );
        if !reuse {
            let budget = image_region_bytes(size, size, 1, texel_bytes, 6);
            let image_offset =
                self.regions
                    .alloc_image(budget)
                    .ok_or(RuntimeError::RegionExhausted {
                        region: "image-storage",
                        requested: budget,
                    })?;
            let native_texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("glaze.cubemap"),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: native,
                usage: TEXTURE_USAGE,
                view_formats: &[],
            });
            let params = self
                .textures
                .lookup(texture)
                .map(|old| old.params)
                .unwrap_or_default();
            let sampler = create_sampler(&self.device, params, 1);
            self.textures.put(
                texture,
                TextureRecord {
                    kind: TextureKind::Cube,
                    width: size,
                    height: size,
                    mip_count: 1,
                    format: native,
                    texture: native_texture,
                    sample_view: None,
                    render_view: None,
                    faces: CubeFaces::empty(),
                    params,
                    sampler: Some(sampler),
                    needs_coherency_barrier: false,
                    used_as_render_target: false,
                    image_offset,
                },
            )?;
        }

        let mut scratch = Vec::new();
        let data = Self::native_pixels(format, pixels, &mut scratch);
        {
            let record = self.textures.get(texture)?;
            stage_and_copy(
                &self.device,
                &mut self.frames,
                &record.texture,
                0,
                wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face.layer(),
                },
                wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                layout.unpadded_bytes_per_row,
                size,
                data,
            );
        }
        self.submit_wait_reprime();

        // Advance the face state machine; the sampling descriptor is created
        // only at the Complete transition.
        let needs_descriptor = {
            let record = self.textures.get_mut(texture)?;
            record.faces |= face.bit();
            record.faces == CubeFaces::COMPLETE && record.sample_view.is_none()
        };
        if needs_descriptor {
            if !self.regions.image_desc_budget.take() {
                return Err(RuntimeError::DescriptorBudgetExhausted {
                    region: "image-descriptors",
                });
            }
            let record = self.textures.get_mut(texture)?;
            let view = record.texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            });
            record.sample_view = Some(view);
            // The copy path bypassed the 3D engine's sampling caches; a full
            // barrier runs at the first sampling bind.
            record.needs_coherency_barrier = true;
            debug!(texture, "cubemap complete; sampling descriptor created");
        }
        Ok(())
    }

    pub(crate) fn try_compressed_tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
        format: CompressedFormat,
        data: &[u8],
    ) -> Result<(), RuntimeError> {
        if !self
            .device
            .features()
            .contains(wgpu::Features::TEXTURE_COMPRESSION_BC)
        {
            return Err(RuntimeError::DrawSkipped(
                "device lacks compressed texture support",
            ));
        }
        let native = compressed_format(format);
        let block_bytes: u32 = match format {
            CompressedFormat::Bc1 => 8,
            CompressedFormat::Bc2 | CompressedFormat::Bc3 => 16,
        };
        let blocks_w = width.div_ceil(4);
        let blocks_h = height.div_ceil(4);

        // The staging region is sized by the caller-declared byte count; the
        // block data is copied opaquely with no CPU-side reformatting.
        let image_offset = self
            .regions
            .alloc_image(data.len() as u64)
            .ok_or(RuntimeError::RegionExhausted {
                region: "image-storage",
                requested: data.len() as u64,
            })?;
        if !self.regions.image_desc_budget.take() {
            return Err(RuntimeError::DescriptorBudgetExhausted {
                region: "image-descriptors",
            });
        }

        let native_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.texture2d.compressed"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: native,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        stage_and_copy(
            &self.device,
            &mut self.frames,
            &native_texture,
            0,
            wgpu::Origin3d::ZERO,
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            blocks_w * block_bytes,
            blocks_h,
            data,
        );
        self.submit_wait_reprime();

        let sample_view = native_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params = self
            .textures
            .lookup(texture)
            .map(|old| old.params)
            .unwrap_or_default();
        let sampler = create_sampler(&self.device, params, 1);
        self.textures.put(
            texture,
            TextureRecord {
                kind: TextureKind::Tex2d,
                width,
                height,
                mip_count: 1,
                format: native,
                texture: native_texture,
                sample_view: Some(sample_view),
                render_view: None,
                faces: CubeFaces::empty(),
                params,
                sampler: Some(sampler),
                needs_coherency_barrier: true,
                used_as_render_target: false,
                image_offset,
            },
        )?;
        Ok(())
    }

    pub(crate) fn try_tex_parameter(
        &mut self,
        texture: Handle,
        params: SamplerParams,
    ) -> Result<(), RuntimeError> {
        let mip_count = self.textures.get(texture)?.mip_count;
        if !self.regions.sampler_budget.take() {
            return Err(RuntimeError::DescriptorBudgetExhausted {
                region: "sampler-descriptors",
            });
        }
        let sampler = create_sampler(&self.device, params, mip_count);
        let record = self.textures.get_mut(texture)?;
        record.params = params;
        record.sampler = Some(sampler);
        self.descriptors_dirty = true;
        Ok(())
    }

    pub(crate) fn try_generate_mipmaps(&mut self, texture: Handle) -> Result<(), RuntimeError> {
        let (mip_count, layers, format) = {
            let record = self.textures.get(texture)?;
            let layers = match record.kind {
                TextureKind::Tex2d => 1,
                TextureKind::Cube => 6,
            };
            if record.kind == TextureKind::Cube && record.faces != CubeFaces::COMPLETE {
                return Err(RuntimeError::IncompleteCubemap {
                    handle: texture,
                    mask: record.faces.bits(),
                });
            }
            (record.mip_count, layers, record.format)
        };
        if mip_count <= 1 {
            return Ok(());
        }

        // Blit level n-1 into level n, halving each dimension with a floor at
        // 1. Each level is its own pass; pass ordering inside the command
        // buffer is the between-level coherency barrier, and the
        // submit-and-wait below is the final one before the chain is
        // sample-ready.
        {
            let record = self.textures.get(texture)?;
            for layer in 0..layers {
                for level in 1..mip_count {
                    let src = record.texture.create_view(&wgpu::TextureViewDescriptor {
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: level - 1,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    });
                    let dst = record.texture.create_view(&wgpu::TextureViewDescriptor {
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: level,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    });
                    let encoder = self.frames.encoder(&self.device);
                    self.mip_blit.blit_level(&self.device, encoder, &src, &dst, format);
                }
            }
        }
        self.submit_wait_reprime();
        if let Ok(record) = self.textures.get_mut(texture) {
            record.needs_coherency_barrier = true;
        }
        debug!(texture, mip_count, "mip chain generated");
        Ok(())
    }

    pub(crate) fn try_renderbuffer_storage(
        &mut self,
        renderbuffer: Handle,
        width: u32,
        height: u32,
    ) -> Result<(), RuntimeError> {
        // Depth24 + stencil8 packed.
        let budget = width as u64 * height as u64 * 4;
        let image_offset = self
            .regions
            .alloc_image(budget)
            .ok_or(RuntimeError::RegionExhausted {
                region: "image-storage",
                requested: budget,
            })?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("glaze.renderbuffer.depth"),
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
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.renderbuffers.put(
            renderbuffer,
            RenderbufferRecord {
                width,
                height,
                view,
                image_offset,
            },
        )?;
        Ok(())
    }

    /// Framebuffer→texture copy, whole image. Three phases: idle the queue so
    /// source rendering is complete, copy the image through the CPU with a
    /// row flip to reconcile the native top-origin rows with the emulated
    /// API's bottom-origin window coordinates, then re-upload through the
    /// standard staging path.
    pub(crate) fn try_copy_tex_image_2d(
        &mut self,
        texture: Handle,
        width: u32,
        height: u32,
    ) -> Result<(), RuntimeError> {
        let rows = self.copy_framebuffer_rows(0, 0, width, height)?;
        self.try_tex_image_2d(texture, width, height, TexFormat::Rgba8, &rows)
    }

    /// Framebuffer→texture copy, sub-region, same three-phase roundtrip.
    pub(crate) fn try_copy_tex_sub_image_2d(
        &mut self,
        texture: Handle,
        dst_x: u32,
        dst_y: u32,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    ) -> Result<(), RuntimeError> {
        let rows = self.copy_framebuffer_rows(src_x, src_y, width, height)?;
        self.try_tex_sub_image_2d(texture, dst_x, dst_y, width, height, TexFormat::Rgba8, &rows)
    }

    /// Phases 1 and 2 of the framebuffer copy: finish, then read the source
    /// rect back through the CPU, flipping rows during the CPU-side copy.
    /// `(x, y)` are the emulated API's bottom-origin window coordinates.
    ///
    /// Returns rows ready for the no-flip upload path; zero-filled when the
    /// native queue has faulted.
    fn copy_framebuffer_rows(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RuntimeError> {
        self.submit_wait_reprime();

        let (_, target_w, target_h, format, _) = self.color_target()?;
        if format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(RuntimeError::DrawSkipped("source format not readable"));
        }
        if x + width > target_w || y + height > target_h {
            return Err(RuntimeError::DrawSkipped("copy rect outside source"));
        }
        let native_y = target_h - y - height;

        let mut rows = match self.read_color_rows(x, native_y, width, height) {
            Ok(rows) => rows,
            Err(RuntimeError::DeviceFault) => vec![0u8; (width * height * 4) as usize],
            Err(err) => return Err(err),
        };
        rows::flip_rows_in_place(&mut rows, width as usize * 4, height as usize);
        Ok(rows)
    }
}

//! The draw assembler.
//!
//! Consolidates the per-attribute vertex specifications into native
//! buffer-binding slots, stages client-side vertex and index data into the
//! current frame slot's sub-range, widens 8-bit indices, snapshots uniforms,
//! and issues the draw into the current command buffer.

use std::collections::HashMap;

use tracing::debug;

use glaze_gpu::rows;

use crate::error::RuntimeError;
use crate::handle::{Handle, NONE_HANDLE};
use crate::types::{
    AttribSource, ClearMask, IndexSource, IndexType, Primitive, VertexAttrib,
};

use super::pipeline::{BlendKey, PipelineKey, StencilKey, VertexLayoutKey};
use super::texture::TextureKind;
use super::{
    resolve_color_target, resolve_depth_target, translate, GlesRuntime, MAX_CUBE_UNITS,
    MAX_TEXTURE_UNITS, MAX_VERTEX_ATTRIBS,
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum DrawKind {
    Arrays {
        first: u32,
        count: u32,
    },
    Elements {
        count: u32,
        index_type: IndexType,
        source: IndexSource,
    },
}

/// One native buffer-binding slot produced by attribute consolidation.
struct SlotGroup {
    /// Structural identity of the backing store plus the effective stride;
    /// two attributes land in the same slot only when both match.
    identity: (u8, u32),
    stride: u32,
    /// Smallest source byte offset of the attributes in this slot.
    base_offset: u32,
    attributes: Vec<wgpu::VertexAttribute>,
    source: AttribSource,
}

/// A slot resolved to a range of the data region.
struct SlotBinding {
    offset: u64,
    size: u64,
    stride: u32,
    attributes: Vec<wgpu::VertexAttribute>,
}

struct IndexBinding {
    offset: u64,
    size: u64,
    format: wgpu::IndexFormat,
}

/// Group enabled attributes by `(source identity, effective stride)`. An
/// attribute joins an existing slot when its offset lies within one stride of
/// the slot base and the relative offset still fits the stride; interleaved
/// layouts collapse into one slot with per-attribute offsets.
fn group_attributes(
    attribs: &[(u32, VertexAttrib)],
) -> Result<Vec<SlotGroup>, RuntimeError> {
    let mut slots: Vec<SlotGroup> = Vec::new();

    for &(location, attrib) in attribs {
        let format = translate::vertex_format(attrib.ty, attrib.size, attrib.normalized).ok_or(
            RuntimeError::UnsupportedAttribute {
                index: location,
                detail: format!(
                    "{:?} x{} normalized={}",
                    attrib.ty, attrib.size, attrib.normalized
                ),
            },
        )?;
        let format_bytes = attrib.size * attrib.ty.component_bytes();
        let stride = attrib.effective_stride();
        let identity = attrib.source.identity();
        let offset = attrib.source.offset();

        let mut placed = false;
        for slot in &mut slots {
            if slot.identity != identity || slot.stride != stride {
                continue;
            }
            // Candidate base: attributes may arrive out of offset order.
            let base = slot.base_offset.min(offset);
            let within_one_stride = offset.max(slot.base_offset) - base < stride;
            let new_fits = offset + format_bytes - base <= stride;
            let existing_fit = slot.attributes.iter().all(|a| {
                let start = slot.base_offset + a.offset as u32;
                start - base + a.format.size() as u32 <= stride
            });
            if !within_one_stride || !new_fits || !existing_fit {
                continue;
            }
            if base != slot.base_offset {
                let shift = (slot.base_offset - base) as u64;
                for attribute in &mut slot.attributes {
                    attribute.offset += shift;
                }
                slot.base_offset = base;
            }
            slot.attributes.push(wgpu::VertexAttribute {
                format,
                offset: (offset - slot.base_offset) as u64,
                shader_location: location,
            });
            placed = true;
            break;
        }
        if !placed {
            slots.push(SlotGroup {
                identity,
                stride,
                base_offset: offset,
                attributes: vec![wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: location,
                }],
                source: attrib.source,
            });
        }
    }
    Ok(slots)
}

impl GlesRuntime {
    pub(crate) fn try_clear(
        &mut self,
        mask: ClearMask,
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    ) -> Result<(), RuntimeError> {
        if mask.is_empty() {
            return Ok(());
        }
        if self.device_faulted() {
            return Err(RuntimeError::DeviceFault);
        }

        let color_view = resolve_color_target(
            self.state.framebuffer,
            &self.textures,
            &self.swapchain,
            self.frames.current(),
            &self.config,
        )?
        .0;
        let depth_view = resolve_depth_target(
            self.state.framebuffer,
            &self.renderbuffers,
            &self.swapchain,
            self.frames.current(),
        );

        let color_ops = if mask.contains(ClearMask::COLOR) {
            wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color {
                    r: color[0] as f64,
                    g: color[1] as f64,
                    b: color[2] as f64,
                    a: color[3] as f64,
                }),
                store: wgpu::StoreOp::Store,
            }
        } else {
            wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }
        };

        let depth_stencil_attachment =
            depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if mask.contains(ClearMask::DEPTH) {
                        wgpu::LoadOp::Clear(depth.clamp(0.0, 1.0))
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: if mask.contains(ClearMask::STENCIL) {
                        wgpu::LoadOp::Clear(stencil)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
            });

        let encoder = self.frames.encoder(&self.device);
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glaze.clear.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: color_ops,
                })],
                depth_stencil_attachment,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        Ok(())
    }

    /// A full barrier runs before the first sampling bind of any texture the
    /// copy engine (or a render-target pass) touched behind the 3D engine's
    /// caches; the flag clears with the barrier.
    fn ensure_sampling_coherency(&mut self) {
        let mut pending = false;
        for &unit in &self.state.units {
            if unit == NONE_HANDLE {
                continue;
            }
            if let Some(record) = self.textures.lookup(unit) {
                if record.needs_coherency_barrier && record.sample_view.is_some() {
                    debug!(
                        unit,
                        was_render_target = record.used_as_render_target,
                        "full barrier before first sampling bind"
                    );
                    pending = true;
                }
            }
        }
        if !pending {
            return;
        }
        self.submit_wait_reprime();
        for unit in 0..MAX_TEXTURE_UNITS {
            let handle = self.state.units[unit];
            if handle == NONE_HANDLE {
                continue;
            }
            if let Ok(record) = self.textures.get_mut(handle) {
                if record.sample_view.is_some() {
                    record.needs_coherency_barrier = false;
                }
            }
        }
    }

    /// Rebuild the sampling descriptor tables when they were invalidated.
    /// Incomplete resources (a cubemap with missing faces, a deleted handle)
    /// resolve to the default descriptors: sampling them is a no-op, never a
    /// fault.
    fn ensure_descriptor_groups(&mut self) {
        if !self.descriptors_dirty
            && self.tex2d_bind_group.is_some()
            && self.cube_bind_group.is_some()
        {
            return;
        }

        let mut entries = Vec::with_capacity(MAX_TEXTURE_UNITS * 2);
        for unit in 0..MAX_TEXTURE_UNITS {
            let record = match self.textures.lookup(self.state.units[unit]) {
                Some(record)
                    if record.kind == TextureKind::Tex2d && record.sample_view.is_some() =>
                {
                    Some(record)
                }
                _ => None,
            };
            let sampler = record
                .and_then(|r| r.sampler.as_ref())
                .unwrap_or(&self.default_sampler);
            let view = record
                .and_then(|r| r.sample_view.as_ref())
                .unwrap_or(&self.default_view_2d);
            entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2 + 1) as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let tex2d = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glaze.textures2d.bg"),
            layout: &self.tex2d_bgl,
            entries: &entries,
        });

        let mut cube_entries = Vec::with_capacity(MAX_CUBE_UNITS * 2);
        for unit in 0..MAX_CUBE_UNITS {
            let record = match self.textures.lookup(self.state.units[unit]) {
                Some(record)
                    if record.kind == TextureKind::Cube && record.sample_view.is_some() =>
                {
                    Some(record)
                }
                _ => None,
            };
            let sampler = record
                .and_then(|r| r.sampler.as_ref())
                .unwrap_or(&self.default_sampler);
            let view = record
                .and_then(|r| r.sample_view.as_ref())
                .unwrap_or(&self.default_view_cube);
            cube_entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2) as u32,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
            cube_entries.push(wgpu::BindGroupEntry {
                binding: (unit * 2 + 1) as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let cube = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glaze.cubemaps.bg"),
            layout: &self.cube_bgl,
            entries: &cube_entries,
        });

        self.tex2d_bind_group = Some(tex2d);
        self.cube_bind_group = Some(cube);
        self.descriptors_dirty = false;
    }

    /// Resolve the grouped slots to data-region ranges, staging client-side
    /// sources as needed. Returns `None` per failed slot never; a staging
    /// failure aborts only the current draw via `Err`.
    fn resolve_slots(
        &mut self,
        groups: Vec<SlotGroup>,
    ) -> Result<Vec<SlotBinding>, RuntimeError> {
        let slot = self.frames.current();
        // One staging copy per distinct client array per draw.
        let mut staged: HashMap<u32, (u64, u64)> = HashMap::new();
        let mut bindings = Vec::with_capacity(groups.len());

        for group in groups {
            let (range_base, range_len) = match group.source {
                AttribSource::Buffer { buffer, .. } => {
                    let record = self.buffers.get(buffer)?;
                    let base = record.gpu_offset.ok_or(RuntimeError::UnknownHandle {
                        table: "buffer",
                        handle: buffer,
                    })?;
                    (base, record.shadow.len() as u64)
                }
                AttribSource::Client { array, .. } => match staged.get(&array) {
                    Some(&range) => range,
                    None => {
                        let data = self.client_arrays.get(&array).ok_or(
                            RuntimeError::UnknownHandle {
                                table: "client-array",
                                handle: array,
                            },
                        )?;
                        let len = data.len() as u64;
                        let offset = {
                            // Field-disjoint: the staged bytes live in
                            // `client_arrays`, the cursor in `regions`.
                            let bytes: &[u8] = data;
                            self.regions
                                .stage_client(&self.queue, slot, bytes)
                                .ok_or(RuntimeError::RegionExhausted {
                                    region: "client-data",
                                    requested: len,
                                })?
                        };
                        staged.insert(array, (offset, len));
                        (offset, len)
                    }
                },
            };

            let offset = range_base + group.base_offset as u64;
            if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
                return Err(RuntimeError::UnsupportedAttribute {
                    index: group.attributes[0].shader_location,
                    detail: format!("slot base offset {offset} not 4-byte aligned"),
                });
            }
            let size = range_len.saturating_sub(group.base_offset as u64);
            if size == 0 {
                return Err(RuntimeError::DrawSkipped("attribute range is empty"));
            }
            bindings.push(SlotBinding {
                offset,
                size,
                stride: group.stride,
                attributes: group.attributes,
            });
        }
        Ok(bindings)
    }

    /// Stage the constant values of every disabled attribute into one
    /// stride-0 slot, so non-varying attributes read the same bytes for each
    /// vertex.
    fn stage_constant_slot(
        &mut self,
        disabled: &[u32],
    ) -> Result<Option<SlotBinding>, RuntimeError> {
        if disabled.is_empty() {
            return Ok(None);
        }
        let mut bytes = Vec::with_capacity(disabled.len() * 16);
        let mut attributes = Vec::with_capacity(disabled.len());
        for (i, &location) in disabled.iter().enumerate() {
            let value = self.state.attrib_constants[location as usize];
            bytes.extend_from_slice(bytemuck::cast_slice(&value));
            attributes.push(wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x4,
                offset: (i * 16) as u64,
                shader_location: location,
            });
        }
        let slot = self.frames.current();
        let len = bytes.len() as u64;
        let offset = self
            .regions
            .stage_client(&self.queue, slot, &bytes)
            .ok_or(RuntimeError::RegionExhausted {
                region: "client-data",
                requested: len,
            })?;
        Ok(Some(SlotBinding {
            offset,
            size: len,
            stride: 0,
            attributes,
        }))
    }

    /// Prepare the index range for an indexed draw. 8-bit indices widen to
    /// 16-bit in staging; 16- and 32-bit indices copy (or bind) verbatim.
    fn resolve_indices(
        &mut self,
        count: u32,
        index_type: IndexType,
        source: IndexSource,
    ) -> Result<IndexBinding, RuntimeError> {
        let slot = self.frames.current();
        match (index_type, source) {
            (IndexType::U8, IndexSource::Buffer { buffer, offset }) => {
                let record = self.buffers.get(buffer)?;
                let start = offset as usize;
                let end = start
                    .checked_add(count as usize)
                    .filter(|&end| end <= record.shadow.len())
                    .ok_or(RuntimeError::DrawSkipped("index range out of bounds"))?;
                let widened = rows::widen_indices_u8_to_u16(&record.shadow[start..end]);
                let bytes: &[u8] = bytemuck::cast_slice(&widened);
                let len = bytes.len() as u64;
                let staged = self
                    .regions
                    .stage_client(&self.queue, slot, bytes)
                    .ok_or(RuntimeError::RegionExhausted {
                        region: "client-data",
                        requested: len,
                    })?;
                Ok(IndexBinding {
                    offset: staged,
                    size: len,
                    format: wgpu::IndexFormat::Uint16,
                })
            }
            (IndexType::U8, IndexSource::Client { array }) => {
                let data = self
                    .client_arrays
                    .get(&array)
                    .ok_or(RuntimeError::UnknownHandle {
                        table: "client-array",
                        handle: array,
                    })?;
                let take = (count as usize).min(data.len());
                let widened = rows::widen_indices_u8_to_u16(&data[..take]);
                let bytes: &[u8] = bytemuck::cast_slice(&widened);
                let len = bytes.len() as u64;
                let staged = self
                    .regions
                    .stage_client(&self.queue, slot, bytes)
                    .ok_or(RuntimeError::RegionExhausted {
                        region: "client-data",
                        requested: len,
                    })?;
                Ok(IndexBinding {
                    offset: staged,
                    size: len,
                    format: wgpu::IndexFormat::Uint16,
                })
            }
            (ty, IndexSource::Buffer { buffer, offset }) => {
                let record = self.buffers.get(buffer)?;
                let base = record.gpu_offset.ok_or(RuntimeError::UnknownHandle {
                    table: "buffer",
                    handle: buffer,
                })?;
                let index_bytes = if ty == IndexType::U16 { 2u64 } else { 4u64 };
                let size = count as u64 * index_bytes;
                if offset as u64 + size > record.shadow.len() as u64 {
                    return Err(RuntimeError::DrawSkipped("index range out of bounds"));
                }
                Ok(IndexBinding {
                    offset: base + offset as u64,
                    size,
                    format: if ty == IndexType::U16 {
                        wgpu::IndexFormat::Uint16
                    } else {
                        wgpu::IndexFormat::Uint32
                    },
                })
            }
            (ty, IndexSource::Client { array }) => {
                let index_bytes = if ty == IndexType::U16 { 2u64 } else { 4u64 };
                let data = self
                    .client_arrays
                    .get(&array)
                    .ok_or(RuntimeError::UnknownHandle {
                        table: "client-array",
                        handle: array,
                    })?;
                let take = ((count as u64 * index_bytes) as usize).min(data.len());
                let len = take as u64;
                let staged = self
                    .regions
                    .stage_client(&self.queue, slot, &data[..take])
                    .ok_or(RuntimeError::RegionExhausted {
                        region: "client-data",
                        requested: len,
                    })?;
                Ok(IndexBinding {
                    offset: staged,
                    size: len,
                    format: if ty == IndexType::U16 {
                        wgpu::IndexFormat::Uint16
                    } else {
                        wgpu::IndexFormat::Uint32
                    },
                })
            }
        }
    }

    pub(crate) fn try_draw(
        &mut self,
        primitive: Primitive,
        kind: DrawKind,
    ) -> Result<(), RuntimeError> {
        if self.device_faulted() {
            return Err(RuntimeError::DeviceFault);
        }
        let program = self.state.program;
        if program == NONE_HANDLE {
            return Err(RuntimeError::DrawSkipped("no program bound"));
        }
        if !self.programs.get(program)?.is_bindable() {
            return Err(RuntimeError::DrawSkipped("program has an invalid stage"));
        }

        self.ensure_sampling_coherency();
        self.ensure_descriptor_groups();

        // Snapshot-at-record: each draw captures the bound uniform bytes into
        // its own slice of the frame's uniform sub-range.
        let (vs_offset, fs_offset) = self.snapshot_uniforms()?;

        // Consolidate enabled attributes; disabled ones ride the constant
        // slot.
        let mut enabled = Vec::new();
        let mut disabled = Vec::new();
        for index in 0..MAX_VERTEX_ATTRIBS as u32 {
            match self.state.attribs[index as usize] {
                Some(attrib) => enabled.push((index, attrib)),
                None => disabled.push(index),
            }
        }
        let groups = group_attributes(&enabled)?;
        let mut slots = self.resolve_slots(groups)?;
        if let Some(constant_slot) = self.stage_constant_slot(&disabled)? {
            slots.push(constant_slot);
        }
        if slots.len() > wgpu::Limits::downlevel_defaults().max_vertex_buffers as usize {
            return Err(RuntimeError::DrawSkipped("too many vertex buffer slots"));
        }

        let indices = match kind {
            DrawKind::Arrays { .. } => None,
            DrawKind::Elements {
                count,
                index_type,
                source,
            } => Some(self.resolve_indices(count, index_type, source)?),
        };

        let strip_index = match (primitive, &indices) {
            (Primitive::LineStrip | Primitive::TriangleStrip, Some(binding)) => {
                Some(binding.format)
            }
            _ => None,
        };

        // Compose the pipeline key from the translated state fragments.
        let state = &self.state;
        let (_, target_w, target_h, color_format, target_handle) = resolve_color_target(
            state.framebuffer,
            &self.textures,
            &self.swapchain,
            self.frames.current(),
            &self.config,
        )?;
        let has_depth = resolve_depth_target(
            state.framebuffer,
            &self.renderbuffers,
            &self.swapchain,
            self.frames.current(),
        )
        .is_some();

        let scissor = if state.scissor_enabled {
            match translate::clamp_scissor(state.scissor, target_w, target_h) {
                Some(rect) => Some(rect),
                // Empty intersection: nothing to draw.
                None => return Ok(()),
            }
        } else {
            None
        };

        let key = PipelineKey {
            program,
            topology: primitive,
            raster: state.raster,
            color_format,
            color_mask_bits: state.color_mask.bits(),
            blend: state.blend.enabled.then_some(BlendKey {
                color_src: state.blend.color_src,
                color_dst: state.blend.color_dst,
                color_op: state.blend.color_op,
                alpha_src: state.blend.alpha_src,
                alpha_dst: state.blend.alpha_dst,
                alpha_op: state.blend.alpha_op,
            }),
            depth_test: state.depth.test_enabled,
            depth_write: state.depth.write_enabled,
            depth_func: state.depth.func,
            stencil: StencilKey {
                enabled: state.stencil.enabled,
                front: state.stencil.front,
                back: state.stencil.back,
                read_mask: state.stencil.read_mask,
                write_mask: state.stencil.write_mask,
            },
            bias_constant: state.bias.constant,
            bias_slope_bits: state.bias.slope.to_bits(),
            has_depth,
            strip_index,
            layouts: slots
                .iter()
                .map(|slot| VertexLayoutKey {
                    stride: slot.stride as u64,
                    attributes: slot
                        .attributes
                        .iter()
                        .map(|a| (a.shader_location, a.format, a.offset))
                        .collect(),
                })
                .collect(),
        };

        let blend = translate::blend_state(&self.state.blend);
        let depth = self.state.depth;
        let stencil = self.state.stencil;
        let bias = self.state.bias;
        let color_writes = translate::color_writes(self.state.color_mask);
        let program_record = self.programs.get(program)?;
        let device = &self.device;
        let layout = &self.pipeline_layout;

        let pipeline = self.pipelines.get_or_create(key, |key| {
            let buffers: Vec<wgpu::VertexBufferLayout> = slots
                .iter()
                .map(|slot| wgpu::VertexBufferLayout {
                    array_stride: slot.stride as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &slot.attributes,
                })
                .collect();

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("glaze.draw.pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &program_record.vertex.module,
                    entry_point: "vs_main",
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology: translate::topology(key.topology),
                    strip_index_format: key.strip_index,
                    front_face: translate::front_face(key.raster.front_face),
                    cull_mode: translate::cull_mode(key.raster.cull),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: key.has_depth.then(|| {
                    translate::depth_stencil_state(
                        &depth,
                        &stencil,
                        bias,
                        wgpu::TextureFormat::Depth24PlusStencil8,
                    )
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &program_record.fragment.module,
                    entry_point: "fs_main",
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color_format,
                        blend,
                        write_mask: color_writes,
                    })],
                }),
                multiview: None,
            })
        });

        // Record the pass.
        let color_view = resolve_color_target(
            self.state.framebuffer,
            &self.textures,
            &self.swapchain,
            self.frames.current(),
            &self.config,
        )?
        .0;
        let depth_view = resolve_depth_target(
            self.state.framebuffer,
            &self.renderbuffers,
            &self.swapchain,
            self.frames.current(),
        );

        let encoder = self.frames.encoder(&self.device);
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glaze.draw.pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_view.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            pass.set_pipeline(pipeline);
            // Dynamic state is programmed after the pipeline-state bind.
            if let Some(viewport) = self.state.viewport {
                let vp = translate::clamp_viewport(viewport, target_w, target_h);
                if vp.width > 0.0 && vp.height > 0.0 {
                    pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
                }
            }
            if let Some(rect) = scissor {
                pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
            }
            pass.set_blend_constant(wgpu::Color {
                r: self.state.blend.constant[0] as f64,
                g: self.state.blend.constant[1] as f64,
                b: self.state.blend.constant[2] as f64,
                a: self.state.blend.constant[3] as f64,
            });
            pass.set_stencil_reference(self.state.stencil.reference);

            pass.set_bind_group(0, &self.uniform_bind_group, &[vs_offset, fs_offset]);
            pass.set_bind_group(1, self.tex2d_bind_group.as_ref().unwrap(), &[]);
            pass.set_bind_group(2, self.cube_bind_group.as_ref().unwrap(), &[]);

            for (i, slot) in slots.iter().enumerate() {
                pass.set_vertex_buffer(
                    i as u32,
                    self.regions.data.slice(slot.offset..slot.offset + slot.size),
                );
            }

            match (kind, &indices) {
                (DrawKind::Arrays { first, count }, None) => {
                    pass.draw(first..first.saturating_add(count), 0..1);
                }
                (DrawKind::Elements { count, .. }, Some(binding)) => {
                    pass.set_index_buffer(
                        self.regions
                            .data
                            .slice(binding.offset..binding.offset + binding.size),
                        binding.format,
                    );
                    pass.draw_indexed(0..count, 0, 0..1);
                }
                _ => unreachable!("draw kind and index binding always agree"),
            }
        }

        // A draw into a non-default target needs a full barrier before that
        // target can be sampled.
        if target_handle != NONE_HANDLE {
            if let Ok(record) = self.textures.get_mut(target_handle) {
                record.needs_coherency_barrier = true;
            }
            self.descriptors_dirty = true;
        }
        debug!(?primitive, slots = slots.len(), "draw recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttribType;

    fn attrib(buffer: Handle, offset: u32, stride: u32, size: u32) -> VertexAttrib {
        VertexAttrib {
            size,
            ty: AttribType::F32,
            normalized: false,
            stride,
            source: AttribSource::Buffer { buffer, offset },
        }
    }

    #[test]
    fn interleaved_attributes_share_one_slot() {
        // Stride 32, offsets 0 and 12: one buffer binding, two attribute
        // offsets.
        let groups = group_attributes(&[
            (0, attrib(7, 0, 32, 3)),
            (1, attrib(7, 12, 32, 2)),
        ])
        .unwrap();

        assert_eq!(groups.len(), 1);
        let slot = &groups[0];
        assert_eq!(slot.stride, 32);
        assert_eq!(slot.base_offset, 0);
        assert_eq!(slot.attributes[0].offset, 0);
        assert_eq!(slot.attributes[1].offset, 12);
    }

    #[test]
    fn interleave_detection_handles_out_of_order_offsets() {
        let groups = group_attributes(&[
            (0, attrib(7, 12, 32, 2)),
            (1, attrib(7, 0, 32, 3)),
        ])
        .unwrap();

        assert_eq!(groups.len(), 1);
        let slot = &groups[0];
        assert_eq!(slot.base_offset, 0);
        // The earlier attribute was rebased when the lower offset arrived.
        assert_eq!(slot.attributes[0].offset, 12);
        assert_eq!(slot.attributes[1].offset, 0);
    }

    #[test]
    fn different_strides_split_slots() {
        let groups = group_attributes(&[
            (0, attrib(7, 0, 32, 3)),
            (1, attrib(7, 0, 16, 2)),
        ])
        .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn different_buffers_split_slots() {
        let groups = group_attributes(&[
            (0, attrib(7, 0, 32, 3)),
            (1, attrib(8, 0, 32, 3)),
        ])
        .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn far_apart_offsets_split_slots() {
        // Same buffer and stride, but more than one stride apart: separate
        // non-interleaved streams.
        let groups = group_attributes(&[
            (0, attrib(7, 0, 16, 2)),
            (1, attrib(7, 4096, 16, 2)),
        ])
        .unwrap();
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn tightly_packed_stride_zero_computes_effective_stride() {
        let a = attrib(7, 0, 0, 3);
        assert_eq!(a.effective_stride(), 12);
    }

    #[test]
    fn unsupported_layout_is_an_error() {
        let bad = VertexAttrib {
            size: 3,
            ty: AttribType::U8,
            normalized: true,
            stride: 0,
            source: AttribSource::Buffer { buffer: 1, offset: 0 },
        };
        assert!(matches!(
            group_attributes(&[(0, bad)]),
            Err(RuntimeError::UnsupportedAttribute { index: 0, .. })
        ));
    }

    #[test]
    fn client_arrays_group_by_array_identity() {
        let a = VertexAttrib {
            size: 2,
            ty: AttribType::F32,
            normalized: false,
            stride: 16,
            source: AttribSource::Client { array: 3, offset: 0 },
        };
        let b = VertexAttrib {
            size: 2,
            ty: AttribType::F32,
            normalized: false,
            stride: 16,
            source: AttribSource::Client { array: 3, offset: 8 },
        };
        let groups = group_attributes(&[(0, a), (1, b)]).unwrap();
        assert_eq!(groups.len(), 1);

        // A buffer-backed attribute with the same numeric id stays separate:
        // identity includes the source kind.
        let c = attrib(3, 0, 16, 2);
        let groups = group_attributes(&[(0, a), (1, c)]).unwrap();
        assert_eq!(groups.len(), 2);
    }
}

//! Native pipeline-state composition and caching.
//!
//! The native API bakes blend/depth/stencil/raster/vertex-layout state into
//! monolithic pipeline objects, so the translated state fragments are
//! combined into a key and the resulting objects cached for the lifetime of
//! the runtime. Dynamic values (blend constant, stencil reference, viewport,
//! scissor) stay out of the key and are programmed after the pipeline bind.

use std::collections::HashMap;

use crate::handle::Handle;
use crate::types::{
    BlendFactor, BlendOp, CompareFunc, Primitive, RasterState, StencilFaceState,
};

/// Blend portion of the key; the constant color is dynamic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendKey {
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub color_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    pub alpha_op: BlendOp,
}

/// Stencil portion of the key; the reference value is dynamic state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilKey {
    pub enabled: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub read_mask: u32,
    pub write_mask: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayoutKey {
    pub stride: u64,
    pub attributes: Vec<(u32, wgpu::VertexFormat, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: Handle,
    pub topology: Primitive,
    pub raster: RasterState,
    pub color_format: wgpu::TextureFormat,
    pub color_mask_bits: u8,
    pub blend: Option<BlendKey>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunc,
    pub stencil: StencilKey,
    pub bias_constant: i32,
    /// f32 slope stored as raw bits so the key stays hashable.
    pub bias_slope_bits: u32,
    pub has_depth: bool,
    /// Strip topologies bake the restart index format into the pipeline for
    /// indexed draws.
    pub strip_index: Option<wgpu::IndexFormat>,
    pub layouts: Vec<VertexLayoutKey>,
}

#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn get_or_create(
        &mut self,
        key: PipelineKey,
        create: impl FnOnce(&PipelineKey) -> wgpu::RenderPipeline,
    ) -> &wgpu::RenderPipeline {
        self.pipelines.entry(key).or_insert_with_key(create)
    }

    /// Drop every cached object. Program deletion invalidates its pipelines.
    pub fn remove_program(&mut self, program: Handle) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CullMode, FrontFace};

    fn base_key() -> PipelineKey {
        PipelineKey {
            program: 1,
            topology: Primitive::TriangleList,
            raster: RasterState {
                cull: CullMode::None,
                front_face: FrontFace::Ccw,
            },
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            color_mask_bits: 0xF,
            blend: None,
            depth_test: false,
            depth_write: false,
            depth_func: CompareFunc::Less,
            stencil: StencilKey {
                enabled: false,
                front: StencilFaceState::default(),
                back: StencilFaceState::default(),
                read_mask: 0xFF,
                write_mask: 0xFF,
            },
            bias_constant: 0,
            bias_slope_bits: 0,
            has_depth: true,
            strip_index: None,
            layouts: Vec::new(),
        }
    }

    #[test]
    fn keys_differ_by_any_state_fragment() {
        let a = base_key();

        let mut b = a.clone();
        b.depth_test = true;
        assert_ne!(a, b);

        let mut c = a.clone();
        c.bias_slope_bits = 1.5f32.to_bits();
        assert_ne!(a, c);

        let mut d = a.clone();
        d.layouts.push(VertexLayoutKey {
            stride: 32,
            attributes: vec![(0, wgpu::VertexFormat::Float32x3, 0)],
        });
        assert_ne!(a, d);
    }
}

//! Fixed-function state translation onto native pipeline-state fragments.
//!
//! Each `apply_*` call translates one state group; the draw assembler
//! composes the fragments into a full pipeline description. Depth and
//! stencil are one native object (see `GlesBackend::apply_depth_stencil`).
//! Cull mode and winding map directly with no Y-axis inversion: the native
//! device's default coordinate convention already matches the emulated API.

use crate::types::{
    AttribType, BlendFactor, BlendOp, BlendState, ColorMask, CompareFunc, CullMode, DepthBias,
    DepthState, FrontFace, Primitive, ScissorRect, StencilFaceState, StencilOp, StencilState,
    Viewport,
};

pub fn compare_func(func: CompareFunc) -> wgpu::CompareFunction {
    match func {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

pub fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::ConstantColor => wgpu::BlendFactor::Constant,
        BlendFactor::OneMinusConstantColor => wgpu::BlendFactor::OneMinusConstant,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn blend_op(op: BlendOp) -> wgpu::BlendOperation {
    match op {
        BlendOp::Add => wgpu::BlendOperation::Add,
        BlendOp::Subtract => wgpu::BlendOperation::Subtract,
        BlendOp::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
    }
}

pub fn stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::IncrClamp => wgpu::StencilOperation::IncrementClamp,
        StencilOp::DecrClamp => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

pub fn cull_mode(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

pub fn front_face(winding: FrontFace) -> wgpu::FrontFace {
    match winding {
        FrontFace::Ccw => wgpu::FrontFace::Ccw,
        FrontFace::Cw => wgpu::FrontFace::Cw,
    }
}

pub fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Points => wgpu::PrimitiveTopology::PointList,
        Primitive::Lines => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::TriangleList => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub fn blend_state(state: &BlendState) -> Option<wgpu::BlendState> {
    if !state.enabled {
        return None;
    }
    Some(wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(state.color_src),
            dst_factor: blend_factor(state.color_dst),
            operation: blend_op(state.color_op),
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(state.alpha_src),
            dst_factor: blend_factor(state.alpha_dst),
            operation: blend_op(state.alpha_op),
        },
    })
}

pub fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let mut writes = wgpu::ColorWrites::empty();
    if mask.contains(ColorMask::R) {
        writes |= wgpu::ColorWrites::RED;
    }
    if mask.contains(ColorMask::G) {
        writes |= wgpu::ColorWrites::GREEN;
    }
    if mask.contains(ColorMask::B) {
        writes |= wgpu::ColorWrites::BLUE;
    }
    if mask.contains(ColorMask::A) {
        writes |= wgpu::ColorWrites::ALPHA;
    }
    writes
}

fn stencil_face(face: &StencilFaceState, enabled: bool) -> wgpu::StencilFaceState {
    if !enabled {
        return wgpu::StencilFaceState::IGNORE;
    }
    wgpu::StencilFaceState {
        compare: compare_func(face.func),
        fail_op: stencil_op(face.fail_op),
        depth_fail_op: stencil_op(face.depth_fail_op),
        pass_op: stencil_op(face.pass_op),
    }
}

/// Build the single merged depth+stencil object.
pub fn depth_stencil_state(
    depth: &DepthState,
    stencil: &StencilState,
    bias: DepthBias,
    format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: depth.test_enabled && depth.write_enabled,
        depth_compare: if depth.test_enabled {
            compare_func(depth.func)
        } else {
            wgpu::CompareFunction::Always
        },
        stencil: wgpu::StencilState {
            front: stencil_face(&stencil.front, stencil.enabled),
            back: stencil_face(&stencil.back, stencil.enabled),
            read_mask: stencil.read_mask,
            write_mask: if stencil.enabled { stencil.write_mask } else { 0 },
        },
        bias: wgpu::DepthBiasState {
            constant: bias.constant,
            slope_scale: bias.slope,
            clamp: 0.0,
        },
    }
}

/// Map an attribute's component layout to a native vertex format.
///
/// The native fetch hardware has no 1- or 3-component narrow formats, so
/// those combinations are unsupported and the caller skips the draw.
pub fn vertex_format(ty: AttribType, size: u32, normalized: bool) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let format = match (ty, size, normalized) {
        (AttribType::F32, 1, _) => F::Float32,
        (AttribType::F32, 2, _) => F::Float32x2,
        (AttribType::F32, 3, _) => F::Float32x3,
        (AttribType::F32, 4, _) => F::Float32x4,
        (AttribType::U8, 2, true) => F::Unorm8x2,
        (AttribType::U8, 4, true) => F::Unorm8x4,
        (AttribType::U8, 2, false) => F::Uint8x2,
        (AttribType::U8, 4, false) => F::Uint8x4,
        (AttribType::I8, 2, true) => F::Snorm8x2,
        (AttribType::I8, 4, true) => F::Snorm8x4,
        (AttribType::I8, 2, false) => F::Sint8x2,
        (AttribType::I8, 4, false) => F::Sint8x4,
        (AttribType::U16, 2, true) => F::Unorm16x2,
        (AttribType::U16, 4, true) => F::Unorm16x4,
        (AttribType::U16, 2, false) => F::Uint16x2,
        (AttribType::U16, 4, false) => F::Uint16x4,
        (AttribType::I16, 2, true) => F::Snorm16x2,
        (AttribType::I16, 4, true) => F::Snorm16x4,
        (AttribType::I16, 2, false) => F::Sint16x2,
        (AttribType::I16, 4, false) => F::Sint16x4,
        _ => return None,
    };
    Some(format)
}

/// Clamp a viewport to the current target; the emulated API allows rectangles
/// that poke outside it, the native one does not.
pub fn clamp_viewport(mut viewport: Viewport, width: u32, height: u32) -> Viewport {
    let (tw, th) = (width as f32, height as f32);
    if viewport.x < 0.0 {
        viewport.width += viewport.x;
        viewport.x = 0.0;
    }
    if viewport.y < 0.0 {
        viewport.height += viewport.y;
        viewport.y = 0.0;
    }
    viewport.x = viewport.x.min(tw);
    viewport.y = viewport.y.min(th);
    viewport.width = viewport.width.clamp(0.0, tw - viewport.x);
    viewport.height = viewport.height.clamp(0.0, th - viewport.y);
    viewport.min_depth = viewport.min_depth.clamp(0.0, 1.0);
    viewport.max_depth = viewport.max_depth.clamp(viewport.min_depth, 1.0);
    viewport
}

/// Clamp a scissor rectangle; `None` means the intersection is empty and the
/// draw can be skipped outright.
pub fn clamp_scissor(rect: ScissorRect, width: u32, height: u32) -> Option<ScissorRect> {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    let w = rect.width.min(width - x);
    let h = rect.height.min(height - y);
    if w == 0 || h == 0 {
        return None;
    }
    Some(ScissorRect {
        x,
        y,
        width: w,
        height: h,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_depth_test_translates_to_always_pass_no_write() {
        let ds = depth_stencil_state(
            &DepthState {
                test_enabled: false,
                write_enabled: true,
                func: CompareFunc::Less,
            },
            &StencilState::default(),
            DepthBias::default(),
            wgpu::TextureFormat::Depth24PlusStencil8,
        );
        assert!(!ds.depth_write_enabled);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::Always);
        assert!(!ds.stencil.is_enabled());
    }

    #[test]
    fn merged_object_carries_both_depth_and_stencil_fields() {
        let depth = DepthState {
            test_enabled: true,
            write_enabled: true,
            func: CompareFunc::LessEqual,
        };
        let stencil = StencilState {
            enabled: true,
            front: StencilFaceState {
                func: CompareFunc::Equal,
                fail_op: StencilOp::Keep,
                depth_fail_op: StencilOp::Keep,
                pass_op: StencilOp::Replace,
            },
            ..StencilState::default()
        };
        let ds = depth_stencil_state(
            &depth,
            &stencil,
            DepthBias::default(),
            wgpu::TextureFormat::Depth24PlusStencil8,
        );

        // One object: neither group may clobber the other.
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::LessEqual);
        assert!(ds.depth_write_enabled);
        assert_eq!(ds.stencil.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(ds.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(ds.stencil.write_mask, 0xFF);
    }

    #[test]
    fn raster_mapping_has_no_axis_inversion() {
        assert_eq!(front_face(FrontFace::Ccw), wgpu::FrontFace::Ccw);
        assert_eq!(front_face(FrontFace::Cw), wgpu::FrontFace::Cw);
        assert_eq!(cull_mode(CullMode::Back), Some(wgpu::Face::Back));
        assert_eq!(cull_mode(CullMode::None), None);
    }

    #[test]
    fn narrow_integer_attribute_layouts_are_unsupported() {
        assert_eq!(vertex_format(AttribType::U8, 3, true), None);
        assert_eq!(vertex_format(AttribType::U16, 1, false), None);
        assert_eq!(
            vertex_format(AttribType::F32, 3, false),
            Some(wgpu::VertexFormat::Float32x3)
        );
    }

    #[test]
    fn scissor_clamps_to_target_and_drops_empty() {
        assert_eq!(
            clamp_scissor(
                ScissorRect {
                    x: 10,
                    y: 10,
                    width: 1000,
                    height: 1000
                },
                64,
                64
            ),
            Some(ScissorRect {
                x: 10,
                y: 10,
                width: 54,
                height: 54
            })
        );
        assert_eq!(
            clamp_scissor(
                ScissorRect {
                    x: 100,
                    y: 0,
                    width: 10,
                    height: 10
                },
                64,
                64
            ),
            None
        );
    }
}

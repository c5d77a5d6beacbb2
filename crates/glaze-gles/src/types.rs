//! API-level state model.
//!
//! These are the value types carried across the operation table: the front
//! end has already validated them semantically, so the backend treats them as
//! well-formed and only translates.

use bitflags::bitflags;

use crate::handle::Handle;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

bitflags! {
    /// Per-face upload completion mask for cubemaps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CubeFaces: u8 {
        const POS_X = 1 << 0;
        const NEG_X = 1 << 1;
        const POS_Y = 1 << 2;
        const NEG_Y = 1 << 3;
        const POS_Z = 1 << 4;
        const NEG_Z = 1 << 5;
    }
}

impl CubeFaces {
    pub const COMPLETE: CubeFaces = CubeFaces::all();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl CubeFace {
    pub fn bit(self) -> CubeFaces {
        match self {
            Self::PosX => CubeFaces::POS_X,
            Self::NegX => CubeFaces::NEG_X,
            Self::PosY => CubeFaces::POS_Y,
            Self::NegY => CubeFaces::NEG_Y,
            Self::PosZ => CubeFaces::POS_Z,
            Self::NegZ => CubeFaces::NEG_Z,
        }
    }

    /// Array layer of the face in the native cubemap image.
    pub fn layer(self) -> u32 {
        match self {
            Self::PosX => 0,
            Self::NegX => 1,
            Self::PosY => 2,
            Self::NegY => 3,
            Self::PosZ => 4,
            Self::NegZ => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrClamp,
    DecrClamp,
    Invert,
    IncrWrap,
    DecrWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendState {
    pub enabled: bool,
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub color_op: BlendOp,
    pub alpha_src: BlendFactor,
    pub alpha_dst: BlendFactor,
    pub alpha_op: BlendOp,
    /// Programmed as dynamic state after the pipeline bind.
    pub constant: [f32; 4],
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            color_src: BlendFactor::One,
            color_dst: BlendFactor::Zero,
            color_op: BlendOp::Add,
            alpha_src: BlendFactor::One,
            alpha_dst: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            constant: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub func: CompareFunc,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enabled: false,
            write_enabled: true,
            func: CompareFunc::Less,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub func: CompareFunc,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            func: CompareFunc::Always,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub enabled: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub read_mask: u32,
    pub write_mask: u32,
    /// Programmed as dynamic state after the pipeline bind.
    pub reference: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
            read_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull: CullMode,
    pub front_face: FrontFace,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            cull: CullMode::None,
            front_face: FrontFace::Ccw,
        }
    }
}

/// Polygon offset. `slope` scales with the primitive's depth slope,
/// `constant` is in minimum-resolvable-depth units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    pub constant: i32,
    pub slope: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexFormat {
    /// 4-channel 8-bit.
    Rgba8,
    /// 3-channel 8-bit; widened to 4 channels during staging because the
    /// native format set has no packed 24-bit layout.
    Rgb8,
    /// Single-channel 8-bit.
    Alpha8,
}

impl TexFormat {
    /// Bytes per texel as supplied by the caller.
    pub fn source_texel_bytes(self) -> u32 {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
            Self::Alpha8 => 1,
        }
    }

    /// Bytes per texel once staged for the native image.
    pub fn native_texel_bytes(self) -> u32 {
        match self {
            Self::Rgba8 | Self::Rgb8 => 4,
            Self::Alpha8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressedFormat {
    Bc1,
    Bc2,
    Bc3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexFilter {
    Nearest,
    Linear,
    NearestMipNearest,
    LinearMipNearest,
    NearestMipLinear,
    LinearMipLinear,
}

impl TexFilter {
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, Self::Nearest | Self::Linear)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexWrap {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    pub min_filter: TexFilter,
    pub mag_filter: TexFilter,
    pub wrap_s: TexWrap,
    pub wrap_t: TexWrap,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: TexFilter::NearestMipLinear,
            mag_filter: TexFilter::Linear,
            wrap_s: TexWrap::Repeat,
            wrap_t: TexWrap::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribType {
    F32,
    U8,
    I8,
    U16,
    I16,
}

impl AttribType {
    pub fn component_bytes(self) -> u32 {
        match self {
            Self::F32 => 4,
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
        }
    }
}

/// Where a vertex attribute's data lives.
///
/// Client-side attributes carry an array identity and a byte offset instead
/// of a raw pointer, so interleave detection is a structural equality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttribSource {
    Buffer { buffer: Handle, offset: u32 },
    Client { array: u32, offset: u32 },
}

impl AttribSource {
    pub fn offset(self) -> u32 {
        match self {
            Self::Buffer { offset, .. } | Self::Client { offset, .. } => offset,
        }
    }

    /// Identity of the backing store, ignoring the byte offset.
    pub fn identity(self) -> (u8, u32) {
        match self {
            Self::Buffer { buffer, .. } => (0, buffer),
            Self::Client { array, .. } => (1, array),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    /// Component count, 1..=4.
    pub size: u32,
    pub ty: AttribType,
    pub normalized: bool,
    /// 0 means tightly packed (`size * component_bytes`).
    pub stride: u32,
    pub source: AttribSource,
}

impl VertexAttrib {
    pub fn effective_stride(&self) -> u32 {
        if self.stride != 0 {
            self.stride
        } else {
            self.size * self.ty.component_bytes()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U8,
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSource {
    Buffer { buffer: Handle, offset: u32 },
    Client { array: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

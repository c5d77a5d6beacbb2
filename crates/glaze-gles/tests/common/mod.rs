//! Shared helpers for backend integration tests.
//!
//! Tests acquire a real device and skip gracefully when the host has no
//! usable adapter (software or otherwise), so CI without a GPU stays green.

#![allow(dead_code)]

use std::path::PathBuf;

use glaze_gles::{
    GlesBackend, GlesRuntime, Handle, Primitive, RuntimeConfig, RuntimeError, ShaderStage,
    VertexAttrib,
};

pub const TARGET_W: u32 = 8;
pub const TARGET_H: u32 = 8;

pub fn runtime() -> Option<GlesRuntime> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = RuntimeConfig {
        swapchain_width: TARGET_W,
        swapchain_height: TARGET_H,
        ..Default::default()
    };
    match GlesRuntime::new_blocking(config) {
        Ok(runtime) => Some(runtime),
        Err(RuntimeError::AdapterNotFound) => {
            eprintln!("skipping test: no GPU adapter available");
            None
        }
        Err(err) => {
            eprintln!("skipping test: device unavailable: {err}");
            None
        }
    }
}

/// Write a precompiled shader blob where the backend can load it from.
pub fn write_blob(dir: &tempfile::TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).expect("write shader blob");
    path
}

pub const SOLID_VS: &str = r#"
@vertex
fn vs_main(@location(0) pos: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 0.0, 1.0);
}
"#;

pub const SOLID_FS: &str = r#"
struct FsUniforms {
    color: vec4<f32>,
};
@group(0) @binding(1) var<uniform> fs_u: FsUniforms;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return fs_u.color;
}
"#;

pub const TEXTURED_VS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(pos, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

pub const TEXTURED_FS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(1) @binding(0) var s0: sampler;
@group(1) @binding(1) var t0: texture_2d<f32>;

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return textureSample(t0, s0, in.uv);
}
"#;

pub const CUBE_FS: &str = r#"
@group(2) @binding(0) var sc: sampler;
@group(2) @binding(1) var tc: texture_cube<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return textureSample(tc, sc, vec3<f32>(1.0, 0.0, 0.0));
}
"#;

pub const TINTED_VS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) tint: vec4<f32>,
};

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(5) tint: vec4<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(pos, 0.0, 1.0);
    out.tint = tint;
    return out;
}
"#;

pub const TINTED_FS: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) tint: vec4<f32>,
};

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return in.tint;
}
"#;

/// Load, link, and bind a program from WGSL blobs on disk.
pub fn setup_program(
    runtime: &mut GlesRuntime,
    dir: &tempfile::TempDir,
    program: Handle,
    vs_source: &str,
    fs_source: &str,
) {
    let vs_path = write_blob(dir, "shader.vs.blob", vs_source);
    let fs_path = write_blob(dir, "shader.fs.blob", fs_source);
    let vs_handle = program * 10 + 1;
    let fs_handle = program * 10 + 2;
    runtime.load_shader(vs_handle, ShaderStage::Vertex, &vs_path);
    runtime.load_shader(fs_handle, ShaderStage::Fragment, &fs_path);
    runtime.link_program(program, vs_handle, fs_handle);
    runtime.bind_program(program);
}

/// Fullscreen quad positions for a 4-vertex triangle strip.
pub fn quad_positions() -> Vec<u8> {
    let verts: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
    bytemuck::cast_slice(&verts).to_vec()
}

/// Fullscreen quad with per-vertex UVs interleaved (pos.xy, uv.xy).
/// v = 0 lands on the top screen edge so texel row 0 renders at the top.
pub fn quad_positions_uvs() -> Vec<u8> {
    let verts: [f32; 16] = [
        -1.0, -1.0, 0.0, 1.0, //
        1.0, -1.0, 1.0, 1.0, //
        -1.0, 1.0, 0.0, 0.0, //
        1.0, 1.0, 1.0, 0.0,
    ];
    bytemuck::cast_slice(&verts).to_vec()
}

pub fn position_attrib(array: u32) -> VertexAttrib {
    VertexAttrib {
        size: 2,
        ty: glaze_gles::AttribType::F32,
        normalized: false,
        stride: 8,
        source: glaze_gles::AttribSource::Client { array, offset: 0 },
    }
}

/// Draw a fullscreen quad from client array `array` (positions only).
pub fn draw_fullscreen(runtime: &mut GlesRuntime, array: u32) {
    runtime.supply_client_array(array, &quad_positions());
    runtime.set_vertex_attrib(0, Some(position_attrib(array)));
    runtime.draw_arrays(Primitive::TriangleStrip, 0, 4);
}

/// Fetch the RGBA8 pixel at bottom-origin window coordinates `(x, y)` from a
/// `read_pixels` result.
pub fn pixel(data: &[u8], x: u32, y: u32, width: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [data[i], data[i + 1], data[i + 2], data[i + 3]]
}

/// Uniform block contents for a solid color.
pub fn color_bytes(rgba: [f32; 4]) -> Vec<u8> {
    bytemuck::cast_slice(&rgba).to_vec()
}

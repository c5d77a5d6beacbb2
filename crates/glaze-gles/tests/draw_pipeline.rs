//! Draw assembly, uniform snapshots, index widening, and cubemap atomicity
//! exercised against a real device.

mod common;

use pretty_assertions::assert_eq;

use common::{
    color_bytes, draw_fullscreen, pixel, position_attrib, quad_positions, quad_positions_uvs,
    setup_program, TARGET_H, TARGET_W,
};
use glaze_gles::{
    AttribSource, AttribType, ClearMask, CubeFace, GlesBackend, IndexSource, IndexType, Primitive,
    ScissorRect, TexFilter, TexFormat, TexWrap, SamplerParams, VertexAttrib,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

fn nearest_params() -> SamplerParams {
    SamplerParams {
        min_filter: TexFilter::Nearest,
        mag_filter: TexFilter::Nearest,
        wrap_s: TexWrap::ClampToEdge,
        wrap_t: TexWrap::ClampToEdge,
    }
}

/// Two sequential draws in the same recorded command stream with different
/// uniform values each observe their own value: uniforms are snapshotted at
/// record time, not read live at execution time.
#[test]
fn uniform_snapshot_isolation_between_draws() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::SOLID_FS);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);

    runtime.uniform_alloc(1, 16);
    runtime.uniform_write(1, 0, &color_bytes([1.0, 0.0, 0.0, 1.0]));
    runtime.bind_uniforms(0, 1);

    draw_fullscreen(&mut runtime, 1);

    // Overwrite the block, scissor to the right half, draw again. If the GPU
    // read the block lazily both halves would come out green.
    runtime.uniform_write(1, 0, &color_bytes([0.0, 1.0, 0.0, 1.0]));
    runtime.apply_scissor(
        true,
        ScissorRect {
            x: TARGET_W / 2,
            y: 0,
            width: TARGET_W / 2,
            height: TARGET_H,
        },
    );
    draw_fullscreen(&mut runtime, 1);
    runtime.apply_scissor(false, ScissorRect { x: 0, y: 0, width: 0, height: 0 });

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(pixel(&data, 1, 3, TARGET_W), RED, "left half keeps draw 1's snapshot");
    assert_eq!(pixel(&data, 6, 3, TARGET_W), GREEN, "right half sees draw 2's snapshot");
}

/// 8-bit indices are widened to 16-bit in staging; the element-fetch
/// sequence matches the equivalent 16-bit draw exactly.
#[test]
fn index_widening_matches_16_bit_draw() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::SOLID_FS);

    runtime.uniform_alloc(1, 16);
    runtime.uniform_write(1, 0, &color_bytes([1.0, 0.0, 0.0, 1.0]));
    runtime.bind_uniforms(0, 1);

    runtime.supply_client_array(1, &quad_positions());
    runtime.set_vertex_attrib(0, Some(position_attrib(1)));

    let draw_with = |runtime: &mut glaze_gles::GlesRuntime,
                         index_type: IndexType,
                         array: u32|
     -> Vec<u8> {
        let slot = runtime.acquire_image();
        runtime.begin_frame(slot);
        runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);
        runtime.draw_elements(
            Primitive::TriangleList,
            3,
            index_type,
            IndexSource::Client { array },
        );
        let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
        runtime.end_frame(slot);
        runtime.present(slot);
        runtime.wait_fence(slot);
        data
    };

    // Trailing 255 exercises the full byte range without being fetched.
    runtime.supply_client_array(2, &[0u8, 1, 2, 255]);
    let narrow = draw_with(&mut runtime, IndexType::U8, 2);

    let wide_indices: [u16; 4] = [0, 1, 2, 255];
    runtime.supply_client_array(3, bytemuck::cast_slice(&wide_indices));
    let wide = draw_with(&mut runtime, IndexType::U16, 3);

    assert_eq!(narrow, wide, "8-bit and 16-bit index draws must rasterize identically");
    // The single triangle covers the lower-left half.
    assert_eq!(pixel(&narrow, 1, 1, TARGET_W), RED);
    assert_eq!(pixel(&narrow, 6, 6, TARGET_W), BLACK);
}

/// Two attributes sharing one client array with stride 16 and offsets 0/8
/// land in one native buffer-binding slot; the textured quad samples the
/// uploaded image in supplied row order.
#[test]
fn interleaved_attributes_drive_textured_draw() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::TEXTURED_VS, common::TEXTURED_FS);

    // 2x2 texture: top row red/green, bottom row blue/white.
    let texels: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 255, 255],
    ];
    runtime.tex_image_2d(1, 2, 2, TexFormat::Rgba8, bytemuck::cast_slice(&texels));
    runtime.tex_parameter(1, nearest_params());
    runtime.bind_texture(0, 1);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);

    runtime.supply_client_array(1, &quad_positions_uvs());
    runtime.set_vertex_attrib(
        0,
        Some(VertexAttrib {
            size: 2,
            ty: AttribType::F32,
            normalized: false,
            stride: 16,
            source: AttribSource::Client { array: 1, offset: 0 },
        }),
    );
    runtime.set_vertex_attrib(
        1,
        Some(VertexAttrib {
            size: 2,
            ty: AttribType::F32,
            normalized: false,
            stride: 16,
            source: AttribSource::Client { array: 1, offset: 8 },
        }),
    );
    runtime.draw_arrays(Primitive::TriangleStrip, 0, 4);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    // v=0 maps to the screen top, so texel row 0 is the top half; read_pixels
    // rows are bottom-origin.
    assert_eq!(pixel(&data, 1, 6, TARGET_W), RED, "top-left shows texel (0,0)");
    assert_eq!(pixel(&data, 6, 6, TARGET_W), GREEN, "top-right shows texel (1,0)");
    assert_eq!(pixel(&data, 1, 1, TARGET_W), [0, 0, 255, 255]);
    assert_eq!(pixel(&data, 6, 1, TARGET_W), [255, 255, 255, 255]);
}

/// Disabled attributes feed their constant value through a non-varying slot.
#[test]
fn disabled_attribute_uses_constant_value() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::TINTED_VS, common::TINTED_FS);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);

    // Attribute 5 stays disabled; its constant value tints every fragment.
    runtime.set_attrib_constant(5, [0.0, 1.0, 0.0, 1.0]);
    draw_fullscreen(&mut runtime, 1);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(pixel(&data, 3, 3, TARGET_W), GREEN);
}

/// A cubemap's sampling descriptor is observable only after all six faces
/// have uploaded; binding earlier is a silent no-op that samples the default
/// texture instead of crashing or returning garbage.
#[test]
fn cubemap_sampling_is_atomic_across_face_uploads() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::CUBE_FS);

    let face_pixels = |rgba: [u8; 4]| -> Vec<u8> {
        std::iter::repeat(rgba).take(4).flatten().collect()
    };

    // Five faces only; +X is red.
    let faces = [
        (CubeFace::PosX, [255u8, 0, 0, 255]),
        (CubeFace::NegX, [1, 0, 0, 255]),
        (CubeFace::PosY, [2, 0, 0, 255]),
        (CubeFace::NegY, [3, 0, 0, 255]),
        (CubeFace::PosZ, [4, 0, 0, 255]),
    ];
    for (face, color) in faces {
        runtime.tex_image_cube_face(5, face, 2, TexFormat::Rgba8, &face_pixels(color));
    }
    runtime.bind_texture(0, 5);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);
    draw_fullscreen(&mut runtime, 1);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(
        pixel(&data, 3, 3, TARGET_W),
        [255, 255, 255, 255],
        "incomplete cubemap samples the default texture"
    );

    // Final face arrives; the descriptor becomes observable.
    runtime.tex_image_cube_face(5, CubeFace::NegZ, 2, TexFormat::Rgba8, &face_pixels([5, 0, 0, 255]));
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);
    draw_fullscreen(&mut runtime, 1);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(pixel(&data, 3, 3, TARGET_W), RED, "+X face samples after completion");
}

/// Programs copy their shaders at link time: deleting the source shader
/// handles afterwards must not invalidate the program.
#[test]
fn program_survives_shader_deletion() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::SOLID_FS);
    runtime.delete_shader(11);
    runtime.delete_shader(12);

    runtime.uniform_alloc(1, 16);
    runtime.uniform_write(1, 0, &color_bytes([1.0, 0.0, 0.0, 1.0]));
    runtime.bind_uniforms(0, 1);

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);
    draw_fullscreen(&mut runtime, 1);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(pixel(&data, 3, 3, TARGET_W), RED);
}

/// Buffer-backed attributes draw from the static data region.
#[test]
fn buffer_backed_vertices_draw() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::SOLID_FS);

    runtime.uniform_alloc(1, 16);
    runtime.uniform_write(1, 0, &color_bytes([0.0, 1.0, 0.0, 1.0]));
    runtime.bind_uniforms(0, 1);

    runtime.create_buffer(7);
    runtime.buffer_data(7, &quad_positions());
    runtime.set_vertex_attrib(
        0,
        Some(VertexAttrib {
            size: 2,
            ty: AttribType::F32,
            normalized: false,
            stride: 8,
            source: AttribSource::Buffer { buffer: 7, offset: 0 },
        }),
    );

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [0.0, 0.0, 0.0, 1.0], 1.0, 0);
    runtime.draw_arrays(Primitive::TriangleStrip, 0, 4);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(pixel(&data, 3, 3, TARGET_W), GREEN);
}

/// Mip generation leaves the base level intact and the chain sample-ready.
#[test]
fn generate_mipmaps_keeps_base_level() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    setup_program(&mut runtime, &dir, 1, common::SOLID_VS, common::SOLID_FS);

    let pixels = vec![200u8; (4 * 4 * 4) as usize];
    runtime.tex_image_2d(1, 4, 4, TexFormat::Rgba8, &pixels);
    runtime.generate_mipmaps(1);

    runtime.bind_framebuffer(1, 0);
    let data = runtime.read_pixels(0, 0, 4, 4);
    assert!(data.iter().all(|&b| b == 200));
}

//! Readback row-order reconciliation and degraded-mode behavior.

mod common;

use common::{pixel, TARGET_H, TARGET_W};
use glaze_gles::{ClearMask, GlesBackend, TexFormat};

#[test]
fn clear_color_reads_back_everywhere() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::all(), [1.0, 0.0, 0.0, 1.0], 1.0, 0);

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert_eq!(data.len(), (TARGET_W * TARGET_H * 4) as usize);
    for y in 0..TARGET_H {
        for x in 0..TARGET_W {
            assert_eq!(pixel(&data, x, y, TARGET_W), [255, 0, 0, 255]);
        }
    }
}

/// Upload known rows, bounce them through a framebuffer→texture copy, and
/// read back: the returned rows arrive in the same top-to-bottom order as
/// originally supplied. Each GPU→CPU crossing flips exactly once; nothing
/// double-flips.
#[test]
fn framebuffer_copy_round_trip_preserves_row_order() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    const W: u32 = 4;
    const H: u32 = 4;
    let row_colors: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 255, 255],
    ];
    let mut pixels = Vec::with_capacity((W * H * 4) as usize);
    for row in &row_colors {
        for _ in 0..W {
            pixels.extend_from_slice(row);
        }
    }

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);

    runtime.tex_image_2d(1, W, H, TexFormat::Rgba8, &pixels);

    // Use the uploaded texture as the source framebuffer and copy it onto a
    // second texture through the CPU roundtrip.
    runtime.bind_framebuffer(1, 0);
    runtime.copy_tex_image_2d(2, W, H);

    runtime.bind_framebuffer(2, 0);
    let data = runtime.read_pixels(0, 0, W, H);

    // Reading the returned buffer start-to-end yields the supplied order.
    for (i, row) in row_colors.iter().enumerate() {
        for x in 0..W {
            assert_eq!(
                pixel(&data, x, i as u32, W),
                *row,
                "row {i} changed order in the round trip"
            );
        }
    }
}

#[test]
fn single_row_readback_needs_no_flip() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    const W: u32 = 4;
    let pixels: Vec<u8> = (0..W).flat_map(|x| [x as u8 * 10, 1, 2, 255]).collect();

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.tex_image_2d(1, W, 1, TexFormat::Rgba8, &pixels);
    runtime.bind_framebuffer(1, 0);

    let data = runtime.read_pixels(0, 0, W, 1);
    assert_eq!(data, pixels);
}

#[test]
fn rgb_upload_expands_to_opaque_rgba() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    let pixels = [10u8, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.tex_image_2d(1, 2, 2, TexFormat::Rgb8, &pixels);
    runtime.bind_framebuffer(1, 0);

    let data = runtime.read_pixels(0, 0, 2, 2);
    // Bottom-origin: returned row 0 is the supplied second row.
    assert_eq!(pixel(&data, 0, 0, 2), [70, 80, 90, 255]);
    assert_eq!(pixel(&data, 1, 0, 2), [100, 110, 120, 255]);
    assert_eq!(pixel(&data, 0, 1, 2), [10, 20, 30, 255]);
    assert_eq!(pixel(&data, 1, 1, 2), [40, 50, 60, 255]);
}

#[test]
fn degraded_readback_returns_zeros_and_stays_consistent() {
    let Some(mut runtime) = common::runtime() else {
        return;
    };

    let slot = runtime.acquire_image();
    runtime.begin_frame(slot);
    runtime.clear(ClearMask::COLOR, [1.0, 1.0, 1.0, 1.0], 1.0, 0);

    runtime.mark_device_faulted();

    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert!(data.iter().all(|&b| b == 0), "faulted readback must be zero-filled");

    // Bookkeeping survives: the frame can still be closed out and the next
    // one opened.
    runtime.end_frame(slot);
    runtime.present(slot);
    runtime.wait_fence(slot);
    let next = runtime.acquire_image();
    runtime.begin_frame(next);
    let data = runtime.read_pixels(0, 0, TARGET_W, TARGET_H);
    assert!(data.iter().all(|&b| b == 0));
}

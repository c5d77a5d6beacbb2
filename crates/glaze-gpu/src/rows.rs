//! CPU-side row reconciliation for staged uploads and readbacks.
//!
//! The copy engine wants rows at a fixed stride alignment; the emulated API
//! hands us tightly packed (sometimes 3-channel) client rows and expects
//! bottom-origin ordering on readback. Everything here is plain byte work so
//! it can be exercised without a device.

/// Repack tightly packed source rows into `out` at `padded_stride` bytes per
/// row. `out` is resized to exactly `padded_stride * height`; padding bytes
/// are zeroed.
pub fn pack_rows_padded(
    src: &[u8],
    row_bytes: usize,
    height: usize,
    padded_stride: usize,
    out: &mut Vec<u8>,
) {
    debug_assert!(padded_stride >= row_bytes);
    debug_assert!(src.len() >= row_bytes * height);

    out.clear();
    out.resize(padded_stride * height, 0);
    for y in 0..height {
        let dst = y * padded_stride;
        out[dst..dst + row_bytes].copy_from_slice(&src[y * row_bytes..y * row_bytes + row_bytes]);
    }
}

/// Copy padded rows out of a mapped readback buffer into tightly packed rows,
/// reversing row order. Row 0 of the output is the last row of the source.
///
/// A single-row image needs no reconciliation; callers skip the flip there.
pub fn unpack_rows_flipped(
    src: &[u8],
    padded_stride: usize,
    row_bytes: usize,
    height: usize,
    out: &mut [u8],
) {
    debug_assert!(src.len() >= padded_stride * height);
    debug_assert!(out.len() >= row_bytes * height);

    for y in 0..height {
        let src_off = (height - 1 - y) * padded_stride;
        out[y * row_bytes..y * row_bytes + row_bytes]
            .copy_from_slice(&src[src_off..src_off + row_bytes]);
    }
}

/// Reverse row order in place. Used on the CPU leg of framebuffer→texture
/// copies, where the data never leaves a scratch vector.
pub fn flip_rows_in_place(data: &mut [u8], row_bytes: usize, height: usize) {
    debug_assert!(data.len() >= row_bytes * height);

    let (mut top, mut bottom) = (0usize, height.saturating_sub(1));
    while top < bottom {
        let (a, b) = (top * row_bytes, bottom * row_bytes);
        for i in 0..row_bytes {
            data.swap(a + i, b + i);
        }
        top += 1;
        bottom -= 1;
    }
}

/// Expand 3-channel texels to 4-channel with opaque alpha.
///
/// The native format set has no packed 24-bit layout, so RGB uploads widen
/// during staging.
pub fn expand_rgb8_to_rgba8(src: &[u8], out: &mut Vec<u8>) {
    debug_assert_eq!(src.len() % 3, 0);

    out.clear();
    out.reserve(src.len() / 3 * 4);
    for texel in src.chunks_exact(3) {
        out.extend_from_slice(texel);
        out.push(0xFF);
    }
}

/// Widen 8-bit indices to 16-bit.
///
/// The native index fetch has no 8-bit path, so byte indices expand while
/// being staged. 16- and 32-bit indices are copied verbatim by the caller.
pub fn widen_indices_u8_to_u16(src: &[u8]) -> Vec<u16> {
    src.iter().map(|&i| i as u16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pack_rows_padded_zero_fills_padding() {
        let src: Vec<u8> = (0..12).collect();
        let mut out = Vec::new();
        pack_rows_padded(&src, 6, 2, 8, &mut out);

        assert_eq!(out.len(), 16);
        assert_eq!(&out[..6], &src[..6]);
        assert_eq!(&out[6..8], &[0, 0]);
        assert_eq!(&out[8..14], &src[6..]);
    }

    #[test]
    fn unpack_rows_flipped_reverses_row_order() {
        // Two padded rows of stride 8, payload 4.
        let src = [1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2, 0, 0, 0, 0];
        let mut out = [0u8; 8];
        unpack_rows_flipped(&src, 8, 4, 2, &mut out);
        assert_eq!(out, [2, 2, 2, 2, 1, 1, 1, 1]);
    }

    #[test]
    fn flip_twice_is_identity() {
        let original: Vec<u8> = (0..24).collect();
        let mut data = original.clone();
        flip_rows_in_place(&mut data, 8, 3);
        assert_ne!(data, original);
        flip_rows_in_place(&mut data, 8, 3);
        assert_eq!(data, original);
    }

    #[test]
    fn single_row_flip_is_identity() {
        let original: Vec<u8> = (0..8).collect();
        let mut data = original.clone();
        flip_rows_in_place(&mut data, 8, 1);
        assert_eq!(data, original);
    }

    #[test]
    fn expand_rgb8_appends_opaque_alpha() {
        let mut out = Vec::new();
        expand_rgb8_to_rgba8(&[10, 20, 30, 40, 50, 60], &mut out);
        assert_eq!(out, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn widen_indices_preserves_values() {
        assert_eq!(widen_indices_u8_to_u16(&[0, 1, 2, 255]), vec![0u16, 1, 2, 255]);
    }
}

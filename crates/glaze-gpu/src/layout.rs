//! Copy-layout math for staged texture uploads.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("texture dimensions must be non-zero (got {width}x{height})")]
    ZeroExtent { width: u32, height: u32 },
    #[error("texture row size overflow ({width} texels at {texel_bytes} bytes)")]
    RowOverflow { width: u32, texel_bytes: u32 },
}

/// Dimension of mip level `level`, clamped to 1 at the tail.
pub fn mip_dim(base: u32, level: u32) -> u32 {
    base.checked_shr(level).unwrap_or(0).max(1)
}

/// Number of mip levels in a full chain: successive halving of the larger
/// dimension until it reaches 1.
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    32 - max_dim.leading_zeros()
}

/// Byte layout of one staged subresource copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyLayout {
    pub width: u32,
    pub height: u32,
    /// Tightly packed bytes in one row.
    pub unpadded_bytes_per_row: u32,
    /// Row stride in the staging buffer, aligned for the copy engine.
    pub padded_bytes_per_row: u32,
    /// Total staging bytes (padded rows).
    pub staging_size: u64,
}

/// Compute the staging layout for a linear (uncompressed) image with
/// `texel_bytes` bytes per texel.
pub fn linear_copy_layout(
    width: u32,
    height: u32,
    texel_bytes: u32,
) -> Result<CopyLayout, LayoutError> {
    if width == 0 || height == 0 {
        return Err(LayoutError::ZeroExtent { width, height });
    }
    let unpadded = width
        .checked_mul(texel_bytes)
        .ok_or(LayoutError::RowOverflow { width, texel_bytes })?;
    let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
        * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    Ok(CopyLayout {
        width,
        height,
        unpadded_bytes_per_row: unpadded,
        padded_bytes_per_row: padded,
        staging_size: padded as u64 * height as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_dim_halves_and_floors_at_one() {
        assert_eq!(mip_dim(256, 0), 256);
        assert_eq!(mip_dim(256, 3), 32);
        assert_eq!(mip_dim(256, 8), 1);
        assert_eq!(mip_dim(256, 31), 1);
        assert_eq!(mip_dim(3, 1), 1);
    }

    #[test]
    fn full_mip_count_follows_max_dimension() {
        assert_eq!(full_mip_count(1, 1), 1);
        assert_eq!(full_mip_count(256, 256), 9);
        assert_eq!(full_mip_count(256, 16), 9);
        assert_eq!(full_mip_count(640, 480), 10);
    }

    #[test]
    fn linear_copy_layout_pads_rows_to_copy_alignment() {
        let layout = linear_copy_layout(3, 2, 4).unwrap();
        assert_eq!(layout.unpadded_bytes_per_row, 12);
        assert_eq!(layout.padded_bytes_per_row, 256);
        assert_eq!(layout.staging_size, 512);

        let aligned = linear_copy_layout(64, 4, 4).unwrap();
        assert_eq!(aligned.padded_bytes_per_row, 256);
        assert_eq!(aligned.staging_size, 1024);
    }

    #[test]
    fn linear_copy_layout_rejects_zero_extent() {
        assert_eq!(
            linear_copy_layout(0, 4, 4),
            Err(LayoutError::ZeroExtent { width: 0, height: 4 })
        );
    }
}

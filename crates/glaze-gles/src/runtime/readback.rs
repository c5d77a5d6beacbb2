//! Pixel readback: GPU→CPU roundtrips with explicit row-order
//! reconciliation.
//!
//! Native storage is top-origin; the emulated API expects bottom-origin
//! row 0 on readback. The flip happens exactly once, during the CPU-side
//! copy out of the mapped buffer, and is skipped for single-row reads.

use tracing::warn;

use glaze_gpu::layout::linear_copy_layout;
use glaze_gpu::rows;

use crate::error::RuntimeError;
use crate::handle::NONE_HANDLE;

use super::{GlesRuntime, SwapchainImage};

/// Block until a readback buffer is mapped, then copy its contents out.
fn map_buffer_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    size: u64,
) -> Result<Vec<u8>, RuntimeError> {
    let slice = buffer.slice(..size);
    let state = std::sync::Arc::new((
        std::sync::Mutex::new(None::<Result<(), wgpu::BufferAsyncError>>),
        std::sync::Condvar::new(),
    ));
    let state_clone = state.clone();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let (lock, cv) = &*state_clone;
        *lock.lock().unwrap() = Some(result);
        cv.notify_one();
    });

    device.poll(wgpu::Maintain::Wait);

    let (lock, cv) = &*state;
    let mut guard = lock.lock().unwrap();
    while guard.is_none() {
        guard = cv.wait(guard).unwrap();
    }
    guard
        .take()
        .unwrap()
        .map_err(|err| RuntimeError::ReadbackMap(err.to_string()))?;

    let mapped = slice.get_mapped_range();
    let out = mapped.to_vec();
    drop(mapped);
    buffer.unmap();
    Ok(out)
}

impl GlesRuntime {
    fn resolve_color_texture(&self) -> Result<&wgpu::Texture, RuntimeError> {
        let binding = self.state.framebuffer;
        if binding.color == NONE_HANDLE {
            let image: &SwapchainImage = &self.swapchain[self.frames.current()];
            return Ok(&image.color);
        }
        Ok(&self.textures.get(binding.color)?.texture)
    }

    /// Copy a rect of the current color image into CPU memory.
    ///
    /// `native_y` is in the image's own (top-origin) row order; the returned
    /// rows are tightly packed and still top-origin. The native queue's error
    /// flag is checked both before and after submission.
    pub(crate) fn read_color_rows(
        &mut self,
        x: u32,
        native_y: u32,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RuntimeError> {
        if self.device_faulted() {
            return Err(RuntimeError::DeviceFault);
        }
        let layout = linear_copy_layout(width, height, 4)
            .map_err(|_| RuntimeError::DrawSkipped("empty readback rect"))?;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glaze.readback"),
            size: layout.staging_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("glaze.readback.encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: self.resolve_color_texture()?,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x,
                    y: native_y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        let fence = self.queue.submit([encoder.finish()]);
        self.device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(fence));
        if self.device_faulted() {
            return Err(RuntimeError::DeviceFault);
        }

        let padded = map_buffer_blocking(&self.device, &readback, layout.staging_size)?;
        let row_bytes = layout.unpadded_bytes_per_row as usize;
        let mut rows_out = vec![0u8; row_bytes * height as usize];
        for row in 0..height as usize {
            let src = row * layout.padded_bytes_per_row as usize;
            rows_out[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&padded[src..src + row_bytes]);
        }
        Ok(rows_out)
    }

    /// `read_pixels`: returns RGBA8 rows in bottom-origin order; zero-filled
    /// output when the native queue has faulted. The recording context is
    /// fully restored afterwards regardless of outcome.
    pub(crate) fn read_pixels_impl(&mut self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        let mut out = vec![0u8; width as usize * height as usize * 4];
        if width == 0 || height == 0 {
            return out;
        }

        if self.device_faulted() {
            warn!("device fault: read_pixels returns zero-filled data");
            self.reprime_recording();
            return out;
        }

        // Source rendering must be complete before the copy engine reads it.
        self.submit_wait_reprime();

        let rect = (|| -> Result<(u32, u32), RuntimeError> {
            let (_, target_w, target_h, _, _) = self.color_target()?;
            if x + width > target_w || y + height > target_h {
                return Err(RuntimeError::DrawSkipped("read rect outside target"));
            }
            // Bottom-origin window coordinates to native top-origin rows.
            Ok((x, target_h - y - height))
        })();

        match rect.and_then(|(x, native_y)| self.read_color_rows(x, native_y, width, height)) {
            Ok(rows_in) => {
                let row_bytes = width as usize * 4;
                if height == 1 {
                    out.copy_from_slice(&rows_in);
                } else {
                    rows::unpack_rows_flipped(
                        &rows_in,
                        row_bytes,
                        row_bytes,
                        height as usize,
                        &mut out,
                    );
                }
            }
            Err(err) => {
                warn!(error = %err, "read_pixels degraded to zero-filled data");
            }
        }

        self.reprime_recording();
        out
    }
}

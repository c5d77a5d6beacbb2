/// Subset of device limits relevant for region sub-allocation.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCaps {
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_buffer_size: u64,
    pub max_texture_dimension_2d: u32,
}

impl DeviceCaps {
    pub fn from_device(device: &wgpu::Device) -> Self {
        let limits = device.limits();
        Self {
            min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment,
            max_buffer_size: limits.max_buffer_size,
            max_texture_dimension_2d: limits.max_texture_dimension_2d,
        }
    }

    /// Alignment for uniform snapshot allocations inside the data region.
    pub fn uniform_alignment(&self) -> u64 {
        (self.min_uniform_buffer_offset_alignment as u64).max(wgpu::COPY_BUFFER_ALIGNMENT)
    }
}

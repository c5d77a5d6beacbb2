//! The fixed GPU-visible memory regions.
//!
//! Five regions, all bump-allocated, none reclaiming within a run:
//! shader code, the data region (static buffers + per-slot client staging +
//! per-slot uniform snapshots, all sub-ranges of one native buffer), image
//! storage accounting, and the two descriptor budgets.

use std::borrow::Cow;

use glaze_gpu::{align_up, BumpArena, SlotBudget};

use crate::config::MemoryConfig;
use crate::error::RuntimeError;
use crate::handle::Handle;

use super::GlesRuntime;

/// Alignment for static buffer-object and uniform allocations.
pub const BUFFER_ALIGN: u64 = 256;
/// Client vertex/index staging cursor alignment.
pub const CLIENT_ALIGN: u64 = 4;
/// Image storage accounting alignment.
pub const IMAGE_ALIGN: u64 = 4096;
/// Shader blob alignment inside the code region.
pub const CODE_ALIGN: u64 = 256;

pub struct MemoryRegions {
    /// The whole data region as one native buffer.
    pub data: wgpu::Buffer,
    static_arena: BumpArena,
    slot_client: Vec<BumpArena>,
    slot_uniform: Vec<BumpArena>,

    code_bytes: Vec<u8>,
    code_arena: BumpArena,

    image_arena: BumpArena,
    pub sampler_budget: SlotBudget,
    pub image_desc_budget: SlotBudget,
}

impl MemoryRegions {
    pub fn new(device: &wgpu::Device, config: &MemoryConfig, frames_in_flight: usize) -> Self {
        let static_size = align_up(config.static_data_size, BUFFER_ALIGN);
        let client_size = align_up(config.client_data_size_per_slot, BUFFER_ALIGN);
        let uniform_size = align_up(config.uniform_data_size_per_slot, BUFFER_ALIGN);

        let n = frames_in_flight as u64;
        let total = static_size + n * client_size + n * uniform_size;

        let data = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glaze.data-region"),
            size: total,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::INDEX
                | wgpu::BufferUsages::UNIFORM
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let slot_client = (0..frames_in_flight)
            .map(|i| {
                BumpArena::new("client-data", static_size + i as u64 * client_size, client_size)
            })
            .collect();
        let uniform_base = static_size + n * client_size;
        let slot_uniform = (0..frames_in_flight)
            .map(|i| {
                BumpArena::new(
                    "uniform-data",
                    uniform_base + i as u64 * uniform_size,
                    uniform_size,
                )
            })
            .collect();

        Self {
            data,
            static_arena: BumpArena::new("static-data", 0, static_size),
            slot_client,
            slot_uniform,
            code_bytes: vec![0u8; config.code_size as usize],
            code_arena: BumpArena::new("shader-code", 0, config.code_size),
            image_arena: BumpArena::new("image-storage", 0, config.image_size),
            sampler_budget: SlotBudget::new("sampler-descriptors", config.sampler_descriptors),
            image_desc_budget: SlotBudget::new("image-descriptors", config.image_descriptors),
        }
    }

    /// Pad `bytes` out to the native copy alignment.
    fn padded<'a>(bytes: &'a [u8]) -> Cow<'a, [u8]> {
        let padded_len = align_up(bytes.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT) as usize;
        if padded_len == bytes.len() {
            Cow::Borrowed(bytes)
        } else {
            let mut out = vec![0u8; padded_len];
            out[..bytes.len()].copy_from_slice(bytes);
            Cow::Owned(out)
        }
    }

    /// Allocate a static range and upload `bytes` into it. Never reclaimed;
    /// released only in bulk at shutdown.
    pub fn alloc_static(&mut self, queue: &wgpu::Queue, bytes: &[u8]) -> Option<u64> {
        let padded = Self::padded(bytes);
        let offset = self.static_arena.alloc(padded.len() as u64, BUFFER_ALIGN)?;
        queue.write_buffer(&self.data, offset, &padded);
        Some(offset)
    }

    /// Overwrite part of an existing static range.
    pub fn write_static(&mut self, queue: &wgpu::Queue, offset: u64, bytes: &[u8]) {
        queue.write_buffer(&self.data, offset, &Self::padded(bytes));
    }

    /// Stage client vertex/index bytes into `slot`'s sub-range.
    ///
    /// Exhaustion returns `None`; the caller aborts only the current draw.
    pub fn stage_client(&mut self, queue: &wgpu::Queue, slot: usize, bytes: &[u8]) -> Option<u64> {
        let padded = Self::padded(bytes);
        let offset = self.slot_client[slot].alloc(padded.len() as u64, CLIENT_ALIGN)?;
        queue.write_buffer(&self.data, offset, &padded);
        Some(offset)
    }

    /// Snapshot uniform bytes into `slot`'s uniform sub-range, reserving
    /// `reserve` bytes so any block up to that size can bind at the returned
    /// dynamic offset.
    pub fn snapshot_uniform(
        &mut self,
        queue: &wgpu::Queue,
        slot: usize,
        bytes: &[u8],
        reserve: u64,
        alignment: u64,
    ) -> Option<u32> {
        debug_assert!(bytes.len() as u64 <= reserve);
        let offset = self.slot_uniform[slot].alloc(reserve, alignment.max(BUFFER_ALIGN))?;
        if !bytes.is_empty() {
            queue.write_buffer(&self.data, offset, &Self::padded(bytes));
        }
        u32::try_from(offset).ok()
    }

    pub fn reset_client(&mut self, slot: usize) {
        self.slot_client[slot].reset();
    }

    /// Uniform snapshots are safe to reset once the slot's fence has
    /// signaled: the bytes were captured into the command stream at record
    /// time, never referenced live.
    pub fn reset_uniform(&mut self, slot: usize) {
        self.slot_uniform[slot].reset();
    }

    /// Copy a shader blob into aligned code memory, returning its offset.
    pub fn load_code(&mut self, blob: &[u8]) -> Option<u64> {
        let offset = self.code_arena.alloc(blob.len() as u64, CODE_ALIGN)?;
        let start = offset as usize;
        self.code_bytes[start..start + blob.len()].copy_from_slice(blob);
        Some(offset)
    }

    pub fn code_at(&self, offset: u64, len: usize) -> &[u8] {
        &self.code_bytes[offset as usize..offset as usize + len]
    }

    /// Account for image storage. The native image is a discrete object, but
    /// the region enforces the fixed capacity and yields the aligned offset
    /// the image would occupy.
    pub fn alloc_image(&mut self, size: u64) -> Option<u64> {
        self.image_arena.alloc(size, IMAGE_ALIGN)
    }

    /// Bulk release at shutdown: every region back to empty.
    pub fn release_all(&mut self) {
        self.static_arena.reset();
        for arena in &mut self.slot_client {
            arena.reset();
        }
        for arena in &mut self.slot_uniform {
            arena.reset();
        }
        self.code_arena.reset();
        self.image_arena.reset();
        self.sampler_budget.reset();
        self.image_desc_budget.reset();
    }
}

impl GlesRuntime {
    /// Upload a buffer object's data. Each upload takes a fresh static range;
    /// the previous range (if any) stays allocated until shutdown.
    pub(crate) fn try_buffer_data(&mut self, buffer: Handle, data: &[u8]) -> Result<(), RuntimeError> {
        self.buffers.get(buffer)?;
        let offset = self
            .regions
            .alloc_static(&self.queue, data)
            .ok_or(RuntimeError::RegionExhausted {
                region: "static-data",
                requested: data.len() as u64,
            })?;
        let record = self.buffers.get_mut(buffer)?;
        record.gpu_offset = Some(offset);
        record.shadow = data.to_vec();
        Ok(())
    }

    /// Overwrite part of a buffer object, keeping the CPU shadow coherent
    /// with the GPU range.
    pub(crate) fn try_buffer_sub_data(
        &mut self,
        buffer: Handle,
        offset: u32,
        data: &[u8],
    ) -> Result<(), RuntimeError> {
        let record = self.buffers.get_mut(buffer)?;
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= record.shadow.len())
            .ok_or(RuntimeError::DrawSkipped("buffer sub-range out of bounds"))?;
        record.shadow[start..end].copy_from_slice(data);

        let base = record.gpu_offset.ok_or(RuntimeError::UnknownHandle {
            table: "buffer",
            handle: buffer,
        })?;
        // The copy engine wants 4-byte granularity; widen the window inside
        // the shadow so no live byte is clobbered by padding.
        let aligned_start = start & !3;
        let aligned_end = ((end + 3) & !3).min(record.shadow.len());
        let window = &record.shadow[aligned_start..aligned_end];
        self.regions
            .write_static(&self.queue, base + aligned_start as u64, window);
        Ok(())
    }
}

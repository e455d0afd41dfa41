/// Per-frame linear allocator for small constant blocks.
///
/// Each frame slot owns one persistently mapped upload buffer. Blocks are
/// bump-allocated at 256-byte granularity and the whole region is reset by
/// `begin_frame`. A slot's region is only reset after the command stream has
/// observed that slot's previous submission retire, so the GPU never reads
/// a block the CPU is overwriting.

use std::sync::Arc;
use bytemuck::Pod;
use crate::config::CONSTANT_BUFFER_ALIGNMENT;
use crate::engine_fatal;
use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, BufferDesc, BufferUsage, GpuVirtualAddress, GraphicsDevice};

/// Size of a block once rounded to the constant-buffer granularity
pub const fn aligned_block_size(size: u64) -> u64 {
    let rounded = (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1);
    if rounded == 0 { CONSTANT_BUFFER_ALIGNMENT } else { rounded }
}

pub struct FrameConstantRing {
    buffers: Vec<Arc<dyn Buffer>>,
    cursors: Vec<u64>,
    capacity: u64,
}

impl FrameConstantRing {
    /// Create one region of `max_allocations` blocks per frame slot
    pub fn new(device: &dyn GraphicsDevice, frame_count: usize, max_allocations: u32) -> Result<Self> {
        let capacity = max_allocations as u64 * CONSTANT_BUFFER_ALIGNMENT;
        let buffers = (0..frame_count)
            .map(|slot| {
                device.create_buffer(&BufferDesc {
                    label: format!("frame_constants_{}", slot),
                    size: capacity,
                    usage: BufferUsage::Constant,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            buffers,
            cursors: vec![0; frame_count],
            capacity,
        })
    }

    /// Rewind the region of `slot` to its start
    pub fn begin_frame(&mut self, slot: usize) -> Result<()> {
        *self.cursor_mut(slot)? = 0;
        Ok(())
    }

    /// Copy `data` into the region of `slot` and return its GPU address
    ///
    /// `T` must fit in a single 256-byte block; larger types fail to compile.
    pub fn allocate<T: Pod>(&mut self, data: &T, slot: usize) -> Result<GpuVirtualAddress> {
        const { assert!(std::mem::size_of::<T>() as u64 <= CONSTANT_BUFFER_ALIGNMENT) };

        let block = aligned_block_size(std::mem::size_of::<T>() as u64);
        let capacity = self.capacity;
        let offset = *self.cursor_mut(slot)?;
        if offset + block > capacity {
            return Err(engine_fatal!(
                "nebula::constant_ring",
                Error::ConstantRingOverflow { requested: offset + block, capacity }
            ));
        }

        let buffer = &self.buffers[slot];
        buffer.write(offset, bytemuck::bytes_of(data))?;
        self.cursors[slot] = offset + block;
        Ok(buffer.gpu_address().offset(offset))
    }

    /// Bytes allocated so far in the region of `slot`
    pub fn cursor(&self, slot: usize) -> Result<u64> {
        self.cursors
            .get(slot)
            .copied()
            .ok_or(Error::InvalidFrameSlot { slot, frame_count: self.cursors.len() })
    }

    /// Bytes per frame region
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn cursor_mut(&mut self, slot: usize) -> Result<&mut u64> {
        let frame_count = self.cursors.len();
        self.cursors
            .get_mut(slot)
            .ok_or(Error::InvalidFrameSlot { slot, frame_count })
    }
}

#[cfg(test)]
#[path = "frame_constant_ring_tests.rs"]
mod tests;

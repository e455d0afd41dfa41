/// Bump allocator over one descriptor heap.
///
/// Slots are handed out in increasing order and never returned: the
/// descriptor population is fixed after start-up apart from a bounded
/// number of loaded textures, and heap capacities are sized for it.
/// Exhaustion is a configuration bug and is reported as the fatal
/// `Error::DescriptorHeapExhausted`.

use std::sync::Arc;
use crate::engine_fatal;
use crate::error::{Error, Result};
use crate::graphics_device::{
    CpuDescriptorHandle, DescriptorHeap, DescriptorHeapKind, DescriptorView, GpuDescriptorHandle,
    GraphicsDevice,
};

// ===== DESCRIPTOR SLOT =====

/// Stable index of one descriptor inside its heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescriptorSlot(u32);

impl DescriptorSlot {
    /// Raw index
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Slot `n` positions further (inside a range from `allocate_range`)
    pub fn offset(&self, n: u32) -> Self {
        Self(self.0 + n)
    }
}

// ===== DESCRIPTOR ALLOCATOR =====

pub struct DescriptorAllocator {
    heap: Arc<dyn DescriptorHeap>,
    next: u32,
}

impl DescriptorAllocator {
    /// Create a heap of `kind` with room for `capacity` descriptors
    pub fn new(device: &dyn GraphicsDevice, kind: DescriptorHeapKind, capacity: u32) -> Result<Self> {
        let heap = device.create_descriptor_heap(kind, capacity)?;
        Ok(Self { heap, next: 0 })
    }

    /// Next unused slot
    pub fn allocate(&mut self) -> Result<DescriptorSlot> {
        self.allocate_range(1)
    }

    /// `count` contiguous slots; returns the first
    pub fn allocate_range(&mut self, count: u32) -> Result<DescriptorSlot> {
        let capacity = self.heap.capacity();
        match self.next.checked_add(count) {
            Some(end) if end <= capacity => {
                let first = DescriptorSlot(self.next);
                self.next = end;
                Ok(first)
            }
            _ => Err(engine_fatal!(
                "nebula::descriptor_allocator",
                Error::DescriptorHeapExhausted { kind: self.heap.kind(), capacity }
            )),
        }
    }

    /// CPU handle of `slot`
    pub fn cpu_handle(&self, slot: DescriptorSlot) -> CpuDescriptorHandle {
        let start = self.heap.cpu_start();
        CpuDescriptorHandle(start.0 + slot.0 as u64 * self.heap.increment_size())
    }

    /// GPU handle of `slot`, `None` for heaps shaders cannot see
    pub fn gpu_handle(&self, slot: DescriptorSlot) -> Option<GpuDescriptorHandle> {
        let start = self.heap.gpu_start()?;
        Some(GpuDescriptorHandle(start.0 + slot.0 as u64 * self.heap.increment_size()))
    }

    /// Write a view into `slot`
    pub fn write_view(&self, slot: DescriptorSlot, view: DescriptorView<'_>) -> Result<()> {
        self.heap.write_view(self.cpu_handle(slot), view)
    }

    /// Number of slots handed out so far
    pub fn allocated(&self) -> u32 {
        self.next
    }

    pub fn capacity(&self) -> u32 {
        self.heap.capacity()
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.heap.kind()
    }

    /// Underlying heap
    pub fn heap(&self) -> &Arc<dyn DescriptorHeap> {
        &self.heap
    }
}

#[cfg(test)]
#[path = "descriptor_allocator_tests.rs"]
mod tests;

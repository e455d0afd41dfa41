/// Buffer trait and buffer descriptor

use crate::error::Result;

/// GPU virtual address of a byte inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GpuVirtualAddress(pub u64);

impl GpuVirtualAddress {
    /// Address `bytes` further into the same buffer
    pub fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer
    Vertex,
    /// Index buffer
    Index,
    /// Constant data read through a root constant buffer address
    Constant,
    /// Staging source for buffer-to-texture copies
    Upload,
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label
    pub label: String,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
}

/// Buffer resource trait
///
/// Buffers live in upload memory and stay mapped for their whole lifetime.
/// The buffer is destroyed when dropped.
pub trait Buffer: Send + Sync {
    /// Size in bytes
    fn size(&self) -> u64;

    /// Usage the buffer was created with
    fn usage(&self) -> BufferUsage;

    /// GPU virtual address of the first byte
    fn gpu_address(&self) -> GpuVirtualAddress;

    /// Copy `data` into the mapped memory at `offset`
    ///
    /// # Arguments
    ///
    /// * `offset` - Byte offset into the buffer
    /// * `data` - Bytes to write; `offset + data.len()` must not exceed `size()`
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;
}

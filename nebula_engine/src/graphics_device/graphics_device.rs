/// GraphicsDevice trait - the device context every GPU object is created from

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, BufferDesc, CommandList, CommandQueue, DescriptorHeap, DescriptorHeapKind,
    Fence, Pipeline, PipelineDesc, Texture, TextureDesc,
};

/// Logical GPU device
///
/// Creation-only: the device hands out queues, fences, command lists,
/// descriptor heaps and resources, and is shared as `Arc<dyn GraphicsDevice>`
/// by every component that needs to create GPU objects. Implemented by
/// backend crates (e.g. `VulkanDevice`).
pub trait GraphicsDevice: Send + Sync {
    /// Create the direct (graphics) command queue
    fn create_command_queue(&self) -> Result<Arc<dyn CommandQueue>>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>>;

    /// Create a command list with its own allocator, in the closed state
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Create a descriptor heap of the given kind and capacity
    ///
    /// Only `DescriptorHeapKind::ShaderResource` heaps are shader-visible.
    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Arc<dyn DescriptorHeap>>;

    /// Create a persistently mapped, CPU-writable buffer
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a texture and place it in `desc.initial_state`
    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a graphics pipeline (root signature + fixed-function state)
    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>>;

    /// File extension of the shader binaries this backend consumes (e.g. "spv")
    fn shader_extension(&self) -> &'static str;

    /// Block until the device has finished all submitted work
    fn wait_idle(&self) -> Result<()>;
}

/// Graphics device module - the explicit GPU API surface the engine records against

// Module declarations
pub mod graphics_device;
pub mod buffer;
pub mod texture;
pub mod descriptor_heap;
pub mod command_list;
pub mod command_queue;
pub mod pipeline;
pub mod resource_state;
pub mod surface;

// Re-export everything from graphics_device.rs
pub use graphics_device::*;

// Re-export from other modules
pub use buffer::*;
pub use texture::*;
pub use descriptor_heap::*;
pub use command_list::*;
pub use command_queue::*;
pub use pipeline::*;
pub use resource_state::*;
pub use surface::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;

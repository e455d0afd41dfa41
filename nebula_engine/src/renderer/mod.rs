/// Submission substrate and frame orchestration

mod command_stream;
mod descriptor_allocator;
mod frame_constant_ring;
mod renderer;
mod shader_library;
mod texture_cache;
mod ui_overlay;

pub use command_stream::CommandStream;
pub use descriptor_allocator::{DescriptorAllocator, DescriptorSlot};
pub use frame_constant_ring::{aligned_block_size, FrameConstantRing};
pub use renderer::{Renderer, RendererStats};
pub use shader_library::ShaderLibrary;
pub use texture_cache::{texture_id, upload_texture, CachedTexture, TextureCache, TextureId, TextureLoader, TextureSource};
pub use ui_overlay::{NullOverlay, UiOverlay};

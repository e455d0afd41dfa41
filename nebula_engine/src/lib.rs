/*!
# Nebula Engine

Real-time forward renderer with shadow mapping and image-based lighting.

The crate records frames against the explicit GPU API defined in
`graphics_device` (command lists, queues, fences, descriptor heaps, resource
barriers). Backend crates implement those traits; `nebula_engine_renderer_vulkan`
is the Vulkan one.

## Architecture

- **graphics_device**: Backend traits and descriptors
- **renderer**: Submission substrate (command stream, constant ring,
  descriptor allocators, shader library, texture cache) and the `Renderer`
  frame orchestrator
- **stages**: Shadow, IBL bake, scene, skybox and equirectangular-to-cube stages
- **scene**: Camera, models, materials, lights and GPU constant layouts
*/

// Internal modules
mod error;
mod engine;
pub mod config;
pub mod graphics_device;
pub mod log;
pub mod renderer;
pub mod scene;
pub mod stages;

// Main nebula namespace module
pub mod nebula {
    // Error types
    pub use crate::error::{Error, Result};

    // Logger registry
    pub use crate::engine::Engine;

    // Renderer configuration
    pub use crate::config::{RendererConfig, ShadowConfig};

    // Frame orchestrator and UI hook
    pub use crate::renderer::{NullOverlay, Renderer, RendererStats, UiOverlay};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Backend traits
    pub mod device {
        pub use crate::graphics_device::*;
    }

    // Submission substrate
    pub mod render {
        pub use crate::renderer::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }

    // Render stages
    pub mod stages {
        pub use crate::stages::*;
    }
}

// Re-export math library at crate root
pub use glam;

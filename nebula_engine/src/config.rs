/// Renderer configuration
///
/// Surface size comes from the surface itself; the heap capacities and
/// ring size are deployment constants sized for the largest scene the
/// engine is expected to draw.

use std::path::PathBuf;
use std::time::Duration;
use crate::error::{Error, Result};

/// Alignment of a single constant-buffer allocation in bytes
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Directional shadow settings
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowConfig {
    /// Width and height of the square shadow depth map
    pub map_size: u32,
    /// Width and height of the orthographic light volume
    pub light_view_size: f32,
    /// Distance from the camera target back along the light direction
    pub light_distance: f32,
    /// Light rotation in degrees (pitch, yaw, roll)
    pub light_rotation_deg: [f32; 3],
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 2048,
            light_view_size: 100.0,
            light_distance: 100.0,
            light_rotation_deg: [50.0, -45.0, 0.0],
        }
    }
}

/// Configuration for renderer creation
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Application name (reported to the driver)
    pub app_name: String,
    /// Enable backend validation layers
    pub enable_validation: bool,
    /// Number of frame slots in flight
    pub frame_count: usize,
    /// Render-target view heap capacity
    pub rtv_heap_capacity: u32,
    /// Depth-stencil view heap capacity
    pub dsv_heap_capacity: u32,
    /// Shader-visible CBV/SRV/UAV heap capacity
    pub srv_heap_capacity: u32,
    /// Constant blocks per frame slot (each 256 bytes)
    pub max_constant_allocations: u32,
    /// Timeout for steady-state frame pacing waits
    pub frame_wait_timeout: Duration,
    /// Timeout for resize and shutdown drains
    pub drain_timeout: Duration,
    /// Directory holding precompiled shader binaries
    pub shader_dir: PathBuf,
    /// Equirectangular environment image converted to the sky cube
    pub environment_map: PathBuf,
    /// Swap interval passed to present
    pub present_interval: u32,
    /// Directional shadow settings
    pub shadow: ShadowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: "Nebula Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            frame_count: 2,
            rtv_heap_capacity: 128,
            dsv_heap_capacity: 8,
            srv_heap_capacity: 5000,
            max_constant_allocations: 20000,
            frame_wait_timeout: Duration::MAX,
            drain_timeout: Duration::from_secs(5),
            shader_dir: PathBuf::from("shaders"),
            environment_map: PathBuf::from("assets/HDRI/testDome.hdr"),
            present_interval: 1,
            shadow: ShadowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Bytes of constant ring reserved per frame slot
    pub fn constant_ring_size(&self) -> u64 {
        self.max_constant_allocations as u64 * CONSTANT_BUFFER_ALIGNMENT
    }

    /// Reject configurations the renderer cannot start with
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InitializationFailed(format!("Invalid renderer config: {}", what)));

        if self.frame_count == 0 {
            return invalid("frame_count must be at least 1");
        }
        if self.rtv_heap_capacity == 0 || self.dsv_heap_capacity == 0 || self.srv_heap_capacity == 0 {
            return invalid("descriptor heap capacities must be non-zero");
        }
        if self.max_constant_allocations == 0 {
            return invalid("max_constant_allocations must be non-zero");
        }
        if self.shadow.map_size == 0 {
            return invalid("shadow map size must be non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Surface trait - presentable window surface

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{Texture, TextureFormat};

/// Presentable surface with a fixed set of back buffers
///
/// Window creation and the message loop belong to the application; the
/// renderer only acquires, renders into, presents and resizes the surface.
pub trait Surface: Send + Sync {
    /// Number of back buffers
    fn back_buffer_count(&self) -> usize;

    /// Acquire the back buffer the next frame renders into
    ///
    /// Returns `Ok(None)` when the surface is out of date and must be resized
    /// before rendering can continue.
    fn acquire_next_back_buffer(&mut self) -> Result<Option<usize>>;

    /// Index of the back buffer acquired last
    fn current_back_buffer_index(&self) -> usize;

    /// Back buffer texture at `index`
    fn back_buffer(&self, index: usize) -> Arc<dyn Texture>;

    /// Present the current back buffer
    ///
    /// Returns `Ok(false)` when the surface became suboptimal or out of date.
    ///
    /// # Arguments
    ///
    /// * `interval` - Number of vertical blanks to wait (0 = immediate)
    fn present(&mut self, interval: u32) -> Result<bool>;

    /// Rebuild the back buffers at a new size
    ///
    /// The caller must have drained all GPU work referencing the old back buffers.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Current size in pixels
    fn extent(&self) -> (u32, u32);

    /// Back buffer format
    fn format(&self) -> TextureFormat;
}

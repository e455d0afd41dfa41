/// Resource states, transition barriers and state tracking

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{CommandList, Texture};

/// How a GPU resource may currently be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// No particular access; contents undefined for textures
    Common,
    /// Presentable back buffer
    Present,
    /// Color attachment
    RenderTarget,
    /// Depth attachment with writes
    DepthWrite,
    /// Depth attachment, read-only
    DepthRead,
    /// Sampled in shaders
    ShaderResource,
    /// Copy destination
    CopyDest,
    /// Copy source
    CopySource,
    /// Upload memory read by the GPU
    GenericRead,
}

/// Transition of every subresource of a texture
#[derive(Clone, Copy)]
pub struct TransitionBarrier<'a> {
    pub texture: &'a dyn Texture,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl std::fmt::Debug for TransitionBarrier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionBarrier")
            .field("texture", &self.texture.info().label)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish()
    }
}

/// A texture paired with the state the command stream left it in
///
/// Every transition goes through `transition`, so the `before` state of a
/// barrier is always the state the previous barrier produced.
pub struct TrackedTexture {
    texture: Arc<dyn Texture>,
    state: ResourceState,
}

impl TrackedTexture {
    /// Track `texture`, currently in `state`
    pub fn new(texture: Arc<dyn Texture>, state: ResourceState) -> Self {
        Self { texture, state }
    }

    /// The tracked texture
    pub fn texture(&self) -> &Arc<dyn Texture> {
        &self.texture
    }

    /// Current state
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// Record a barrier into `after`
    ///
    /// Returns `false` without recording anything when the texture is already in `after`.
    pub fn transition(&mut self, cmd: &mut dyn CommandList, after: ResourceState) -> Result<bool> {
        if self.state == after {
            return Ok(false);
        }
        cmd.resource_barrier(&[TransitionBarrier {
            texture: self.texture.as_ref(),
            before: self.state,
            after,
        }])?;
        self.state = after;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "resource_state_tests.rs"]
mod tests;

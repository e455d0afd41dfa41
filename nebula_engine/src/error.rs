//! Error types for the Nebula engine
//!
//! A single error enum covers device failures, resource failures and the
//! fatal conditions of the submission substrate (heap exhaustion, constant
//! ring overflow, fence timeouts, missing shader binaries).

use std::fmt;
use crate::graphics_device::DescriptorHeapKind;

/// Result type for Nebula engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Nebula engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan device, queue or command failure)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (device, heaps, stages)
    InitializationFailed(String),

    /// A descriptor heap ran out of slots
    DescriptorHeapExhausted {
        kind: DescriptorHeapKind,
        capacity: u32,
    },

    /// The per-frame constant ring has no room left for this frame
    ConstantRingOverflow {
        requested: u64,
        capacity: u64,
    },

    /// A fence wait did not complete within its timeout
    ///
    /// `slot` is `None` for drains and one-shot submissions.
    FenceTimeout {
        slot: Option<usize>,
        value: u64,
        timeout_ms: u128,
    },

    /// A precompiled shader binary could not be loaded
    ShaderLoadFailed {
        path: String,
        reason: String,
    },

    /// A stage was asked to record before a scene was bound
    SceneNotBound(String),

    /// Frame slot index outside `[0, frame_count)`
    InvalidFrameSlot {
        slot: usize,
        frame_count: usize,
    },
}

impl Error {
    /// Whether the error ends the rendering session.
    ///
    /// Only `InvalidResource` is recoverable (the caller may substitute a
    /// fallback resource). Everything else leaves GPU state ambiguous.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::InvalidResource(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::DescriptorHeapExhausted { kind, capacity } => {
                write!(f, "Descriptor heap exhausted: {:?} heap has capacity {}", kind, capacity)
            }
            Error::ConstantRingOverflow { requested, capacity } => {
                write!(f, "Constant ring overflow: {} bytes requested, capacity {} bytes", requested, capacity)
            }
            Error::FenceTimeout { slot: Some(slot), value, timeout_ms } => {
                write!(f, "Fence timeout: slot {} waiting for value {} after {} ms", slot, value, timeout_ms)
            }
            Error::FenceTimeout { slot: None, value, timeout_ms } => {
                write!(f, "Fence timeout: waiting for value {} after {} ms", value, timeout_ms)
            }
            Error::ShaderLoadFailed { path, reason } => {
                write!(f, "Shader load failed: {} ({})", path, reason)
            }
            Error::SceneNotBound(stage) => write!(f, "Scene not bound: {}", stage),
            Error::InvalidFrameSlot { slot, frame_count } => {
                write!(f, "Invalid frame slot: {} (frame count {})", slot, frame_count)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

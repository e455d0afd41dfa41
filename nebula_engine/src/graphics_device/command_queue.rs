/// CommandQueue and Fence traits - GPU submission and CPU/GPU synchronization

use std::time::Duration;
use crate::error::Result;
use crate::graphics_device::{CommandList, Surface};

/// Monotonic GPU fence
///
/// The GPU writes increasing values into the fence as queued signals
/// complete; the CPU can poll or block on a value.
pub trait Fence: Send + Sync {
    /// Highest value the GPU has completed
    fn completed_value(&self) -> Result<u64>;

    /// Block until `completed_value() >= value` or the timeout elapses
    ///
    /// Returns `Ok(true)` when the value was reached, `Ok(false)` on timeout.
    fn wait(&self, value: u64, timeout: Duration) -> Result<bool>;
}

/// GPU execution queue
pub trait CommandQueue: Send + Sync {
    /// Enqueue a closed command list. Does not block.
    ///
    /// # Arguments
    ///
    /// * `list` - Closed command list
    /// * `surface` - Surface whose acquired back buffer this list renders into;
    ///   the backend orders the submission against image acquisition and present
    fn execute(&self, list: &dyn CommandList, surface: Option<&dyn Surface>) -> Result<()>;

    /// Ask the GPU to set `fence` to `value` once all previously enqueued work completes
    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()>;
}

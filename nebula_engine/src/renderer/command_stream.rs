/// Command submission and CPU/GPU synchronization for one queue.
///
/// A CommandStream owns the direct queue, one command list per frame slot
/// and a single fence driven by a monotonically increasing counter. Every
/// `signal_and_advance` records the signaled value against the slot, and
/// `wait_for_slot` blocks until the GPU has retired that value, which is
/// what makes reusing the slot's command list (and constant ring region)
/// safe.
///
/// Call order for one frame on slot `s`:
///
/// ```text
/// wait_for_slot(s) -> reset(s) -> record into active_list() -> submit() -> signal_and_advance(s)
/// ```

use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::graphics_device::{CommandList, CommandQueue, Fence, GraphicsDevice, Surface};
use crate::{engine_bail, engine_fatal, engine_info, engine_trace};

pub struct CommandStream {
    queue: Arc<dyn CommandQueue>,
    lists: Vec<Box<dyn CommandList>>,
    fence: Arc<dyn Fence>,
    /// Last value handed to the queue
    fence_counter: u64,
    /// Value signaled after the last submission of each slot (0 = never submitted)
    slot_values: Vec<u64>,
    active: Option<usize>,
}

impl CommandStream {
    /// Create the queue, `frame_count` command lists and the fence
    pub fn new(device: &dyn GraphicsDevice, frame_count: usize) -> Result<Self> {
        if frame_count == 0 {
            engine_bail!("nebula::command_stream", "Command stream needs at least one frame slot");
        }

        let queue = device.create_command_queue()?;
        let lists = (0..frame_count)
            .map(|_| device.create_command_list())
            .collect::<Result<Vec<_>>>()?;
        let fence = device.create_fence(0)?;

        engine_info!("nebula::command_stream", "Command stream created with {} frame slots", frame_count);

        Ok(Self {
            queue,
            lists,
            fence,
            fence_counter: 0,
            slot_values: vec![0; frame_count],
            active: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.lists.len()
    }

    /// Begin recording into the command list of `slot`
    ///
    /// The slot's previous submission must have retired (see `wait_for_slot`).
    pub fn reset(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        if let Some(active) = self.active {
            engine_bail!("nebula::command_stream",
                "Cannot reset slot {} while slot {} is still recording", slot, active);
        }
        self.lists[slot].begin()?;
        self.active = Some(slot);
        Ok(())
    }

    /// Command list currently recording
    pub fn active_list(&mut self) -> Result<&mut dyn CommandList> {
        match self.active {
            Some(slot) => Ok(self.lists[slot].as_mut()),
            None => Err(Error::BackendError("No command list is recording".to_string())),
        }
    }

    /// Slot currently recording
    pub fn active_slot(&self) -> Option<usize> {
        self.active
    }

    /// Close the active list and enqueue it. Does not block.
    ///
    /// # Arguments
    ///
    /// * `surface` - Surface whose acquired back buffer the list renders into
    pub fn submit(&mut self, surface: Option<&dyn Surface>) -> Result<()> {
        let Some(slot) = self.active else {
            engine_bail!("nebula::command_stream", "submit called with no command list recording");
        };
        let list = &mut self.lists[slot];
        list.end()?;
        self.active = None;
        self.queue.execute(list.as_ref(), surface)
    }

    /// Signal the next fence value after everything submitted so far and record it for `slot`
    ///
    /// Returns the signaled value.
    pub fn signal_and_advance(&mut self, slot: usize) -> Result<u64> {
        self.check_slot(slot)?;
        let value = self.signal_next()?;
        self.slot_values[slot] = value;
        Ok(value)
    }

    /// Block until the last value signaled for `slot` has completed
    pub fn wait_for_slot(&mut self, slot: usize, timeout: Duration) -> Result<()> {
        self.check_slot(slot)?;
        let value = self.slot_values[slot];
        self.wait_value(Some(slot), value, timeout)
    }

    /// Block until all submitted work has completed
    pub fn drain(&mut self, timeout: Duration) -> Result<()> {
        let value = self.signal_next()?;
        engine_info!("nebula::command_stream", "Draining GPU work up to fence value {}", value);
        self.wait_value(None, value, timeout)
    }

    /// Record, submit and wait for a transient command list
    ///
    /// Used for texture uploads and the one-time IBL bake. Blocks until the
    /// GPU has executed the list.
    pub fn execute_one_shot<F>(&mut self, device: &dyn GraphicsDevice, timeout: Duration, record: F) -> Result<()>
    where
        F: FnOnce(&mut dyn CommandList) -> Result<()>,
    {
        let mut list = device.create_command_list()?;
        list.begin()?;
        record(list.as_mut())?;
        list.end()?;
        self.queue.execute(list.as_ref(), None)?;
        let value = self.signal_next()?;
        self.wait_value(None, value, timeout)
    }

    /// Value signaled after the last submission of `slot`
    pub fn fence_value(&self, slot: usize) -> Result<u64> {
        self.check_slot(slot)?;
        Ok(self.slot_values[slot])
    }

    /// Last value handed to the queue
    pub fn last_signaled(&self) -> u64 {
        self.fence_counter
    }

    /// Highest value the GPU has completed
    pub fn completed_value(&self) -> Result<u64> {
        self.fence.completed_value()
    }

    fn signal_next(&mut self) -> Result<u64> {
        let value = self.fence_counter + 1;
        self.queue.signal(self.fence.as_ref(), value)?;
        self.fence_counter = value;
        Ok(value)
    }

    fn wait_value(&self, slot: Option<usize>, value: u64, timeout: Duration) -> Result<()> {
        if self.fence.completed_value()? >= value {
            return Ok(());
        }

        engine_trace!("nebula::command_stream", "Waiting for fence value {} (slot {:?})", value, slot);
        if self.fence.wait(value, timeout)? {
            Ok(())
        } else {
            Err(engine_fatal!(
                "nebula::command_stream",
                Error::FenceTimeout { slot, value, timeout_ms: timeout.as_millis() }
            ))
        }
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.lists.len() {
            return Err(Error::InvalidFrameSlot { slot, frame_count: self.lists.len() });
        }
        Ok(())
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        // Command lists must not be destroyed while the GPU still reads them
        if self.fence_counter > 0 {
            if let Err(e) = self.drain(Duration::from_secs(5)) {
                crate::engine_error!("nebula::command_stream", "Drain on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "command_stream_tests.rs"]
mod tests;

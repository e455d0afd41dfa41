/// Immediate-mode UI drawn on top of the frame.
///
/// The renderer reserves one shader-visible descriptor slot for the UI
/// font atlas before calling `init`, and records the overlay after the
/// skybox, inside a rendering scope on the back buffer.

use crate::error::Result;
use crate::graphics_device::{CommandList, GraphicsDevice};
use crate::renderer::{DescriptorAllocator, DescriptorSlot};

pub trait UiOverlay {
    /// Create the font atlas and write its view into `font_slot`
    fn init(&mut self, device: &dyn GraphicsDevice, font_slot: DescriptorSlot, srv_heap: &DescriptorAllocator) -> Result<()>;

    fn update(&mut self, delta_time: f32);

    /// Record the overlay draws; the back buffer is bound as the only color attachment
    fn record(&mut self, cmd: &mut dyn CommandList) -> Result<()>;
}

/// Overlay that draws nothing
#[derive(Debug, Default)]
pub struct NullOverlay {
    font_slot: Option<DescriptorSlot>,
}

impl NullOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot reserved by the renderer, once initialized
    pub fn font_slot(&self) -> Option<DescriptorSlot> {
        self.font_slot
    }
}

impl UiOverlay for NullOverlay {
    fn init(&mut self, _device: &dyn GraphicsDevice, font_slot: DescriptorSlot, _srv_heap: &DescriptorAllocator) -> Result<()> {
        self.font_slot = Some(font_slot);
        Ok(())
    }

    fn update(&mut self, _delta_time: f32) {}

    fn record(&mut self, _cmd: &mut dyn CommandList) -> Result<()> {
        Ok(())
    }
}

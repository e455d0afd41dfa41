/// Mock graphics device for unit tests (no GPU required)
///
/// Every object created by a `MockGraphicsDevice` appends what it does to a
/// shared journal, so tests can assert the ordering of recording, barriers,
/// submissions, fence signals and fence waits.
///
/// The mock GPU completes work lazily: a queued fence signal is only reported
/// as completed once the CPU waits for it (unless the GPU is stalled, in which
/// case waits time out).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::engine_bail;
use crate::graphics_device::{
    Buffer, BufferDesc, BufferUsage, CommandList, CommandQueue, CpuDescriptorHandle,
    DescriptorHeap, DescriptorHeapKind, DescriptorView, Fence, GpuDescriptorHandle,
    GpuVirtualAddress, GraphicsDevice, IndexType, Pipeline, PipelineDesc, Rect2D,
    RenderingDesc, ResourceState, Surface, Texture, TextureCopyRegion, TextureDesc,
    TextureDimension, TextureFormat, TextureInfo, TextureUsage, TransitionBarrier, Viewport,
};

// ============================================================================
// Journal
// ============================================================================

/// One observable action of the mock GPU
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Begin { list: usize },
    End { list: usize },
    Barrier { list: usize, texture: String, before: ResourceState, after: ResourceState },
    BeginRendering { list: usize, width: u32, height: u32, color_clear: Option<[f32; 4]>, depth_clear: Option<f32> },
    Command { list: usize, name: &'static str },
    RootConstants { list: usize, parameter: u32, data: Vec<u8> },
    Draw { list: usize, pipeline: String, count: u32, indexed: bool },
    Execute { list: usize, with_surface: bool },
    Signal { value: u64 },
    Wait { value: u64, reached: bool },
    Acquire { index: usize },
    Present,
    Resize { width: u32, height: u32 },
}

/// Shared, append-only event log
#[derive(Clone, Default)]
pub struct MockJournal {
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockJournal {
    pub fn push(&self, event: MockEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Number of draws issued with `pipeline`
    pub fn draws_with(&self, pipeline: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MockEvent::Draw { pipeline: p, .. } if p == pipeline))
            .count()
    }

    /// Barriers recorded against `texture`, as (before, after)
    pub fn barriers_of(&self, texture: &str) -> Vec<(ResourceState, ResourceState)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                MockEvent::Barrier { texture: t, before, after, .. } if t == texture => Some((*before, *after)),
                _ => None,
            })
            .collect()
    }

    /// Number of `Execute` events
    pub fn submissions(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, MockEvent::Execute { .. }))
            .count()
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

pub struct MockBuffer {
    pub label: String,
    pub usage: BufferUsage,
    address: GpuVirtualAddress,
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    /// Copy of `len` bytes at `offset`
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let data = self.data.lock().unwrap();
        data[offset as usize..offset as usize + len].to_vec()
    }
}

impl Buffer for MockBuffer {
    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn gpu_address(&self) -> GpuVirtualAddress {
        self.address
    }

    fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let end = offset as usize + bytes.len();
        if end > data.len() {
            engine_bail!("nebula::mock", "Write of {} bytes at {} overflows buffer '{}'", bytes.len(), offset, self.label);
        }
        data[offset as usize..end].copy_from_slice(bytes);
        Ok(())
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    pub info: TextureInfo,
}

impl MockTexture {
    pub fn new(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            info: TextureInfo {
                label: label.to_string(),
                width,
                height,
                format,
                dimension: TextureDimension::D2,
                mip_levels: 1,
                usage: TextureUsage::RENDER_TARGET,
            },
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

// ============================================================================
// Mock Pipeline
// ============================================================================

pub struct MockPipeline {
    pub desc: PipelineDesc,
}

impl Pipeline for MockPipeline {
    fn label(&self) -> &str {
        &self.desc.label
    }
}

// ============================================================================
// Mock Descriptor Heap
// ============================================================================

pub struct MockDescriptorHeap {
    kind: DescriptorHeapKind,
    capacity: u32,
    cpu_start: u64,
    views: Mutex<FxHashMap<u64, String>>,
}

impl MockDescriptorHeap {
    pub const INCREMENT: u64 = 32;

    /// Description of the view written at `handle`, e.g. "srv:shadow_map"
    pub fn view_at(&self, handle: CpuDescriptorHandle) -> Option<String> {
        self.views.lock().unwrap().get(&handle.0).cloned()
    }

    pub fn written_views(&self) -> usize {
        self.views.lock().unwrap().len()
    }
}

impl DescriptorHeap for MockDescriptorHeap {
    fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.cpu_start)
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.kind
            .is_shader_visible()
            .then_some(GpuDescriptorHandle(self.cpu_start + 0x8000_0000))
    }

    fn increment_size(&self) -> u64 {
        Self::INCREMENT
    }

    fn write_view(&self, handle: CpuDescriptorHandle, view: DescriptorView<'_>) -> Result<()> {
        let end = self.cpu_start + self.capacity as u64 * Self::INCREMENT;
        if handle.0 < self.cpu_start || handle.0 >= end {
            engine_bail!("nebula::mock", "Descriptor handle {:#x} outside {:?} heap", handle.0, self.kind);
        }
        let desc = match view {
            DescriptorView::RenderTarget { texture, mip, array_layer } => {
                format!("rtv:{}:{}:{}", texture.info().label, mip, array_layer)
            }
            DescriptorView::DepthStencil { texture } => format!("dsv:{}", texture.info().label),
            DescriptorView::ShaderResource { texture } => format!("srv:{}", texture.info().label),
        };
        self.views.lock().unwrap().insert(handle.0, desc);
        Ok(())
    }
}

// ============================================================================
// Mock Fence and Queue
// ============================================================================

pub struct MockFence {
    journal: MockJournal,
    stalled: Arc<AtomicBool>,
    signaled: AtomicU64,
    completed: AtomicU64,
}

impl MockFence {
    pub fn signaled_value(&self) -> u64 {
        self.signaled.load(Ordering::SeqCst)
    }
}

impl Fence for MockFence {
    fn completed_value(&self) -> Result<u64> {
        Ok(self.completed.load(Ordering::SeqCst))
    }

    fn wait(&self, value: u64, _timeout: Duration) -> Result<bool> {
        if !self.stalled.load(Ordering::SeqCst) {
            let reachable = value.min(self.signaled.load(Ordering::SeqCst));
            self.completed.fetch_max(reachable, Ordering::SeqCst);
        }
        let reached = self.completed.load(Ordering::SeqCst) >= value;
        self.journal.push(MockEvent::Wait { value, reached });
        Ok(reached)
    }
}

pub struct MockCommandQueue {
    journal: MockJournal,
}

impl CommandQueue for MockCommandQueue {
    fn execute(&self, list: &dyn CommandList, surface: Option<&dyn Surface>) -> Result<()> {
        let mock = unsafe { &*(list as *const dyn CommandList as *const MockCommandList) };
        if mock.recording {
            engine_bail!("nebula::mock", "Command list {} executed while still recording", mock.id);
        }
        self.journal.push(MockEvent::Execute { list: mock.id, with_surface: surface.is_some() });
        Ok(())
    }

    fn signal(&self, fence: &dyn Fence, value: u64) -> Result<()> {
        let mock = unsafe { &*(fence as *const dyn Fence as *const MockFence) };
        mock.signaled.fetch_max(value, Ordering::SeqCst);
        self.journal.push(MockEvent::Signal { value });
        Ok(())
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

pub struct MockCommandList {
    pub id: usize,
    journal: MockJournal,
    recording: bool,
    pipeline: Option<String>,
}

impl MockCommandList {
    fn check_recording(&self, what: &str) -> Result<()> {
        if !self.recording {
            engine_bail!("nebula::mock", "{} on command list {} outside begin/end", what, self.id);
        }
        Ok(())
    }

    fn command(&mut self, name: &'static str) -> Result<()> {
        self.check_recording(name)?;
        self.journal.push(MockEvent::Command { list: self.id, name });
        Ok(())
    }

    fn draw_event(&mut self, count: u32, indexed: bool) -> Result<()> {
        self.check_recording("draw")?;
        let Some(pipeline) = self.pipeline.clone() else {
            engine_bail!("nebula::mock", "Draw on command list {} without a pipeline", self.id);
        };
        self.journal.push(MockEvent::Draw { list: self.id, pipeline, count, indexed });
        Ok(())
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.recording {
            engine_bail!("nebula::mock", "Command list {} already recording", self.id);
        }
        self.recording = true;
        self.pipeline = None;
        self.journal.push(MockEvent::Begin { list: self.id });
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.check_recording("end")?;
        self.recording = false;
        self.journal.push(MockEvent::End { list: self.id });
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[TransitionBarrier<'_>]) -> Result<()> {
        self.check_recording("resource_barrier")?;
        for barrier in barriers {
            self.journal.push(MockEvent::Barrier {
                list: self.id,
                texture: barrier.texture.info().label.clone(),
                before: barrier.before,
                after: barrier.after,
            });
        }
        Ok(())
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) -> Result<()> {
        self.check_recording("begin_rendering")?;
        self.journal.push(MockEvent::BeginRendering {
            list: self.id,
            width: desc.width,
            height: desc.height,
            color_clear: desc.color.first().and_then(|c| c.clear),
            depth_clear: desc.depth.and_then(|d| d.clear),
        });
        Ok(())
    }

    fn end_rendering(&mut self) -> Result<()> {
        self.command("end_rendering")
    }

    fn set_viewport(&mut self, _viewport: Viewport) -> Result<()> {
        self.command("set_viewport")
    }

    fn set_scissor(&mut self, _scissor: Rect2D) -> Result<()> {
        self.command("set_scissor")
    }

    fn set_pipeline(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.command("set_pipeline")?;
        self.pipeline = Some(pipeline.label().to_string());
        Ok(())
    }

    fn set_root_constants(&mut self, parameter: u32, _dest_offset: u32, data: &[u8]) -> Result<()> {
        self.check_recording("set_root_constants")?;
        self.journal.push(MockEvent::RootConstants { list: self.id, parameter, data: data.to_vec() });
        Ok(())
    }

    fn set_root_constant_buffer(&mut self, _parameter: u32, _address: GpuVirtualAddress) -> Result<()> {
        self.command("set_root_constant_buffer")
    }

    fn set_root_descriptor_table(&mut self, _parameter: u32, _base: GpuDescriptorHandle) -> Result<()> {
        self.command("set_root_descriptor_table")
    }

    fn set_vertex_buffer(&mut self, _buffer: &Arc<dyn Buffer>, _stride: u32) -> Result<()> {
        self.command("set_vertex_buffer")
    }

    fn set_index_buffer(&mut self, _buffer: &Arc<dyn Buffer>, _index_type: IndexType) -> Result<()> {
        self.command("set_index_buffer")
    }

    fn draw(&mut self, vertex_count: u32, _first_vertex: u32) -> Result<()> {
        self.draw_event(vertex_count, false)
    }

    fn draw_indexed(&mut self, index_count: u32, _first_index: u32, _vertex_offset: i32) -> Result<()> {
        self.draw_event(index_count, true)
    }

    fn copy_buffer_to_texture(
        &mut self,
        _src: &Arc<dyn Buffer>,
        _dst: &dyn Texture,
        _regions: &[TextureCopyRegion],
    ) -> Result<()> {
        self.command("copy_buffer_to_texture")
    }
}

// ============================================================================
// Mock Surface
// ============================================================================

pub struct MockSurface {
    journal: MockJournal,
    back_buffers: Vec<Arc<MockTexture>>,
    current: usize,
    width: u32,
    height: u32,
    /// Next acquire reports the surface as out of date
    pub out_of_date: bool,
    /// Next present reports the surface as suboptimal
    pub suboptimal: bool,
    /// Back buffer count after the next resize (unchanged when `None`)
    pub resize_back_buffer_count: Option<usize>,
}

impl MockSurface {
    pub fn new(device: &MockGraphicsDevice, count: usize, width: u32, height: u32) -> Self {
        Self {
            journal: device.journal(),
            back_buffers: Self::create_back_buffers(count, width, height),
            current: 0,
            width,
            height,
            out_of_date: false,
            suboptimal: false,
            resize_back_buffer_count: None,
        }
    }

    fn create_back_buffers(count: usize, width: u32, height: u32) -> Vec<Arc<MockTexture>> {
        (0..count)
            .map(|i| Arc::new(MockTexture::new(&format!("back_buffer_{}", i), width, height, TextureFormat::B8G8R8A8_SRGB)))
            .collect()
    }
}

impl Surface for MockSurface {
    fn back_buffer_count(&self) -> usize {
        self.back_buffers.len()
    }

    fn acquire_next_back_buffer(&mut self) -> Result<Option<usize>> {
        if self.out_of_date {
            self.out_of_date = false;
            return Ok(None);
        }
        self.journal.push(MockEvent::Acquire { index: self.current });
        Ok(Some(self.current))
    }

    fn current_back_buffer_index(&self) -> usize {
        self.current
    }

    fn back_buffer(&self, index: usize) -> Arc<dyn Texture> {
        self.back_buffers[index].clone()
    }

    fn present(&mut self, _interval: u32) -> Result<bool> {
        self.journal.push(MockEvent::Present);
        self.current = (self.current + 1) % self.back_buffers.len();
        if self.suboptimal {
            self.suboptimal = false;
            return Ok(false);
        }
        Ok(true)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        let count = self.resize_back_buffer_count.take().unwrap_or(self.back_buffers.len());
        self.back_buffers = Self::create_back_buffers(count, width, height);
        self.current = 0;
        self.journal.push(MockEvent::Resize { width, height });
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> TextureFormat {
        TextureFormat::B8G8R8A8_SRGB
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

pub struct MockGraphicsDevice {
    journal: MockJournal,
    stalled: Arc<AtomicBool>,
    next_list: AtomicUsize,
    next_address: AtomicU64,
    next_heap: AtomicU64,
    buffers: Mutex<Vec<Arc<MockBuffer>>>,
    heaps: Mutex<Vec<Arc<MockDescriptorHeap>>>,
    textures: Mutex<Vec<TextureDesc>>,
    pipelines: Mutex<Vec<Arc<MockPipeline>>>,
    fences: Mutex<Vec<Arc<MockFence>>>,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            journal: MockJournal::default(),
            stalled: Arc::new(AtomicBool::new(false)),
            next_list: AtomicUsize::new(0),
            next_address: AtomicU64::new(0x1_0000_0000),
            next_heap: AtomicU64::new(0x1000_0000),
            buffers: Mutex::new(Vec::new()),
            heaps: Mutex::new(Vec::new()),
            textures: Mutex::new(Vec::new()),
            pipelines: Mutex::new(Vec::new()),
            fences: Mutex::new(Vec::new()),
        }
    }

    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }

    /// Stop (or resume) GPU progress: fence waits no longer complete
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn buffers(&self) -> Vec<Arc<MockBuffer>> {
        self.buffers.lock().unwrap().clone()
    }

    pub fn heaps(&self) -> Vec<Arc<MockDescriptorHeap>> {
        self.heaps.lock().unwrap().clone()
    }

    /// Descriptors of every texture created so far
    pub fn textures(&self) -> Vec<TextureDesc> {
        self.textures.lock().unwrap().clone()
    }

    pub fn pipeline_labels(&self) -> Vec<String> {
        self.pipelines.lock().unwrap().iter().map(|p| p.desc.label.clone()).collect()
    }

    pub fn pipeline(&self, label: &str) -> Option<Arc<MockPipeline>> {
        self.pipelines.lock().unwrap().iter().find(|p| p.desc.label == label).cloned()
    }

    pub fn fences(&self) -> Vec<Arc<MockFence>> {
        self.fences.lock().unwrap().clone()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn create_command_queue(&self) -> Result<Arc<dyn CommandQueue>> {
        Ok(Arc::new(MockCommandQueue { journal: self.journal.clone() }))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<dyn Fence>> {
        let fence = Arc::new(MockFence {
            journal: self.journal.clone(),
            stalled: self.stalled.clone(),
            signaled: AtomicU64::new(initial_value),
            completed: AtomicU64::new(initial_value),
        });
        self.fences.lock().unwrap().push(fence.clone());
        Ok(fence)
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList {
            id: self.next_list.fetch_add(1, Ordering::SeqCst),
            journal: self.journal.clone(),
            recording: false,
            pipeline: None,
        }))
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Arc<dyn DescriptorHeap>> {
        if capacity == 0 {
            return Err(Error::InitializationFailed("Descriptor heap capacity must be non-zero".to_string()));
        }
        let heap = Arc::new(MockDescriptorHeap {
            kind,
            capacity,
            cpu_start: self.next_heap.fetch_add(0x100_0000, Ordering::SeqCst),
            views: Mutex::new(FxHashMap::default()),
        });
        self.heaps.lock().unwrap().push(heap.clone());
        Ok(heap)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        let address = self.next_address.fetch_add(desc.size.max(1).next_multiple_of(0x1_0000), Ordering::SeqCst);
        let buffer = Arc::new(MockBuffer {
            label: desc.label.clone(),
            usage: desc.usage,
            address: GpuVirtualAddress(address),
            data: Mutex::new(vec![0; desc.size as usize]),
        });
        self.buffers.lock().unwrap().push(buffer.clone());
        Ok(buffer)
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        if desc.width == 0 || desc.height == 0 {
            return Err(Error::InvalidResource(format!("Texture '{}' has zero size", desc.label)));
        }
        self.textures.lock().unwrap().push(desc.clone());
        Ok(Arc::new(MockTexture { info: TextureInfo::from_desc(desc) }))
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        desc.root_signature.validate()?;
        let pipeline = Arc::new(MockPipeline { desc: desc.clone() });
        self.pipelines.lock().unwrap().push(pipeline.clone());
        Ok(pipeline)
    }

    fn shader_extension(&self) -> &'static str {
        "mock"
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;

/// Pipeline trait, root signature and pipeline descriptor

use crate::error::{Error, Result};
use crate::graphics_device::TextureFormat;

/// Root signature budget in 32-bit values (128 bytes)
pub const MAX_ROOT_SIGNATURE_DWORDS: u32 = 32;

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    /// Triangle list
    TriangleList,
    /// Triangle strip
    TriangleStrip,
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

// ===== RASTERIZATION =====

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    /// Counter-clockwise vertices define front face
    CounterClockwise,
    /// Clockwise vertices define front face
    Clockwise,
}

/// Comparison operator for depth tests and comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Depth bias parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    /// Constant depth offset
    pub constant_factor: f32,
    /// Slope-based depth offset
    pub slope_factor: f32,
    /// Maximum depth bias clamp
    pub clamp: f32,
}

/// Rasterization fixed-function state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    /// Face culling mode
    pub cull_mode: CullMode,
    /// Front face winding order
    pub front_face: FrontFace,
    /// Depth bias (None = disabled)
    pub depth_bias: Option<DepthBias>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            depth_bias: None,
        }
    }
}

/// Depth testing state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilState {
    /// Enable depth testing
    pub depth_test_enable: bool,
    /// Enable writing to depth buffer
    pub depth_write_enable: bool,
    /// Depth comparison operator
    pub depth_compare_op: CompareOp,
}

impl DepthStencilState {
    /// No depth attachment interaction
    pub const DISABLED: Self = Self {
        depth_test_enable: false,
        depth_write_enable: false,
        depth_compare_op: CompareOp::Always,
    };
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::LessOrEqual,
        }
    }
}

/// Color blending of the render targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Overwrite
    #[default]
    Opaque,
    /// src * a + dst * (1 - a)
    AlphaBlend,
}

// ===== ROOT SIGNATURE =====

/// Shader stages that can read a root parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Pixel,
}

/// One root signature entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootParameter {
    /// Inline 32-bit constants
    Constants {
        num_values: u32,
        visibility: ShaderVisibility,
    },
    /// Address of a constant block (e.g. from the frame constant ring)
    ConstantBuffer {
        visibility: ShaderVisibility,
    },
    /// Contiguous range of shader-visible descriptors
    DescriptorTable {
        num_descriptors: u32,
        visibility: ShaderVisibility,
    },
}

impl RootParameter {
    /// Cost of the parameter in 32-bit values
    pub fn size_in_dwords(&self) -> u32 {
        match self {
            RootParameter::Constants { num_values, .. } => *num_values,
            RootParameter::ConstantBuffer { .. } => 2,
            RootParameter::DescriptorTable { .. } => 1,
        }
    }
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Point,
    Linear,
}

/// Texture addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
}

/// Sampler baked into the root signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSampler {
    pub filter: Filter,
    pub address_mode: AddressMode,
    /// Comparison sampler (shadow lookups) when set
    pub comparison: Option<CompareOp>,
}

impl StaticSampler {
    /// Trilinear, wrapping
    pub const LINEAR_WRAP: Self = Self {
        filter: Filter::Linear,
        address_mode: AddressMode::Wrap,
        comparison: None,
    };
    /// Trilinear, clamped
    pub const LINEAR_CLAMP: Self = Self {
        filter: Filter::Linear,
        address_mode: AddressMode::Clamp,
        comparison: None,
    };
}

/// Layout of the values a pipeline reads from the command list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootSignatureDesc {
    /// Parameters, addressed by index
    pub parameters: Vec<RootParameter>,
    /// Samplers, bound at registers s0.. in order
    pub static_samplers: Vec<StaticSampler>,
}

impl RootSignatureDesc {
    /// Total size in 32-bit values
    pub fn size_in_dwords(&self) -> u32 {
        self.parameters.iter().map(RootParameter::size_in_dwords).sum()
    }

    /// Reject signatures that exceed the root budget
    pub fn validate(&self) -> Result<()> {
        let size = self.size_in_dwords();
        if size > MAX_ROOT_SIGNATURE_DWORDS {
            return Err(Error::InvalidResource(format!(
                "Root signature uses {} dwords, limit is {}",
                size, MAX_ROOT_SIGNATURE_DWORDS
            )));
        }
        Ok(())
    }
}

// ===== PIPELINE DESCRIPTOR =====

/// Precompiled shader binary
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderBytecode {
    /// Stage name the binary was loaded for (e.g. "ShadowVS")
    pub name: String,
    /// Raw binary
    pub code: Vec<u8>,
}

/// One vertex attribute; attribute `i` of the layout is shader input location `i`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputElement {
    /// Semantic name, for diagnostics
    pub semantic: &'static str,
    /// Attribute format
    pub format: TextureFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
}

/// Descriptor for creating a graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    /// Debug label
    pub label: String,
    /// Root signature
    pub root_signature: RootSignatureDesc,
    /// Vertex shader
    pub vertex_shader: ShaderBytecode,
    /// Pixel shader (`None` for depth-only pipelines)
    pub pixel_shader: Option<ShaderBytecode>,
    /// Vertex attributes
    pub input_layout: Vec<InputElement>,
    /// Size in bytes of one vertex
    pub vertex_stride: u32,
    /// Primitive topology
    pub topology: PrimitiveTopology,
    /// Rasterization state
    pub rasterization: RasterizationState,
    /// Depth testing state
    pub depth_stencil: DepthStencilState,
    /// Color blending
    pub blend: BlendMode,
    /// Formats of the color attachments
    pub color_formats: Vec<TextureFormat>,
    /// Format of the depth attachment
    pub depth_format: Option<TextureFormat>,
}

/// Pipeline resource trait
///
/// Implemented by backend-specific pipeline types. The pipeline is destroyed when dropped.
pub trait Pipeline: Send + Sync {
    /// Debug label the pipeline was created with
    fn label(&self) -> &str;
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

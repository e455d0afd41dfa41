/// Backend-only configuration of the Vulkan device

/// Which validation messages reach the engine logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    /// Errors only
    ErrorsOnly,
    /// Errors and warnings
    #[default]
    ErrorsAndWarnings,
    /// Everything the layers report, including info and verbose
    All,
}

/// Vulkan backend knobs not covered by `RendererConfig`
///
/// Only read when `RendererConfig::enable_validation` is set and the crate is
/// built with the `vulkan-validation` feature.
#[derive(Debug, Clone)]
pub struct VulkanConfig {
    /// Minimum severity forwarded to the engine logger
    pub debug_severity: DebugSeverity,
    /// Abort the process on the first validation error
    pub break_on_validation_error: bool,
    /// Count validation messages (see `get_validation_stats`)
    pub enable_validation_stats: bool,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            debug_severity: DebugSeverity::default(),
            break_on_validation_error: false,
            enable_validation_stats: true,
        }
    }
}

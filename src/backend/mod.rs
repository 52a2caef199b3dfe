// Backend module - Vulkan abstraction layer
//
// Thin wrapper around ash: each submodule owns one stage of bring-up, and
// `Renderer` strings them together and drives the frame loop.

pub mod frame;
pub mod instance;
pub mod pipeline;
pub mod probe;
pub mod renderer;
pub mod resources;
pub mod session;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use renderer::Renderer;

use ash::extensions::khr;
use std::ffi::CStr;
use std::path::PathBuf;

use crate::config::Config;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Whether validation layers and the debug messenger are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugOutput {
    Enabled,
    Disabled,
}

/// Everything bring-up needs that isn't discovered from the hardware
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub app_name: String,
    pub debug_output: DebugOutput,
    /// Device extensions a physical device must support to be considered
    pub device_extensions: Vec<&'static CStr>,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl RendererConfig {
    pub fn new(debug_output: DebugOutput) -> Self {
        Self {
            app_name: "Hello Triangle".to_string(),
            debug_output,
            device_extensions: vec![khr::Swapchain::name()],
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

impl From<&Config> for RendererConfig {
    fn from(config: &Config) -> Self {
        let debug_output = if config.debug_output_enabled() {
            DebugOutput::Enabled
        } else {
            DebugOutput::Disabled
        };
        Self::new(debug_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_is_always_required() {
        let config = RendererConfig::new(DebugOutput::Disabled);
        assert_eq!(config.device_extensions, vec![khr::Swapchain::name()]);
    }

    #[test]
    fn debug_output_follows_config_switch() {
        let mut config = Config::default();
        config.debug.validation_layers = false;
        assert_eq!(RendererConfig::from(&config).debug_output, DebugOutput::Disabled);

        config.debug.validation_layers = true;
        let expected = if cfg!(debug_assertions) {
            DebugOutput::Enabled
        } else {
            DebugOutput::Disabled
        };
        assert_eq!(RendererConfig::from(&config).debug_output, expected);
    }
}

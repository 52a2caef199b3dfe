// Renderer errors
//
// Every failure the backend can report, grouped into four kinds:
// initialization, device selection, resource creation and per-frame errors.
// Bring-up errors are fatal; frame errors are logged and the frame is dropped.

use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Broad category of a [`RendererError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Initialization,
    DeviceSelection,
    ResourceCreation,
    Frame,
}

/// Stage of the frame loop a [`RendererError::Frame`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    WaitFence,
    ResetFence,
    Acquire,
    Record,
    Submit,
    Present,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::WaitFence => "fence wait",
            FrameStage::ResetFence => "fence reset",
            FrameStage::Acquire => "image acquire",
            FrameStage::Record => "command recording",
            FrameStage::Submit => "queue submit",
            FrameStage::Present => "present",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// An enumeration or creation call during instance bootstrap failed
    #[error("Failed to {what}: {result}")]
    Initialization {
        what: &'static str,
        result: vk::Result,
    },

    #[error("Required instance extensions not supported: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),

    #[error("Required instance layers not supported: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    #[error("No suitable GPU found")]
    NoSuitableDevice,

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Failed to create {what}: {result}")]
    ResourceCreation {
        what: &'static str,
        result: vk::Result,
    },

    #[error("Failed to load shader {}", path.display())]
    ShaderLoad { path: PathBuf },

    #[error("Frame dropped at {stage}: {result}")]
    Frame { stage: FrameStage, result: vk::Result },
}

pub type RendererResult<T> = Result<T, RendererError>;

impl RendererError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RendererError::Loading(_)
            | RendererError::Initialization { .. }
            | RendererError::MissingExtensions(_)
            | RendererError::MissingLayers(_) => ErrorKind::Initialization,
            RendererError::NoSuitableDevice => ErrorKind::DeviceSelection,
            RendererError::DeviceCreation(_)
            | RendererError::ResourceCreation { .. }
            | RendererError::ShaderLoad { .. } => ErrorKind::ResourceCreation,
            RendererError::Frame { .. } => ErrorKind::Frame,
        }
    }

    /// `map_err` adapter for bootstrap calls
    pub fn init(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::Initialization { what, result }
    }

    /// `map_err` adapter for native object creation during bring-up
    pub fn resource(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::ResourceCreation { what, result }
    }

    /// `map_err` adapter for the steady-state frame loop
    pub fn frame(stage: FrameStage) -> impl FnOnce(vk::Result) -> Self {
        move |result| RendererError::Frame { stage, result }
    }
}

// Capability prober
//
// Responsibilities:
// - Enumerate instance extensions and layers
// - Enumerate physical devices and gather what each can do with the surface
// - Score candidates and pick the best one (prefer discrete GPU)

use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr};

use super::surface::{Surface, SurfaceSupport};
use super::swapchain::{choose_present_mode, choose_surface_format};
use crate::error::{RendererError, RendererResult};

/// Where the graphics and present queues come from. Either may be missing
/// until a family supporting it is found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// A complete assignment: both queues have a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyAssignment {
    pub fn resolve(&self) -> Option<QueueFamilies> {
        match (self.graphics, self.present) {
            (Some(graphics), Some(present)) => Some(QueueFamilies { graphics, present }),
            _ => None,
        }
    }
}

impl QueueFamilies {
    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// What one queue family can do
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Walk families in order, stopping as soon as both roles are filled
pub fn find_queue_families(families: &[QueueFamilySupport]) -> QueueFamilyAssignment {
    let mut assignment = QueueFamilyAssignment::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.graphics {
            assignment.graphics = Some(index);
        }
        if family.present {
            assignment.present = Some(index);
        }
        if assignment.resolve().is_some() {
            break;
        }
    }

    assignment
}

/// A physical device and everything selection needs to know about it
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub vendor_id: u32,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub extensions: Vec<String>,
    pub surface: SurfaceSupport,
    pub queue_families: QueueFamilyAssignment,
    /// Set when an extension or surface query failed for this device
    pub query_error: Option<vk::Result>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsuitable {
    QueryFailed(vk::Result),
    MissingExtension(String),
    NoSurfaceFormats,
    NoPresentModes,
    IncompleteQueueFamilies,
}

/// Outcome of scoring one candidate. `Suitable(0)` is a real score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suitability {
    Suitable(u32),
    Unsuitable(Unsuitable),
}

const DISCRETE_GPU_BONUS: u32 = 1000;
const SRGB_FORMAT_BONUS: u32 = 50;
const SRGB_COLOR_SPACE_BONUS: u32 = 50;
const MAILBOX_BONUS: u32 = 100;

pub fn score(candidate: &DeviceCandidate, required_extensions: &[&CStr]) -> Suitability {
    if let Some(result) = candidate.query_error {
        return Suitability::Unsuitable(Unsuitable::QueryFailed(result));
    }

    if let Some(missing) = required_extensions.iter().find(|required| {
        let required = required.to_string_lossy();
        !candidate.extensions.iter().any(|ext| *ext == required)
    }) {
        return Suitability::Unsuitable(Unsuitable::MissingExtension(
            missing.to_string_lossy().into_owned(),
        ));
    }

    let Some(format) = choose_surface_format(&candidate.surface.formats) else {
        return Suitability::Unsuitable(Unsuitable::NoSurfaceFormats);
    };
    if candidate.surface.present_modes.is_empty() {
        return Suitability::Unsuitable(Unsuitable::NoPresentModes);
    }
    if candidate.queue_families.resolve().is_none() {
        return Suitability::Unsuitable(Unsuitable::IncompleteQueueFamilies);
    }

    let mut score = 0;
    if candidate.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_GPU_BONUS;
    }
    if format.format == vk::Format::B8G8R8A8_SRGB {
        score += SRGB_FORMAT_BONUS;
    }
    if format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR {
        score += SRGB_COLOR_SPACE_BONUS;
    }
    if choose_present_mode(&candidate.surface.present_modes) == vk::PresentModeKHR::MAILBOX {
        score += MAILBOX_BONUS;
    }

    Suitability::Suitable(score)
}

/// Index of the highest `Suitable` score; the first one wins a tie
pub fn select_best(scores: &[Suitability]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;

    for (index, suitability) in scores.iter().enumerate() {
        if let Suitability::Suitable(score) = *suitability {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((index, score)),
            }
        }
    }

    best.map(|(index, _)| index)
}

/// The chosen device with its resolved queue families
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub candidate: DeviceCandidate,
    pub queue_families: QueueFamilies,
}

pub fn pick_physical_device(
    instance: &ash::Instance,
    surface: &Surface,
    required_extensions: &[&CStr],
) -> RendererResult<SelectedDevice> {
    let candidates = enumerate_candidates(instance, surface)?;

    let scores: Vec<Suitability> = candidates
        .iter()
        .map(|candidate| {
            let suitability = score(candidate, required_extensions);
            log::debug!("{}: {:?}", candidate.name, suitability);
            suitability
        })
        .collect();

    let index = select_best(&scores).ok_or(RendererError::NoSuitableDevice)?;
    let candidate = candidates
        .into_iter()
        .nth(index)
        .ok_or(RendererError::NoSuitableDevice)?;
    let queue_families = candidate
        .queue_families
        .resolve()
        .ok_or(RendererError::NoSuitableDevice)?;

    Ok(SelectedDevice {
        candidate,
        queue_families,
    })
}

pub fn enumerate_candidates(
    instance: &ash::Instance,
    surface: &Surface,
) -> RendererResult<Vec<DeviceCandidate>> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(RendererError::init("enumerate physical devices"))?;

    if devices.is_empty() {
        log::error!("No Vulkan-capable GPU found");
    }

    Ok(devices
        .into_iter()
        .map(|device| probe_device(instance, surface, device))
        .collect())
}

/// A failed query only disqualifies this device, not the whole selection
fn probe_device(
    instance: &ash::Instance,
    surface: &Surface,
    device: vk::PhysicalDevice,
) -> DeviceCandidate {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = c_name(&properties.device_name);
    let mut query_error = None;

    let extensions = device_extension_names(instance, device).unwrap_or_else(|e| {
        log::warn!("{}: failed to enumerate device extensions: {}", name, e);
        query_error = Some(e);
        Vec::new()
    });
    let surface_support = surface.support(device).unwrap_or_else(|e| {
        log::warn!("{}: failed to query surface support: {}", name, e);
        if query_error.is_none() {
            query_error = Some(e);
        }
        SurfaceSupport::default()
    });

    let families: Vec<QueueFamilySupport> =
        unsafe { instance.get_physical_device_queue_family_properties(device) }
            .iter()
            .enumerate()
            .map(|(index, family)| QueueFamilySupport {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: surface.supports_present(device, index as u32),
            })
            .collect();

    DeviceCandidate {
        handle: device,
        name,
        vendor_id: properties.vendor_id,
        device_type: properties.device_type,
        api_version: properties.api_version,
        extensions,
        surface: surface_support,
        queue_families: find_queue_families(&families),
        query_error,
    }
}

fn device_extension_names(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> VkResult<Vec<String>> {
    let properties = unsafe { instance.enumerate_device_extension_properties(device) }?;

    Ok(properties
        .iter()
        .map(|ext| c_name(&ext.extension_name))
        .collect())
}

pub fn enumerate_instance_extensions(entry: &Entry) -> RendererResult<Vec<vk::ExtensionProperties>> {
    entry
        .enumerate_instance_extension_properties(None)
        .map_err(RendererError::init("enumerate instance extensions"))
}

pub fn enumerate_instance_layers(entry: &Entry) -> RendererResult<Vec<vk::LayerProperties>> {
    entry
        .enumerate_instance_layer_properties()
        .map_err(RendererError::init("enumerate instance layers"))
}

/// Names from `required` that do not appear in `available`
pub fn missing_names(required: &[&CStr], available: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.contains(name))
        .collect()
}

pub fn c_name(raw: &[c_char]) -> String {
    // Vulkan name arrays are always NUL-terminated within their fixed size
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

pub fn vendor_name(vendor_id: u32) -> String {
    match vendor_id {
        0x1002 => "AMD".to_string(),
        0x1010 => "ImgTec".to_string(),
        0x10DE => "NVIDIA".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x8086 => "Intel".to_string(),
        0x10005 => "Mesa".to_string(),
        other => format!("Vendor 0x{:04X}", other),
    }
}

pub fn device_type_label(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "dGPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "iGPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "vGPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        vk::PhysicalDeviceType::OTHER => "Other",
        _ => "Unknown",
    }
}

pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{} (variant {})",
        vk::api_version_major(version),
        vk::api_version_minor(version),
        vk::api_version_patch(version),
        vk::api_version_variant(version)
    )
}

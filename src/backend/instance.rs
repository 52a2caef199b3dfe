// Instance bootstrap
//
// Responsibilities:
// - Check required instance extensions/layers before creating anything
// - Instance creation, with the debug messenger chained in when enabled
// - Standing debug messenger routing validation output into `log`
// - Capability dumps (versions, extensions, layers, devices) in debug mode

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

use super::probe::{
    c_name, device_type_label, enumerate_instance_extensions, enumerate_instance_layers,
    missing_names, vendor_name, version_string,
};
use super::resources::{ResourceStack, VkResource};
use super::{DebugOutput, RendererConfig, VALIDATION_LAYER};
use crate::error::{RendererError, RendererResult};

const ENGINE_NAME: &CStr = c"triangle-renderer";

pub fn create_instance(
    entry: &Entry,
    config: &RendererConfig,
    display_handle: RawDisplayHandle,
    resources: &mut ResourceStack<VkResource>,
) -> RendererResult<ash::Instance> {
    let debug_enabled = config.debug_output == DebugOutput::Enabled;

    // Step 1: Collect and check required extensions
    let mut extensions: Vec<&CStr> = ash_window::enumerate_required_extensions(display_handle)
        .map_err(RendererError::init("query surface extensions"))?
        .iter()
        .map(|&name| unsafe { CStr::from_ptr(name) })
        .collect();
    if debug_enabled {
        extensions.push(DebugUtils::name());
    }

    let available: Vec<String> = enumerate_instance_extensions(entry)?
        .iter()
        .map(|ext| c_name(&ext.extension_name))
        .collect();
    let missing = missing_names(&extensions, &available);
    if !missing.is_empty() {
        return Err(RendererError::MissingExtensions(missing));
    }

    // Step 2: Validation layer, debug only
    let layers: Vec<&CStr> = if debug_enabled {
        vec![VALIDATION_LAYER]
    } else {
        vec![]
    };
    if !layers.is_empty() {
        let available: Vec<String> = enumerate_instance_layers(entry)?
            .iter()
            .map(|layer| c_name(&layer.layer_name))
            .collect();
        let missing = missing_names(&layers, &available);
        if !missing.is_empty() {
            return Err(RendererError::MissingLayers(missing));
        }
    }

    // Step 3: Create the instance
    let app_name = CString::new(config.app_name.as_str()).unwrap_or_else(|_| CString::from(c"Hello Triangle"));
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|name| name.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

    // Chained so instance creation and destruction are reported too
    let mut instance_debug_info = messenger_create_info();

    let mut create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs);
    if debug_enabled {
        create_info = create_info.push_next(&mut instance_debug_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(RendererError::init("create Vulkan instance"))?;
    resources.push(VkResource::Instance(instance.clone()));

    log::info!("Created Vulkan instance ({} extensions, {} layers)", extensions.len(), layers.len());

    Ok(instance)
}

pub fn create_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
    resources: &mut ResourceStack<VkResource>,
) -> RendererResult<()> {
    let debug_utils = DebugUtils::new(entry, instance);
    let create_info = messenger_create_info();

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(RendererError::init("create debug messenger"))?;
    resources.push(VkResource::DebugMessenger(debug_utils, messenger));

    Ok(())
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Log the loader version plus every instance extension and layer
pub fn log_instance_details(entry: &Entry) -> RendererResult<()> {
    let version = entry
        .try_enumerate_instance_version()
        .map_err(RendererError::init("query instance version"))?
        .unwrap_or(vk::API_VERSION_1_0);
    log::info!("Vulkan support details:");
    log::info!("  Version: {}", version_string(version));

    let extensions = enumerate_instance_extensions(entry)?;
    log::info!("  Extensions ({}):", extensions.len());
    for ext in &extensions {
        log::info!("    {} (version {})", c_name(&ext.extension_name), ext.spec_version);
    }

    let layers = enumerate_instance_layers(entry)?;
    log::info!("  Layers ({}):", layers.len());
    for layer in &layers {
        log::info!(
            "    {} (Vulkan {}, version {})",
            c_name(&layer.layer_name),
            version_string(layer.spec_version),
            layer.implementation_version
        );
    }

    Ok(())
}

/// Log every physical device with its device extensions
pub fn log_device_details(instance: &ash::Instance) -> RendererResult<()> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(RendererError::init("enumerate physical devices"))?;

    log::info!("  Physical devices ({}):", devices.len());
    for device in devices {
        let props = unsafe { instance.get_physical_device_properties(device) };
        log::info!(
            "    {} {} [{}], Vulkan {}",
            vendor_name(props.vendor_id),
            c_name(&props.device_name),
            device_type_label(props.device_type),
            version_string(props.api_version)
        );

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(RendererError::init("enumerate device extensions"))?;
        log::info!("      Extensions ({}):", extensions.len());
        for ext in &extensions {
            log::info!("        {} (version {})", c_name(&ext.extension_name), ext.spec_version);
        }
    }

    Ok(())
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> String {
    let mut labels = Vec::new();
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL) {
        labels.push("GENERAL");
    }
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        labels.push("PERFORMANCE");
    }
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        labels.push("VALIDATION");
    }
    labels.join(" | ")
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();
    let kind = message_type_label(message_type);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {}] {}", kind, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {}] {}", kind, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan {}] {}", kind, message);
        }
        _ => {
            log::trace!("[Vulkan {}] {}", kind, message);
        }
    }

    vk::FALSE
}

/// Context - Shared GPU resources for all Vulkan presentation objects
///
/// Contains everything the backend needs for GPU operations:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics and present queues for submission and display
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use vega_present::vega::{Error, Result};
use vega_present::vega_error;

const SOURCE: &str = "vega::vulkan::Context";

/// Backend configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name reported to the Vulkan driver
    pub app_name: String,
    /// Enable VK_LAYER_KHRONOS_validation (requires the `vulkan-validation`
    /// cargo feature for the messenger to be compiled in)
    pub enable_validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Vega Application".to_string(),
            enable_validation: false,
        }
    }
}

/// Shared Vulkan context.
///
/// Created once, shared (via `Arc`) by every backend object so device,
/// allocator and queue references are not duplicated per resource. Window
/// handles are only borrowed during construction for extension and queue
/// selection; the context itself works headless when no window is given.
pub struct Context {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,

    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    present_queue: vk::Queue,
    present_queue_family: u32,

    /// GPU memory allocator (shared, requires mutex for thread safety).
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is
    /// destroyed.
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    #[cfg(feature = "vulkan-validation")]
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Context {
    /// Create a Vulkan context.
    ///
    /// `window` is only used to enumerate the platform surface extensions
    /// and to pick a present-capable queue family; pass `None` for a
    /// headless context (no surface extensions, present queue = graphics
    /// queue).
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: Option<&W>,
        config: &Config,
    ) -> Result<Arc<Self>> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                vega_error!(SOURCE, "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            let app_name = std::ffi::CString::new(config.app_name.as_str())
                .unwrap_or_else(|_| std::ffi::CString::new("Vega Application").unwrap());
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Vega")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Instance extensions: surface extensions only when a window
            // exists, debug utils only with validation.
            let mut extension_names: Vec<*const i8> = Vec::new();
            if let Some(window) = window {
                let display_handle = window.display_handle().map_err(|e| {
                    vega_error!(SOURCE, "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
                extension_names.extend_from_slice(
                    ash_window::enumerate_required_extensions(display_handle.as_raw()).map_err(
                        |e| {
                            vega_error!(SOURCE, "Failed to get required extensions: {}", e);
                            Error::InitializationFailed(format!(
                                "Failed to get required extensions: {}",
                                e
                            ))
                        },
                    )?,
                );
            }
            #[cfg(feature = "vulkan-validation")]
            if config.enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names: Vec<*const i8> = if config.enable_validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                vega_error!(SOURCE, "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            #[cfg(feature = "vulkan-validation")]
            let debug_utils = if config.enable_validation {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(
                        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                    )
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));
                let messenger = loader
                    .create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| {
                        vega_error!(SOURCE, "Failed to create debug messenger: {:?}", e);
                        Error::InitializationFailed(format!(
                            "Failed to create debug messenger: {:?}",
                            e
                        ))
                    })?;
                Some((loader, messenger))
            } else {
                None
            };

            // Pick physical device
            let physical_devices = instance.enumerate_physical_devices().map_err(|e| {
                vega_error!(SOURCE, "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!(
                    "Failed to enumerate physical devices: {:?}",
                    e
                ))
            })?;
            let physical_device = physical_devices.into_iter().next().ok_or_else(|| {
                vega_error!(SOURCE, "No Vulkan-capable GPU found");
                Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
            })?;

            // Find queue families
            let queue_families =
                instance.get_physical_device_queue_family_properties(physical_device);
            let graphics_family_index = queue_families
                .iter()
                .enumerate()
                .find(|(_, qf)| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32)
                .ok_or_else(|| {
                    vega_error!(SOURCE, "No graphics queue family found");
                    Error::InitializationFailed("No graphics queue family found".to_string())
                })?;

            // Present support needs a surface to test against; a temporary
            // one is created and destroyed here. Headless contexts present
            // nowhere and reuse the graphics family.
            let present_family_index = match window {
                Some(window) => {
                    let display_handle = window.display_handle().map_err(|e| {
                        Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                    })?;
                    let window_handle = window.window_handle().map_err(|e| {
                        Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                    })?;
                    let surface = ash_window::create_surface(
                        &entry,
                        &instance,
                        display_handle.as_raw(),
                        window_handle.as_raw(),
                        None,
                    )
                    .map_err(|e| {
                        vega_error!(SOURCE, "Failed to create surface: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
                    })?;
                    let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

                    let index = (0..queue_families.len() as u32).find(|&i| {
                        surface_loader
                            .get_physical_device_surface_support(physical_device, i, surface)
                            .unwrap_or(false)
                    });
                    surface_loader.destroy_surface(surface, None);
                    index.ok_or_else(|| {
                        vega_error!(SOURCE, "No present queue family found");
                        Error::InitializationFailed("No present queue family found".to_string())
                    })?
                }
                None => graphics_family_index,
            };

            // Create logical device
            let queue_priorities = [1.0];
            let queue_create_infos = if graphics_family_index == present_family_index {
                vec![vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(graphics_family_index)
                    .queue_priorities(&queue_priorities)]
            } else {
                vec![
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(graphics_family_index)
                        .queue_priorities(&queue_priorities),
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(present_family_index)
                        .queue_priorities(&queue_priorities),
                ]
            };

            let mut device_extension_names: Vec<*const i8> = Vec::new();
            if window.is_some() {
                device_extension_names.push(ash::khr::swapchain::NAME.as_ptr());
            }

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    vega_error!(SOURCE, "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);
            let present_queue = device.get_device_queue(present_family_index, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                vega_error!(SOURCE, "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            Ok(Arc::new(Self {
                entry,
                instance,
                physical_device,
                device,
                graphics_queue,
                graphics_queue_family: graphics_family_index,
                present_queue,
                present_queue_family: present_family_index,
                allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
                #[cfg(feature = "vulkan-validation")]
                debug_utils,
            }))
        }
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub(crate) fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub(crate) fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Vulkan logical device
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Graphics queue for command submission
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Graphics queue family index
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Queue the platform presents on
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Present queue family index
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    pub(crate) fn allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.allocator)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            // The allocator must release its memory blocks while the device
            // is still alive.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            #[cfg(feature = "vulkan-validation")]
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

use std::ffi::{c_char, c_void, CStr, CString};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::negotiation::{self, SwapchainSupport};

/// Initializes Vulkan and keeps the instance, debug messenger, and window surface alive
pub struct RenderInstance {
    pub instance: ash::Instance,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub validation_enabled: bool,

    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,

    // Keeps the Vulkan loader library loaded for as long as the instance lives
    _entry: ash::Entry,
}

impl RenderInstance {
    pub const VALIDATION_LAYERS: &'static [&'static CStr] = &[
        c"VK_LAYER_KHRONOS_validation",
    ];

    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load()? };

        let validation_enabled = config.enable_validation
            && Self::validation_layers_supported(&entry)?;

        let instance = Self::create_instance(
            &entry,
            window,
            &config.app_name,
            validation_enabled,
        )?;

        // From here on the instance is owned by `ctx`, so a failure below still destroys it
        let mut ctx = Self {
            surface: vk::SurfaceKHR::null(),
            surface_loader: ash::khr::surface::Instance::new(&entry, &instance),
            instance,
            validation_enabled,
            debug_utils: None,
            _entry: entry,
        };

        if validation_enabled {
            ctx.debug_utils = Some(Self::create_debug_utils_messenger(&ctx._entry, &ctx.instance)?);
        }

        ctx.surface = unsafe {
            ash_window::create_surface(
                &ctx._entry,
                &ctx.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };

        Ok(ctx)
    }

    /// Queries surface capabilities, formats, and present modes for `physical_device`
    pub fn swapchain_support(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SwapchainSupport> {
        unsafe {
            Ok(SwapchainSupport {
                capabilities: self.surface_loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                formats: self.surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                present_modes: self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            })
        }
    }

    fn create_instance(
        entry: &ash::Entry,
        window: &Window,
        app_name: &str,
        validation_enabled: bool,
    ) -> Result<ash::Instance> {
        let required_extensions = Self::get_required_instance_extensions(window, validation_enabled)?;
        Self::check_instance_extensions_supported(entry, &required_extensions)?;

        let app_name = CString::new(app_name)?;
        let application_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);
        let enabled_layer_names = if validation_enabled {
            Self::VALIDATION_LAYERS
                .iter()
                .map(|layer| layer.as_ptr())
                .collect::<Vec<*const c_char>>()
        } else {
            Vec::new()
        };
        let enabled_extension_names = required_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        // Chaining the messenger info also reports problems in instance creation itself
        let mut debug_info = debug_utils_messenger_create_info();
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);
        let instance_info = if validation_enabled {
            instance_info.push_next(&mut debug_info)
        } else {
            instance_info
        };

        #[cfg(target_os = "macos")]
        let instance_info = instance_info
            .flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        Ok(unsafe {
            entry.create_instance(&instance_info, None)?
        })
    }

    fn create_debug_utils_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils_loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_utils_info = debug_utils_messenger_create_info();
        let debug_utils_messenger = unsafe {
            debug_utils_loader.create_debug_utils_messenger(&debug_utils_info, None)?
        };
        Ok((debug_utils_loader, debug_utils_messenger))
    }

    fn get_required_instance_extensions(
        window: &Window,
        validation_enabled: bool,
    ) -> Result<Vec<&'static CStr>> {
        let mut exts = ash_window::enumerate_required_extensions(
            window.display_handle()?.as_raw()
        )?
            .iter()
            .map(|ext| unsafe {
                CStr::from_ptr(*ext)
            })
            .collect::<Vec<_>>();

        if validation_enabled {
            exts.push(ash::ext::debug_utils::NAME);
        }

        #[cfg(target_os = "macos")]
        {
            exts.push(ash::khr::portability_enumeration::NAME);
            exts.push(ash::khr::get_physical_device_properties2::NAME);
        }

        Ok(exts)
    }

    fn check_instance_extensions_supported(
        entry: &ash::Entry,
        required: &[&CStr],
    ) -> Result<()> {
        let properties = unsafe {
            entry.enumerate_instance_extension_properties(None)?
        };
        let supported = properties
            .iter()
            .map(|props| props.extension_name_as_c_str())
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Required instance extensions: {:?}", required);
        log::debug!("Available instance extensions: {:?}", supported);

        if !negotiation::extensions_satisfied(required, &supported) {
            let missing = required
                .iter()
                .filter(|ext| !supported.contains(*ext))
                .collect::<Vec<_>>();
            return Err(eyre!(
                "Required instance extensions not supported: {:?}",
                missing
            ));
        }

        Ok(())
    }

    /// Validation is optional, so a missing layer only turns it off
    fn validation_layers_supported(entry: &ash::Entry) -> Result<bool> {
        let properties = unsafe {
            entry.enumerate_instance_layer_properties()?
        };
        let supported = properties
            .iter()
            .map(|props| props.layer_name_as_c_str())
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("Requested layers: {:?}", Self::VALIDATION_LAYERS);
        log::debug!("Available layers: {:?}", supported);

        let satisfied = negotiation::layers_satisfied(Self::VALIDATION_LAYERS, &supported);
        if !satisfied {
            log::warn!(
                "Validation layers {:?} requested but not available, continuing without them",
                Self::VALIDATION_LAYERS
            );
        }
        Ok(satisfied)
    }
}

impl Drop for RenderInstance {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_utils_messenger_create_info(
) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    };
    let msg = unsafe {
        if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
            c"<no message>"
        } else {
            CStr::from_ptr((*p_callback_data).p_message)
        }
    };
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => {
            log::trace!("[Verbose]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Warning]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Error]{} {:?}", msg_type, msg);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Info]{} {:?}", msg_type, msg);
        }
        _ => {
            log::warn!("[Unknown]{} {:?}", msg_type, msg);
        }
    }

    // Never abort the call that triggered the message
    vk::FALSE
}

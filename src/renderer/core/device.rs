use std::ffi::{c_char, CStr, CString};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::negotiation::{self, DeviceProbe, QueueFamilyIndices, SwapchainSupport};

/// Logical device and the queues it was created with
pub struct RenderDevice {
    pub logical: ash::Device,
    pub physical: vk::PhysicalDevice,
    pub name: String,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
}

impl RenderDevice {
    pub fn new(instance: &RenderInstance) -> Result<Self> {
        let (physical, queue_families) = Self::select_physical_device(instance)?;

        let name = device_name(&instance.instance, physical);
        log::info!("Selected device: {}", name);

        let graphics_queue_family = queue_families
            .graphics
            .ok_or_eyre("Selected device has no graphics queue family")?;
        let present_queue_family = queue_families
            .present
            .ok_or_eyre("Selected device has no present queue family")?;

        let logical = Self::create_logical_device(
            &instance.instance,
            physical,
            &queue_families,
        )?;

        let (graphics_queue, present_queue) = unsafe {
            (
                logical.get_device_queue(graphics_queue_family, 0),
                logical.get_device_queue(present_queue_family, 0),
            )
        };

        Ok(Self {
            logical,
            physical,
            name,
            graphics_queue,
            present_queue,
            graphics_queue_family,
            present_queue_family,
        })
    }

    pub fn required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }

    fn select_physical_device(
        instance: &RenderInstance,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe {
            instance.instance.enumerate_physical_devices()?
        };
        if devices.is_empty() {
            return Err(eyre!("Failed to find GPUs with Vulkan support"));
        }

        log::info!("Physical devices:");
        for device in &devices {
            log::info!("\t{}", device_name(&instance.instance, *device));
        }

        let required_extensions = Self::required_device_extensions();
        let probe = negotiation::pick_device(
            devices
                .into_iter()
                .map(|physical| PhysicalDeviceProbe { instance, physical }),
            &required_extensions,
        )
            .ok_or_eyre("Failed to find a suitable GPU")?;

        Ok((probe.physical, probe.queue_families()))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities: &[f32] = &[1.0];
        let queue_create_infos = queue_families
            .unique_families()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        Ok(unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        })
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle: {}", err);
            }
            self.logical.destroy_device(None);
        }
    }
}

/// Answers capability queries for one physical device against the instance's surface.
/// Failed driver queries count as the capability being absent.
struct PhysicalDeviceProbe<'a> {
    instance: &'a RenderInstance,
    physical: vk::PhysicalDevice,
}

impl PhysicalDeviceProbe<'_> {
    fn queue_families(&self) -> QueueFamilyIndices {
        negotiation::select_queue_families(
            &self.queue_family_flags(),
            |i| self.supports_present(i),
        )
    }
}

impl DeviceProbe for PhysicalDeviceProbe<'_> {
    fn queue_family_flags(&self) -> Vec<vk::QueueFlags> {
        let properties = unsafe {
            self.instance
                .instance
                .get_physical_device_queue_family_properties(self.physical)
        };
        properties
            .iter()
            .map(|props| props.queue_flags)
            .collect()
    }

    fn supports_present(&self, queue_family_index: u32) -> bool {
        let supported = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_support(
                    self.physical,
                    queue_family_index,
                    self.instance.surface,
                )
        };
        supported.unwrap_or_else(|err| {
            log::warn!("Surface support query failed for queue family {}: {}", queue_family_index, err);
            false
        })
    }

    fn extension_names(&self) -> Vec<CString> {
        let properties = unsafe {
            self.instance
                .instance
                .enumerate_device_extension_properties(self.physical)
        }
            .unwrap_or_else(|err| {
                log::warn!("Device extension query failed: {}", err);
                Vec::new()
            });

        let names = properties
            .iter()
            .filter_map(|props| props.extension_name_as_c_str().ok())
            .map(CStr::to_owned)
            .collect::<Vec<_>>();
        log::debug!(
            "{} extensions: {:?}",
            device_name(&self.instance.instance, self.physical),
            names
        );
        names
    }

    fn swapchain_support(&self) -> SwapchainSupport {
        self.instance
            .swapchain_support(self.physical)
            .unwrap_or_else(|err| {
                log::warn!("Swapchain support query failed: {}", err);
                SwapchainSupport::default()
            })
    }
}

fn device_name(instance: &ash::Instance, physical: vk::PhysicalDevice) -> String {
    let properties = unsafe {
        instance.get_physical_device_properties(physical)
    };
    properties
        .device_name_as_c_str()
        .map_or_else(|_| "<unnamed device>".to_owned(), |name| name.to_string_lossy().into_owned())
}

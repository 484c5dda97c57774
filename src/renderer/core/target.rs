use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;

use crate::renderer::config::RenderConfig;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::negotiation;

/// Presentation target of the renderer, encapsulating the window and swapchain
pub struct RenderTarget {
    pub window: Arc<Window>,

    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,

    device: ash::Device,
}

/// Swapchain parameters decided from the surface's reported capabilities
struct SwapchainSettings {
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    image_count: u32,
    pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        instance: &RenderInstance,
        device: &RenderDevice,
        config: &RenderConfig,
    ) -> Result<Self> {
        let settings = Self::negotiate(&window, instance, device, config)?;

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &instance.instance, &device.logical);
        let swapchain = Self::create_swapchain(
            &swapchain_loader,
            instance.surface,
            device,
            &settings,
        )?;

        let mut tgt = Self {
            window,
            surface_format: settings.surface_format,
            present_mode: settings.present_mode,
            extent: settings.extent,
            swapchain,
            swapchain_loader,
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            device: device.logical.clone(),
        };

        tgt.swapchain_images = unsafe {
            tgt.swapchain_loader.get_swapchain_images(tgt.swapchain)?
        };
        for image in &tgt.swapchain_images {
            let view = create_image_view(&tgt.device, *image, tgt.surface_format.format)?;
            tgt.swapchain_image_views.push(view);
        }
        log::info!("Created {} swapchain images", tgt.swapchain_images.len());

        Ok(tgt)
    }

    fn negotiate(
        window: &Window,
        instance: &RenderInstance,
        device: &RenderDevice,
        config: &RenderConfig,
    ) -> Result<SwapchainSettings> {
        let support = instance.swapchain_support(device.physical)?;

        let surface_format = negotiation::choose_surface_format(&support.formats)
            .ok_or_eyre("Surface reports no formats")?;

        let present_mode = if config.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            negotiation::choose_present_mode(&support.present_modes)
        };

        let window_size = window.inner_size();
        let extent = negotiation::choose_extent(
            &support.capabilities,
            vk::Extent2D {
                width: window_size.width,
                height: window_size.height,
            },
        );

        let image_count = negotiation::choose_image_count(&support.capabilities);

        let pre_transform = if support.capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            support.capabilities.current_transform
        };

        log::info!(
            "Swapchain: {:?} {:?}, {:?}, {}x{}, {} images",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count,
        );

        Ok(SwapchainSettings {
            surface_format,
            present_mode,
            extent,
            image_count,
            pre_transform,
        })
    }

    fn create_swapchain(
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        device: &RenderDevice,
        settings: &SwapchainSettings,
    ) -> Result<vk::SwapchainKHR> {
        let queue_family_indices = [device.graphics_queue_family, device.present_queue_family];

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .image_array_layers(1);

        // Images are shared between both families unless one family does both jobs
        let swapchain_info = if device.graphics_queue_family != device.present_queue_family {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        Ok(unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        })
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> VkResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image(image);
    unsafe {
        device.create_image_view(&view_info, None)
    }
}

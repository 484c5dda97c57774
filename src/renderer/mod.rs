pub mod config;
pub mod core;
pub mod negotiation;

use color_eyre::Result;
use std::sync::Arc;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::target::RenderTarget;

pub struct Renderer {
    // Fields drop in declaration order: swapchain, then device, then instance
    pub target: RenderTarget,
    pub device: RenderDevice,
    pub instance: RenderInstance,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(&window, config)?;
        log::info!(
            "Vulkan instance created (validation {})",
            if instance.validation_enabled { "on" } else { "off" }
        );

        let device = RenderDevice::new(&instance)?;
        let target = RenderTarget::new(window, &instance, &device, config)?;

        Ok(Self {
            target,
            device,
            instance,
        })
    }
}

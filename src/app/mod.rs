use super::renderer::Renderer;
use color_eyre::eyre::Report;
use color_eyre::Result;
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::renderer::config::RenderConfig;

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,

    // State
    error: Option<Report>,
    close_requested: bool,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            error: None,
            close_requested: false,
        }
    }

    /// Runs the event loop until the window closes. A failed bring-up stops the
    /// loop and is returned here.
    pub fn run(&mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(self)?;

        // Tear down Vulkan objects before the window goes away
        self.renderer = None;
        self.window = None;

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = match self.window.as_ref() {
            Some(window) => window.clone(),
            None => {
                let attributes = Window::default_attributes()
                    .with_title(self.config.window_title.as_str())
                    .with_inner_size(LogicalSize::new(self.config.width, self.config.height))
                    .with_resizable(false);
                let window = Arc::new(event_loop.create_window(attributes)?);
                self.window = Some(window.clone());
                window
            }
        };

        if self.renderer.is_none() {
            self.renderer = Some(Renderer::new(window, &self.config)?);
        }

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.init(event_loop) {
            log::error!("Initialization failed: {}", err);
            self.error = Some(err);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
        }
    }
}

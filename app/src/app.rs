//! Window and event loop.
//!
//! [`App`] creates the window on the first `resumed`, builds a wgpu-backed
//! [`Viewer`] for it and then forwards window events: input is translated
//! and applied between frames, `RedrawRequested` renders one frame and
//! requests the next. Any error ends the loop and is returned from
//! [`App::run`].

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use mapview_core::input::InputEvent;
use mapview_graphics::backend::wgpu_impl::WgpuBackend;
use mapview_graphics::{GraphicsDevice, TextureFormat};

use crate::args::ViewerConfig;
use crate::error::AppError;
use crate::input::{PointerState, map_winit_key, wheel_units};
use crate::viewer::{Viewer, load_scene};

/// The windowed viewer.
pub struct App {
    config: ViewerConfig,
    // Declared before the window: the viewer's surface must go first.
    viewer: Option<Viewer>,
    window: Option<Arc<Window>>,
    pointer: PointerState,
    error: Option<AppError>,
}

impl App {
    /// Create an application for `config`. Nothing is opened until [`run`](Self::run).
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            viewer: None,
            window: None,
            pointer: PointerState::default(),
            error: None,
        }
    }

    /// Open the window and run until it closes, the frame limit is reached
    /// or an error occurs.
    pub fn run(config: ViewerConfig) -> Result<(), AppError> {
        let event_loop = EventLoop::new()?;
        let mut app = Self::new(config);
        event_loop.run_app(&mut app)?;
        app.finish()
    }

    fn finish(mut self) -> Result<(), AppError> {
        let shutdown = match self.viewer.take() {
            Some(viewer) => viewer.shutdown(),
            None => Ok(()),
        };
        match self.error.take() {
            Some(error) => Err(error),
            None => shutdown,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.width,
                self.config.height,
            ));
        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        log::info!("Window created ({}x{})", size.width, size.height);

        let assets = load_scene(&self.config)?;
        let backend = WgpuBackend::with_window(Arc::clone(&window))?;
        let surface_format = backend.preferred_surface_format().unwrap_or_else(|| {
            log::warn!("No preferred 8-bit surface format, using Rgba8Unorm");
            TextureFormat::Rgba8Unorm
        });
        let device = GraphicsDevice::new(Arc::new(backend));
        log::info!("Graphics initialized: {} ({surface_format:?})", device.name());

        let viewer = Viewer::new(
            device,
            &self.config,
            assets,
            surface_format,
            (size.width, size.height),
        )?;
        self.viewer = Some(viewer);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: AppError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn input(&mut self, event: InputEvent) {
        if let Some(viewer) = &mut self.viewer {
            viewer.handle_input(&event);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let Some(viewer) = &mut self.viewer else {
            return Ok(());
        };
        viewer.frame()?;
        if viewer.finished() {
            log::info!(
                "Reached max frames limit ({}), exiting",
                viewer.frames_rendered()
            );
            event_loop.exit();
        } else if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }
        if let Err(error) = self.init(event_loop) {
            self.fail(event_loop, error);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.on_resize_event(size.width, size.height);
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(error) = self.redraw(event_loop) {
                    self.fail(event_loop, error);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && !event.repeat
                    && let PhysicalKey::Code(key) = event.physical_key
                    && let Some(code) = map_winit_key(key)
                {
                    self.input(InputEvent::KeyDown { code });
                }
            }

            WindowEvent::ModifiersChanged(modifiers) => {
                self.pointer.on_modifiers(modifiers.state());
            }

            WindowEvent::MouseInput { state, button, .. } => {
                self.pointer.on_button(button, state);
            }

            WindowEvent::CursorMoved { position, .. } => {
                let event = self.pointer.moved(position.x, position.y);
                self.input(event);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                self.input(InputEvent::MouseWheel {
                    delta: wheel_units(delta),
                });
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = self.viewer.take()
            && let Err(error) = viewer.shutdown()
        {
            log::error!("Shutdown failed: {error}");
            self.error.get_or_insert(error);
        }
    }
}

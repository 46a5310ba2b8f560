//! pathview - compute ray-traced scene viewer.
//!
//! Keys: `R` recompiles and reloads shaders, `Escape` quits.

use anyhow::Result;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use pathview_core::ProjectConfig;
use pathview_platform::{Action, InputState, Window};
use pathview_renderer::{DrawOutcome, Renderer, RendererSettings};

const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 800;
const WINDOW_TITLE: &str = "pathview";

struct App {
    // Dropped before the window it renders into.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
}

impl App {
    fn new() -> Self {
        Self {
            renderer: None,
            window: None,
            input: InputState::new(),
        }
    }

    fn handle_actions(&mut self, event_loop: &ActiveEventLoop) {
        for action in self.input.drain_actions() {
            match action {
                Action::Exit => {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                }
                Action::ReloadShaders => {
                    let Some(renderer) = self.renderer.as_mut() else {
                        continue;
                    };
                    match renderer.reload_shaders() {
                        Ok(outcome) => info!("Shader reload: {:?}", outcome),
                        Err(e) => warn!("Shader reload failed: {}", e),
                    }
                }
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };
        if window.is_minimized() {
            return;
        }

        renderer.update();
        match renderer.draw() {
            Ok(DrawOutcome::Success) => {}
            Ok(DrawOutcome::SwapchainOutOfDate) => info!("Swapchain rebuilt, frame skipped"),
            Err(e) => {
                error!("Stopping after fatal GPU error: {}", e);
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let config = ProjectConfig::load_or_default();
        match Renderer::new(&window, config, RendererSettings::default()) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
                self.handle_actions(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    pathview_core::init_logging();
    info!("Starting pathview");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}

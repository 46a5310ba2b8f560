//! Windowing and input for the pathview viewer.
//!
//! Wraps winit for the window and event loop, and creates the Vulkan surface
//! through raw window handles.

mod input;
mod window;

pub use input::{Action, InputState, KeyCode};
pub use window::{Surface, Window, required_instance_extensions};

pub use winit::event::{ElementState, KeyEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};

//! Keyboard state and the key bindings of the viewer.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Something the user asked the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ReloadShaders,
    Exit,
}

impl Action {
    /// Default binding for `key`, if any.
    pub fn for_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::KeyR => Some(Action::ReloadShaders),
            KeyCode::Escape => Some(Action::Exit),
            _ => None,
        }
    }
}

/// Tracks held keys and the actions triggered since the last drain.
///
/// Holding a key down fires its action once; auto-repeat is ignored.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    pending: Vec<Action>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key)
            && let Some(action) = Action::for_key(key)
        {
            self.pending.push(action);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Returns triggered actions in press order and clears them.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending)
    }
}

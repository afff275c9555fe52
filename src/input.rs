use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::camera3d::FlyInput;

/// Key and mouse state accumulated between frames.
pub struct Input {
    bindings: InputBindings,
    mouse_delta: Vec2,
    held: HashMap<InputAction, bool>,
    look_held: bool,
    vsync_toggle: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads binding overrides from a JSON file, keeping defaults for anything missing.
    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self { bindings, mouse_delta: Vec2::ZERO, held: HashMap::new(), look_held: false, vsync_toggle: false }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => {
                if let Some(binding) = InputKeyBinding::from_event_key(&key) {
                    let actions: Vec<_> = self.bindings.actions_for_key(&binding).collect();
                    for action in actions {
                        self.update_action_state(action, pressed);
                    }
                }
            }
            InputEvent::MouseMove { dx, dy } => {
                self.mouse_delta += Vec2::new(dx, dy);
            }
            InputEvent::MouseButton { button: MouseButton::Right, pressed } => {
                self.look_held = pressed;
            }
            InputEvent::MouseButton { .. } | InputEvent::Other => {}
        }
    }

    fn update_action_state(&mut self, action: InputAction, pressed: bool) {
        match action {
            InputAction::VsyncToggle => {
                if pressed {
                    self.vsync_toggle = true;
                }
            }
            held => {
                self.held.insert(held, pressed);
            }
        }
    }

    fn is_held(&self, action: InputAction) -> bool {
        self.held.get(&action).copied().unwrap_or(false)
    }

    /// Snapshot for the fly camera. Mouse motion counts only while the right button is down.
    pub fn fly_input(&self) -> FlyInput {
        FlyInput {
            forward: self.is_held(InputAction::FlyForward),
            back: self.is_held(InputAction::FlyBackward),
            left: self.is_held(InputAction::FlyLeft),
            right: self.is_held(InputAction::FlyRight),
            up: self.is_held(InputAction::FlyAscend),
            down: self.is_held(InputAction::FlyDescend),
            fast: self.is_held(InputAction::FlyBoost),
            mouse_delta: self.mouse_delta,
            look: self.look_held,
        }
    }

    pub fn take_vsync_toggle(&mut self) -> bool {
        std::mem::take(&mut self.vsync_toggle)
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::with_overrides(config.into_overrides(&path.display().to_string())),
                Err(err) => {
                    log::warn!("failed to parse {}: {err}; using default bindings", path.display());
                    Self::default()
                }
            },
            Err(err) => {
                log::debug!("no input bindings at {} ({err}); using defaults", path.display());
                Self::default()
            }
        }
    }

    fn with_overrides(overrides: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if !keys.is_empty() {
                action_map.insert(action, keys);
            }
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        HashMap::from([
            (FlyForward, vec![InputKeyBinding::character("w")]),
            (FlyBackward, vec![InputKeyBinding::character("s")]),
            (FlyLeft, vec![InputKeyBinding::character("a")]),
            (FlyRight, vec![InputKeyBinding::character("d")]),
            (FlyAscend, vec![InputKeyBinding::character("e"), InputKeyBinding::Named(NamedKeyCode::Space)]),
            (FlyDescend, vec![InputKeyBinding::character("q")]),
            (FlyBoost, vec![InputKeyBinding::Named(NamedKeyCode::Shift)]),
            (VsyncToggle, vec![InputKeyBinding::character("v")]),
        ])
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        (normalized.chars().count() == 1).then_some(Self::Character(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Space,
    Shift,
    Control,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Space => Some(Self::Space),
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::Control => Some(Self::Control),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "ctrl" | "control" | "left_ctrl" | "right_ctrl" => Some(Self::Control),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum InputAction {
    FlyForward,
    FlyBackward,
    FlyLeft,
    FlyRight,
    FlyAscend,
    FlyDescend,
    FlyBoost,
    VsyncToggle,
}

impl InputAction {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "fly_forward" => Some(Self::FlyForward),
            "fly_backward" => Some(Self::FlyBackward),
            "fly_left" => Some(Self::FlyLeft),
            "fly_right" => Some(Self::FlyRight),
            "fly_ascend" => Some(Self::FlyAscend),
            "fly_descend" => Some(Self::FlyDescend),
            "fly_boost" => Some(Self::FlyBoost),
            "vsync_toggle" => Some(Self::VsyncToggle),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = InputAction::from_str(&action_name.trim().to_lowercase()) else {
                log::warn!("{origin}: unknown action '{action_name}', ignoring");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match InputKeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => log::warn!("{origin}: unknown key '{key}' for action '{action_name}', ignoring"),
                }
            }
            if parsed.is_empty() {
                log::warn!("{origin}: action '{action_name}' has no valid keys, keeping defaults");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

pub enum InputEvent {
    Key { key: Key, pressed: bool },
    MouseMove { dx: f32, dy: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }

    pub fn from_device_event(ev: &DeviceEvent) -> Self {
        match ev {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => InputEvent::MouseMove { dx: *dx as f32, dy: *dy as f32 },
            _ => InputEvent::Other,
        }
    }
}

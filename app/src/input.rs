//! Input conversion utilities.
//!
//! Maps winit window events to the viewer's platform-agnostic
//! [`InputEvent`] values. Keys become ASCII codes; pointer moves carry the
//! buttons and control modifier sampled at the time of the move.

use mapview_core::input::{InputEvent, MouseButtons};
use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{self, ModifiersState};

/// Wheel units per notch.
pub const WHEEL_NOTCH: f32 = 120.0;

/// Pixels of touchpad scroll treated as one notch.
const PIXELS_PER_NOTCH: f64 = 40.0;

/// Convert a winit [`keyboard::KeyCode`] to the ASCII code the viewer binds.
///
/// Letters map to upper case, digits from both rows of the keyboard map to
/// `'0'..='9'`.
pub fn map_winit_key(key: keyboard::KeyCode) -> Option<u8> {
    use keyboard::KeyCode as K;
    Some(match key {
        K::KeyA => b'A',
        K::KeyB => b'B',
        K::KeyC => b'C',
        K::KeyD => b'D',
        K::KeyE => b'E',
        K::KeyF => b'F',
        K::KeyG => b'G',
        K::KeyH => b'H',
        K::KeyI => b'I',
        K::KeyJ => b'J',
        K::KeyK => b'K',
        K::KeyL => b'L',
        K::KeyM => b'M',
        K::KeyN => b'N',
        K::KeyO => b'O',
        K::KeyP => b'P',
        K::KeyQ => b'Q',
        K::KeyR => b'R',
        K::KeyS => b'S',
        K::KeyT => b'T',
        K::KeyU => b'U',
        K::KeyV => b'V',
        K::KeyW => b'W',
        K::KeyX => b'X',
        K::KeyY => b'Y',
        K::KeyZ => b'Z',

        K::Digit0 | K::Numpad0 => b'0',
        K::Digit1 | K::Numpad1 => b'1',
        K::Digit2 | K::Numpad2 => b'2',
        K::Digit3 | K::Numpad3 => b'3',
        K::Digit4 | K::Numpad4 => b'4',
        K::Digit5 | K::Numpad5 => b'5',
        K::Digit6 | K::Numpad6 => b'6',
        K::Digit7 | K::Numpad7 => b'7',
        K::Digit8 | K::Numpad8 => b'8',
        K::Digit9 | K::Numpad9 => b'9',

        K::Space => b' ',
        K::Escape => 0x1b,

        _ => return None,
    })
}

/// Convert a wheel delta to signed wheel units, saturating at `i16` bounds.
pub fn wheel_units(delta: MouseScrollDelta) -> i16 {
    let units = match delta {
        MouseScrollDelta::LineDelta(_, y) => f64::from(y * WHEEL_NOTCH),
        MouseScrollDelta::PixelDelta(position) => {
            position.y / PIXELS_PER_NOTCH * f64::from(WHEEL_NOTCH)
        }
    };
    units.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Pointer buttons and modifiers between events.
///
/// winit reports buttons and modifiers as separate events; pointer moves
/// need both, so they are tracked here.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerState {
    buttons: MouseButtons,
    ctrl: bool,
}

impl PointerState {
    /// Record a button press or release.
    pub fn on_button(&mut self, button: MouseButton, state: ElementState) {
        let pressed = state == ElementState::Pressed;
        match button {
            MouseButton::Left => self.buttons.left = pressed,
            MouseButton::Right => self.buttons.right = pressed,
            MouseButton::Middle => self.buttons.middle = pressed,
            _ => {}
        }
    }

    /// Record the current modifier set.
    pub fn on_modifiers(&mut self, modifiers: ModifiersState) {
        self.ctrl = modifiers.control_key();
    }

    /// Buttons currently held.
    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    /// Build the move event for a cursor position.
    pub fn moved(&self, x: f64, y: f64) -> InputEvent {
        InputEvent::MouseMove {
            x: x.round() as i32,
            y: y.round() as i32,
            buttons: self.buttons,
            ctrl: self.ctrl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn test_letter_and_digit_keys() {
        assert_eq!(map_winit_key(keyboard::KeyCode::KeyW), Some(b'W'));
        assert_eq!(map_winit_key(keyboard::KeyCode::Digit3), Some(b'3'));
        assert_eq!(map_winit_key(keyboard::KeyCode::Numpad7), Some(b'7'));
        assert_eq!(map_winit_key(keyboard::KeyCode::F5), None);
    }

    #[test]
    fn test_wheel_units() {
        assert_eq!(wheel_units(MouseScrollDelta::LineDelta(0.0, 1.0)), 120);
        assert_eq!(wheel_units(MouseScrollDelta::LineDelta(0.0, -2.0)), -240);
        assert_eq!(
            wheel_units(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 20.0))),
            60
        );
        assert_eq!(
            wheel_units(MouseScrollDelta::LineDelta(0.0, 1000.0)),
            i16::MAX
        );
    }

    #[test]
    fn test_pointer_tracks_buttons_and_ctrl() {
        let mut pointer = PointerState::default();
        pointer.on_button(MouseButton::Right, ElementState::Pressed);
        pointer.on_modifiers(ModifiersState::CONTROL);
        assert_eq!(
            pointer.moved(10.4, 20.6),
            InputEvent::MouseMove {
                x: 10,
                y: 21,
                buttons: MouseButtons::RIGHT,
                ctrl: true
            }
        );

        pointer.on_button(MouseButton::Right, ElementState::Released);
        pointer.on_modifiers(ModifiersState::empty());
        assert_eq!(pointer.buttons(), MouseButtons::NONE);
    }
}

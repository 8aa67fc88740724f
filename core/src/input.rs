//! Platform-agnostic input events.
//!
//! The windowing layer translates native events into [`InputEvent`] values
//! and hands them to the viewer on the main thread, between frames. Keys are
//! identified by their ASCII code (upper-case letters, digits), which is all
//! the viewer binds.

/// Mouse button state sampled with a pointer move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseButtons {
    /// Left button held.
    pub left: bool,
    /// Right button held.
    pub right: bool,
    /// Middle button held.
    pub middle: bool,
}

impl MouseButtons {
    /// No buttons held.
    pub const NONE: Self = Self {
        left: false,
        right: false,
        middle: false,
    };

    /// Only the left button held.
    pub const LEFT: Self = Self {
        left: true,
        right: false,
        middle: false,
    };

    /// Only the right button held.
    pub const RIGHT: Self = Self {
        left: false,
        right: true,
        middle: false,
    };
}

/// A discrete input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A key went down.
    KeyDown {
        /// ASCII code of the key.
        code: u8,
    },
    /// The pointer moved to an absolute window position.
    MouseMove {
        /// Horizontal position in pixels.
        x: i32,
        /// Vertical position in pixels.
        y: i32,
        /// Buttons held during the move.
        buttons: MouseButtons,
        /// Whether the control modifier is held.
        ctrl: bool,
    },
    /// The wheel turned. One notch is 120 units, positive away from the user.
    MouseWheel {
        /// Signed wheel delta.
        delta: i16,
    },
}

/// Map a key code to a 0-based world index.
///
/// Digits `'1'..='9'` select worlds `0..=8`; only indices below `world_count`
/// are accepted. Everything else yields `None`.
pub fn world_for_key(code: u8, world_count: usize) -> Option<usize> {
    if !(b'1'..=b'9').contains(&code) {
        return None;
    }
    let index = usize::from(code - b'1');
    (index < world_count).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_keys_select_worlds() {
        for (offset, code) in (b'1'..=b'7').enumerate() {
            assert_eq!(world_for_key(code, 7), Some(offset));
        }
    }

    #[test]
    fn test_out_of_range_keys_rejected() {
        assert_eq!(world_for_key(b'0', 7), None);
        assert_eq!(world_for_key(b'8', 7), None);
        assert_eq!(world_for_key(b'9', 7), None);
        assert_eq!(world_for_key(b'A', 7), None);
        assert_eq!(world_for_key(0xFF, 7), None);
    }

    #[test]
    fn test_world_count_limits_selection() {
        assert_eq!(world_for_key(b'3', 2), None);
        assert_eq!(world_for_key(b'2', 2), Some(1));
    }
}

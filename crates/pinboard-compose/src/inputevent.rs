// Imports
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An input event.
///
/// Note that there is no "motion while down" event, because we want the events to be entirely
/// stateless from the producer's point of view. [InputEvent::Motion] is emitted for any pointer
/// movement; whether a gesture is in flight is state that the receiving state machine owns.
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// A mouse button down event.
    Down {
        /// The pointer position in surface coordinates.
        pos: na::Vector2<f64>,
        /// The pressed button.
        button: MouseButton,
        /// Modifier keys pressed during the event.
        modifier_keys: HashSet<ModifierKey>,
    },
    /// A pointer motion event. Emitted regardless of button state.
    Motion {
        /// The pointer position in surface coordinates.
        pos: na::Vector2<f64>,
        /// Modifier keys pressed during the event.
        modifier_keys: HashSet<ModifierKey>,
    },
    /// A mouse button up event.
    Up {
        /// The pointer position in surface coordinates.
        pos: na::Vector2<f64>,
        /// The released button.
        button: MouseButton,
        /// Modifier keys pressed during the event.
        modifier_keys: HashSet<ModifierKey>,
    },
    /// A double click with the primary button.
    DoubleClick {
        /// The pointer position in surface coordinates.
        pos: na::Vector2<f64>,
        /// Modifier keys pressed during the event.
        modifier_keys: HashSet<ModifierKey>,
    },
    /// A scroll wheel event.
    ///
    /// Modifier keys are deliberately absent. Wheel zoom must behave identically with or
    /// without them to avoid fighting OS-level pinch and browser-zoom gestures.
    Wheel {
        /// The pointer position in surface coordinates.
        pos: na::Vector2<f64>,
        /// Positive for scrolling up, negative for down.
        delta_y: f64,
    },
    /// A keyboard key pressed event.
    KeyPressed {
        /// the key
        keyboard_key: KeyboardKey,
        /// Modifier keys pressed during the event.
        modifier_keys: HashSet<ModifierKey>,
    },
    /// Text input event.
    Text {
        /// The committed text.
        text: String,
    },
    /// Cancel event when the pointer vanishes unexpectedly.
    ///
    /// Should finish all current actions and reset all state.
    Cancel,
}

/// A mouse button.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MouseButton {
    /// Primary button.
    Left,
    /// Middle button / wheel press.
    Middle,
    /// Secondary button.
    Right,
}

/// A key on the keyboard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum KeyboardKey {
    /// A Unicode character.
    ///
    /// Expects that control characters are already converted and filtered out with the method
    /// [KeyboardKey::filter_convert_unicode_control_chars].
    Unicode(char),
    /// Backspace.
    BackSpace,
    /// Tab.
    HorizontalTab,
    /// Line feed.
    Linefeed,
    /// Carriage return.
    CarriageReturn,
    /// Escape.
    Escape,
    /// Delete.
    Delete,
    /// Arrow up.
    NavUp,
    /// Arrow down.
    NavDown,
    /// Arrow left.
    NavLeft,
    /// Arrow right.
    NavRight,
    /// Home.
    Home,
    /// End.
    End,
    /// Unsupported Key.
    Unsupported,
}

impl KeyboardKey {
    /// Filter and convert unicode control characters to a fitting variant,
    /// or if unsupported [KeyboardKey::Unsupported].
    pub fn filter_convert_unicode_control_chars(self) -> Self {
        match self {
            key @ Self::Unicode(keychar) => {
                if keychar.is_control() {
                    match keychar as u32 {
                        0x08 => Self::BackSpace,
                        0x09 => Self::HorizontalTab,
                        0x0a => Self::Linefeed,
                        0x0d => Self::CarriageReturn,
                        0x1b => Self::Escape,
                        0x7f => Self::Delete,
                        _ => Self::Unsupported,
                    }
                } else {
                    key
                }
            }
            other => other,
        }
    }
}

/// A modifier key.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename = "modifier_key")]
pub enum ModifierKey {
    /// Shift.
    #[serde(rename = "keyboard_shift")]
    KeyboardShift,
    /// Ctrl.
    #[serde(rename = "keyboard_ctrl")]
    KeyboardCtrl,
    /// Alt.
    #[serde(rename = "keyboard_alt")]
    KeyboardAlt,
}

/// The progress of the gesture that is currently handling input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GestureProgress {
    /// In idle state.
    Idle,
    /// In progress state.
    InProgress,
    /// The gesture is finished.
    Finished,
}

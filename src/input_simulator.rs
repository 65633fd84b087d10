//! Synthetic input events and the portable rdev backend
//!
//! The login replay talks to the OS through [`InputInjector`]. Two backends
//! exist: [`RdevInjector`] here, which works on Windows, macOS and X11, and
//! the XTest injector in [`crate::x11`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rdev::{simulate, Button, EventType, Key};
use tracing::{debug, warn};

use crate::config::InputBackend;
use crate::x11::XTestInjector;
use crate::AutoLoginError;

/// Some platforms drop events that arrive back to back
const EVENT_GAP: Duration = Duration::from_millis(20);

/// One synthetic pointer or keyboard action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Move the pointer to absolute screen coordinates
    MoveTo { x: i32, y: i32 },
    /// Left button press and release at the current position
    Click,
    /// Ctrl+A (Cmd+A on macOS)
    SelectAll,
    /// Delete key
    Delete,
    /// Type a single character
    Key(char),
    /// Return key
    Enter,
}

impl InputEvent {
    /// Short name for logs; never includes the typed character
    pub fn kind(&self) -> &'static str {
        match self {
            InputEvent::MoveTo { .. } => "move",
            InputEvent::Click => "click",
            InputEvent::SelectAll => "select-all",
            InputEvent::Delete => "delete",
            InputEvent::Key(_) => "key",
            InputEvent::Enter => "enter",
        }
    }
}

/// Injects synthetic input into the current desktop session
pub trait InputInjector: Send + Sync {
    fn inject(&self, event: InputEvent) -> Result<(), AutoLoginError>;
}

/// Create the injector for the configured backend
pub fn create_injector(backend: InputBackend) -> Result<Arc<dyn InputInjector>, AutoLoginError> {
    match backend {
        InputBackend::X11 => Ok(Arc::new(XTestInjector::connect()?)),
        InputBackend::Rdev => Ok(Arc::new(RdevInjector::new())),
    }
}

/// Convert a character to the US-layout key that produces it, and whether
/// Shift has to be held
fn char_to_key(c: char) -> Option<(Key, bool)> {
    let plain = |k| Some((k, false));
    let shifted = |k| Some((k, true));

    if c.is_ascii_alphabetic() {
        let key = letter_key(c.to_ascii_lowercase())?;
        return Some((key, c.is_ascii_uppercase()));
    }

    match c {
        '0' => plain(Key::Num0),
        '1' => plain(Key::Num1),
        '2' => plain(Key::Num2),
        '3' => plain(Key::Num3),
        '4' => plain(Key::Num4),
        '5' => plain(Key::Num5),
        '6' => plain(Key::Num6),
        '7' => plain(Key::Num7),
        '8' => plain(Key::Num8),
        '9' => plain(Key::Num9),
        ')' => shifted(Key::Num0),
        '!' => shifted(Key::Num1),
        '@' => shifted(Key::Num2),
        '#' => shifted(Key::Num3),
        '$' => shifted(Key::Num4),
        '%' => shifted(Key::Num5),
        '^' => shifted(Key::Num6),
        '&' => shifted(Key::Num7),
        '*' => shifted(Key::Num8),
        '(' => shifted(Key::Num9),
        ' ' => plain(Key::Space),
        '-' => plain(Key::Minus),
        '_' => shifted(Key::Minus),
        '=' => plain(Key::Equal),
        '+' => shifted(Key::Equal),
        '[' => plain(Key::LeftBracket),
        '{' => shifted(Key::LeftBracket),
        ']' => plain(Key::RightBracket),
        '}' => shifted(Key::RightBracket),
        '\\' => plain(Key::BackSlash),
        '|' => shifted(Key::BackSlash),
        ';' => plain(Key::SemiColon),
        ':' => shifted(Key::SemiColon),
        '\'' => plain(Key::Quote),
        '"' => shifted(Key::Quote),
        ',' => plain(Key::Comma),
        '<' => shifted(Key::Comma),
        '.' => plain(Key::Dot),
        '>' => shifted(Key::Dot),
        '/' => plain(Key::Slash),
        '?' => shifted(Key::Slash),
        '`' => plain(Key::BackQuote),
        '~' => shifted(Key::BackQuote),
        _ => None,
    }
}

fn letter_key(c: char) -> Option<Key> {
    const LETTERS: [Key; 26] = [
        Key::KeyA, Key::KeyB, Key::KeyC, Key::KeyD, Key::KeyE, Key::KeyF, Key::KeyG,
        Key::KeyH, Key::KeyI, Key::KeyJ, Key::KeyK, Key::KeyL, Key::KeyM, Key::KeyN,
        Key::KeyO, Key::KeyP, Key::KeyQ, Key::KeyR, Key::KeyS, Key::KeyT, Key::KeyU,
        Key::KeyV, Key::KeyW, Key::KeyX, Key::KeyY, Key::KeyZ,
    ];
    let index = (c as u32).checked_sub('a' as u32)? as usize;
    LETTERS.get(index).copied()
}

fn select_all_modifier() -> Key {
    if cfg!(target_os = "macos") {
        Key::MetaLeft
    } else {
        Key::ControlLeft
    }
}

/// Input injector built on `rdev::simulate`
#[derive(Debug, Default)]
pub struct RdevInjector;

impl RdevInjector {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, event: &EventType) -> Result<(), AutoLoginError> {
        simulate(event)
            .map_err(|e| AutoLoginError::Injection(format!("OS refused event: {:?}", e)))?;
        thread::sleep(EVENT_GAP);
        Ok(())
    }

    fn tap(&self, key: Key) -> Result<(), AutoLoginError> {
        self.send(&EventType::KeyPress(key))?;
        self.send(&EventType::KeyRelease(key))
    }

    /// Tap `key` while `modifier` is held; the modifier is always released
    fn chord(&self, modifier: Key, key: Key) -> Result<(), AutoLoginError> {
        self.send(&EventType::KeyPress(modifier))?;
        let result = self.tap(key);
        if let Err(e) = self.send(&EventType::KeyRelease(modifier)) {
            warn!("Failed to release {:?}: {}", modifier, e);
        }
        result
    }
}

impl InputInjector for RdevInjector {
    fn inject(&self, event: InputEvent) -> Result<(), AutoLoginError> {
        debug!("Injecting {} via rdev", event.kind());
        match event {
            InputEvent::MoveTo { x, y } => self.send(&EventType::MouseMove {
                x: f64::from(x),
                y: f64::from(y),
            }),
            InputEvent::Click => {
                self.send(&EventType::ButtonPress(Button::Left))?;
                self.send(&EventType::ButtonRelease(Button::Left))
            }
            InputEvent::SelectAll => self.chord(select_all_modifier(), Key::KeyA),
            InputEvent::Delete => self.tap(Key::Delete),
            InputEvent::Enter => self.tap(Key::Return),
            InputEvent::Key(c) => {
                let (key, shift) = char_to_key(c).ok_or_else(|| {
                    AutoLoginError::Injection("character has no key on US layout".to_string())
                })?;
                if shift {
                    self.chord(Key::ShiftLeft, key)
                } else {
                    self.tap(key)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_map_with_shift_for_uppercase() {
        assert_eq!(char_to_key('j'), Some((Key::KeyJ, false)));
        assert_eq!(char_to_key('J'), Some((Key::KeyJ, true)));
        assert_eq!(char_to_key('z'), Some((Key::KeyZ, false)));
    }

    #[test]
    fn digits_and_symbols_share_keys() {
        assert_eq!(char_to_key('1'), Some((Key::Num1, false)));
        assert_eq!(char_to_key('!'), Some((Key::Num1, true)));
        assert_eq!(char_to_key('_'), Some((Key::Minus, true)));
        assert_eq!(char_to_key('"'), Some((Key::Quote, true)));
    }

    #[test]
    fn unmapped_characters_are_rejected() {
        assert_eq!(char_to_key('é'), None);
        assert_eq!(char_to_key('\n'), None);
    }
}

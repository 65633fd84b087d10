//! X11 backend: XTest fake input and pointer queries
//!
//! Works for native X11 sessions and XWayland windows (Wine/Proton games
//! included). Events are sent with the XTest extension so the target sees
//! them as hardware input.

use std::collections::HashMap;

use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::cookie::VoidCookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{self, ConnectionExt as _, Keycode, Window};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

use crate::input_simulator::{InputEvent, InputInjector};
use crate::pointer::PointerSource;
use crate::AutoLoginError;

const XK_RETURN: u32 = 0xff0d;
const XK_DELETE: u32 = 0xffff;
const XK_SHIFT_L: u32 = 0xffe1;
const XK_CONTROL_L: u32 = 0xffe3;
const XK_A_LOWER: u32 = 0x61;

/// Left mouse button
const BUTTON_LEFT: u8 = 1;

/// Keysym for a character: Latin-1 maps directly, everything else uses the
/// Unicode keysym range
fn char_to_keysym(c: char) -> u32 {
    let cp = c as u32;
    match cp {
        0x20..=0x7e | 0xa0..=0xff => cp,
        _ => 0x0100_0000 | cp,
    }
}

/// Keysym to tap and modifier keysym to hold for a keyboard event
fn key_chord(event: InputEvent) -> Option<(u32, Option<u32>)> {
    match event {
        // Ctrl+A under every X server, XQuartz included
        InputEvent::SelectAll => Some((XK_A_LOWER, Some(XK_CONTROL_L))),
        InputEvent::Delete => Some((XK_DELETE, None)),
        InputEvent::Enter => Some((XK_RETURN, None)),
        InputEvent::Key(c) => Some((char_to_keysym(c), None)),
        InputEvent::MoveTo { .. } | InputEvent::Click => None,
    }
}

/// Clamp a screen coordinate into the protocol's 16-bit range
fn to_i16(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn display_error(e: impl std::fmt::Display) -> AutoLoginError {
    AutoLoginError::Display(format!("Failed to connect to X11: {}", e))
}

/// Connection to the X server plus the root window of the default screen
struct X11Display {
    conn: RustConnection,
    root: Window,
}

impl X11Display {
    fn connect() -> Result<Self, AutoLoginError> {
        let (conn, screen_num) = x11rb::connect(None).map_err(display_error)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| display_error(format!("no screen {}", screen_num)))?;
        Ok(Self { conn, root })
    }
}

/// Keysym → (keycode, needs shift), built from the server's keyboard mapping
#[derive(Debug, Default)]
struct Keymap {
    codes: HashMap<u32, (Keycode, bool)>,
}

impl Keymap {
    /// Build from a flat GetKeyboardMapping reply. Only the first two columns
    /// (unshifted, shifted) are used; the first keycode found wins.
    fn from_mapping(min_keycode: Keycode, per_keycode: usize, keysyms: &[u32]) -> Self {
        let mut codes = HashMap::new();
        if per_keycode == 0 {
            return Self { codes };
        }
        for column in 0..per_keycode.min(2) {
            for (row, syms) in keysyms.chunks(per_keycode).enumerate() {
                let Some(&sym) = syms.get(column) else { continue };
                if sym == 0 {
                    continue;
                }
                let Ok(offset) = u8::try_from(row) else { break };
                let code = min_keycode.saturating_add(offset);
                codes.entry(sym).or_insert((code, column == 1));
            }
        }
        Self { codes }
    }

    fn lookup(&self, keysym: u32) -> Option<(Keycode, bool)> {
        self.codes.get(&keysym).copied()
    }
}

/// Input injector using the XTest extension
pub struct XTestInjector {
    display: X11Display,
    keymap: Keymap,
}

impl XTestInjector {
    /// Connect to the display named by `DISPLAY` and load its keyboard mapping
    pub fn connect() -> Result<Self, AutoLoginError> {
        let display = X11Display::connect()?;
        let conn = &display.conn;

        let version = conn
            .xtest_get_version(2, 2)
            .map_err(display_error)?
            .reply()
            .map_err(|e| display_error(format!("XTest extension unavailable: {}", e)))?;
        debug!(
            "XTest {}.{} available",
            version.major_version, version.minor_version
        );

        let setup = conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let mapping = conn
            .get_keyboard_mapping(min, max.saturating_sub(min).saturating_add(1))
            .map_err(display_error)?
            .reply()
            .map_err(display_error)?;
        let keymap = Keymap::from_mapping(
            min,
            usize::from(mapping.keysyms_per_keycode),
            &mapping.keysyms,
        );

        info!("Connected to X11 for input injection");
        Ok(Self { display, keymap })
    }

    fn keycode(&self, keysym: u32) -> Result<(Keycode, bool), AutoLoginError> {
        self.keymap.lookup(keysym).ok_or_else(|| {
            // The keysym may come from a password; keep it out of the message
            AutoLoginError::Injection("keysym missing from keyboard mapping".to_string())
        })
    }

    /// Send one fake event and wait for the server to accept it
    fn fake(&self, type_: u8, detail: u8, x: i16, y: i16) -> Result<(), AutoLoginError> {
        let cookie: VoidCookie<'_, RustConnection> = self
            .display
            .conn
            .xtest_fake_input(type_, detail, x11rb::CURRENT_TIME, self.display.root, x, y, 0)
            .map_err(|e: ConnectionError| AutoLoginError::Injection(e.to_string()))?;
        cookie
            .check()
            .map_err(|e: ReplyError| AutoLoginError::Injection(e.to_string()))
    }

    fn key_down(&self, code: Keycode) -> Result<(), AutoLoginError> {
        self.fake(xproto::KEY_PRESS_EVENT, code, 0, 0)
    }

    fn key_up(&self, code: Keycode) -> Result<(), AutoLoginError> {
        self.fake(xproto::KEY_RELEASE_EVENT, code, 0, 0)
    }

    /// Tap `code`, holding `modifier` if given; the modifier is always released
    fn tap(&self, code: Keycode, modifier: Option<Keycode>) -> Result<(), AutoLoginError> {
        if let Some(m) = modifier {
            self.key_down(m)?;
        }
        let result = self.key_down(code).and_then(|_| self.key_up(code));
        if let Some(m) = modifier {
            self.key_up(m)?;
        }
        result
    }

    /// Tap `keysym` holding `modifier`, or Shift when the keymap needs it
    fn tap_keysym(&self, keysym: u32, modifier: Option<u32>) -> Result<(), AutoLoginError> {
        let (code, shift) = self.keycode(keysym)?;
        let modifier = match (modifier, shift) {
            (Some(held), _) => Some(self.keycode(held)?.0),
            (None, true) => Some(self.keycode(XK_SHIFT_L)?.0),
            (None, false) => None,
        };
        self.tap(code, modifier)
    }
}

impl InputInjector for XTestInjector {
    fn inject(&self, event: InputEvent) -> Result<(), AutoLoginError> {
        debug!("Injecting {} via XTest", event.kind());
        match event {
            InputEvent::MoveTo { x, y } => {
                self.fake(xproto::MOTION_NOTIFY_EVENT, 0, to_i16(x), to_i16(y))
            }
            InputEvent::Click => {
                self.fake(xproto::BUTTON_PRESS_EVENT, BUTTON_LEFT, 0, 0)?;
                self.fake(xproto::BUTTON_RELEASE_EVENT, BUTTON_LEFT, 0, 0)
            }
            key => match key_chord(key) {
                Some((keysym, modifier)) => self.tap_keysym(keysym, modifier),
                None => Ok(()),
            },
        }
    }
}

/// Pointer position read with QueryPointer on the root window
pub struct X11PointerSource {
    display: X11Display,
}

impl X11PointerSource {
    pub fn connect() -> Result<Self, AutoLoginError> {
        Ok(Self {
            display: X11Display::connect()?,
        })
    }
}

impl PointerSource for X11PointerSource {
    fn cursor_position(&self) -> Result<(i32, i32), AutoLoginError> {
        let reply = self
            .display
            .conn
            .query_pointer(self.display.root)
            .map_err(|e| AutoLoginError::PointerQuery(e.to_string()))?
            .reply()
            .map_err(|e| AutoLoginError::PointerQuery(e.to_string()))?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_characters_use_their_code_point() {
        assert_eq!(char_to_keysym('j'), 0x6a);
        assert_eq!(char_to_keysym('J'), 0x4a);
        assert_eq!(char_to_keysym('1'), 0x31);
        assert_eq!(char_to_keysym('é'), 0xe9);
    }

    #[test]
    fn other_characters_use_unicode_keysyms() {
        assert_eq!(char_to_keysym('ł'), 0x0100_0142);
        assert_eq!(char_to_keysym('€'), 0x0100_20ac);
    }

    #[test]
    fn select_all_is_control_a_on_every_platform() {
        assert_eq!(
            key_chord(InputEvent::SelectAll),
            Some((XK_A_LOWER, Some(XK_CONTROL_L)))
        );
        assert_eq!(key_chord(InputEvent::Enter), Some((XK_RETURN, None)));
        assert_eq!(key_chord(InputEvent::Key('J')), Some((0x4a, None)));
        assert_eq!(key_chord(InputEvent::Click), None);
    }

    #[test]
    fn coordinates_clamp_to_protocol_range() {
        assert_eq!(to_i16(100), 100);
        assert_eq!(to_i16(-40_000), i16::MIN);
        assert_eq!(to_i16(70_000), i16::MAX);
    }

    #[test]
    fn keymap_prefers_unshifted_column() {
        // keycode 10: [a, A], keycode 11: [1, exclam], keycode 12: [A, NoSymbol]
        let keysyms = [0x61, 0x41, 0x31, 0x21, 0x41, 0];
        let keymap = Keymap::from_mapping(10, 2, &keysyms);
        assert_eq!(keymap.lookup(0x61), Some((10, false)));
        assert_eq!(keymap.lookup(0x41), Some((12, false)));
        assert_eq!(keymap.lookup(0x21), Some((11, true)));
        assert_eq!(keymap.lookup(0x7a), None);
    }

    #[test]
    fn keymap_ignores_columns_past_shift() {
        let keysyms = [0x61, 0x41, 0xe6, 0xc6];
        let keymap = Keymap::from_mapping(8, 4, &keysyms);
        assert_eq!(keymap.lookup(0xe6), None);
        assert_eq!(keymap.lookup(0x41), Some((8, true)));
    }
}

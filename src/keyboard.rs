//! Key press decoding
//!
//! Turns a KeyPress record into a control character, a printable ASCII
//! character, or nothing. The keysym table is fetched once per [`Keyboard`].

use anyhow::Result;
use std::fmt;
use tracing::debug;
use x11rb::protocol::xproto::KeyPressEvent;

use crate::session::Session;

const NO_SYMBOL: u32 = 0;

const SHIFT: u16 = 1 << 0;
const CONTROL: u16 = 1 << 2;

/// Keycode to keysym table, as returned by GetKeyboardMapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySymbols {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeySymbols {
    pub fn new(min_keycode: u8, keysyms_per_keycode: u8, keysyms: Vec<u32>) -> Self {
        Self {
            min_keycode,
            keysyms_per_keycode,
            keysyms,
        }
    }

    pub fn max_keycode(&self) -> u8 {
        let per = self.keysyms_per_keycode.max(1) as usize;
        let rows = self.keysyms.len() / per;
        (self.min_keycode as usize + rows.saturating_sub(1)).min(u8::MAX as usize) as u8
    }

    /// Keysym in `column` for `keycode`.
    ///
    /// Columns 0-3 follow the core protocol's group rules: a lone alphabetic
    /// keysym yields its lower case in even columns and its upper case in
    /// odd ones.
    pub fn lookup(&self, keycode: u8, column: usize) -> u32 {
        let mut per = self.keysyms_per_keycode as usize;
        if per == 0
            || (column >= per && column > 3)
            || keycode < self.min_keycode
            || keycode > self.max_keycode()
        {
            return NO_SYMBOL;
        }

        let start = (keycode - self.min_keycode) as usize * per;
        let Some(syms) = self.keysyms.get(start..start + per) else {
            return NO_SYMBOL;
        };

        let mut column = column;
        if column < 4 {
            if column > 1 {
                while per > 2 && syms[per - 1] == NO_SYMBOL {
                    per -= 1;
                }
                if per < 3 {
                    column -= 2;
                }
            }
            if per <= (column | 1) || syms[column | 1] == NO_SYMBOL {
                let (lower, upper) = convert_case(syms[column & !1]);
                return if column & 1 == 0 {
                    lower
                } else if upper == lower {
                    NO_SYMBOL
                } else {
                    upper
                };
            }
        }
        syms.get(column).copied().unwrap_or(NO_SYMBOL)
    }
}

/// Lower and upper case of a Latin-1 keysym; others are returned unchanged.
fn convert_case(keysym: u32) -> (u32, u32) {
    match keysym {
        0x41..=0x5a | 0xc0..=0xd6 | 0xd8..=0xde => (keysym + 0x20, keysym),
        0x61..=0x7a | 0xe0..=0xf6 | 0xf8..=0xfe => (keysym, keysym - 0x20),
        _ => (keysym, keysym),
    }
}

/// Shift, Control, Caps/Shift lock, Meta, Alt, Super, Hyper, the ISO lock and
/// level keys, Mode_switch and Num_Lock.
pub fn is_modifier_key(keysym: u32) -> bool {
    matches!(keysym, 0xffe1..=0xffee | 0xfe01..=0xfe13 | 0xff7e | 0xff7f)
}

/// A control character and its mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCode {
    pub code: u8,
    pub name: &'static str,
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{:#04x} {}", self.code, self.name)
    }
}

const fn control(code: u8, name: &'static str) -> Option<ControlCode> {
    Some(ControlCode { code, name })
}

/// Caret notation: `^@ ^A..^Z ^[ ^\ ^] ^^ ^_ ^?`, plus the digit row aliases
/// `^2`..`^8` most terminals accept. Letters match either case.
pub fn control_code(keysym: u32) -> Option<ControlCode> {
    let Ok(byte) = u8::try_from(keysym) else {
        return None;
    };
    match byte.to_ascii_uppercase() {
        b'@' | b'2' => control(0x00, "null"),
        b'A' => control(0x01, "start-of-heading"),
        b'B' => control(0x02, "start-of-text"),
        b'C' => control(0x03, "end-of-text"),
        b'D' => control(0x04, "end-of-transmission"),
        b'E' => control(0x05, "enquiry"),
        b'F' => control(0x06, "acknowledgement"),
        b'G' => control(0x07, "bell"),
        b'H' => control(0x08, "backspace"),
        b'I' => control(0x09, "horizontal-tab"),
        b'J' => control(0x0a, "line-feed"),
        b'K' => control(0x0b, "vertical-tab"),
        b'L' => control(0x0c, "form-feed"),
        b'M' => control(0x0d, "carriage-return"),
        b'N' => control(0x0e, "shift-out"),
        b'O' => control(0x0f, "shift-in"),
        b'P' => control(0x10, "data-link-escape"),
        b'Q' => control(0x11, "device-control-1"),
        b'R' => control(0x12, "device-control-2"),
        b'S' => control(0x13, "device-control-3"),
        b'T' => control(0x14, "device-control-4"),
        b'U' => control(0x15, "negative-acknowledgement"),
        b'V' => control(0x16, "synchronous-idle"),
        b'W' => control(0x17, "end-of-transmission-block"),
        b'X' => control(0x18, "cancel"),
        b'Y' => control(0x19, "end-of-medium"),
        b'Z' => control(0x1a, "substitute"),
        b'[' | b'3' => control(0x1b, "escape"),
        b'\\' | b'4' => control(0x1c, "file-separator"),
        b']' | b'5' => control(0x1d, "group-separator"),
        b'^' | b'6' => control(0x1e, "record-separator"),
        b'_' | b'7' => control(0x1f, "unit-separator"),
        b'?' | b'8' => control(0x7f, "delete"),
        _ => None,
    }
}

/// What a key press decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    /// Modifier keys, unmapped keys and keysyms outside ASCII.
    Ignored,
    Control(ControlCode),
    Printable(char),
}

impl Keystroke {
    /// Whether the press produced a printable character.
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Printable(_))
    }
}

/// Key press decoder with its own keysym table.
#[derive(Debug)]
pub struct Keyboard {
    symbols: KeySymbols,
}

impl Keyboard {
    /// Fetches the server's keyboard mapping.
    pub fn new(session: &Session) -> Result<Self> {
        let symbols = session.keyboard_mapping()?;
        debug!(
            min_keycode = symbols.min_keycode,
            max_keycode = symbols.max_keycode(),
            per_keycode = symbols.keysyms_per_keycode,
            "keyboard mapping loaded"
        );
        Ok(Self::from_symbols(symbols))
    }

    pub fn from_symbols(symbols: KeySymbols) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &KeySymbols {
        &self.symbols
    }

    pub fn press(&self, event: KeyPressEvent) -> Keystroke {
        let state = u16::from(event.state);
        let column = usize::from(state & !CONTROL);
        let keysym = self.symbols.lookup(event.detail, column);

        if is_modifier_key(keysym) {
            return Keystroke::Ignored;
        }

        if state == CONTROL || state == CONTROL | SHIFT {
            return match control_code(keysym) {
                Some(code) => {
                    debug!(caret = code.code, name = code.name, "keyboard");
                    Keystroke::Control(code)
                }
                None => Keystroke::Ignored,
            };
        }

        if state & CONTROL == 0 && 0x1f < keysym && keysym < 0x7f {
            let ch = char::from(keysym as u8);
            debug!(ascii = %ch, "keyboard");
            return Keystroke::Printable(ch);
        }

        Keystroke::Ignored
    }
}

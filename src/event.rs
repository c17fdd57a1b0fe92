//! Received events
//!
//! An [`Envelope`] holds one raw event buffer from the server until a
//! handler takes it as a concrete x11rb record.

use bitflags::bitflags;
use thiserror::Error;
use x11rb::errors::ParseError;
use x11rb::protocol::xproto::*;
use x11rb::x11_utils::TryParse;

use crate::session::Session;

/// Set by the server on events a client sent with SendEvent.
const SYNTHETIC_BIT: u8 = 0x80;

bitflags! {
    /// Which core event codes a handler takes. Bit `n` is event code `n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventKinds: u64 {
        const KEY_PRESS = 1 << KEY_PRESS_EVENT;
        const KEY_RELEASE = 1 << KEY_RELEASE_EVENT;
        const BUTTON_PRESS = 1 << BUTTON_PRESS_EVENT;
        const BUTTON_RELEASE = 1 << BUTTON_RELEASE_EVENT;
        const MOTION_NOTIFY = 1 << MOTION_NOTIFY_EVENT;
        const ENTER_NOTIFY = 1 << ENTER_NOTIFY_EVENT;
        const LEAVE_NOTIFY = 1 << LEAVE_NOTIFY_EVENT;
        const FOCUS_IN = 1 << FOCUS_IN_EVENT;
        const FOCUS_OUT = 1 << FOCUS_OUT_EVENT;
        const KEYMAP_NOTIFY = 1 << KEYMAP_NOTIFY_EVENT;
        const EXPOSE = 1 << EXPOSE_EVENT;
        const GRAPHICS_EXPOSURE = 1 << GRAPHICS_EXPOSURE_EVENT;
        const NO_EXPOSURE = 1 << NO_EXPOSURE_EVENT;
        const VISIBILITY_NOTIFY = 1 << VISIBILITY_NOTIFY_EVENT;
        const CREATE_NOTIFY = 1 << CREATE_NOTIFY_EVENT;
        const DESTROY_NOTIFY = 1 << DESTROY_NOTIFY_EVENT;
        const UNMAP_NOTIFY = 1 << UNMAP_NOTIFY_EVENT;
        const MAP_NOTIFY = 1 << MAP_NOTIFY_EVENT;
        const MAP_REQUEST = 1 << MAP_REQUEST_EVENT;
        const REPARENT_NOTIFY = 1 << REPARENT_NOTIFY_EVENT;
        const CONFIGURE_NOTIFY = 1 << CONFIGURE_NOTIFY_EVENT;
        const CONFIGURE_REQUEST = 1 << CONFIGURE_REQUEST_EVENT;
        const GRAVITY_NOTIFY = 1 << GRAVITY_NOTIFY_EVENT;
        const RESIZE_REQUEST = 1 << RESIZE_REQUEST_EVENT;
        const CIRCULATE_NOTIFY = 1 << CIRCULATE_NOTIFY_EVENT;
        const CIRCULATE_REQUEST = 1 << CIRCULATE_REQUEST_EVENT;
        const PROPERTY_NOTIFY = 1 << PROPERTY_NOTIFY_EVENT;
        const SELECTION_CLEAR = 1 << SELECTION_CLEAR_EVENT;
        const SELECTION_REQUEST = 1 << SELECTION_REQUEST_EVENT;
        const SELECTION_NOTIFY = 1 << SELECTION_NOTIFY_EVENT;
        const COLORMAP_NOTIFY = 1 << COLORMAP_NOTIFY_EVENT;
        const CLIENT_MESSAGE = 1 << CLIENT_MESSAGE_EVENT;
        const MAPPING_NOTIFY = 1 << MAPPING_NOTIFY_EVENT;
        const GE_GENERIC = 1 << GE_GENERIC_EVENT;
    }
}

impl EventKinds {
    /// The flag for one event code; empty for codes outside 0..64.
    pub const fn of(kind: u8) -> Self {
        if kind < 64 {
            Self::from_bits_retain(1 << kind)
        } else {
            Self::empty()
        }
    }
}

bitflags! {
    /// Event mask selected on a window: which events the server delivers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventInterest: u32 {
        const KEY_PRESS = 1 << 0;
        const KEY_RELEASE = 1 << 1;
        const BUTTON_PRESS = 1 << 2;
        const BUTTON_RELEASE = 1 << 3;
        const ENTER_WINDOW = 1 << 4;
        const LEAVE_WINDOW = 1 << 5;
        const POINTER_MOTION = 1 << 6;
        const POINTER_MOTION_HINT = 1 << 7;
        const BUTTON_1_MOTION = 1 << 8;
        const BUTTON_2_MOTION = 1 << 9;
        const BUTTON_3_MOTION = 1 << 10;
        const BUTTON_4_MOTION = 1 << 11;
        const BUTTON_5_MOTION = 1 << 12;
        const BUTTON_MOTION = 1 << 13;
        const KEYMAP_STATE = 1 << 14;
        const EXPOSURE = 1 << 15;
        const VISIBILITY_CHANGE = 1 << 16;
        const STRUCTURE_NOTIFY = 1 << 17;
        const RESIZE_REDIRECT = 1 << 18;
        const SUBSTRUCTURE_NOTIFY = 1 << 19;
        const SUBSTRUCTURE_REDIRECT = 1 << 20;
        const FOCUS_CHANGE = 1 << 21;
        const PROPERTY_CHANGE = 1 << 22;
        const COLOR_MAP_CHANGE = 1 << 23;
        const OWNER_GRAB_BUTTON = 1 << 24;
    }
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("event already released")]
    Empty,

    #[error("malformed event: {0}")]
    Parse(#[from] ParseError),
}

/// One received event buffer, owned until released.
#[derive(Debug, Default)]
pub struct Envelope {
    buffer: Option<Vec<u8>>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            buffer: Some(bytes),
        }
    }

    /// Blocks for the next event, dropping whatever was held before.
    ///
    /// Returns `false` once the stream has ended.
    pub fn wait(&mut self, session: &Session) -> bool {
        self.buffer = session.wait_for_event();
        self.buffer.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    /// Event code with the synthetic bit cleared.
    pub fn kind(&self) -> Option<u8> {
        self.buffer
            .as_deref()
            .and_then(|b| b.first())
            .map(|t| t & !SYNTHETIC_BIT)
    }

    pub fn is_synthetic(&self) -> bool {
        self.buffer
            .as_deref()
            .and_then(|b| b.first())
            .is_some_and(|t| t & SYNTHETIC_BIT != 0)
    }

    /// Sequence number of the last request the server processed.
    ///
    /// KeymapNotify carries none.
    pub fn sequence(&self) -> Option<u16> {
        if self.kind() == Some(KEYMAP_NOTIFY_EVENT) {
            return None;
        }
        let bytes = self.buffer.as_deref()?;
        Some(u16::from_ne_bytes([*bytes.get(2)?, *bytes.get(3)?]))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.buffer.as_deref()
    }

    /// Takes the buffer out as a concrete record, leaving the envelope empty.
    ///
    /// The caller picks `E` to match [`kind`](Self::kind); that is not checked.
    pub fn release_as<E: TryParse>(&mut self) -> Result<E, EnvelopeError> {
        let bytes = self.buffer.take().ok_or(EnvelopeError::Empty)?;
        let (event, _) = E::try_parse(&bytes)?;
        Ok(event)
    }
}

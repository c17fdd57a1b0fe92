//! Display-server session
//!
//! A [`Session`] owns the one connection of the process. Everything that
//! talks to the server borrows it; it is dropped last.

use anyhow::Result;
use std::io;
use std::ops::Deref;
use thiserror::Error;
use tracing::{debug, warn};
use x11rb::errors::{ConnectError, ConnectionError};

use crate::keyboard::KeySymbols;
use crate::setup::{SetupError, SetupRef};
use crate::x11::X11Transport;

/// Fatal conditions raised while opening a session. None of them is retried.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("socket errors, pipe errors or other stream errors: {0}")]
    Transport(#[source] io::Error),

    #[error("extension not supported")]
    ExtensionUnsupported,

    #[error("memory not available")]
    InsufficientMemory,

    #[error("exceeding request length that server accepts")]
    RequestLengthExceeded,

    #[error("error during parsing display string: {0}")]
    DisplayParse(String),

    #[error("the server does not have a screen matching the display")]
    InvalidScreen,
}

impl From<ConnectError> for SessionError {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::IoError(e) => Self::Transport(e),
            ConnectError::InsufficientMemory => Self::InsufficientMemory,
            ConnectError::DisplayParsingError(e) => Self::DisplayParse(e.to_string()),
            ConnectError::InvalidScreen => Self::InvalidScreen,
            other => Self::Transport(io::Error::other(other)),
        }
    }
}

impl From<ConnectionError> for SessionError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::IoError(e) => Self::Transport(e),
            ConnectionError::UnsupportedExtension => Self::ExtensionUnsupported,
            ConnectionError::InsufficientMemory => Self::InsufficientMemory,
            ConnectionError::MaximumRequestLengthExceeded => Self::RequestLengthExceeded,
            other => Self::Transport(io::Error::other(other)),
        }
    }
}

/// Parameters of a CreateWindow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateWindow {
    pub id: u32,
    pub parent: u32,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub class: u16,
}

/// Byte-oriented connection to a display server.
///
/// Requests are fire-and-forget: they are buffered until [`flush`] and any
/// protocol error they cause arrives later in the event stream. Only
/// [`keyboard_mapping`] waits for a reply.
///
/// [`flush`]: Transport::flush
/// [`keyboard_mapping`]: Transport::keyboard_mapping
pub trait Transport {
    /// Raw setup reply, in wire layout.
    fn setup(&self) -> &[u8];

    fn generate_id(&self) -> Result<u32>;

    fn flush(&self) -> Result<()>;

    /// Blocks for the next event. `None` means the stream has ended.
    fn wait_for_event(&self) -> Option<Vec<u8>>;

    fn create_window(&self, request: &CreateWindow) -> Result<()>;
    fn destroy_window(&self, window: u32) -> Result<()>;
    fn map_window(&self, window: u32) -> Result<()>;
    fn unmap_window(&self, window: u32) -> Result<()>;

    /// `values` must be ordered by ascending bit of `mask`.
    fn configure_window(&self, window: u32, mask: u16, values: &[u32]) -> Result<()>;

    /// `values` must be ordered by ascending bit of `mask`.
    fn change_window_attributes(&self, window: u32, mask: u32, values: &[u32]) -> Result<()>;

    fn keyboard_mapping(&self) -> Result<KeySymbols>;

    fn create_pixmap(&self, depth: u8, pixmap: u32, drawable: u32, width: u16, height: u16)
        -> Result<()>;
    fn free_pixmap(&self, pixmap: u32) -> Result<()>;
    fn create_gc(&self, gc: u32, drawable: u32, foreground: u32) -> Result<()>;
    fn free_gc(&self, gc: u32) -> Result<()>;
    fn fill_rectangle(&self, drawable: u32, gc: u32, width: u16, height: u16) -> Result<()>;
    fn copy_area(&self, src: u32, dst: u32, gc: u32, width: u16, height: u16) -> Result<()>;
}

/// The connection to the display server.
pub struct Session {
    transport: Box<dyn Transport>,
}

impl Session {
    /// Connects to `display`, or to `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>) -> Result<Self, SessionError> {
        let transport = X11Transport::connect(display)?;
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    pub fn setup(&self) -> Result<SetupRef<'_>, SetupError> {
        SetupRef::parse(self.transport.setup())
    }

    /// Pushes buffered requests to the server.
    ///
    /// A broken connection is not reported here; the next wait sees it.
    pub fn flush(&self) {
        if let Err(e) = self.transport.flush() {
            warn!(error = %e, "flush failed");
        }
    }

    pub fn wait_for_event(&self) -> Option<Vec<u8>> {
        self.transport.wait_for_event()
    }
}

impl Deref for Session {
    type Target = dyn Transport;

    fn deref(&self) -> &Self::Target {
        self.transport.as_ref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!("session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_mapping() {
        let err = SessionError::from(ConnectError::InvalidScreen);
        assert!(matches!(err, SessionError::InvalidScreen));

        let err = SessionError::from(ConnectError::InsufficientMemory);
        assert!(matches!(err, SessionError::InsufficientMemory));

        let err = SessionError::from(ConnectError::ZeroIdMask);
        assert!(matches!(err, SessionError::Transport(_)));
    }

    #[test]
    fn test_connection_error_mapping() {
        let err = SessionError::from(ConnectionError::UnsupportedExtension);
        assert!(matches!(err, SessionError::ExtensionUnsupported));

        let err = SessionError::from(ConnectionError::MaximumRequestLengthExceeded);
        assert!(matches!(err, SessionError::RequestLengthExceeded));
        assert!(err.to_string().contains("request length"));

        let io = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        let err = SessionError::from(ConnectionError::IoError(io));
        assert!(matches!(err, SessionError::Transport(_)));
    }
}

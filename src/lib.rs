//! vt10x - X11 window and event layer of the vt10x terminal emulator
//!
//! Opens one session with the X server, owns the terminal's window and
//! routes every incoming event to the handler methods its surface type
//! declares.
//!
//! ```text
//! Session ── Window ── Surface (canvas + keyboard)
//!    │                    │
//!    └── Envelope ── dispatch::execute
//! ```

pub mod canvas;
pub mod config;
pub mod dispatch;
pub mod event;
pub mod keyboard;
pub mod session;
pub mod setup;
#[cfg(any(test, feature = "stub"))]
pub mod stub;
pub mod surface;
pub mod window;
mod x11;

pub use canvas::{Canvas, PixmapCanvas};
pub use dispatch::{execute, Handler};
pub use event::{Envelope, EventInterest, EventKinds};
pub use keyboard::{Keyboard, Keystroke};
pub use session::{Session, SessionError, Transport};
pub use surface::Surface;
pub use window::Window;

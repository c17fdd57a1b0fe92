//! The terminal's drawable window

use anyhow::Result;
use tracing::{debug, trace};
use x11rb::protocol::xproto::{ConfigureNotifyEvent, KeyPressEvent};

use crate::canvas::{Canvas, PixmapCanvas};
use crate::dispatch::Handler;
use crate::event::{EventInterest, EventKinds};
use crate::keyboard::{Keyboard, Keystroke};
use crate::session::Session;
use crate::setup::root_visual;
use crate::window::Window;

/// A window with a canvas bound to it, resized on ConfigureNotify and
/// decoding key presses.
pub struct Surface<'s, C: Canvas<'s> = PixmapCanvas<'s>> {
    // fields drop in order: the canvas goes before the window it draws on
    canvas: C,
    keyboard: Option<Keyboard>,
    window: Window<'s>,
}

impl<'s, C: Canvas<'s>> Surface<'s, C> {
    /// Creates a top-level surface under the first screen's root.
    pub fn new(session: &'s Session) -> Result<Self> {
        Self::create(session, None)
    }

    /// Creates a surface as a child of `parent`.
    pub fn with_parent(session: &'s Session, parent: u32) -> Result<Self> {
        Self::create(session, Some(parent))
    }

    fn create(session: &'s Session, parent: Option<u32>) -> Result<Self> {
        let window = Window::create(session, parent)?;
        let setup = session.setup()?;
        let visual = root_visual(&setup)?;
        let canvas = C::bind(session, window.id(), &visual, 1, 1)?;
        debug!(window = window.id(), "surface instantiated");

        Ok(Self {
            canvas,
            keyboard: None,
            window,
        })
    }

    pub fn window(&self) -> &Window<'s> {
        &self.window
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn resize(&mut self, width: u16, height: u16) -> Result<()> {
        self.canvas.set_size(width, height)
    }

    /// Pushes canvas content, then the session's request buffer.
    pub fn flush(&mut self) -> Result<()> {
        self.canvas.flush()?;
        trace!(window = self.window.id(), "surface flushed");
        self.window.session().flush();
        Ok(())
    }
}

impl<'s, C: Canvas<'s>> Handler for Surface<'s, C> {
    const EVENT_MASK: EventInterest = EventInterest::KEY_PRESS
        .union(EventInterest::EXPOSURE)
        .union(EventInterest::STRUCTURE_NOTIFY);

    const HANDLED: EventKinds = EventKinds::KEY_PRESS.union(EventKinds::CONFIGURE_NOTIFY);

    fn window(&self) -> &Window<'_> {
        &self.window
    }

    fn key_press(&mut self, event: KeyPressEvent) -> Result<()> {
        let keyboard = match self.keyboard.take() {
            Some(keyboard) => keyboard,
            None => Keyboard::new(self.window.session())?,
        };
        let stroke = keyboard.press(event);
        self.keyboard = Some(keyboard);

        if stroke != Keystroke::Ignored {
            trace!(?stroke, "key decoded");
        }
        Ok(())
    }

    fn configure_notify(&mut self, event: ConfigureNotifyEvent) -> Result<()> {
        self.resize(event.width, event.height)
    }
}

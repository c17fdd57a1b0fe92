//! Rendering surfaces bound to a window

use anyhow::Result;
use tracing::{trace, warn};

use crate::session::Session;
use crate::setup::RootVisual;

/// A drawing surface bound to one window. Dropping it releases it.
pub trait Canvas<'s>: Sized {
    fn bind(
        session: &'s Session,
        window: u32,
        visual: &RootVisual<'_>,
        width: u16,
        height: u16,
    ) -> Result<Self>;

    fn set_size(&mut self, width: u16, height: u16) -> Result<()>;

    /// Pushes pending drawing to the window. Does not flush the session.
    fn flush(&mut self) -> Result<()>;
}

const BACKGROUND: u32 = 0x0000_0000;

/// Off-screen pixmap copied onto the window on flush.
pub struct PixmapCanvas<'s> {
    session: &'s Session,
    window: u32,
    depth: u8,
    gc: u32,
    pixmap: Option<u32>,
    width: u16,
    height: u16,
}

impl<'s> PixmapCanvas<'s> {
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn pixmap(&self) -> Option<u32> {
        self.pixmap
    }
}

impl<'s> Canvas<'s> for PixmapCanvas<'s> {
    fn bind(
        session: &'s Session,
        window: u32,
        visual: &RootVisual<'_>,
        width: u16,
        height: u16,
    ) -> Result<Self> {
        let gc = session.generate_id()?;
        session.create_gc(gc, window, BACKGROUND)?;

        let mut canvas = Self {
            session,
            window,
            depth: visual.depth,
            gc,
            pixmap: None,
            width: 0,
            height: 0,
        };
        canvas.set_size(width, height)?;
        trace!(
            window,
            visual = visual.visual.visual_id(),
            depth = visual.depth,
            "canvas bound"
        );
        Ok(canvas)
    }

    fn set_size(&mut self, width: u16, height: u16) -> Result<()> {
        let (width, height) = (width.max(1), height.max(1));
        if self.pixmap.is_some() && (width, height) == (self.width, self.height) {
            return Ok(());
        }

        let pixmap = self.session.generate_id()?;
        self.session
            .create_pixmap(self.depth, pixmap, self.window, width, height)?;

        // owned from here on, so drop frees it whatever fails below
        let old = self.pixmap.replace(pixmap);
        self.width = width;
        self.height = height;

        let filled = self.session.fill_rectangle(pixmap, self.gc, width, height);
        if let Some(old) = old {
            self.session.free_pixmap(old)?;
        }
        filled?;
        trace!(width, height, "canvas resized");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(pixmap) = self.pixmap {
            self.session
                .copy_area(pixmap, self.window, self.gc, self.width, self.height)?;
        }
        Ok(())
    }
}

impl Drop for PixmapCanvas<'_> {
    fn drop(&mut self) {
        if let Some(pixmap) = self.pixmap.take() {
            if let Err(e) = self.session.free_pixmap(pixmap) {
                warn!(pixmap, error = %e, "free pixmap failed");
            }
        }
        if let Err(e) = self.session.free_gc(self.gc) {
            warn!(gc = self.gc, error = %e, "free gc failed");
        }
    }
}

//! X11 transport over x11rb's pure-rust connection

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    BackingStore, ChangeWindowAttributesAux, ConfigureWindowAux, ConnectionExt, CreateGCAux,
    CreateWindowAux, EventMask, Gravity, Rectangle, StackMode, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::x11_utils::Serialize;
use x11rb::COPY_DEPTH_FROM_PARENT;
use x11rb::COPY_FROM_PARENT;

use crate::keyboard::KeySymbols;
use crate::session::{CreateWindow, SessionError, Transport};

pub struct X11Transport {
    conn: RustConnection,
    setup: Vec<u8>,
}

impl X11Transport {
    pub fn connect(display: Option<&str>) -> Result<Self, SessionError> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let setup = conn.setup();
        info!(
            screens = setup.roots.len(),
            preferred = screen_num,
            vendor = %String::from_utf8_lossy(&setup.vendor),
            "connected to X server"
        );
        let setup = setup.serialize();
        Ok(Self { conn, setup })
    }
}

/// Walks the set bits of `mask` from the lowest up, pairing each with the
/// next value.
fn masked_values<'v>(
    mask: u32,
    width: u32,
    values: &'v [u32],
) -> impl Iterator<Item = Result<(u32, u32)>> + 'v {
    let mut values = values.iter();
    (0..width)
        .map(|bit| 1u32 << bit)
        .filter(move |bit| mask & bit != 0)
        .map(move |bit| {
            values
                .next()
                .map(|&value| (bit, value))
                .ok_or_else(|| anyhow!("no value for mask bit {:#x}", bit))
        })
}

fn configure_aux(mask: u16, values: &[u32]) -> Result<ConfigureWindowAux> {
    let mut aux = ConfigureWindowAux::new();
    for entry in masked_values(mask.into(), 7, values) {
        let (bit, value) = entry?;
        aux = match bit {
            0x01 => aux.x(value as i32),
            0x02 => aux.y(value as i32),
            0x04 => aux.width(value),
            0x08 => aux.height(value),
            0x10 => aux.border_width(value),
            0x20 => aux.sibling(value),
            0x40 => aux.stack_mode(StackMode::from(value as u8)),
            _ => unreachable!(),
        };
    }
    Ok(aux)
}

fn attributes_aux(mask: u32, values: &[u32]) -> Result<ChangeWindowAttributesAux> {
    let mut aux = ChangeWindowAttributesAux::new();
    for entry in masked_values(mask, 15, values) {
        let (bit, value) = entry?;
        aux = match bit {
            0x0001 => aux.background_pixmap(value),
            0x0002 => aux.background_pixel(value),
            0x0004 => aux.border_pixmap(value),
            0x0008 => aux.border_pixel(value),
            0x0010 => aux.bit_gravity(Gravity::from(value as u8)),
            0x0020 => aux.win_gravity(Gravity::from(value as u8)),
            0x0040 => aux.backing_store(BackingStore::from(value as u8)),
            0x0080 => aux.backing_planes(value),
            0x0100 => aux.backing_pixel(value),
            0x0200 => aux.override_redirect(value),
            0x0400 => aux.save_under(value),
            0x0800 => aux.event_mask(EventMask::from(value)),
            0x1000 => aux.do_not_propogate_mask(EventMask::from(value)),
            0x2000 => aux.colormap(value),
            0x4000 => aux.cursor(value),
            _ => unreachable!(),
        };
    }
    Ok(aux)
}

impl Transport for X11Transport {
    fn setup(&self) -> &[u8] {
        &self.setup
    }

    fn generate_id(&self) -> Result<u32> {
        Ok(self.conn.generate_id()?)
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }

    fn wait_for_event(&self) -> Option<Vec<u8>> {
        match self.conn.wait_for_raw_event() {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, "event stream ended");
                None
            }
        }
    }

    fn create_window(&self, request: &CreateWindow) -> Result<()> {
        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            request.id,
            request.parent,
            request.x,
            request.y,
            request.width.max(1),
            request.height.max(1),
            request.border_width,
            WindowClass::from(request.class),
            COPY_FROM_PARENT,
            &CreateWindowAux::new(),
        )?;
        Ok(())
    }

    fn destroy_window(&self, window: u32) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn map_window(&self, window: u32) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&self, window: u32) -> Result<()> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn configure_window(&self, window: u32, mask: u16, values: &[u32]) -> Result<()> {
        self.conn
            .configure_window(window, &configure_aux(mask, values)?)?;
        Ok(())
    }

    fn change_window_attributes(&self, window: u32, mask: u32, values: &[u32]) -> Result<()> {
        self.conn
            .change_window_attributes(window, &attributes_aux(mask, values)?)?;
        Ok(())
    }

    fn keyboard_mapping(&self) -> Result<KeySymbols> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)?
            .reply()?;
        Ok(KeySymbols::new(min, reply.keysyms_per_keycode, reply.keysyms))
    }

    fn create_pixmap(
        &self,
        depth: u8,
        pixmap: u32,
        drawable: u32,
        width: u16,
        height: u16,
    ) -> Result<()> {
        self.conn
            .create_pixmap(depth, pixmap, drawable, width, height)?;
        Ok(())
    }

    fn free_pixmap(&self, pixmap: u32) -> Result<()> {
        self.conn.free_pixmap(pixmap)?;
        Ok(())
    }

    fn create_gc(&self, gc: u32, drawable: u32, foreground: u32) -> Result<()> {
        let aux = CreateGCAux::new()
            .foreground(foreground)
            .graphics_exposures(0);
        self.conn.create_gc(gc, drawable, &aux)?;
        Ok(())
    }

    fn free_gc(&self, gc: u32) -> Result<()> {
        self.conn.free_gc(gc)?;
        Ok(())
    }

    fn fill_rectangle(&self, drawable: u32, gc: u32, width: u16, height: u16) -> Result<()> {
        let rect = Rectangle {
            x: 0,
            y: 0,
            width,
            height,
        };
        self.conn.poly_fill_rectangle(drawable, gc, &[rect])?;
        Ok(())
    }

    fn copy_area(&self, src: u32, dst: u32, gc: u32, width: u16, height: u16) -> Result<()> {
        self.conn
            .copy_area(src, dst, gc, 0, 0, 0, 0, width, height)?;
        Ok(())
    }
}

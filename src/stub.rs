//! In-process fake display server
//!
//! Implements [`Transport`] without a socket: the setup reply is built byte
//! by byte, every request is recorded, and events are replayed from a
//! queue. When the queue runs dry the stream ends, like a closed connection.

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use x11rb::protocol::xproto;

use crate::keyboard::KeySymbols;
use crate::session::{CreateWindow, Transport};

const RESOURCE_ID_BASE: u32 = 0x0020_0000;
const RESOURCE_ID_MASK: u32 = 0x001f_ffff;
const MIN_KEYCODE: u8 = 8;
const MAX_KEYCODE: u8 = 255;

#[derive(Debug, Clone)]
pub struct VisualSpec {
    pub id: u32,
    pub class: u8,
}

#[derive(Debug, Clone)]
pub struct DepthSpec {
    pub depth: u8,
    pub visuals: Vec<VisualSpec>,
}

#[derive(Debug, Clone)]
pub struct ScreenSpec {
    pub root: u32,
    pub root_visual: u32,
    pub root_depth: u8,
    pub width: u16,
    pub height: u16,
    pub depths: Vec<DepthSpec>,
}

impl Default for ScreenSpec {
    fn default() -> Self {
        Self {
            root: 0x0000_0100,
            root_visual: 0x21,
            root_depth: 24,
            width: 1280,
            height: 720,
            depths: vec![DepthSpec {
                depth: 24,
                visuals: vec![VisualSpec { id: 0x21, class: 4 }],
            }],
        }
    }
}

/// Builds a setup reply in wire layout, native byte order.
#[derive(Debug, Clone, Default)]
pub struct SetupBuilder {
    vendor: Vec<u8>,
    screens: Vec<ScreenSpec>,
}

impl SetupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vendor(mut self, vendor: &[u8]) -> Self {
        self.vendor = vendor.to_vec();
        self
    }

    pub fn screen(mut self, screen: ScreenSpec) -> Self {
        self.screens.push(screen);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let vendor_pad = (4 - (self.vendor.len() % 4)) % 4;
        let num_formats = 1u8;

        let mut reply = Vec::with_capacity(256);
        reply.push(1); // success
        reply.push(0);
        reply.extend_from_slice(&11u16.to_ne_bytes());
        reply.extend_from_slice(&0u16.to_ne_bytes());
        reply.extend_from_slice(&0u16.to_ne_bytes()); // length, patched below

        reply.extend_from_slice(&0u32.to_ne_bytes()); // release
        reply.extend_from_slice(&RESOURCE_ID_BASE.to_ne_bytes());
        reply.extend_from_slice(&RESOURCE_ID_MASK.to_ne_bytes());
        reply.extend_from_slice(&0u32.to_ne_bytes()); // motion buffer
        reply.extend_from_slice(&(self.vendor.len() as u16).to_ne_bytes());
        reply.extend_from_slice(&0xffffu16.to_ne_bytes());
        reply.push(self.screens.len() as u8);
        reply.push(num_formats);
        reply.push(0); // image byte order
        reply.push(0); // bitmap bit order
        reply.push(32); // scanline unit
        reply.push(32); // scanline pad
        reply.push(MIN_KEYCODE);
        reply.push(MAX_KEYCODE);
        reply.extend_from_slice(&[0u8; 4]);

        reply.extend_from_slice(&self.vendor);
        reply.extend(std::iter::repeat(0).take(vendor_pad));

        // pixmap format: depth 24, 32 bpp, pad 32
        reply.push(24);
        reply.push(32);
        reply.push(32);
        reply.extend_from_slice(&[0u8; 5]);

        for screen in &self.screens {
            reply.extend_from_slice(&screen.root.to_ne_bytes());
            reply.extend_from_slice(&0x20u32.to_ne_bytes()); // colormap
            reply.extend_from_slice(&0x00ff_ffffu32.to_ne_bytes()); // white
            reply.extend_from_slice(&0u32.to_ne_bytes()); // black
            reply.extend_from_slice(&0u32.to_ne_bytes()); // input masks
            reply.extend_from_slice(&screen.width.to_ne_bytes());
            reply.extend_from_slice(&screen.height.to_ne_bytes());
            reply.extend_from_slice(&(screen.width / 4).to_ne_bytes());
            reply.extend_from_slice(&(screen.height / 4).to_ne_bytes());
            reply.extend_from_slice(&1u16.to_ne_bytes());
            reply.extend_from_slice(&1u16.to_ne_bytes());
            reply.extend_from_slice(&screen.root_visual.to_ne_bytes());
            reply.push(0); // backing stores
            reply.push(0); // save unders
            reply.push(screen.root_depth);
            reply.push(screen.depths.len() as u8);

            for depth in &screen.depths {
                reply.push(depth.depth);
                reply.push(0);
                reply.extend_from_slice(&(depth.visuals.len() as u16).to_ne_bytes());
                reply.extend_from_slice(&[0u8; 4]);

                for visual in &depth.visuals {
                    reply.extend_from_slice(&visual.id.to_ne_bytes());
                    reply.push(visual.class);
                    reply.push(8);
                    reply.extend_from_slice(&256u16.to_ne_bytes());
                    reply.extend_from_slice(&0x00ff_0000u32.to_ne_bytes());
                    reply.extend_from_slice(&0x0000_ff00u32.to_ne_bytes());
                    reply.extend_from_slice(&0x0000_00ffu32.to_ne_bytes());
                    reply.extend_from_slice(&[0u8; 4]);
                }
            }
        }

        let additional_words = ((reply.len() - 8) / 4) as u16;
        reply[6..8].copy_from_slice(&additional_words.to_ne_bytes());
        reply
    }
}

/// A request the server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateWindow(CreateWindow),
    DestroyWindow(u32),
    MapWindow(u32),
    UnmapWindow(u32),
    ConfigureWindow { window: u32, mask: u16, values: Vec<u32> },
    ChangeWindowAttributes { window: u32, mask: u32, values: Vec<u32> },
    GetKeyboardMapping,
    CreatePixmap { pixmap: u32, drawable: u32, depth: u8, width: u16, height: u16 },
    FreePixmap(u32),
    CreateGc { gc: u32, drawable: u32, foreground: u32 },
    FreeGc(u32),
    FillRectangle { drawable: u32, gc: u32, width: u16, height: u16 },
    CopyArea { src: u32, dst: u32, gc: u32, width: u16, height: u16 },
    Flush,
}

#[derive(Debug, Default)]
struct State {
    next_id: u32,
    requests: Vec<Request>,
    events: VecDeque<Vec<u8>>,
    fail_pixmaps: bool,
    fail_fills: bool,
}

/// Shared handle to the fake server. Clones see the same state.
#[derive(Clone)]
pub struct StubServer {
    setup: Rc<Vec<u8>>,
    keymap: Rc<KeySymbols>,
    state: Rc<RefCell<State>>,
}

impl Default for StubServer {
    fn default() -> Self {
        Self::new()
    }
}

impl StubServer {
    /// One 1280x720 TrueColor screen and [`us_keymap`].
    pub fn new() -> Self {
        Self::with_setup(SetupBuilder::new().screen(ScreenSpec::default()).build())
    }

    pub fn with_setup(setup: Vec<u8>) -> Self {
        Self {
            setup: Rc::new(setup),
            keymap: Rc::new(us_keymap()),
            state: Rc::new(RefCell::new(State::default())),
        }
    }

    /// Queues an event buffer; events are delivered in push order.
    pub fn push_event(&self, event: Vec<u8>) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Makes every CreatePixmap request fail.
    pub fn fail_pixmaps(&self) {
        self.state.borrow_mut().fail_pixmaps = true;
    }

    /// Makes every PolyFillRectangle request fail.
    pub fn fail_fills(&self) {
        self.state.borrow_mut().fail_fills = true;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.borrow().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.borrow_mut().requests.clear();
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().events.len()
    }

    fn record(&self, request: Request) -> Result<()> {
        self.state.borrow_mut().requests.push(request);
        Ok(())
    }
}

impl Transport for StubServer {
    fn setup(&self) -> &[u8] {
        &self.setup
    }

    fn generate_id(&self) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        if state.next_id > RESOURCE_ID_MASK {
            bail!("resource ids exhausted");
        }
        Ok(RESOURCE_ID_BASE | state.next_id)
    }

    fn flush(&self) -> Result<()> {
        self.record(Request::Flush)
    }

    fn wait_for_event(&self) -> Option<Vec<u8>> {
        self.state.borrow_mut().events.pop_front()
    }

    fn create_window(&self, request: &CreateWindow) -> Result<()> {
        self.record(Request::CreateWindow(*request))
    }

    fn destroy_window(&self, window: u32) -> Result<()> {
        self.record(Request::DestroyWindow(window))
    }

    fn map_window(&self, window: u32) -> Result<()> {
        self.record(Request::MapWindow(window))
    }

    fn unmap_window(&self, window: u32) -> Result<()> {
        self.record(Request::UnmapWindow(window))
    }

    fn configure_window(&self, window: u32, mask: u16, values: &[u32]) -> Result<()> {
        self.record(Request::ConfigureWindow {
            window,
            mask,
            values: values.to_vec(),
        })
    }

    fn change_window_attributes(&self, window: u32, mask: u32, values: &[u32]) -> Result<()> {
        self.record(Request::ChangeWindowAttributes {
            window,
            mask,
            values: values.to_vec(),
        })
    }

    fn keyboard_mapping(&self) -> Result<KeySymbols> {
        self.record(Request::GetKeyboardMapping)?;
        Ok((*self.keymap).clone())
    }

    fn create_pixmap(
        &self,
        depth: u8,
        pixmap: u32,
        drawable: u32,
        width: u16,
        height: u16,
    ) -> Result<()> {
        if self.state.borrow().fail_pixmaps {
            bail!("BadAlloc for pixmap {:#x}", pixmap);
        }
        self.record(Request::CreatePixmap {
            pixmap,
            drawable,
            depth,
            width,
            height,
        })
    }

    fn free_pixmap(&self, pixmap: u32) -> Result<()> {
        self.record(Request::FreePixmap(pixmap))
    }

    fn create_gc(&self, gc: u32, drawable: u32, foreground: u32) -> Result<()> {
        self.record(Request::CreateGc {
            gc,
            drawable,
            foreground,
        })
    }

    fn free_gc(&self, gc: u32) -> Result<()> {
        self.record(Request::FreeGc(gc))
    }

    fn fill_rectangle(&self, drawable: u32, gc: u32, width: u16, height: u16) -> Result<()> {
        if self.state.borrow().fail_fills {
            bail!("BadDrawable for fill of {:#x}", drawable);
        }
        self.record(Request::FillRectangle {
            drawable,
            gc,
            width,
            height,
        })
    }

    fn copy_area(&self, src: u32, dst: u32, gc: u32, width: u16, height: u16) -> Result<()> {
        self.record(Request::CopyArea {
            src,
            dst,
            gc,
            width,
            height,
        })
    }
}

pub mod keycode {
    pub const ESCAPE: u8 = 9;
    pub const DIGIT_2: u8 = 11;
    pub const DIGIT_3: u8 = 12;
    pub const DIGIT_8: u8 = 17;
    pub const BRACKET_LEFT: u8 = 34;
    pub const RETURN: u8 = 36;
    pub const CONTROL_L: u8 = 37;
    pub const KEY_A: u8 = 38;
    pub const SHIFT_L: u8 = 50;
    pub const KEY_C: u8 = 54;
    pub const KEY_Q: u8 = 24;
    pub const SPACE: u8 = 65;
    pub const CAPS_LOCK: u8 = 66;
    pub const TILDE: u8 = 49;
    /// Bound to keysym 0x1f, just below the printable range.
    pub const UNIT_SEPARATOR: u8 = 200;
    /// Bound to keysym 0x7f, just above the printable range.
    pub const DELETE_CHAR: u8 = 201;
}

/// Two keysyms per keycode (unshifted, shifted) for a handful of US keys.
pub fn us_keymap() -> KeySymbols {
    use keycode::*;

    let per = 2usize;
    let count = (MAX_KEYCODE - MIN_KEYCODE) as usize + 1;
    let mut keysyms = vec![0u32; count * per];
    let mut bind = |code: u8, syms: [u32; 2]| {
        let at = (code - MIN_KEYCODE) as usize * per;
        keysyms[at..at + per].copy_from_slice(&syms);
    };

    bind(ESCAPE, [0xff1b, 0]);
    bind(DIGIT_2, [u32::from(b'2'), u32::from(b'@')]);
    bind(DIGIT_3, [u32::from(b'3'), u32::from(b'#')]);
    bind(DIGIT_8, [u32::from(b'8'), u32::from(b'*')]);
    bind(BRACKET_LEFT, [u32::from(b'['), u32::from(b'{')]);
    bind(RETURN, [0xff0d, 0]);
    bind(CONTROL_L, [0xffe3, 0]);
    bind(KEY_A, [u32::from(b'a'), u32::from(b'A')]);
    bind(SHIFT_L, [0xffe1, 0]);
    bind(KEY_C, [u32::from(b'c'), u32::from(b'C')]);
    bind(KEY_Q, [u32::from(b'q'), 0]);
    bind(SPACE, [u32::from(b' '), 0]);
    bind(CAPS_LOCK, [0xffe5, 0]);
    bind(TILDE, [u32::from(b'`'), u32::from(b'~')]);
    bind(UNIT_SEPARATOR, [0x1f, 0]);
    bind(DELETE_CHAR, [0x7f, 0]);

    KeySymbols::new(MIN_KEYCODE, per as u8, keysyms)
}

fn event_header(kind: u8, sequence: u16) -> [u8; 32] {
    let mut event = [0u8; 32];
    event[0] = kind;
    event[2..4].copy_from_slice(&sequence.to_ne_bytes());
    event
}

/// A KeyPress event for `window`.
pub fn key_press(sequence: u16, window: u32, detail: u8, state: u16) -> Vec<u8> {
    let mut event = event_header(xproto::KEY_PRESS_EVENT, sequence);
    event[1] = detail;
    event[12..16].copy_from_slice(&window.to_ne_bytes());
    event[28..30].copy_from_slice(&state.to_ne_bytes());
    event[30] = 1; // same screen
    event.to_vec()
}

/// A ConfigureNotify event reporting a new size for `window`.
pub fn configure_notify(sequence: u16, window: u32, width: u16, height: u16) -> Vec<u8> {
    let mut event = event_header(xproto::CONFIGURE_NOTIFY_EVENT, sequence);
    event[4..8].copy_from_slice(&window.to_ne_bytes());
    event[8..12].copy_from_slice(&window.to_ne_bytes());
    event[20..22].copy_from_slice(&width.to_ne_bytes());
    event[22..24].copy_from_slice(&height.to_ne_bytes());
    event.to_vec()
}

/// An Expose event covering `width` x `height` of `window`.
pub fn expose(sequence: u16, window: u32, width: u16, height: u16) -> Vec<u8> {
    let mut event = event_header(xproto::EXPOSE_EVENT, sequence);
    event[4..8].copy_from_slice(&window.to_ne_bytes());
    event[12..14].copy_from_slice(&width.to_ne_bytes());
    event[14..16].copy_from_slice(&height.to_ne_bytes());
    event.to_vec()
}

/// A zeroed 32-byte event of any kind.
pub fn blank(kind: u8, sequence: u16) -> Vec<u8> {
    event_header(kind, sequence).to_vec()
}

/// An X11 error packet as it shows up in the event stream.
pub fn error(sequence: u16, code: u8) -> Vec<u8> {
    let mut packet = event_header(0, sequence);
    packet[1] = code;
    packet.to_vec()
}

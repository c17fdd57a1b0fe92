//! Borrowed views over the connection setup reply
//!
//! The setup reply packs screens, depths and visuals back to back as
//! variable-length lists. The views here read them in place without
//! copying; every view borrows the reply bytes and cannot outlive them.

use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

const SETUP_HEADER_LEN: usize = 40;
const SCREEN_LEN: usize = 40;
const DEPTH_LEN: usize = 8;
const VISUAL_LEN: usize = 24;
const FORMAT_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("setup reply truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("server refused connection setup (status {0})")]
    Refused(u8),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("there is no root visualtype")]
    NoRootVisual,

    #[error("setup reply lists no screens")]
    NoScreen,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// A fixed-layout record at the front of a byte slice.
pub trait Record<'a>: Sized {
    /// Reads one record, returning it with the number of bytes it spans.
    /// `None` when `bytes` is too short.
    fn read(bytes: &'a [u8]) -> Option<(Self, usize)>;
}

/// Lazy, forward-only walk over `len` records packed in a reply.
///
/// Not `Clone`: a walk is consumed once. Two positions compare equal only
/// when they point at the same byte of the same list.
pub struct Records<'a, R> {
    bytes: &'a [u8],
    remaining: usize,
    _record: PhantomData<R>,
}

impl<'a, R: Record<'a>> Records<'a, R> {
    fn new(bytes: &'a [u8], len: usize) -> Self {
        Self {
            bytes,
            remaining: len,
            _record: PhantomData,
        }
    }

    /// Records left according to the declared list length.
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl<'a, R: Record<'a>> Iterator for Records<'a, R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        if self.remaining == 0 {
            return None;
        }
        match R::read(self.bytes) {
            Some((record, len)) => {
                self.bytes = &self.bytes[len..];
                self.remaining -= 1;
                Some(record)
            }
            None => {
                // truncated list
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a, R> PartialEq for Records<'a, R> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.bytes.as_ptr(), other.bytes.as_ptr()) && self.remaining == other.remaining
    }
}

impl<'a, R> fmt::Debug for Records<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// The setup reply.
#[derive(Clone, Copy)]
pub struct SetupRef<'a> {
    bytes: &'a [u8],
}

impl<'a> SetupRef<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, SetupError> {
        if bytes.len() < SETUP_HEADER_LEN {
            return Err(SetupError::Truncated { len: bytes.len() });
        }
        if bytes[0] != 1 {
            return Err(SetupError::Refused(bytes[0]));
        }
        let setup = Self { bytes };
        if setup.roots_offset() > bytes.len() {
            return Err(SetupError::Truncated { len: bytes.len() });
        }
        Ok(setup)
    }

    pub fn protocol_version(&self) -> (u16, u16) {
        (read_u16(self.bytes, 2), read_u16(self.bytes, 4))
    }

    pub fn resource_id_base(&self) -> u32 {
        read_u32(self.bytes, 12)
    }

    pub fn resource_id_mask(&self) -> u32 {
        read_u32(self.bytes, 16)
    }

    pub fn min_keycode(&self) -> u8 {
        self.bytes[34]
    }

    pub fn max_keycode(&self) -> u8 {
        self.bytes[35]
    }

    pub fn vendor(&self) -> &'a [u8] {
        let len = read_u16(self.bytes, 24) as usize;
        let end = (SETUP_HEADER_LEN + len).min(self.bytes.len());
        &self.bytes[SETUP_HEADER_LEN..end]
    }

    fn roots_offset(&self) -> usize {
        let vendor_len = read_u16(self.bytes, 24) as usize;
        let formats_len = self.bytes[29] as usize;
        SETUP_HEADER_LEN + pad4(vendor_len) + formats_len * FORMAT_LEN
    }

    pub fn roots(&self) -> Records<'a, ScreenRef<'a>> {
        Records::new(&self.bytes[self.roots_offset()..], self.bytes[28] as usize)
    }
}

impl fmt::Debug for SetupRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupRef")
            .field("protocol_version", &self.protocol_version())
            .field("screens", &self.roots().len())
            .finish()
    }
}

/// One screen of the setup reply.
#[derive(Clone, Copy)]
pub struct ScreenRef<'a> {
    bytes: &'a [u8],
}

impl<'a> ScreenRef<'a> {
    pub fn root(&self) -> u32 {
        read_u32(self.bytes, 0)
    }

    pub fn default_colormap(&self) -> u32 {
        read_u32(self.bytes, 4)
    }

    pub fn white_pixel(&self) -> u32 {
        read_u32(self.bytes, 8)
    }

    pub fn black_pixel(&self) -> u32 {
        read_u32(self.bytes, 12)
    }

    pub fn width_in_pixels(&self) -> u16 {
        read_u16(self.bytes, 20)
    }

    pub fn height_in_pixels(&self) -> u16 {
        read_u16(self.bytes, 22)
    }

    pub fn root_visual(&self) -> u32 {
        read_u32(self.bytes, 32)
    }

    pub fn root_depth(&self) -> u8 {
        self.bytes[38]
    }

    pub fn allowed_depths(&self) -> Records<'a, DepthRef<'a>> {
        Records::new(&self.bytes[SCREEN_LEN..], self.bytes[39] as usize)
    }
}

impl<'a> Record<'a> for ScreenRef<'a> {
    fn read(bytes: &'a [u8]) -> Option<(Self, usize)> {
        if bytes.len() < SCREEN_LEN {
            return None;
        }
        let depths = bytes[39] as usize;
        let mut len = SCREEN_LEN;
        for _ in 0..depths {
            let (_, depth_len) = DepthRef::read(&bytes[len..])?;
            len += depth_len;
        }
        let screen = Self {
            bytes: &bytes[..len],
        };
        Some((screen, len))
    }
}

impl fmt::Debug for ScreenRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenRef")
            .field("root", &self.root())
            .field("root_visual", &self.root_visual())
            .field("root_depth", &self.root_depth())
            .finish()
    }
}

/// One allowed depth of a screen.
#[derive(Clone, Copy)]
pub struct DepthRef<'a> {
    bytes: &'a [u8],
}

impl<'a> DepthRef<'a> {
    pub fn depth(&self) -> u8 {
        self.bytes[0]
    }

    pub fn visuals(&self) -> Records<'a, VisualRef<'a>> {
        Records::new(&self.bytes[DEPTH_LEN..], read_u16(self.bytes, 2) as usize)
    }
}

impl<'a> Record<'a> for DepthRef<'a> {
    fn read(bytes: &'a [u8]) -> Option<(Self, usize)> {
        if bytes.len() < DEPTH_LEN {
            return None;
        }
        let len = DEPTH_LEN + read_u16(bytes, 2) as usize * VISUAL_LEN;
        if bytes.len() < len {
            return None;
        }
        Some((Self { bytes: &bytes[..len] }, len))
    }
}

impl fmt::Debug for DepthRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepthRef")
            .field("depth", &self.depth())
            .field("visuals", &self.visuals().len())
            .finish()
    }
}

/// One visual type of a depth.
#[derive(Clone, Copy)]
pub struct VisualRef<'a> {
    bytes: &'a [u8],
}

impl<'a> VisualRef<'a> {
    pub fn visual_id(&self) -> u32 {
        read_u32(self.bytes, 0)
    }

    pub fn class(&self) -> u8 {
        self.bytes[4]
    }

    pub fn bits_per_rgb_value(&self) -> u8 {
        self.bytes[5]
    }

    pub fn colormap_entries(&self) -> u16 {
        read_u16(self.bytes, 6)
    }

    pub fn red_mask(&self) -> u32 {
        read_u32(self.bytes, 8)
    }

    pub fn green_mask(&self) -> u32 {
        read_u32(self.bytes, 12)
    }

    pub fn blue_mask(&self) -> u32 {
        read_u32(self.bytes, 16)
    }
}

impl<'a> Record<'a> for VisualRef<'a> {
    fn read(bytes: &'a [u8]) -> Option<(Self, usize)> {
        if bytes.len() < VISUAL_LEN {
            return None;
        }
        Some((
            Self {
                bytes: &bytes[..VISUAL_LEN],
            },
            VISUAL_LEN,
        ))
    }
}

impl fmt::Debug for VisualRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualRef")
            .field("visual_id", &self.visual_id())
            .field("class", &self.class())
            .finish()
    }
}

/// The visual a rendering surface binds to, with the depth it was listed under.
#[derive(Debug, Clone, Copy)]
pub struct RootVisual<'a> {
    pub depth: u8,
    pub visual: VisualRef<'a>,
}

/// Root window of the first screen.
pub fn root_screen(setup: &SetupRef<'_>) -> Result<u32, ResolveError> {
    setup
        .roots()
        .next()
        .map(|screen| screen.root())
        .ok_or(ResolveError::NoScreen)
}

/// First visual whose id matches its screen's root visual.
///
/// Screens, then depths, then visuals, in list order; stops at the first hit.
pub fn root_visual<'a>(setup: &SetupRef<'a>) -> Result<RootVisual<'a>, ResolveError> {
    setup
        .roots()
        .find_map(|screen| {
            let wanted = screen.root_visual();
            screen.allowed_depths().find_map(|depth| {
                depth
                    .visuals()
                    .find(|visual| visual.visual_id() == wanted)
                    .map(|visual| RootVisual {
                        depth: depth.depth(),
                        visual,
                    })
            })
        })
        .ok_or(ResolveError::NoRootVisual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{DepthSpec, ScreenSpec, SetupBuilder, VisualSpec};

    fn screen(root: u32, root_visual: u32, depths: Vec<DepthSpec>) -> ScreenSpec {
        ScreenSpec {
            root,
            root_visual,
            root_depth: 24,
            width: 1920,
            height: 1080,
            depths,
        }
    }

    fn depth(depth: u8, visuals: &[(u32, u8)]) -> DepthSpec {
        DepthSpec {
            depth,
            visuals: visuals
                .iter()
                .map(|&(id, class)| VisualSpec { id, class })
                .collect(),
        }
    }

    #[test]
    fn test_parse_rejects_short_and_refused() {
        assert_eq!(
            SetupRef::parse(&[1, 0, 11]).unwrap_err(),
            SetupError::Truncated { len: 3 }
        );

        let mut bytes = SetupBuilder::new().build();
        bytes[0] = 0;
        assert_eq!(SetupRef::parse(&bytes).unwrap_err(), SetupError::Refused(0));
    }

    #[test]
    fn test_walk_nested_lists() {
        let bytes = SetupBuilder::new()
            .vendor(b"vt10x-test")
            .screen(screen(
                0x100,
                0x21,
                vec![depth(24, &[(0x21, 4), (0x22, 4)]), depth(32, &[(0x40, 4)])],
            ))
            .screen(screen(0x200, 0x50, vec![depth(8, &[(0x50, 3)])]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        assert_eq!(setup.protocol_version(), (11, 0));
        assert_eq!(setup.vendor(), b"vt10x-test");

        let mut roots = setup.roots();
        assert_eq!(roots.len(), 2);

        let first = roots.next().unwrap();
        assert_eq!(first.root(), 0x100);
        let depths: Vec<_> = first.allowed_depths().map(|d| d.depth()).collect();
        assert_eq!(depths, vec![24, 32]);
        let ids: Vec<_> = first
            .allowed_depths()
            .flat_map(|d| d.visuals())
            .map(|v| v.visual_id())
            .collect();
        assert_eq!(ids, vec![0x21, 0x22, 0x40]);

        let second = roots.next().unwrap();
        assert_eq!(second.root(), 0x200);
        assert!(roots.is_empty());
        assert!(roots.next().is_none());
    }

    #[test]
    fn test_positions_compare_by_place_in_list() {
        let bytes = SetupBuilder::new()
            .screen(screen(1, 0x21, vec![depth(24, &[(0x21, 4), (0x22, 4)])]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        let mut a = setup.roots();
        let b = setup.roots();
        assert_eq!(a, b);
        a.next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_truncated_list_ends_early() {
        let bytes = SetupBuilder::new()
            .screen(screen(1, 0x21, vec![depth(24, &[(0x21, 4), (0x22, 4)])]))
            .build();
        let cut = &bytes[..bytes.len() - 10];
        let setup = SetupRef::parse(cut).unwrap();

        let mut roots = setup.roots();
        assert!(roots.next().is_none());
        assert!(roots.is_empty());
    }

    #[test]
    fn test_root_screen_is_first() {
        let bytes = SetupBuilder::new()
            .screen(screen(0x100, 0x21, vec![]))
            .screen(screen(0x200, 0x21, vec![]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();
        assert_eq!(root_screen(&setup), Ok(0x100));

        let empty = SetupBuilder::new().build();
        let setup = SetupRef::parse(&empty).unwrap();
        assert_eq!(root_screen(&setup), Err(ResolveError::NoScreen));
    }

    #[test]
    fn test_root_visual_searches_nested() {
        let bytes = SetupBuilder::new()
            .screen(screen(
                1,
                0x77,
                vec![
                    depth(1, &[(0x10, 0)]),
                    depth(16, &[(0x11, 4), (0x12, 4)]),
                    depth(24, &[(0x13, 4), (0x77, 4)]),
                ],
            ))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        let found = root_visual(&setup).unwrap();
        assert_eq!(found.visual.visual_id(), 0x77);
        assert_eq!(found.depth, 24);
    }

    #[test]
    fn test_root_visual_first_match_wins() {
        // same id listed twice; the class tells the entries apart
        let bytes = SetupBuilder::new()
            .screen(screen(
                1,
                0x21,
                vec![depth(24, &[(0x20, 4), (0x21, 4)]), depth(32, &[(0x21, 5)])],
            ))
            .screen(screen(2, 0x21, vec![depth(8, &[(0x21, 3)])]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        let found = root_visual(&setup).unwrap();
        assert_eq!(found.visual.class(), 4);
        assert_eq!(found.depth, 24);
    }

    thread_local! {
        static READS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    /// One byte per record, counting every read.
    struct Counted(u8);

    impl<'a> Record<'a> for Counted {
        fn read(bytes: &'a [u8]) -> Option<(Self, usize)> {
            READS.with(|reads| reads.set(reads.get() + 1));
            bytes.first().map(|&b| (Counted(b), 1))
        }
    }

    #[test]
    fn test_records_read_nothing_past_match() {
        let bytes = [7u8, 8, 9, 10, 11, 12];
        let mut walk = Records::<Counted>::new(&bytes, bytes.len());

        let found = walk.find(|record| record.0 == 9).map(|record| record.0);
        assert_eq!(found, Some(9));
        assert_eq!(READS.with(|reads| reads.get()), 3);
        assert_eq!(walk.len(), 3);
    }

    #[test]
    fn test_root_visual_ignores_broken_screen_after_match() {
        let mut bytes = SetupBuilder::new()
            .screen(screen(1, 0x21, vec![depth(24, &[(0x21, 4)])]))
            .screen(screen(2, 0x21, vec![depth(24, &[(0x21, 4), (0x22, 4)])]))
            .build();
        // header, one pixmap format, then screen 1: 40 + 8 + 24 bytes
        let first_screen_end = SETUP_HEADER_LEN + FORMAT_LEN + SCREEN_LEN + DEPTH_LEN + VISUAL_LEN;
        bytes.truncate(first_screen_end + 10);
        let setup = SetupRef::parse(&bytes).unwrap();

        let found = root_visual(&setup).unwrap();
        assert_eq!(found.visual.visual_id(), 0x21);
        assert_eq!(found.depth, 24);

        // the same cut with nothing to find before it
        let mut bytes = SetupBuilder::new()
            .screen(screen(1, 0x99, vec![depth(24, &[(0x21, 4)])]))
            .screen(screen(2, 0x21, vec![depth(24, &[(0x21, 4)])]))
            .build();
        bytes.truncate(first_screen_end + 10);
        let setup = SetupRef::parse(&bytes).unwrap();
        assert_eq!(root_visual(&setup).unwrap_err(), ResolveError::NoRootVisual);
    }

    #[test]
    fn test_root_visual_in_later_screen() {
        let bytes = SetupBuilder::new()
            .screen(screen(1, 0x99, vec![depth(24, &[(0x21, 4)])]))
            .screen(screen(2, 0x30, vec![depth(8, &[(0x30, 3)])]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        let found = root_visual(&setup).unwrap();
        assert_eq!(found.visual.visual_id(), 0x30);
        assert_eq!(found.depth, 8);
    }

    #[test]
    fn test_no_root_visual() {
        let bytes = SetupBuilder::new()
            .screen(screen(1, 0x99, vec![depth(24, &[(0x21, 4), (0x22, 4)])]))
            .build();
        let setup = SetupRef::parse(&bytes).unwrap();

        let err = root_visual(&setup).unwrap_err();
        assert_eq!(err, ResolveError::NoRootVisual);
        assert_eq!(err.to_string(), "there is no root visualtype");
    }
}

//! Server-side window owned for a scope

use anyhow::Result;
use tracing::{debug, warn};
use x11rb::protocol::xproto::{WindowClass, CW};

use crate::event::EventInterest;
use crate::session::{CreateWindow, Session};
use crate::setup::root_screen;

const BORDER_WIDTH: u16 = 2;

/// A window created on construction and destroyed on drop.
///
/// The destroy request is issued exactly once, whichever way the owning
/// scope is left.
pub struct Window<'s> {
    session: &'s Session,
    id: u32,
}

impl<'s> Window<'s> {
    /// Creates a 1x1 input/output window under `parent`, or under the root
    /// of the first screen.
    ///
    /// Depth and visual are copied from the parent; no attributes are set.
    pub fn create(session: &'s Session, parent: Option<u32>) -> Result<Self> {
        let parent = match parent {
            Some(parent) => parent,
            None => root_screen(&session.setup()?)?,
        };
        let id = session.generate_id()?;

        session.create_window(&CreateWindow {
            id,
            parent,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            border_width: BORDER_WIDTH,
            class: WindowClass::INPUT_OUTPUT.into(),
        })?;
        debug!(window = id, parent, "window created");

        Ok(Self { session, id })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    pub fn map(&self) -> Result<()> {
        self.session.map_window(self.id)
    }

    pub fn unmap(&self) -> Result<()> {
        self.session.unmap_window(self.id)
    }

    /// ConfigureWindow with `values` in ascending bit order of `mask`.
    pub fn configure(&self, mask: u16, values: &[u32]) -> Result<()> {
        self.session.configure_window(self.id, mask, values)
    }

    /// ChangeWindowAttributes with `values` in ascending bit order of `mask`.
    pub fn change_attributes(&self, mask: u32, values: &[u32]) -> Result<()> {
        self.session.change_window_attributes(self.id, mask, values)
    }

    /// Replaces the window's event mask.
    pub fn select_events(&self, interest: EventInterest) -> Result<()> {
        self.change_attributes(CW::EVENT_MASK.into(), &[interest.bits()])
    }
}

impl Drop for Window<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.session.destroy_window(self.id) {
            warn!(window = self.id, error = %e, "destroy window failed");
        }
        debug!(window = self.id, "window destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::{Request, StubServer};
    use x11rb::protocol::xproto::ConfigWindow;

    #[test]
    fn test_create_under_first_root() {
        let server = StubServer::new();
        let session = Session::with_transport(server.clone());

        let window = Window::create(&session, None).unwrap();
        let requests = server.requests();
        assert_eq!(
            requests,
            vec![Request::CreateWindow(CreateWindow {
                id: window.id(),
                parent: 0x100,
                x: 0,
                y: 0,
                width: 1,
                height: 1,
                border_width: 2,
                class: 1,
            })]
        );
    }

    #[test]
    fn test_create_under_explicit_parent() {
        let server = StubServer::new();
        let session = Session::with_transport(server.clone());

        let parent = Window::create(&session, None).unwrap();
        let child = Window::create(&session, Some(parent.id())).unwrap();
        assert_ne!(child.id(), parent.id());
        assert!(matches!(
            server.requests()[1],
            Request::CreateWindow(CreateWindow { parent: p, .. }) if p == parent.id()
        ));
    }

    #[test]
    fn test_destroyed_once_on_drop() {
        let server = StubServer::new();
        let session = Session::with_transport(server.clone());

        let id = {
            let window = Window::create(&session, None).unwrap();
            window.id()
        };
        let destroys: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| matches!(r, Request::DestroyWindow(_)))
            .collect();
        assert_eq!(destroys, vec![Request::DestroyWindow(id)]);
    }

    #[test]
    fn test_destroyed_on_error_unwind() {
        fn failing(session: &Session) -> Result<u32> {
            let window = Window::create(session, None)?;
            window.map()?;
            anyhow::bail!("handler gave up on {}", window.id())
        }

        let server = StubServer::new();
        let session = Session::with_transport(server.clone());
        assert!(failing(&session).is_err());

        let requests = server.requests();
        assert!(matches!(requests.last(), Some(Request::DestroyWindow(_))));
    }

    #[test]
    fn test_requests_forward_mask_and_values() {
        let server = StubServer::new();
        let session = Session::with_transport(server.clone());
        let window = Window::create(&session, None).unwrap();
        server.clear_requests();

        let mask = u16::from(ConfigWindow::WIDTH | ConfigWindow::HEIGHT);
        window.configure(mask, &[1280, 720]).unwrap();
        window.map().unwrap();
        window.unmap().unwrap();
        window
            .select_events(EventInterest::KEY_PRESS | EventInterest::EXPOSURE)
            .unwrap();

        let id = window.id();
        assert_eq!(
            server.requests(),
            vec![
                Request::ConfigureWindow {
                    window: id,
                    mask: 0x0c,
                    values: vec![1280, 720]
                },
                Request::MapWindow(id),
                Request::UnmapWindow(id),
                Request::ChangeWindowAttributes {
                    window: id,
                    mask: 1 << 11,
                    values: vec![(1 << 0) | (1 << 15)]
                },
            ]
        );
    }
}

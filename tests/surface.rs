use anyhow::{bail, Result};

use vt10x::canvas::{Canvas, PixmapCanvas};
use vt10x::dispatch::{execute, Handler};
use vt10x::session::Session;
use vt10x::setup::RootVisual;
use vt10x::stub::{self, keycode, Request, ScreenSpec, SetupBuilder, StubServer};
use vt10x::surface::Surface;

/// A canvas that can never be bound.
struct Broken;

impl<'s> Canvas<'s> for Broken {
    fn bind(
        _session: &'s Session,
        window: u32,
        _visual: &RootVisual<'_>,
        _width: u16,
        _height: u16,
    ) -> Result<Self> {
        bail!("no backend for window {:#x}", window)
    }

    fn set_size(&mut self, _width: u16, _height: u16) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn destroys(server: &StubServer) -> Vec<u32> {
    server
        .requests()
        .into_iter()
        .filter_map(|r| match r {
            Request::DestroyWindow(id) => Some(id),
            _ => None,
        })
        .collect()
}

#[test]
fn test_surface_binds_canvas_to_its_window() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    let requests = server.requests();
    assert!(matches!(
        &requests[0],
        Request::CreateWindow(create) if create.id == window && create.parent == 0x100
    ));
    assert!(requests.iter().any(|r| matches!(
        r,
        Request::CreatePixmap { drawable, depth: 24, width: 1, height: 1, .. } if *drawable == window
    )));
    assert_eq!(surface.canvas().size(), (1, 1));
}

#[test]
fn test_surface_with_parent() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let surface: Surface = Surface::with_parent(&session, 0x4242).unwrap();

    assert!(matches!(
        &server.requests()[0],
        Request::CreateWindow(create) if create.parent == 0x4242
    ));
    drop(surface);
    assert_eq!(destroys(&server).len(), 1);
}

#[test]
fn test_configure_notify_resizes_canvas() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    server.push_event(stub::configure_notify(1, window, 640, 480));
    assert_eq!(execute(&session, &mut surface).unwrap(), 1);
    assert_eq!(surface.canvas().size(), (640, 480));
}

#[test]
fn test_repeated_configure_keeps_last_size() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    server.push_event(stub::configure_notify(1, window, 800, 600));
    server.push_event(stub::expose(2, window, 800, 600));
    server.push_event(stub::configure_notify(3, window, 1024, 768));
    execute(&session, &mut surface).unwrap();

    assert_eq!(surface.canvas().size(), (1024, 768));
    let pixmaps = server
        .requests()
        .iter()
        .filter(|r| matches!(r, Request::CreatePixmap { .. }))
        .count();
    assert_eq!(pixmaps, 3);
}

#[test]
fn test_failed_canvas_destroys_window_once() {
    let server = StubServer::new();
    server.fail_pixmaps();
    let session = Session::with_transport(server.clone());

    let result: Result<Surface> = Surface::new(&session);
    assert!(result.is_err());

    let created = match &server.requests()[0] {
        Request::CreateWindow(create) => create.id,
        other => panic!("unexpected first request {:?}", other),
    };
    assert_eq!(destroys(&server), vec![created]);
}

#[test]
fn test_unbindable_canvas_type_destroys_window_once() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());

    let err = Surface::<Broken>::new(&session).err().unwrap();
    assert!(err.to_string().starts_with("no backend for window"));
    assert_eq!(destroys(&server).len(), 1);
}

#[test]
fn test_missing_root_visual_fails_creation() {
    let setup = SetupBuilder::new()
        .screen(ScreenSpec {
            root_visual: 0x7777,
            ..ScreenSpec::default()
        })
        .build();
    let server = StubServer::with_setup(setup);
    let session = Session::with_transport(server.clone());

    let err = Surface::<PixmapCanvas>::new(&session).err().unwrap();
    assert_eq!(err.to_string(), "there is no root visualtype");
    assert_eq!(destroys(&server).len(), 1);
}

#[test]
fn test_flush_copies_before_session_flush() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    server.clear_requests();

    surface.flush().unwrap();
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(matches!(requests[0], Request::CopyArea { .. }));
    assert_eq!(requests[1], Request::Flush);
}

#[test]
fn test_keyboard_mapping_fetched_once() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    server.push_event(stub::key_press(1, window, keycode::KEY_A, 0));
    server.push_event(stub::key_press(2, window, keycode::KEY_C, 4));
    server.push_event(stub::key_press(3, window, keycode::SHIFT_L, 0));
    assert_eq!(execute(&session, &mut surface).unwrap(), 3);

    let fetches = server
        .requests()
        .iter()
        .filter(|r| **r == Request::GetKeyboardMapping)
        .count();
    assert_eq!(fetches, 1);
}

#[test]
fn test_no_keyboard_without_key_presses() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    server.push_event(stub::expose(1, window, 10, 10));
    execute(&session, &mut surface).unwrap();
    assert!(!server.requests().contains(&Request::GetKeyboardMapping));
}

#[test]
fn test_surface_selects_its_events() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    execute(&session, &mut surface).unwrap();
    // KeyPress | Exposure | StructureNotify
    let expected = (1 << 0) | (1 << 15) | (1 << 17);
    assert!(server.requests().contains(&Request::ChangeWindowAttributes {
        window,
        mask: 1 << 11,
        values: vec![expected],
    }));
    assert_eq!(
        <Surface as Handler>::EVENT_MASK.bits(),
        expected
    );
}

#[test]
fn test_error_packet_between_events() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let mut surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();

    server.push_event(stub::error(1, 3)); // BadWindow
    server.push_event(stub::configure_notify(2, window, 320, 200));
    assert_eq!(execute(&session, &mut surface).unwrap(), 2);
    assert_eq!(surface.canvas().size(), (320, 200));
}

#[test]
fn test_drop_releases_canvas_before_window() {
    let server = StubServer::new();
    let session = Session::with_transport(server.clone());
    let surface: Surface = Surface::new(&session).unwrap();
    let window = surface.window().id();
    server.clear_requests();

    drop(surface);
    let requests = server.requests();
    assert!(matches!(requests[0], Request::FreePixmap(_)));
    assert!(matches!(requests[1], Request::FreeGc(_)));
    assert_eq!(requests[2], Request::DestroyWindow(window));
}

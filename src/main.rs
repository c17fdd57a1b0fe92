//! vt10x - terminal emulator front end for X11
//!
//! Opens a window on the X server and runs its event loop until the
//! connection closes.
//!
//! ```text
//! vt10x                 → window on $DISPLAY
//! vt10x -d :1           → window on display :1
//! RUST_LOG=vt10x=trace  → every event and key decode
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use x11rb::protocol::xproto::ConfigWindow;

use vt10x::config::Config;
use vt10x::{execute, Session, Surface};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vt10x=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    let session = Session::connect(config.display.as_deref())
        .context("failed to connect to X display")?;
    let mut surface: Surface = Surface::new(&session)?;

    let mask = ConfigWindow::WIDTH | ConfigWindow::HEIGHT;
    surface.window().configure(
        mask.into(),
        &[u32::from(config.width), u32::from(config.height)],
    )?;
    surface.resize(config.width, config.height)?;

    surface.window().map()?;
    surface.flush()?;

    let events = execute(&session, &mut surface)?;
    info!(events, "connection closed");
    Ok(())
}

//! Command line configuration

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vt10x")]
#[command(about = "X11 terminal emulator front end")]
#[command(version)]
pub struct Config {
    /// X display to connect to (e.g., :0); defaults to $DISPLAY
    #[arg(short, long)]
    pub display: Option<String>,

    /// Initial window width in pixels
    #[arg(long, default_value_t = 1280, value_parser = clap::value_parser!(u16).range(1..))]
    pub width: u16,

    /// Initial window height in pixels
    #[arg(long, default_value_t = 720, value_parser = clap::value_parser!(u16).range(1..))]
    pub height: u16,
}

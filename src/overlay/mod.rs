//! Layer-shell overlay for Wayland
//!
//! Places a surface on every matching output and keeps it painted with the
//! current text.

mod buffer;
mod display;
mod event_loop;
mod render;
mod state;
mod surface;
mod text;
mod wayland;

use std::io;
use thiserror::Error;
use tracing::info;
use wayland_client::{
    ConnectError, Connection, DispatchError,
    backend::WaylandError,
    globals::{BindError, GlobalError, registry_queue_init},
};

use self::render::Renderer;
use self::text::{Font, FontError, FontSpec};
use self::wayland::OverlayApp;
use crate::config::OverlayConfig;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),
    #[error("failed to read the global registry: {0}")]
    Registry(#[from] GlobalError),
    #[error("compositor does not provide {global}: {source}")]
    Capability {
        global: &'static str,
        #[source]
        source: BindError,
    },
    #[error("failed to dispatch Wayland events: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("failed to read from the Wayland connection: {0}")]
    Read(#[source] WaylandError),
    #[error("failed to flush the Wayland connection: {0}")]
    Flush(#[source] WaylandError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("font error: {0}")]
    Font(#[from] FontError),
    #[error("failed to set up signal handling: {0}")]
    Signal(#[source] nix::Error),
    #[error("failed to create the interval timer: {0}")]
    Timer(#[source] nix::Error),
}

/// Run the overlay until a terminating signal or a fatal error
pub fn run_overlay(config: OverlayConfig) -> Result<(), OverlayError> {
    info!("starting Wayland overlay");

    let spec = FontSpec::parse(&config.style.font)?;
    let renderer = Renderer::new(Font::load(spec)?, config.style.clone());

    // Connect to Wayland
    let conn = Connection::connect_to_env()?;
    let (globals, mut event_queue) = registry_queue_init(&conn)?;
    let qh = event_queue.handle();

    let feed = config.feed.clone();
    let interval = config.interval;
    let mut app = OverlayApp::new(&globals, &qh, config, renderer)?;

    // Collect output names and scales before requesting surfaces
    event_queue.roundtrip(&mut app)?;
    app.start(&qh);

    let result = event_loop::run(&mut event_queue, &mut app, feed, interval);

    info!("shutting down");
    app.shutdown(&qh);
    // Best effort: the connection may be the reason we stopped
    let _ = event_queue.flush();

    result
}

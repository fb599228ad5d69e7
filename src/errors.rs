//! Error types

use std::path::PathBuf;

use snafu::{prelude::*, Backtrace};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum DimmerError {
    #[snafu(display("Failed to list backlights in {}: {source}", path.display()))]
    BacklightDir {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("No backlight found in {}. Please specify one explicitly.", path.display()))]
    NoBacklight { path: PathBuf, backtrace: Backtrace },
    #[snafu(display("Multiple backlights found in {}. Please specify one explicitly.", path.display()))]
    MultipleBacklights { path: PathBuf, backtrace: Backtrace },
    #[snafu(display("Could not find {}. Maybe --wait is too short (or there is a typo)?", path.display()))]
    FileNotFound { path: PathBuf, backtrace: Backtrace },
    #[snafu(display("Inotify file monitoring error: {source}"))]
    Inotify {
        source: nix::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Epoll polling error: {source}"))]
    Epoll {
        source: nix::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Eventfd error: {source}"))]
    EventFd {
        source: nix::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Signal handling error: {source}"))]
    Signal {
        source: nix::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("Failed to connect to the X server: {source}"))]
    X11Connect {
        source: x11rb::errors::ConnectError,
        backtrace: Backtrace,
    },
    #[snafu(display("X11 request failed: {source}"))]
    X11 {
        source: x11rb::errors::ReplyOrIdError,
        backtrace: Backtrace,
    },
    #[snafu(display("X server lacks {what}"))]
    X11Unsupported { what: String, backtrace: Backtrace },
    #[snafu(display("Failed to spawn {name} thread: {source}"))]
    Spawn {
        name: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

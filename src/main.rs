//! Screen dimming daemon. Keeps a translucent overlay over the screen whose
//! opacity follows the backlight brightness, to go below the minimum the
//! hardware allows.
//!
//! There is no public code API for you to use! However, the command line
//! interface should be stable.

use std::path::Path;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use alpha::OverlayAlpha;
use brightness::BrightnessSource;
use channel::{IntentReceiver, CHANGE_OVERLAY};
use host::{HeadlessHost, FB_VIRTUAL_SIZE};
use panel::{Panel, PanelEvent, PanelSettings};
use x11::X11Host;

use crate::errors::DimmerError;
use crate::utils::{find_backlight, wait_for_file, BACKLIGHT_CLASS};

mod alpha;
mod brightness;
mod channel;
mod errors;
mod flags;
mod host;
mod overlay;
mod panel;
mod signals;
mod utils;
mod x11;

fn main() -> anyhow::Result<()> {
    let cli = flags::Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    run_daemon(&cli)
}

/// Set up and run until SIGTERM/SIGINT.
fn run_daemon(config: &flags::Cli) -> anyhow::Result<()> {
    // Before any thread is spawned, so they all inherit the mask.
    let sfd = signals::block().context("Failed to set up signal handling")?;

    let backlight_dir = match &config.backlight_dir {
        Some(dir) => dir.clone(),
        None => find_backlight(Path::new(BACKLIGHT_CLASS))?,
    };
    if let Some(timeout) = config.wait {
        wait_for_file(&backlight_dir, Duration::from_millis(timeout.into()))?;
    }
    info!("Following backlight {}", backlight_dir.display());

    let (intent_tx, intent_rx) = channel::open(CHANGE_OVERLAY);
    let controller =
        spawn_controller(config, intent_rx).context("Failed to start overlay controller")?;

    let mut panel = Panel::new(
        PanelSettings {
            enabled: !config.disabled,
            auto_adjust: config.alpha.is_none(),
            manual_alpha: config.alpha.map(OverlayAlpha::new).unwrap_or_default(),
        },
        intent_tx,
    );
    info!("Starting with {:?}", panel.settings());

    let (events_tx, events_rx) = mpsc::channel();
    signals::spawn(sfd, events_tx.clone())?;
    // The first emission is the current brightness, which publishes the
    // initial intent.
    let subscription = BrightnessSource::new(backlight_dir)
        .subscribe(move |reading| {
            let _ = events_tx.send(PanelEvent::Brightness(reading));
        })
        .context("Failed to watch backlight")?;

    for event in events_rx {
        if !panel.dispatch(event) {
            break;
        }
    }

    info!("Shutting down");
    subscription.unsubscribe();
    // Last sender gone: the controller detaches, releases and exits.
    drop(panel);
    controller
        .join()
        .map_err(|_| anyhow::anyhow!("Overlay controller panicked"))?;
    Ok(())
}

/// Start the overlay controller on X11, or headless if asked to or if there
/// is no usable X server.
fn spawn_controller(
    config: &flags::Cli,
    rx: IntentReceiver,
) -> Result<JoinHandle<()>, DimmerError> {
    if !config.headless {
        match X11Host::connect() {
            Ok(host) => return overlay::spawn(host, config.tint, rx),
            Err(err) => warn!("No X11 overlay, running headless: {err}"),
        }
    }
    let host = HeadlessHost::from_framebuffer(Path::new(FB_VIRTUAL_SIZE));
    overlay::spawn(host, config.tint, rx)
}

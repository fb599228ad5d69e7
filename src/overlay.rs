//! Overlay controller: owns the overlay surface and applies intents to it.

use std::thread::JoinHandle;

use log::{debug, info};
use smallvec::{smallvec, SmallVec};
use snafu::ResultExt;

use crate::{
    alpha::OverlayAlpha,
    channel::{IntentReceiver, OverlayIntent},
    errors::{DimmerError, SpawnSnafu},
    host::{Argb, SurfaceParams, WindowHost},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attachment {
    Detached,
    Attached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceAction {
    SetFill(OverlayAlpha),
    Attach,
    Detach,
}

/// Compute the next state and what to do to the surface to get there.
///
/// The fill is always updated, even when hiding, so a later re-enable shows
/// the latest alpha without another message.
fn transition(
    state: Attachment,
    intent: &OverlayIntent,
) -> (Attachment, SmallVec<[SurfaceAction; 2]>) {
    let fill = SurfaceAction::SetFill(intent.overlay_alpha);
    match (state, intent.is_overlay_enabled) {
        (Attachment::Detached, true) => {
            (Attachment::Attached, smallvec![fill, SurfaceAction::Attach])
        }
        (Attachment::Attached, false) => {
            (Attachment::Detached, smallvec![fill, SurfaceAction::Detach])
        }
        (state, _) => (state, smallvec![fill]),
    }
}

/// Single owner of the overlay surface.
pub(crate) struct OverlayController<H: WindowHost> {
    host: H,
    /// `None` only after teardown.
    surface: Option<H::Surface>,
    state: Attachment,
    current_alpha: OverlayAlpha,
    tint: u32,
}

impl<H: WindowHost> OverlayController<H> {
    /// Create the surface. It starts out detached.
    pub fn start(mut host: H, tint: u32) -> Self {
        let params = SurfaceParams::overlay(host.display_bounds());
        let surface = host.create_surface(params);
        Self {
            host,
            surface: Some(surface),
            state: Attachment::Detached,
            current_alpha: OverlayAlpha::DEFAULT,
            tint,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> Attachment {
        self.state
    }

    #[cfg(test)]
    pub fn current_alpha(&self) -> OverlayAlpha {
        self.current_alpha
    }

    /// Apply an intent.
    pub fn handle(&mut self, intent: &OverlayIntent) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let (next, actions) = transition(self.state, intent);
        debug!("{:?} + {intent:?} -> {next:?}: {actions:?}", self.state);
        for action in actions {
            match action {
                SurfaceAction::SetFill(alpha) => {
                    self.current_alpha = alpha;
                    self.host
                        .set_fill(surface, Argb::tinted(self.tint, alpha.to_channel()));
                }
                SurfaceAction::Attach => self.host.attach(surface),
                SurfaceAction::Detach => self.host.detach(surface),
            }
        }
        self.state = next;
    }

    /// Detach if needed, then release the surface.
    #[cfg(test)]
    pub fn stop(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(mut surface) = self.surface.take() else {
            return;
        };
        if self.state == Attachment::Attached {
            self.host.detach(&mut surface);
            self.state = Attachment::Detached;
        }
        self.host.release(surface);
    }

    /// Apply intents until every sender is gone, then tear down.
    pub fn run(mut self, rx: IntentReceiver) {
        info!("Listening on {}", rx.name());
        for intent in &rx {
            self.handle(&intent);
        }
        self.teardown();
        debug!("Closing {}", rx.name());
        drop(rx);
    }
}

impl<H: WindowHost> Drop for OverlayController<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Run a controller for `host` on its own thread.
pub(crate) fn spawn<H>(
    host: H,
    tint: u32,
    rx: IntentReceiver,
) -> Result<JoinHandle<()>, DimmerError>
where
    H: WindowHost + Send + 'static,
{
    std::thread::Builder::new()
        .name("overlay".into())
        .spawn(move || OverlayController::start(host, tint).run(rx))
        .context(SpawnSnafu { name: "overlay" })
}

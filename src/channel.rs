//! One-way channel carrying overlay intents from the panel to the controller

use std::sync::mpsc;

use log::{debug, warn};

use crate::alpha::OverlayAlpha;

/// Name of the overlay change channel.
pub(crate) const CHANGE_OVERLAY: &str = "contrastdc.ACTION_CHANGE_OVERLAY";

/// Desired overlay state. Each intent fully replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OverlayIntent {
    pub is_overlay_enabled: bool,
    pub overlay_alpha: OverlayAlpha,
}

/// Sending half. Sends never block and are never acknowledged.
#[derive(Debug, Clone)]
pub(crate) struct IntentSender {
    name: &'static str,
    tx: mpsc::Sender<OverlayIntent>,
}

/// Receiving half, owned by the overlay controller.
#[derive(Debug)]
pub(crate) struct IntentReceiver {
    name: &'static str,
    rx: mpsc::Receiver<OverlayIntent>,
}

/// Open a named FIFO channel.
pub(crate) fn open(name: &'static str) -> (IntentSender, IntentReceiver) {
    let (tx, rx) = mpsc::channel();
    (IntentSender { name, tx }, IntentReceiver { name, rx })
}

impl IntentSender {
    /// Fire and forget. An intent sent after the receiver is gone is dropped.
    pub fn send(&self, intent: OverlayIntent) {
        debug!("{}: {intent:?}", self.name);
        if self.tx.send(intent).is_err() {
            warn!("{}: no receiver, dropped {intent:?}", self.name);
        }
    }
}

impl IntentReceiver {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the next intent. `None` once every sender is gone.
    pub fn recv(&self) -> Option<OverlayIntent> {
        self.rx.recv().ok()
    }
}

impl Iterator for &IntentReceiver {
    type Item = OverlayIntent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

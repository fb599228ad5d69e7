//! User facing overlay settings and the intents they produce

use log::{debug, info};

use crate::{
    alpha::{compute_alpha, OverlayAlpha},
    brightness::DEFAULT_BRIGHTNESS,
    channel::{IntentSender, OverlayIntent},
};

/// Inputs to the panel, from whichever thread produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PanelEvent {
    Brightness(u8),
    ToggleOverlay,
    ToggleAutoAdjust,
    /// Move the manual alpha by this many percent and switch to it.
    StepManualAlpha(i8),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PanelSettings {
    pub enabled: bool,
    /// Derive alpha from brightness instead of using `manual_alpha`.
    pub auto_adjust: bool,
    pub manual_alpha: OverlayAlpha,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_adjust: true,
            manual_alpha: OverlayAlpha::DEFAULT,
        }
    }
}

/// Owns the settings and resends the overlay intent whenever one of them
/// (or the brightness) changes.
#[derive(Debug)]
pub(crate) struct Panel {
    settings: PanelSettings,
    brightness: u8,
    sender: IntentSender,
}

impl Panel {
    pub fn new(settings: PanelSettings, sender: IntentSender) -> Self {
        Self {
            settings,
            brightness: DEFAULT_BRIGHTNESS,
            sender,
        }
    }

    pub fn settings(&self) -> PanelSettings {
        self.settings
    }

    pub fn overlay_alpha(&self) -> OverlayAlpha {
        if self.settings.auto_adjust {
            compute_alpha(self.brightness.into())
        } else {
            self.settings.manual_alpha
        }
    }

    pub fn intent(&self) -> OverlayIntent {
        OverlayIntent {
            is_overlay_enabled: self.settings.enabled,
            overlay_alpha: self.overlay_alpha(),
        }
    }

    /// Send the current intent.
    pub fn publish(&self) {
        self.sender.send(self.intent());
    }

    pub fn on_brightness(&mut self, reading: u8) {
        self.brightness = reading;
        debug!(
            "Brightness {reading}, overlay alpha {}%",
            self.overlay_alpha().percent()
        );
        self.publish();
    }

    pub fn toggle_enabled(&mut self, enabled: bool) {
        info!("Overlay {}", if enabled { "enabled" } else { "disabled" });
        self.settings.enabled = enabled;
        self.publish();
    }

    pub fn set_manual_alpha(&mut self, percent: u8) {
        self.settings.manual_alpha = OverlayAlpha::new(percent);
        info!("Manual alpha {percent}%");
        self.publish();
    }

    /// Nudge the manual alpha, leaving automatic mode if it was on.
    fn step_manual_alpha(&mut self, step: i8) {
        let percent = i16::from(self.settings.manual_alpha.percent()) + i16::from(step);
        self.settings.auto_adjust = false;
        self.set_manual_alpha(percent.clamp(0, i16::from(OverlayAlpha::MAX)) as u8);
    }

    pub fn set_auto_adjust(&mut self, auto_adjust: bool) {
        info!("Automatic alpha {}", if auto_adjust { "on" } else { "off" });
        self.settings.auto_adjust = auto_adjust;
        self.publish();
    }

    /// Apply an event. Returns `false` on shutdown.
    pub fn dispatch(&mut self, event: PanelEvent) -> bool {
        match event {
            PanelEvent::Brightness(reading) => self.on_brightness(reading),
            PanelEvent::ToggleOverlay => self.toggle_enabled(!self.settings.enabled),
            PanelEvent::ToggleAutoAdjust => self.set_auto_adjust(!self.settings.auto_adjust),
            PanelEvent::StepManualAlpha(step) => self.step_manual_alpha(step),
            PanelEvent::Shutdown => return false,
        }
        true
    }
}

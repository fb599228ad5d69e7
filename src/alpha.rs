//! Brightness to overlay alpha mapping

/// Highest brightness reading reported by a [`crate::brightness::BrightnessSource`].
pub(crate) const MAX_BRIGHTNESS: i32 = 255;

/// Hand tuned alpha for the darkest 56 brightness levels. Anything brighter
/// gets no overlay at all.
const ALPHA_TABLE: [u8; 56] = [
    100, 83, 70, 60, 53, 45, 40, 32, 25, 20, 18, 17, 16, 15, 13, 12, 11, 10, 9, 9, 8, 8, 7, 6, 5,
    5, 5, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1,
];

/// Overlay opacity in percent (0 is invisible, 100 fully opaque tint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct OverlayAlpha(u8);

impl OverlayAlpha {
    pub(crate) const MAX: u8 = 100;
    /// Alpha the overlay uses before anyone told it otherwise.
    pub(crate) const DEFAULT: Self = Self(64);

    /// Create, clamping to `0..=100`.
    pub(crate) fn new(percent: u8) -> Self {
        Self(percent.min(Self::MAX))
    }

    pub(crate) fn percent(self) -> u8 {
        self.0
    }

    /// Scale to the 0-255 range used by pixel formats.
    pub(crate) fn to_channel(self) -> u8 {
        ((u16::from(self.0) * 255 + 50) / 100) as u8
    }
}

impl Default for OverlayAlpha {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Map a brightness reading to an overlay alpha.
///
/// Out of range readings are clamped to `0..=255` first.
pub(crate) fn compute_alpha(brightness: i32) -> OverlayAlpha {
    let idx = brightness.clamp(0, MAX_BRIGHTNESS) as usize;
    OverlayAlpha(ALPHA_TABLE.get(idx).copied().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(b: i32) -> u8 {
        compute_alpha(b).percent()
    }

    #[test]
    fn literal_cases() {
        assert_eq!(alpha(0), 100);
        assert_eq!(alpha(10), 18);
        assert_eq!(alpha(55), 1);
        assert_eq!(alpha(56), 0);
        assert_eq!(alpha(255), 0);
        assert_eq!(alpha(-5), 100);
        assert_eq!(alpha(300), 0);
    }

    #[test]
    fn out_of_range_is_clamped() {
        for b in [i32::MIN, -1000, -1, 256, 1000, i32::MAX] {
            assert_eq!(alpha(b), alpha(b.clamp(0, 255)), "brightness {b}");
        }
    }

    #[test]
    fn non_increasing_then_zero() {
        for b in 1..=55 {
            assert!(alpha(b) <= alpha(b - 1), "increase at {b}");
        }
        assert!((56..=255).all(|b| alpha(b) == 0));
        assert!((0..=55).all(|b| alpha(b) >= 1));
    }

    #[test]
    fn overlay_alpha_clamps_and_scales() {
        assert_eq!(OverlayAlpha::new(250).percent(), 100);
        assert_eq!(OverlayAlpha::new(0).to_channel(), 0);
        assert_eq!(OverlayAlpha::new(100).to_channel(), 255);
        assert_eq!(OverlayAlpha::new(50).to_channel(), 128);
        assert_eq!(OverlayAlpha::DEFAULT.to_channel(), 163);
    }
}

//! Windowing primitives the overlay controller drives

use std::path::Path;

use log::{debug, info, warn};

/// Colour with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Argb {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Argb {
    /// `rgb` (as `0xRRGGBB`) with the given alpha channel.
    pub(crate) fn tinted(rgb: u32, a: u8) -> Self {
        Self {
            a,
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        }
    }
}

impl std::fmt::Display for Argb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.a, self.r, self.g, self.b)
    }
}

/// Size of the display in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Translucent,
}

/// How to create the overlay surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceParams {
    pub bounds: Bounds,
    /// Input passes through to whatever is below.
    pub click_through: bool,
    pub focusable: bool,
    pub format: PixelFormat,
}

impl SurfaceParams {
    /// Full screen, click-through, non-focusable, translucent.
    pub(crate) fn overlay(bounds: Bounds) -> Self {
        Self {
            bounds,
            click_through: true,
            focusable: false,
            format: PixelFormat::Translucent,
        }
    }
}

/// Display server side of the overlay.
///
/// A surface is only ever handled by one controller, so implementations do
/// not need to guard against concurrent use of the same surface.
pub(crate) trait WindowHost {
    type Surface;

    fn display_bounds(&self) -> Bounds;
    /// Create a surface. It is not shown until [`WindowHost::attach`].
    fn create_surface(&mut self, params: SurfaceParams) -> Self::Surface;
    fn attach(&mut self, surface: &mut Self::Surface);
    fn detach(&mut self, surface: &mut Self::Surface);
    fn set_fill(&mut self, surface: &mut Self::Surface, color: Argb);
    /// Destroy a (detached) surface.
    fn release(&mut self, surface: Self::Surface);
}

/// Host without a display server. Keeps the surface in memory and logs
/// what a compositor would be asked to do.
#[derive(Debug)]
pub(crate) struct HeadlessHost {
    bounds: Bounds,
}

#[derive(Debug)]
pub(crate) struct HeadlessSurface {
    params: SurfaceParams,
    fill: Option<Argb>,
    attached: bool,
}

/// Framebuffer size as reported by the kernel ("1920,1080").
pub(crate) const FB_VIRTUAL_SIZE: &str = "/sys/class/graphics/fb0/virtual_size";

/// Used when the framebuffer size is unknown.
const FALLBACK_BOUNDS: Bounds = Bounds {
    width: 1920,
    height: 1080,
};

fn parse_virtual_size(s: &str) -> Option<Bounds> {
    let (w, h) = s.trim().split_once(',')?;
    Some(Bounds {
        width: w.parse().ok()?,
        height: h.parse().ok()?,
    })
}

impl HeadlessHost {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Size the display after a framebuffer `virtual_size` file.
    pub fn from_framebuffer(path: &Path) -> Self {
        let bounds = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| parse_virtual_size(&s))
            .unwrap_or_else(|| {
                warn!(
                    "Could not read display size from {}, assuming {}x{}",
                    path.display(),
                    FALLBACK_BOUNDS.width,
                    FALLBACK_BOUNDS.height
                );
                FALLBACK_BOUNDS
            });
        Self::new(bounds)
    }
}

impl WindowHost for HeadlessHost {
    type Surface = HeadlessSurface;

    fn display_bounds(&self) -> Bounds {
        self.bounds
    }

    fn create_surface(&mut self, params: SurfaceParams) -> HeadlessSurface {
        info!("Created overlay surface {params:?}");
        HeadlessSurface {
            params,
            fill: None,
            attached: false,
        }
    }

    fn attach(&mut self, surface: &mut HeadlessSurface) {
        surface.attached = true;
        info!(
            "Overlay attached ({}x{}, fill {})",
            surface.params.bounds.width,
            surface.params.bounds.height,
            surface.fill.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
        );
    }

    fn detach(&mut self, surface: &mut HeadlessSurface) {
        surface.attached = false;
        info!("Overlay detached");
    }

    fn set_fill(&mut self, surface: &mut HeadlessSurface, color: Argb) {
        surface.fill = Some(color);
        if surface.attached {
            info!("Overlay fill {color}");
        } else {
            debug!("Overlay fill {color} (hidden)");
        }
    }

    fn release(&mut self, surface: HeadlessSurface) {
        info!("Released overlay surface (attached: {})", surface.attached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tint_splits_channels() {
        let c = Argb::tinted(0x12_34_56, 0x80);
        assert_eq!((c.a, c.r, c.g, c.b), (0x80, 0x12, 0x34, 0x56));
        assert_eq!(c.to_string(), "#80123456");
    }

    #[test]
    fn framebuffer_size() {
        assert_eq!(
            parse_virtual_size("2560,1440\n"),
            Some(Bounds {
                width: 2560,
                height: 1440
            })
        );
        assert_eq!(parse_virtual_size("2560x1440"), None);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("virtual_size");
        std::fs::write(&path, "1366,768\n").unwrap();
        assert_eq!(
            HeadlessHost::from_framebuffer(&path).display_bounds(),
            Bounds {
                width: 1366,
                height: 768
            }
        );
        assert_eq!(
            HeadlessHost::from_framebuffer(&dir.path().join("missing")).display_bounds(),
            FALLBACK_BOUNDS
        );
    }

    #[test]
    fn headless_tracks_attachment() {
        let mut host = HeadlessHost::new(Bounds {
            width: 1920,
            height: 1080,
        });
        let mut surface = host.create_surface(SurfaceParams::overlay(host.display_bounds()));
        assert!(!surface.attached);
        assert!(surface.params.click_through);
        assert!(!surface.params.focusable);
        host.set_fill(&mut surface, Argb::tinted(0xffffff, 10));
        host.attach(&mut surface);
        assert!(surface.attached);
        assert_eq!(surface.fill, Some(Argb::tinted(0xffffff, 10)));
        host.detach(&mut surface);
        assert!(!surface.attached);
        host.release(surface);
    }
}

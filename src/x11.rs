//! X11 overlay window
//!
//! A full screen override-redirect window on a 32-bit ARGB visual, with an
//! empty input shape so pointer events fall through. The fill is the window
//! background, so nothing has to be redrawn on expose. Translucency needs a
//! compositor.

use log::{debug, info, warn};
use snafu::{OptionExt, ResultExt};
use x11rb::atom_manager;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyOrIdError};
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::{
    errors::{DimmerError, X11ConnectSnafu, X11Snafu, X11UnsupportedSnafu},
    host::{Argb, Bounds, SurfaceParams, WindowHost},
};

atom_manager! {
    pub AtomCollection: AtomCollectionCookie {
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_STATE,
        _NET_WM_STATE_ABOVE,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        ATOM,
    }
}

/// Pixel value for `color` on an ARGB visual. X expects premultiplied alpha.
pub(crate) fn premultiplied_pixel(color: Argb) -> u32 {
    let mul = |c: u8| ((u16::from(c) * u16::from(color.a) + 127) / 255) as u32;
    (u32::from(color.a) << 24) | (mul(color.r) << 16) | (mul(color.g) << 8) | mul(color.b)
}

/// Connection to the X server plus what is needed to make ARGB windows.
pub(crate) struct X11Host {
    conn: RustConnection,
    root: Window,
    visual: Visualid,
    depth: u8,
    atoms: AtomCollection,
    bounds: Bounds,
}

#[derive(Debug)]
pub(crate) struct X11Surface {
    /// `None` if creating the window failed.
    window: Option<Window>,
    colormap: Colormap,
}

/// Find a 32-bit ARGB visual for transparency
fn find_argb_visual(screen: &Screen) -> Option<(Visualid, u8)> {
    screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == 32)
        .flat_map(|depth| depth.visuals.iter().map(move |v| (v, depth.depth)))
        .find(|(v, _)| v.class == VisualClass::TRUE_COLOR)
        .map(|(v, depth)| (v.visual_id, depth))
}

impl X11Host {
    /// Connect to `$DISPLAY`.
    pub fn connect() -> Result<Self, DimmerError> {
        let (conn, screen_num) = x11rb::connect(None).context(X11ConnectSnafu)?;
        let atoms = AtomCollection::new(&conn)
            .map_err(ReplyOrIdError::from)
            .context(X11Snafu)?
            .reply()
            .map_err(ReplyOrIdError::from)
            .context(X11Snafu)?;
        conn.shape_query_version()
            .map_err(ReplyOrIdError::from)
            .context(X11Snafu)?
            .reply()
            .map_err(ReplyOrIdError::from)
            .context(X11Snafu)?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let bounds = Bounds {
            width: screen.width_in_pixels.into(),
            height: screen.height_in_pixels.into(),
        };
        let (visual, depth) = find_argb_visual(screen).context(X11UnsupportedSnafu {
            what: "32-bit ARGB visual",
        })?;
        info!("Connected to X11, screen {}x{}", bounds.width, bounds.height);
        Ok(Self {
            conn,
            root,
            visual,
            depth,
            atoms,
            bounds,
        })
    }

    fn create_window(&self, params: &SurfaceParams) -> Result<X11Surface, ReplyOrIdError> {
        let colormap = self.conn.generate_id()?;
        self.conn
            .create_colormap(ColormapAlloc::NONE, colormap, self.root, self.visual)?;

        let window = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .colormap(colormap)
            .override_redirect(1);
        self.conn.create_window(
            self.depth,
            window,
            self.root,
            0,
            0,
            params.bounds.width as u16,
            params.bounds.height as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            self.visual,
            &aux,
        )?;

        // Dock: on top, no decorations, not in task lists.
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_WINDOW_TYPE,
            self.atoms.ATOM,
            &[self.atoms._NET_WM_WINDOW_TYPE_DOCK],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms._NET_WM_STATE,
            self.atoms.ATOM,
            &[
                self.atoms._NET_WM_STATE_ABOVE,
                self.atoms._NET_WM_STATE_SKIP_TASKBAR,
                self.atoms._NET_WM_STATE_SKIP_PAGER,
            ],
        )?;

        if params.click_through {
            // Empty input region
            self.conn.shape_rectangles(
                shape::SO::SET,
                shape::SK::INPUT,
                ClipOrdering::UNSORTED,
                window,
                0,
                0,
                &[],
            )?;
        }
        self.conn.flush()?;
        Ok(X11Surface {
            window: Some(window),
            colormap,
        })
    }

    /// Flush and drain whatever the server sent back. Errors for our
    /// unchecked requests arrive here.
    fn sync(&self, what: &str) {
        if let Err(err) = self.conn.flush() {
            warn!("X11 {what} failed: {err}");
        }
        while let Ok(Some(event)) = self.conn.poll_for_event() {
            debug!("X11 event after {what}: {event:?}");
        }
    }

    fn request(&self, what: &str, result: Result<impl Sized, ConnectionError>) {
        match result {
            Ok(_) => self.sync(what),
            Err(err) => warn!("X11 {what} failed: {err}"),
        }
    }
}

impl WindowHost for X11Host {
    type Surface = X11Surface;

    fn display_bounds(&self) -> Bounds {
        self.bounds
    }

    fn create_surface(&mut self, params: SurfaceParams) -> X11Surface {
        match self.create_window(&params) {
            Ok(surface) => {
                debug!("Created X11 overlay window {:?}", surface.window);
                surface
            }
            Err(err) => {
                warn!("Could not create X11 overlay window: {err}");
                X11Surface {
                    window: None,
                    colormap: x11rb::NONE,
                }
            }
        }
    }

    fn attach(&mut self, surface: &mut X11Surface) {
        if let Some(window) = surface.window {
            self.request("map", self.conn.map_window(window));
        }
    }

    fn detach(&mut self, surface: &mut X11Surface) {
        if let Some(window) = surface.window {
            self.request("unmap", self.conn.unmap_window(window));
        }
    }

    fn set_fill(&mut self, surface: &mut X11Surface, color: Argb) {
        let Some(window) = surface.window else {
            return;
        };
        let aux = ChangeWindowAttributesAux::new().background_pixel(premultiplied_pixel(color));
        self.request(
            "background change",
            self.conn.change_window_attributes(window, &aux),
        );
        // Repaint with the new background.
        self.request("clear", self.conn.clear_area(false, window, 0, 0, 0, 0));
    }

    fn release(&mut self, surface: X11Surface) {
        if let Some(window) = surface.window {
            self.request("destroy", self.conn.destroy_window(window));
            self.request("colormap free", self.conn.free_colormap(surface.colormap));
        }
    }
}

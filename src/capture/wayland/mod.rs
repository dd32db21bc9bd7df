//! Wayland backend
//!
//! Screenshots come from wlr-screencopy when the compositor offers it.
//! Fullscreening the overlay goes through whichever compositor control
//! socket is available (Sway first, then Hyprland). There is no portable way
//! to read the cursor image or the window list, so both are left to the
//! generic path.

pub mod composite;
pub mod grab_buffer;
pub mod screencopy;

use wayland_client::Connection;

use self::screencopy::ScreencopyGrabber;
use super::{
    compositor::{Hyprland, Sway},
    image_buffer::CaptureImage,
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendType, Geometry},
};

/// Wayland display-server backend
#[derive(Debug)]
pub struct WaylandBackend {
    grabber:  Option<ScreencopyGrabber>,
    sway:     Option<Sway>,
    hyprland: Option<Hyprland>,
}

impl WaylandBackend {
    /// Connects to `$WAYLAND_DISPLAY` and sets up what the compositor offers.
    ///
    /// A compositor without screencopy still yields a backend; its
    /// screenshots then report [`CaptureError::CapabilityAbsent`].
    pub fn connect() -> CaptureResult<Self> {
        let conn = Connection::connect_to_env().map_err(|e| {
            tracing::debug!("Failed to connect to Wayland: {}", e);
            CaptureError::BackendNotAvailable {
                backend: BackendType::Wayland,
            }
        })?;
        tracing::debug!("Wayland connection established");

        let grabber = match ScreencopyGrabber::init(&conn) {
            Ok(grabber) => Some(grabber),
            Err(e) => {
                tracing::warn!("wlr-screencopy unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            grabber,
            sway: Sway::create(),
            hyprland: Hyprland::create(),
        })
    }

    /// Union of all outputs' logical rectangles
    pub fn virtual_desktop(&self) -> CaptureResult<Geometry> {
        self.grabber
            .as_ref()
            .ok_or_else(|| CaptureError::absent("zwlr_screencopy_manager_v1"))?
            .virtual_desktop()
    }

    /// Composites every output into a `geometry`-sized image
    pub fn screenshot(&mut self, geometry: Geometry) -> CaptureResult<CaptureImage> {
        match self.grabber.as_mut() {
            Some(grabber) => grabber.grab(geometry),
            None => {
                tracing::warn!("Unable to get wayland screenshot");
                Err(CaptureError::absent("zwlr_screencopy_manager_v1"))
            }
        }
    }

    /// Asks the running compositor to fullscreen the overlay window.
    ///
    /// Does nothing when neither Sway nor Hyprland is running.
    pub fn request_fullscreen(&self) -> CaptureResult<()> {
        if let Some(sway) = &self.sway {
            return sway.fullscreen();
        }
        if let Some(hyprland) = &self.hyprland {
            return hyprland.fullscreen();
        }
        tracing::debug!("No compositor control socket, leaving fullscreen to the toolkit");
        Ok(())
    }
}

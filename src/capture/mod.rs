//! Capture backends and the platform facade
//!
//! This module provides the display-server abstraction used by the capture
//! overlay. It includes:
//!
//! - [`Platform`]: the five operations the overlay needs, plus diagnostics
//! - [`Backend`]: the backend bound for the process, chosen once by [`probe`]
//! - Native backends for X11 (MIT-SHM, XFIXES, window tree) and Wayland
//!   (wlr-screencopy, compositor control sockets)
//! - [`GenericBackend`], which also serves as the fallback for every failed
//!   native operation

pub mod constants;
pub mod generic;
pub mod image_buffer;

#[cfg(all(target_os = "linux", feature = "wayland"))]
pub mod compositor;

#[cfg(all(target_os = "linux", feature = "wayland"))]
pub mod wayland;

#[cfg(all(target_os = "linux", feature = "x11"))]
pub mod x11;

use std::env;

pub use generic::GenericBackend;
pub use image_buffer::{CaptureImage, CursorImage, MappedPixels, PixelFormat};
#[cfg(all(target_os = "linux", feature = "wayland"))]
pub use wayland::WaylandBackend;
#[cfg(all(target_os = "linux", feature = "x11"))]
pub use x11::X11Backend;

use crate::{
    error::CaptureResult,
    model::{BackendType, Geometry, OpenWindowInfo, PlatformInfo},
    util::detect::{DisplayEnvironment, detect_display_environment},
};

/// Display-server operations needed by the capture overlay
///
/// None of the operations fail: when the native path does not work the
/// implementation logs why and substitutes the generic result, so the
/// overlay always has something to show.
///
/// # Examples
///
/// ```rust,no_run
/// use sharks_platform::{
///     capture::{Platform, probe},
///     model::Geometry,
/// };
///
/// let mut platform = probe();
/// let desktop = platform
///     .virtual_desktop()
///     .unwrap_or(Geometry::new(0, 0, 1920, 1080));
///
/// platform.request_fullscreen();
/// let shot = platform.screenshot(desktop);
/// assert_eq!(shot.dimensions(), (desktop.width, desktop.height));
/// ```
pub trait Platform {
    /// Captures `geometry` of the virtual desktop.
    ///
    /// The image is straight RGBA and exactly `geometry.width` by
    /// `geometry.height` pixels.
    fn screenshot(&mut self, geometry: Geometry) -> CaptureImage;

    /// Current cursor bitmap and hotspot, empty when unavailable
    fn cursor_image(&mut self) -> CursorImage;

    /// Visible top-level windows the user can snap a selection to.
    ///
    /// Empty on backends that cannot enumerate windows.
    fn open_windows(&mut self) -> Vec<OpenWindowInfo>;

    /// Asks the window manager to make the overlay cover every output.
    ///
    /// A no-op where the toolkit handles fullscreen by itself.
    fn request_fullscreen(&mut self);

    /// True when bound to a Wayland compositor
    fn is_wayland(&self) -> bool;

    /// Bounding box of all outputs, when the backend knows it
    fn virtual_desktop(&self) -> Option<Geometry>;

    /// Which backend is bound
    fn backend_type(&self) -> BackendType;

    /// OS and backend, for diagnostics
    fn platform_info(&self) -> PlatformInfo {
        PlatformInfo::new(env::consts::OS.to_string(), self.backend_type())
    }
}

/// The backend bound for the lifetime of the process
#[derive(Debug)]
pub enum Backend {
    Generic(GenericBackend),
    #[cfg(all(target_os = "linux", feature = "x11"))]
    X11(X11Backend),
    #[cfg(all(target_os = "linux", feature = "wayland"))]
    Wayland(WaylandBackend),
}

/// Binds the first backend that connects, trying candidates in the order
/// the session environment suggests and ending with the generic one.
pub fn probe() -> Backend {
    probe_with(&detect_display_environment())
}

/// Same as [`probe`] for an already detected environment
pub fn probe_with(environment: &DisplayEnvironment) -> Backend {
    for candidate in environment.candidates() {
        match connect(candidate) {
            Some(backend) => {
                tracing::debug!("Bound {} backend", candidate);
                return backend;
            }
            None => tracing::debug!("{} backend unavailable, trying the next one", candidate),
        }
    }
    Backend::Generic(GenericBackend::new())
}

fn connect(backend: BackendType) -> Option<Backend> {
    match backend {
        BackendType::Generic => Some(Backend::Generic(GenericBackend::new())),
        #[cfg(all(target_os = "linux", feature = "x11"))]
        BackendType::X11 => X11Backend::connect()
            .map(Backend::X11)
            .map_err(|e| tracing::warn!("X11 backend: {} ({})", e, e.remediation_hint()))
            .ok(),
        #[cfg(all(target_os = "linux", feature = "wayland"))]
        BackendType::Wayland => WaylandBackend::connect()
            .map(Backend::Wayland)
            .map_err(|e| tracing::warn!("Wayland backend: {} ({})", e, e.remediation_hint()))
            .ok(),
        #[allow(unreachable_patterns)]
        other => {
            tracing::debug!("{} support is not compiled in", other);
            None
        }
    }
}

impl Backend {
    fn generic(&self) -> GenericBackend {
        match self {
            Backend::Generic(generic) => *generic,
            #[allow(unreachable_patterns)]
            _ => GenericBackend::new(),
        }
    }
}

/// Takes the native image, or the generic grab when there is none, and
/// returns it as straight RGBA of exactly `geometry`'s size.
fn settle_screenshot(
    native: Option<CaptureResult<CaptureImage>>,
    generic: GenericBackend,
    geometry: Geometry,
) -> CaptureImage {
    let image = match native {
        Some(Ok(image)) => image,
        Some(Err(e)) => {
            tracing::warn!(
                category = ?e.category(),
                "Native screenshot failed, using generic grab: {}",
                e
            );
            generic.screenshot(geometry)
        }
        None => generic.screenshot(geometry),
    };

    image.into_canonical().fit_to(geometry.width, geometry.height)
}

impl Platform for Backend {
    fn screenshot(&mut self, geometry: Geometry) -> CaptureImage {
        let native = match self {
            Backend::Generic(_) => None,
            #[cfg(all(target_os = "linux", feature = "x11"))]
            Backend::X11(x11) => Some(x11.screenshot(geometry).or_else(|e| {
                tracing::warn!(category = ?e.category(), "MIT-SHM grab failed, using GetImage: {}", e);
                x11.screenshot_core(geometry)
            })),
            #[cfg(all(target_os = "linux", feature = "wayland"))]
            Backend::Wayland(wayland) => Some(wayland.screenshot(geometry)),
        };

        settle_screenshot(native, self.generic(), geometry)
    }

    fn cursor_image(&mut self) -> CursorImage {
        let cursor = match self {
            #[cfg(all(target_os = "linux", feature = "x11"))]
            Backend::X11(x11) => x11.cursor_image().unwrap_or_else(|e| {
                tracing::warn!(category = ?e.category(), "XFIXES cursor failed, using generic cursor: {}", e);
                GenericBackend::new().cursor_image()
            }),
            #[allow(unreachable_patterns)]
            _ => self.generic().cursor_image(),
        };
        cursor.into_canonical()
    }

    fn open_windows(&mut self) -> Vec<OpenWindowInfo> {
        match self {
            #[cfg(all(target_os = "linux", feature = "x11"))]
            Backend::X11(x11) => x11.open_windows().unwrap_or_else(|e| {
                tracing::warn!(category = ?e.category(), "Window enumeration failed: {}", e);
                Vec::new()
            }),
            #[allow(unreachable_patterns)]
            _ => Vec::new(),
        }
    }

    fn request_fullscreen(&mut self) {
        match self {
            #[cfg(all(target_os = "linux", feature = "wayland"))]
            Backend::Wayland(wayland) => {
                if let Err(e) = wayland.request_fullscreen() {
                    tracing::warn!(category = ?e.category(), "Compositor fullscreen request failed: {}", e);
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }

    fn is_wayland(&self) -> bool {
        self.backend_type() == BackendType::Wayland
    }

    fn virtual_desktop(&self) -> Option<Geometry> {
        let native = match self {
            Backend::Generic(_) => None,
            #[cfg(all(target_os = "linux", feature = "x11"))]
            Backend::X11(x11) => Some(x11.virtual_desktop()),
            #[cfg(all(target_os = "linux", feature = "wayland"))]
            Backend::Wayland(wayland) => Some(wayland.virtual_desktop()),
        };

        match native {
            Some(Ok(desktop)) => Some(desktop),
            Some(Err(e)) => {
                tracing::debug!("Native desktop geometry unavailable: {}", e);
                self.generic().virtual_desktop()
            }
            None => self.generic().virtual_desktop(),
        }
    }

    fn backend_type(&self) -> BackendType {
        match self {
            Backend::Generic(_) => BackendType::Generic,
            #[cfg(all(target_os = "linux", feature = "x11"))]
            Backend::X11(_) => BackendType::X11,
            #[cfg(all(target_os = "linux", feature = "wayland"))]
            Backend::Wayland(_) => BackendType::Wayland,
        }
    }
}

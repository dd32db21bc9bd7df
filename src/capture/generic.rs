//! Generic backend, also the fallback for every failed native operation
//!
//! With the `xcap-fallback` feature the screenshot is a real grab of every
//! monitor painted at its position. Without it the caller gets a transparent
//! canvas of the requested size, which keeps the selection UI usable.
//! On X11 the facade only ends up here after both MIT-SHM and core
//! `GetImage` have failed.

use crate::{
    capture::image_buffer::{CaptureImage, CursorImage},
    model::Geometry,
};

/// Best-effort backend with no display-server negotiation
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericBackend;

impl GenericBackend {
    pub fn new() -> Self {
        Self
    }

    /// Monitor layout, when it can be queried
    pub fn virtual_desktop(&self) -> Option<Geometry> {
        #[cfg(feature = "xcap-fallback")]
        {
            match xcap::Monitor::all() {
                Ok(monitors) => {
                    let rects: Vec<Geometry> =
                        monitors.iter().filter_map(|m| monitor_geometry(m).ok()).collect();
                    return Geometry::bounding(&rects);
                }
                Err(e) => tracing::warn!("Failed to enumerate monitors: {}", e),
            }
        }
        None
    }

    /// Whole-desktop grab clipped to `geometry`.
    ///
    /// Never fails; areas that could not be read stay transparent.
    pub fn screenshot(&self, geometry: Geometry) -> CaptureImage {
        #[cfg(feature = "xcap-fallback")]
        {
            match grab_monitors(geometry) {
                Ok(image) => return CaptureImage::from_rgba(image),
                Err(e) => tracing::warn!("Generic screen grab failed: {}", e),
            }
        }
        #[cfg(not(feature = "xcap-fallback"))]
        tracing::warn!("No generic screen grabber compiled in, returning a blank {}", geometry);

        CaptureImage::blank(geometry.width, geometry.height)
    }

    /// There is no portable cursor source, so this is always empty
    pub fn cursor_image(&self) -> CursorImage {
        tracing::warn!("unable to get cursor image");
        CursorImage::empty()
    }
}

#[cfg(feature = "xcap-fallback")]
fn monitor_geometry(monitor: &xcap::Monitor) -> xcap::XCapResult<Geometry> {
    Ok(Geometry::new(monitor.x()?, monitor.y()?, monitor.width()?, monitor.height()?))
}

#[cfg(feature = "xcap-fallback")]
fn grab_monitors(geometry: Geometry) -> xcap::XCapResult<image::RgbaImage> {
    use image::imageops;

    let mut canvas = image::RgbaImage::new(geometry.width, geometry.height);
    for monitor in xcap::Monitor::all()? {
        let placement = monitor_geometry(&monitor)?;
        if !placement.intersects(&geometry) {
            continue;
        }
        let shot = monitor.capture_image()?;
        imageops::replace(
            &mut canvas,
            &shot,
            i64::from(placement.x) - i64::from(geometry.x),
            i64::from(placement.y) - i64::from(geometry.y),
        );
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_is_empty() {
        let cursor = GenericBackend::new().cursor_image();
        assert!(cursor.is_empty());
        assert_eq!(cursor.hotspot().x, 0);
    }

    #[cfg(not(feature = "xcap-fallback"))]
    #[test]
    fn test_screenshot_without_grabber_is_blank_and_sized() {
        let image = GenericBackend::new().screenshot(Geometry::new(-5, 10, 64, 48));
        assert_eq!(image.dimensions(), (64, 48));
        assert_eq!(image.pixel(0, 0), Some([0, 0, 0, 0]));
    }

    #[cfg(not(feature = "xcap-fallback"))]
    #[test]
    fn test_virtual_desktop_unknown_without_grabber() {
        assert_eq!(GenericBackend::new().virtual_desktop(), None);
    }
}

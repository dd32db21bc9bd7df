//! Platform facade tests
//!
//! These run without any display server: every probe here ends on the
//! generic backend, which must still honour the facade's guarantees.

use sharks_platform::{
    capture::{Backend, GenericBackend, PixelFormat, Platform, probe, probe_with},
    model::{BackendType, Geometry},
    util::detect::{DisplayEnvironment, detect_display_environment_with_env},
};

fn generic() -> Backend {
    Backend::Generic(GenericBackend::new())
}

#[test]
fn test_override_forces_generic_probe() {
    temp_env::with_var("SHARKS_DISPLAY_BACKEND", Some("generic"), || {
        let platform = probe();
        assert_eq!(platform.backend_type(), BackendType::Generic);
        assert!(!platform.is_wayland());
    });
}

#[test]
fn test_unreachable_wayland_display_falls_back_to_generic() {
    let runtime_dir = tempfile::tempdir().unwrap();
    let runtime_dir = runtime_dir.path().to_string_lossy().into_owned();

    temp_env::with_vars(
        [
            ("WAYLAND_DISPLAY", Some("sharks-no-such-socket")),
            ("XDG_RUNTIME_DIR", Some(runtime_dir.as_str())),
        ],
        || {
            let env = DisplayEnvironment {
                x11_display:     false,
                wayland_display: true,
                forced:          Some(BackendType::Wayland),
            };
            assert_eq!(probe_with(&env).backend_type(), BackendType::Generic);
        },
    );
}

#[test]
fn test_detected_environment_drives_candidates() {
    let env = detect_display_environment_with_env(|key| match key {
        "WAYLAND_DISPLAY" => Some("wayland-1".to_string()),
        "DISPLAY" => Some(":0".to_string()),
        _ => None,
    });
    assert_eq!(env.candidates(), vec![BackendType::Wayland, BackendType::Generic]);
}

#[cfg(not(feature = "xcap-fallback"))]
#[test]
fn test_screenshot_has_exactly_requested_size() {
    let mut platform = generic();

    for geometry in [
        Geometry::new(0, 0, 1920, 1080),
        Geometry::new(1920, 0, 1280, 1024),
        Geometry::new(-300, -200, 1, 1),
    ] {
        let image = platform.screenshot(geometry);
        assert_eq!(image.dimensions(), (geometry.width, geometry.height));
        assert_eq!(image.format(), PixelFormat::Rgba);
    }
}

#[test]
fn test_request_fullscreen_without_compositor_is_noop() {
    temp_env::with_vars_unset(
        ["SWAYSOCK", "HYPRLAND_INSTANCE_SIGNATURE"],
        || {
            let mut platform = generic();
            platform.request_fullscreen();
            platform.request_fullscreen();
        },
    );
}

#[test]
fn test_generic_has_no_windows_or_cursor() {
    let mut platform = generic();
    assert!(platform.open_windows().is_empty());

    let cursor = platform.cursor_image();
    assert!(cursor.is_empty());
    assert_eq!((cursor.hotspot().x, cursor.hotspot().y), (0, 0));
}

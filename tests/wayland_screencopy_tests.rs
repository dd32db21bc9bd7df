//! wlr-screencopy grabber against an in-process compositor
//!
//! The compositor in `common::fake_compositor` answers over a socket pair,
//! so these tests need no running Wayland session.

#![cfg(all(target_os = "linux", feature = "wayland"))]

mod common;

use std::{
    os::unix::net::{UnixListener, UnixStream},
    thread::JoinHandle,
};

use common::fake_compositor::{FakeCompositor, FakeOutput, RequestLog};
use sharks_platform::{
    capture::{Platform, probe_with, wayland::screencopy::ScreencopyGrabber},
    error::CaptureError,
    model::{BackendType, Geometry},
    util::detect::DisplayEnvironment,
};
use wayland_client::Connection;

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 0xFF];
const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

fn connect(compositor: FakeCompositor) -> (Connection, JoinHandle<RequestLog>) {
    let (client, server) = UnixStream::pair().unwrap();
    let handle = compositor.spawn(server);
    (Connection::from_socket(client).unwrap(), handle)
}

#[test]
fn test_init_without_outputs_fails_and_destroys_managers() {
    let (conn, compositor) = connect(FakeCompositor::new(Vec::new()));

    let err = ScreencopyGrabber::init(&conn).unwrap_err();
    assert!(matches!(err, CaptureError::NoOutputs));

    drop(conn);
    let requests = compositor.join().unwrap();
    // zwlr_screencopy_manager_v1.destroy and zxdg_output_manager_v1.destroy
    assert_eq!(requests.count("zwlr_screencopy_manager_v1", 2), 1);
    assert_eq!(requests.count("zxdg_output_manager_v1", 0), 1);
}

#[test]
fn test_init_without_screencopy_releases_bound_objects() {
    let compositor = FakeCompositor::new(vec![FakeOutput::at(0, 0, 4, 4)]).without_screencopy();
    let (conn, compositor) = connect(compositor);

    let err = ScreencopyGrabber::init(&conn).unwrap_err();
    assert!(
        matches!(&err, CaptureError::CapabilityAbsent { capability } if capability == "zwlr_screencopy_manager_v1")
    );

    drop(conn);
    let requests = compositor.join().unwrap();
    assert_eq!(requests.count("zxdg_output_manager_v1", 0), 1);
    // wl_output.release for the output bound at v3
    assert_eq!(requests.count("wl_output", 0), 1);
}

#[test]
fn test_grab_composites_every_output() {
    let outputs = vec![FakeOutput::at(0, 0, 4, 4), FakeOutput::at(4, 0, 4, 4)];
    let (conn, compositor) = connect(FakeCompositor::new(outputs));

    let mut grabber = ScreencopyGrabber::init(&conn).unwrap();
    assert_eq!(grabber.virtual_desktop().unwrap(), Geometry::new(0, 0, 8, 4));

    // two pixels wider than the desktop, so the last column stays empty
    let image = grabber.grab(Geometry::new(0, 0, 10, 4)).unwrap();
    assert_eq!(image.dimensions(), (10, 4));
    assert_eq!(image.pixel(0, 0), Some(OPAQUE_BLACK));
    assert_eq!(image.pixel(7, 3), Some(OPAQUE_BLACK));
    assert_eq!(image.pixel(9, 0), Some(TRANSPARENT));

    drop(grabber);
    drop(conn);
    let requests = compositor.join().unwrap();
    assert_eq!(requests.count("zwlr_screencopy_frame_v1", 0), 2);
    assert_eq!(requests.count("wl_output", 0), 2);
}

#[test]
fn test_output_removed_mid_grab_does_not_stall() {
    let outputs = vec![
        FakeOutput::at(0, 0, 4, 4),
        FakeOutput::at(4, 0, 4, 4).unplugged_on_capture(),
    ];
    let (conn, compositor) = connect(FakeCompositor::new(outputs));

    let mut grabber = ScreencopyGrabber::init(&conn).unwrap();
    let image = grabber.grab(Geometry::new(0, 0, 8, 4)).unwrap();

    assert_eq!(image.pixel(1, 1), Some(OPAQUE_BLACK));
    assert_eq!(image.pixel(5, 1), Some(TRANSPARENT));
    assert_eq!(grabber.virtual_desktop().unwrap(), Geometry::new(0, 0, 4, 4));

    drop(grabber);
    drop(conn);
    compositor.join().unwrap();
}

#[test]
fn test_facade_falls_back_when_compositor_has_no_outputs() {
    let runtime_dir = tempfile::tempdir().unwrap();
    let listener = UnixListener::bind(runtime_dir.path().join("wayland-sharks-test")).unwrap();
    let compositor = FakeCompositor::new(Vec::new()).listen(listener);
    let runtime_path = runtime_dir.path().to_string_lossy().into_owned();

    temp_env::with_vars(
        [
            ("WAYLAND_DISPLAY", Some("wayland-sharks-test")),
            ("XDG_RUNTIME_DIR", Some(runtime_path.as_str())),
            ("WAYLAND_SOCKET", None),
            ("SWAYSOCK", None),
            ("HYPRLAND_INSTANCE_SIGNATURE", None),
        ],
        || {
            let env = DisplayEnvironment {
                x11_display:     false,
                wayland_display: true,
                forced:          Some(BackendType::Wayland),
            };
            let mut platform = probe_with(&env);
            assert_eq!(platform.backend_type(), BackendType::Wayland);
            assert!(platform.is_wayland());

            let image = platform.screenshot(Geometry::new(0, 0, 16, 9));
            assert_eq!(image.dimensions(), (16, 9));
            assert!(platform.cursor_image().is_empty());
            assert!(platform.open_windows().is_empty());
            platform.request_fullscreen();
        },
    );

    compositor.join().unwrap();
}

//! sharks-platform: display-server access for the Sharks capture overlay
//!
//! Negotiates with X11 (MIT-SHM, XFIXES) and wlroots-style Wayland
//! compositors (wlr-screencopy, Sway and Hyprland IPC) to provide a
//! screenshot of the virtual desktop, the cursor image, the list of
//! selectable windows and a way to fullscreen the overlay. A generic
//! best-effort backend covers everything else.

pub mod capture;
pub mod error;
pub mod model;
pub mod util;

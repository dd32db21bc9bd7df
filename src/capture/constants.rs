//! Tuning constants for capture and compositor IPC.
//!
//! # Runtime Configuration
//!
//! Timing values can be overridden at runtime via environment variables:
//!
//! | Environment Variable | Default | Description |
//! |---------------------|---------|-------------|
//! | `SHARKS_HYPRLAND_SETTLE_MS` | 100 | Delay before the Hyprland batch is sent |
//! | `SHARKS_IPC_REPLY_TIMEOUT_MS` | 1000 | Max wait for a compositor reply |
//!
//! Unparsable values are ignored and the default is used.

use std::time::Duration;

/// Delay before sending the Hyprland dispatch batch.
///
/// Hyprland applies `setfloating` to the window that exists when the command
/// arrives. The overlay window is mapped asynchronously by the toolkit, so a
/// short settle gives the compositor time to see it.
pub const HYPRLAND_SETTLE_MS: u64 = 100;

/// Upper bound on waiting for a compositor to start replying.
///
/// Both Sway and Hyprland answer within a frame; a silent peer should not
/// freeze the overlay.
pub const IPC_REPLY_TIMEOUT_MS: u64 = 1000;

/// Root window depths the SHM path understands (4 bytes per pixel).
pub const SUPPORTED_X11_DEPTHS: [u8; 2] = [24, 32];

/// Bytes per pixel of every SHM transfer.
pub const BYTES_PER_PIXEL: usize = 4;

/// Window title the overlay uses; Sway matches it in `for_window`.
pub const OVERLAY_TITLE: &str = "Sharks";

// =============================================================================
// Environment Variable Overrides
// =============================================================================

/// Helper to get a duration from environment variable or fall back to default.
fn get_ms_from_env(env_var: &str, default: u64) -> u64 {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Hyprland settle delay, checking `SHARKS_HYPRLAND_SETTLE_MS`.
pub fn hyprland_settle_ms() -> u64 {
    get_ms_from_env("SHARKS_HYPRLAND_SETTLE_MS", HYPRLAND_SETTLE_MS)
}

/// IPC reply timeout, checking `SHARKS_IPC_REPLY_TIMEOUT_MS`.
///
/// # Example
///
/// ```bash
/// # Give a busy compositor more time
/// export SHARKS_IPC_REPLY_TIMEOUT_MS=3000
/// ```
pub fn ipc_reply_timeout_ms() -> u64 {
    get_ms_from_env("SHARKS_IPC_REPLY_TIMEOUT_MS", IPC_REPLY_TIMEOUT_MS)
}

/// [`hyprland_settle_ms`] as a [`Duration`]
pub fn hyprland_settle() -> Duration {
    Duration::from_millis(hyprland_settle_ms())
}

/// [`ipc_reply_timeout_ms`] as a [`Duration`]; zero becomes one millisecond
/// because a zero read timeout is rejected by the socket layer.
pub fn ipc_reply_timeout() -> Duration {
    Duration::from_millis(ipc_reply_timeout_ms().max(1))
}

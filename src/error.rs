//! Error types for screenshot acquisition
//!
//! Every failure in the platform layer is recoverable: the facade logs it and
//! falls back to a cheaper strategy. Errors still carry enough context (atom
//! name, pixel format value, error code) to diagnose a compositor
//! incompatibility after the fact.

use serde::{Deserialize, Serialize};

use crate::model::{BackendType, Geometry};

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// How the facade reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A global, extension or environment variable is missing; the feature
    /// is simply not constructed
    CapabilityAbsent,
    /// A round trip returned an error; the current operation falls back
    Negotiation,
    /// One window or one output failed; the batch continues without it
    Partial,
}

/// Error type for screenshot acquisition
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Display server connection could not be established
    #[error("Backend {backend} is not available")]
    BackendNotAvailable {
        /// Backend that could not connect
        backend: BackendType,
    },

    /// A required protocol global, extension or environment variable is missing
    #[error("Required capability '{capability}' is absent")]
    CapabilityAbsent {
        /// Name of the missing global, extension or variable
        capability: String,
    },

    /// A protocol request returned an error reply or the round trip failed
    #[error("{operation} failed: {reason}")]
    Negotiation {
        /// Request or step that failed
        operation: &'static str,
        /// Error code or message reported by the peer
        reason:    String,
    },

    /// X11 color depth the SHM path cannot handle
    #[error("Unsupported color depth {depth} bpp")]
    UnsupportedDepth {
        /// Depth reported by the server
        depth: u8,
    },

    /// Compositor offered a wl_shm pixel format outside the allow-list
    #[error("Unsupported pixel format 0x{format:08x}")]
    UnsupportedPixelFormat {
        /// Raw wl_shm format value
        format: u32,
    },

    /// Wayland registry did not advertise any output
    #[error("No outputs bound")]
    NoOutputs,

    /// Capture rectangle cannot be grabbed
    #[error("Invalid geometry {geometry}: {reason}")]
    InvalidGeometry {
        /// The rejected rectangle
        geometry: Geometry,
        /// Why it was rejected
        reason:   String,
    },

    /// I/O error from a socket, memfd, mmap or shared-memory syscall
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CaptureError {
    /// Builds a [`CaptureError::Negotiation`] from any displayable error.
    pub fn negotiation(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        CaptureError::Negotiation {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Builds a [`CaptureError::CapabilityAbsent`].
    pub fn absent(capability: impl Into<String>) -> Self {
        CaptureError::CapabilityAbsent {
            capability: capability.into(),
        }
    }

    /// Maps the error onto the fallback taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaptureError::BackendNotAvailable { .. }
            | CaptureError::CapabilityAbsent { .. }
            | CaptureError::NoOutputs => ErrorCategory::CapabilityAbsent,
            CaptureError::UnsupportedPixelFormat { .. } => ErrorCategory::Partial,
            CaptureError::Negotiation { .. }
            | CaptureError::UnsupportedDepth { .. }
            | CaptureError::InvalidGeometry { .. }
            | CaptureError::IoError(_) => ErrorCategory::Negotiation,
        }
    }

    /// Returns an actionable remediation hint for this error
    pub fn remediation_hint(&self) -> &str {
        match self {
            CaptureError::BackendNotAvailable { backend } => match backend {
                BackendType::X11 => {
                    "X11 backend not available. Ensure DISPLAY points at a running X server and \
                     the client is authorized (xauth / xhost)."
                }
                BackendType::Wayland => {
                    "Wayland backend not available. Ensure WAYLAND_DISPLAY is set and the \
                     compositor socket is reachable."
                }
                BackendType::Generic => "The generic backend is always available.",
            },
            CaptureError::CapabilityAbsent { capability } => {
                if capability.contains("screencopy") {
                    "The compositor does not implement wlr-screencopy. Only wlroots-based \
                     compositors (Sway, Hyprland, river, ...) support direct capture."
                } else if capability.contains("MIT-SHM") {
                    "The X server lacks the MIT-SHM extension or runs on another host. Capture \
                     falls back to the slow path."
                } else {
                    "A required protocol global or environment variable is missing. The feature \
                     is disabled for this session."
                }
            }
            CaptureError::Negotiation { .. } => {
                "A protocol round trip failed. Run with RUST_LOG=sharks_platform=debug to see \
                 the failing request and error code."
            }
            CaptureError::UnsupportedDepth { .. } => {
                "Only 24 and 32 bpp root windows support shared-memory capture. Reconfigure the \
                 X server depth or accept the fallback grab."
            }
            CaptureError::UnsupportedPixelFormat { .. } => {
                "The compositor offered a pixel format outside XRGB8888/RGB888/BGR888. The \
                 affected monitor is left blank."
            }
            CaptureError::NoOutputs => {
                "The compositor advertised no outputs. Check that at least one monitor is \
                 enabled."
            }
            CaptureError::InvalidGeometry { .. } => {
                "The capture rectangle must have a positive width and height that fit the \
                 protocol limits (65535 pixels per side)."
            }
            CaptureError::IoError(_) => {
                "An I/O error occurred. Check /dev/shm space, shared-memory limits (kernel.shmmax) \
                 and socket permissions."
            }
        }
    }
}

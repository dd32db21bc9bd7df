//! Display environment detection for backend probing
//!
//! Decides which native backends are worth trying, and in which order, from
//! the session environment. Nothing here opens a connection: the probe in
//! [`crate::capture::probe`] does that for each candidate in turn.

use std::env;

use tracing::warn;

use crate::model::{BackendType, PlatformInfo};

/// Environment variable forcing a particular backend
pub const BACKEND_OVERRIDE_VAR: &str = "SHARKS_DISPLAY_BACKEND";

/// What the session environment says about available display servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayEnvironment {
    /// An X11 display is the session's display
    pub x11_display:     bool,
    /// A Wayland compositor socket is advertised
    pub wayland_display: bool,
    /// Backend forced through [`BACKEND_OVERRIDE_VAR`]
    pub forced:          Option<BackendType>,
}

impl DisplayEnvironment {
    /// Backends to try, in order. Always ends with [`BackendType::Generic`].
    pub fn candidates(&self) -> Vec<BackendType> {
        let mut order = Vec::with_capacity(3);

        match self.forced {
            Some(BackendType::Generic) => {}
            Some(forced) => order.push(forced),
            None => {
                if self.x11_display {
                    order.push(BackendType::X11);
                }
                if self.wayland_display {
                    order.push(BackendType::Wayland);
                }
            }
        }

        order.push(BackendType::Generic);
        order
    }

    /// The first backend the probe will try
    pub fn preferred(&self) -> BackendType {
        self.candidates()
            .first()
            .copied()
            .unwrap_or(BackendType::Generic)
    }
}

/// Reads the display environment of the current process
///
/// # Examples
///
/// ```
/// use sharks_platform::{model::BackendType, util::detect::detect_display_environment};
///
/// let env = detect_display_environment();
/// assert_eq!(env.candidates().last(), Some(&BackendType::Generic));
/// ```
pub fn detect_display_environment() -> DisplayEnvironment {
    detect_display_environment_with_env(|key| env::var(key).ok())
}

/// Detection with a custom environment variable provider
///
/// This allows for easier testing by injecting mock environment variables.
pub fn detect_display_environment_with_env<F>(env_provider: F) -> DisplayEnvironment
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| env_provider(key).filter(|v| !v.is_empty());

    let wayland_display = non_empty("WAYLAND_DISPLAY").is_some();
    // With both set the toolkit runs on Wayland, so XWayland's DISPLAY does
    // not make X11 the session display.
    let x11_display = non_empty("DISPLAY").is_some() && !wayland_display;

    let forced = non_empty(BACKEND_OVERRIDE_VAR).and_then(|value| {
        value
            .parse::<BackendType>()
            .map_err(|e| warn!("Ignoring {BACKEND_OVERRIDE_VAR}: {e}"))
            .ok()
    });

    DisplayEnvironment {
        x11_display,
        wayland_display,
        forced,
    }
}

/// Detects the current platform and the preferred display backend
///
/// The backend reported here is the first probe candidate; the backend
/// actually bound may differ if its connection fails.
pub fn detect_platform() -> PlatformInfo {
    PlatformInfo::new(env::consts::OS.to_string(), detect_display_environment().preferred())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Helper function to create a mock environment provider
    fn mock_env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_detect_x11_only() {
        let env = detect_display_environment_with_env(mock_env(&[("DISPLAY", ":0")]));

        assert!(env.x11_display);
        assert!(!env.wayland_display);
        assert_eq!(env.candidates(), vec![BackendType::X11, BackendType::Generic]);
    }

    #[test]
    fn test_detect_wayland_only() {
        let env = detect_display_environment_with_env(mock_env(&[("WAYLAND_DISPLAY", "wayland-1")]));

        assert_eq!(env.candidates(), vec![BackendType::Wayland, BackendType::Generic]);
        assert_eq!(env.preferred(), BackendType::Wayland);
    }

    #[test]
    fn test_xwayland_display_is_not_x11_session() {
        let env = detect_display_environment_with_env(mock_env(&[
            ("WAYLAND_DISPLAY", "wayland-0"),
            ("DISPLAY", ":1"),
        ]));

        assert!(!env.x11_display);
        assert_eq!(env.candidates(), vec![BackendType::Wayland, BackendType::Generic]);
    }

    #[test]
    fn test_no_display_falls_to_generic() {
        let env = detect_display_environment_with_env(mock_env(&[]));

        assert_eq!(env.candidates(), vec![BackendType::Generic]);
        assert_eq!(env.preferred(), BackendType::Generic);
    }

    #[test]
    fn test_empty_env_vars_treated_as_unset() {
        let env = detect_display_environment_with_env(mock_env(&[
            ("WAYLAND_DISPLAY", ""),
            ("DISPLAY", ""),
            (BACKEND_OVERRIDE_VAR, ""),
        ]));

        assert_eq!(env.candidates(), vec![BackendType::Generic]);
        assert_eq!(env.forced, None);
    }

    #[test]
    fn test_override_forces_x11_under_wayland() {
        let env = detect_display_environment_with_env(mock_env(&[
            ("WAYLAND_DISPLAY", "wayland-0"),
            ("DISPLAY", ":1"),
            (BACKEND_OVERRIDE_VAR, "x11"),
        ]));

        assert_eq!(env.candidates(), vec![BackendType::X11, BackendType::Generic]);
    }

    #[test]
    fn test_override_generic_skips_native() {
        let env = detect_display_environment_with_env(mock_env(&[
            ("DISPLAY", ":0"),
            (BACKEND_OVERRIDE_VAR, "Generic"),
        ]));

        assert_eq!(env.candidates(), vec![BackendType::Generic]);
    }

    #[test]
    fn test_invalid_override_is_ignored() {
        let env = detect_display_environment_with_env(mock_env(&[
            ("DISPLAY", ":0"),
            (BACKEND_OVERRIDE_VAR, "quartz"),
        ]));

        assert_eq!(env.forced, None);
        assert_eq!(env.preferred(), BackendType::X11);
    }

    #[test]
    fn test_detect_platform_public_api() {
        let platform = detect_platform();

        assert!(!platform.os.is_empty());
    }
}

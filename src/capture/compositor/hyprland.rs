//! Hyprland IPC (`$XDG_RUNTIME_DIR/hypr/<signature>/.socket.sock`)

use std::{
    env,
    path::{Path, PathBuf},
    thread,
};

use super::{non_empty, send_and_wait};
use crate::{
    capture::constants::{hyprland_settle, ipc_reply_timeout},
    error::CaptureResult,
};

/// Hyprland control socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyprland {
    socket_path: PathBuf,
}

impl Hyprland {
    /// Returns `None` unless both `HYPRLAND_INSTANCE_SIGNATURE` and
    /// `XDG_RUNTIME_DIR` are set and non-empty
    pub fn create() -> Option<Self> {
        Self::create_with_env(|key| env::var(key).ok())
    }

    /// Same as [`Hyprland::create`] with an injectable environment
    pub fn create_with_env<F>(env_provider: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signature = non_empty(&env_provider, "HYPRLAND_INSTANCE_SIGNATURE")?;
        let runtime_dir = non_empty(&env_provider, "XDG_RUNTIME_DIR")?;

        let socket_path = socket_path(Path::new(&runtime_dir), &signature);
        tracing::debug!("Hyprland IPC socket at {}", socket_path.display());
        Some(Self { socket_path })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Pulls the overlay out of any group, floats it and moves it to the
    /// desktop origin.
    ///
    /// Waits for the settle delay first so the window exists when the batch
    /// arrives.
    pub fn fullscreen(&self) -> CaptureResult<()> {
        thread::sleep(hyprland_settle());

        let batch = fullscreen_batch(std::process::id());
        tracing::debug!("Sending to hyprland: {}", batch);
        send_and_wait(&self.socket_path, batch.as_bytes(), ipc_reply_timeout())?;
        Ok(())
    }
}

fn socket_path(runtime_dir: &Path, signature: &str) -> PathBuf {
    runtime_dir.join("hypr").join(signature).join(".socket.sock")
}

/// Batched dispatch targeting the windows of process `pid`
pub fn fullscreen_batch(pid: u32) -> String {
    format!(
        "[[BATCH]]/dispatch moveoutofgroup pid:{pid};\
         dispatch setfloating pid:{pid};\
         dispatch movewindowpixel exact 0 0,pid:{pid}"
    )
}

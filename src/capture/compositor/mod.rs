//! Window-manager control sockets
//!
//! Short-lived Unix-socket connections used to make the overlay window
//! fullscreen on compositors where the toolkit cannot do it by itself.
//! Every request opens a fresh connection and closes it once the compositor
//! starts replying, so nothing stays connected between captures.

pub mod hyprland;
pub mod sway;

use std::{
    io::{self, Read, Write},
    os::unix::net::UnixStream,
    path::Path,
    time::Duration,
};

pub use self::{hyprland::Hyprland, sway::Sway};

/// Reads `key` and treats an empty value as unset
fn non_empty<F>(env_provider: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env_provider(key).filter(|v| !v.is_empty())
}

/// Writes `packet` to the socket at `path` and waits, at most `timeout`, for
/// the first reply byte or EOF.
///
/// Closing right after the write can race the compositor reading the request,
/// hence the wait. Returns once the socket is closed.
fn send_and_wait(path: &Path, packet: &[u8], timeout: Duration) -> io::Result<()> {
    let mut stream = UnixStream::connect(path)?;
    stream.write_all(packet)?;
    stream.flush()?;

    stream.set_read_timeout(Some(timeout))?;
    let mut first = [0u8; 1];
    match stream.read(&mut first) {
        Ok(0) => tracing::debug!("{} closed without a reply", path.display()),
        Ok(_) => tracing::trace!("{} replied", path.display()),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            tracing::debug!("No reply from {} within {:?}", path.display(), timeout);
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

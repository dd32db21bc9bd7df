//! Sway IPC (`$SWAYSOCK`)

use std::{env, path::PathBuf};

use super::{non_empty, send_and_wait};
use crate::{
    capture::constants::{OVERLAY_TITLE, ipc_reply_timeout},
    error::CaptureResult,
};

/// Magic string opening every i3/Sway IPC message
pub const IPC_MAGIC: &[u8; 6] = b"i3-ipc";
/// `RUN_COMMAND` message type
pub const RUN_COMMAND: u32 = 0;

/// Sway control socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sway {
    socket_path: PathBuf,
}

impl Sway {
    /// Returns `None` unless `SWAYSOCK` is set and non-empty
    pub fn create() -> Option<Self> {
        Self::create_with_env(|key| env::var(key).ok())
    }

    /// Same as [`Sway::create`] with an injectable environment
    pub fn create_with_env<F>(env_provider: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let socket_path = non_empty(&env_provider, "SWAYSOCK")?;
        tracing::debug!("Sway IPC socket at {}", socket_path);
        Some(Self {
            socket_path: PathBuf::from(socket_path),
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Makes every window of this process titled like the overlay
    /// fullscreen across all outputs.
    pub fn fullscreen(&self) -> CaptureResult<()> {
        let command = fullscreen_command(std::process::id());
        tracing::debug!("Sending to sway: {}", command);
        send_and_wait(
            &self.socket_path,
            &packetize(RUN_COMMAND, command.as_bytes()),
            ipc_reply_timeout(),
        )?;
        Ok(())
    }
}

/// `for_window` rule matching the overlay window of process `pid`
pub fn fullscreen_command(pid: u32) -> String {
    format!("for_window [pid={pid} title=\"^{OVERLAY_TITLE}$\"] fullscreen enable global")
}

/// Frames `payload` as an IPC message: magic, payload length and type, both
/// as native-endian `u32`, then the payload.
pub fn packetize(message_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(IPC_MAGIC.len() + 8 + payload.len());
    packet.extend_from_slice(IPC_MAGIC);
    packet.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    packet.extend_from_slice(&message_type.to_ne_bytes());
    packet.extend_from_slice(payload);
    packet
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        os::unix::net::UnixListener,
        thread,
    };

    use super::*;

    #[test]
    fn test_create_requires_swaysock() {
        assert!(Sway::create_with_env(|_| None).is_none());
        assert!(Sway::create_with_env(|_| Some(String::new())).is_none());

        let sway = Sway::create_with_env(|k| (k == "SWAYSOCK").then(|| "/run/sway.sock".into()));
        assert_eq!(sway.unwrap().socket_path(), std::path::Path::new("/run/sway.sock"));
    }

    #[test]
    fn test_create_reads_process_env() {
        temp_env::with_var("SWAYSOCK", None::<&str>, || assert!(Sway::create().is_none()));
        temp_env::with_var("SWAYSOCK", Some("/tmp/s.sock"), || assert!(Sway::create().is_some()));
    }

    #[test]
    fn test_packet_layout() {
        let packet = packetize(RUN_COMMAND, b"abc");

        assert_eq!(&packet[..6], b"i3-ipc");
        assert_eq!(&packet[6..10], &3u32.to_ne_bytes());
        assert_eq!(&packet[10..14], &0u32.to_ne_bytes());
        assert_eq!(&packet[14..], b"abc");
    }

    #[test]
    fn test_fullscreen_command_text() {
        assert_eq!(
            fullscreen_command(4242),
            "for_window [pid=4242 title=\"^Sharks$\"] fullscreen enable global"
        );
    }

    #[test]
    fn test_fullscreen_sends_framed_command() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sway-ipc.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut header = [0u8; 14];
            conn.read_exact(&mut header).unwrap();
            let len = u32::from_ne_bytes(header[6..10].try_into().unwrap()) as usize;
            let mut payload = vec![0u8; len];
            conn.read_exact(&mut payload).unwrap();
            conn.write_all(b"i3-ipc").unwrap();
            (header, String::from_utf8(payload).unwrap())
        });

        let sway = Sway::create_with_env(|_| Some(path.to_string_lossy().into_owned())).unwrap();
        sway.fullscreen().unwrap();

        let (header, payload) = server.join().unwrap();
        assert_eq!(&header[..6], IPC_MAGIC);
        assert_eq!(&header[10..14], &RUN_COMMAND.to_ne_bytes());
        assert_eq!(payload, fullscreen_command(std::process::id()));
    }
}

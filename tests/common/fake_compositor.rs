//! In-process Wayland compositor for screencopy tests
//!
//! Speaks just enough of the wire protocol to advertise globals, answer
//! roundtrips, describe outputs through xdg-output and complete screencopy
//! frames. Pixels are never written, so every captured frame is the zeroed
//! memfd (opaque black once decoded). Every request the client sends is
//! recorded for later assertions.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    os::unix::net::{UnixListener, UnixStream},
    thread::{self, JoinHandle},
    time::Duration,
};

const DISPLAY_ID: u32 = 1;
const OUTPUT_NAME_BASE: u32 = 10;
const WL_SHM_FORMAT_XRGB8888: u32 = 1;

/// An advertised `wl_output` with its logical rectangle
#[derive(Debug, Clone, Copy)]
pub struct FakeOutput {
    pub x:      i32,
    pub y:      i32,
    pub width:  i32,
    pub height: i32,
    /// Send `global_remove` instead of a buffer offer when captured
    pub unplug_on_capture: bool,
}

impl FakeOutput {
    pub fn at(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            unplug_on_capture: false,
        }
    }

    pub fn unplugged_on_capture(mut self) -> Self {
        self.unplug_on_capture = true;
        self
    }
}

/// Which globals the compositor advertises
#[derive(Debug, Clone)]
pub struct FakeCompositor {
    screencopy: bool,
    outputs:    Vec<FakeOutput>,
}

/// Requests received, as (interface, opcode)
#[derive(Debug, Default)]
pub struct RequestLog(Vec<(String, u16)>);

impl RequestLog {
    pub fn count(&self, interface: &str, opcode: u16) -> usize {
        self.0
            .iter()
            .filter(|(i, o)| i == interface && *o == opcode)
            .count()
    }
}

impl FakeCompositor {
    /// wl_shm, screencopy and xdg-output plus the given outputs
    pub fn new(outputs: Vec<FakeOutput>) -> Self {
        Self {
            screencopy: true,
            outputs,
        }
    }

    pub fn without_screencopy(mut self) -> Self {
        self.screencopy = false;
        self
    }

    /// Serves one client on `stream` until it hangs up
    pub fn spawn(self, stream: UnixStream) -> JoinHandle<RequestLog> {
        thread::spawn(move || Session::new(self, stream).run())
    }

    /// Accepts one client on `listener` and serves it until it hangs up
    pub fn listen(self, listener: UnixListener) -> JoinHandle<RequestLog> {
        thread::spawn(move || match listener.accept() {
            Ok((stream, _)) => Session::new(self, stream).run(),
            Err(_) => RequestLog::default(),
        })
    }

    fn globals(&self) -> Vec<(u32, &'static str, u32)> {
        // outputs first so the client has to create xdg outputs afterwards
        let mut globals: Vec<_> = (0..self.outputs.len() as u32)
            .map(|i| (OUTPUT_NAME_BASE + i, "wl_output", 4))
            .collect();
        globals.push((1, "wl_shm", 1));
        if self.screencopy {
            globals.push((2, "zwlr_screencopy_manager_v1", 3));
        }
        globals.push((3, "zxdg_output_manager_v1", 3));
        globals
    }
}

enum Arg<'a> {
    Uint(u32),
    Int(i32),
    Str(&'a str),
}

struct Args<'a> {
    body: &'a [u8],
    pos:  usize,
}

impl<'a> Args<'a> {
    fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }

    fn uint(&mut self) -> u32 {
        let value = self
            .body
            .get(self.pos..self.pos + 4)
            .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0);
        self.pos += 4;
        value
    }

    fn int(&mut self) -> i32 {
        self.uint() as i32
    }

    fn string(&mut self) -> String {
        let len = self.uint() as usize;
        let text = self
            .body
            .get(self.pos..self.pos + len.saturating_sub(1))
            .unwrap_or_default();
        self.pos += len.next_multiple_of(4);
        String::from_utf8_lossy(text).into_owned()
    }
}

struct Session {
    config:   FakeCompositor,
    stream:   UnixStream,
    registry: Option<u32>,
    objects:  HashMap<u32, String>,
    outputs:  HashMap<u32, usize>,
    log:      RequestLog,
}

impl Session {
    fn new(config: FakeCompositor, stream: UnixStream) -> Self {
        let mut objects = HashMap::new();
        objects.insert(DISPLAY_ID, "wl_display".to_string());
        Self {
            config,
            stream,
            registry: None,
            objects,
            outputs: HashMap::new(),
            log: RequestLog::default(),
        }
    }

    fn run(mut self) -> RequestLog {
        // a client that never hangs up must not wedge the test run
        let _ = self.stream.set_read_timeout(Some(Duration::from_secs(5)));

        loop {
            let mut header = [0u8; 8];
            if self.stream.read_exact(&mut header).is_err() {
                break;
            }
            let sender = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
            let word = u32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
            let opcode = (word & 0xFFFF) as u16;
            let mut body = vec![0u8; ((word >> 16) as usize).saturating_sub(8)];
            if self.stream.read_exact(&mut body).is_err() {
                break;
            }

            let interface = self.objects.get(&sender).cloned().unwrap_or_default();
            self.log.0.push((interface.clone(), opcode));
            if self.handle(sender, &interface, opcode, &body).is_err() {
                break;
            }
        }
        self.log
    }

    fn handle(&mut self, sender: u32, interface: &str, opcode: u16, body: &[u8]) -> io::Result<()> {
        let mut args = Args::new(body);
        match (interface, opcode) {
            // wl_display.sync
            ("wl_display", 0) => {
                let callback = args.uint();
                self.send(callback, 0, &[Arg::Uint(0)])?;
                self.send(DISPLAY_ID, 1, &[Arg::Uint(callback)])?;
            }
            // wl_display.get_registry
            ("wl_display", 1) => {
                let registry = args.uint();
                self.objects.insert(registry, "wl_registry".to_string());
                self.registry = Some(registry);
                for (name, global, version) in self.config.globals() {
                    self.send(registry, 0, &[Arg::Uint(name), Arg::Str(global), Arg::Uint(version)])?;
                }
            }
            // wl_registry.bind
            ("wl_registry", 0) => {
                let name = args.uint();
                let global = args.string();
                let _version = args.uint();
                let id = args.uint();
                if global == "wl_output" {
                    self.outputs.insert(id, (name - OUTPUT_NAME_BASE) as usize);
                }
                self.objects.insert(id, global);
            }
            // zxdg_output_manager_v1.get_xdg_output
            ("zxdg_output_manager_v1", 1) => {
                let id = args.uint();
                let output = args.uint();
                self.objects.insert(id, "zxdg_output_v1".to_string());
                if let Some(o) = self.output(output) {
                    self.send(id, 0, &[Arg::Int(o.x), Arg::Int(o.y)])?;
                    self.send(id, 1, &[Arg::Int(o.width), Arg::Int(o.height)])?;
                    self.send(id, 2, &[])?;
                }
            }
            // zwlr_screencopy_manager_v1.capture_output
            ("zwlr_screencopy_manager_v1", 0) => {
                let frame = args.uint();
                let _overlay_cursor = args.int();
                let output = args.uint();
                self.objects.insert(frame, "zwlr_screencopy_frame_v1".to_string());

                let Some(&index) = self.outputs.get(&output) else {
                    return Ok(());
                };
                let o = self.config.outputs[index];
                if o.unplug_on_capture {
                    if let Some(registry) = self.registry {
                        self.send(registry, 1, &[Arg::Uint(OUTPUT_NAME_BASE + index as u32)])?;
                    }
                } else {
                    let (width, height) = (o.width as u32, o.height as u32);
                    self.send(
                        frame,
                        0,
                        &[
                            Arg::Uint(WL_SHM_FORMAT_XRGB8888),
                            Arg::Uint(width),
                            Arg::Uint(height),
                            Arg::Uint(width * 4),
                        ],
                    )?;
                }
            }
            // zwlr_screencopy_frame_v1.copy
            ("zwlr_screencopy_frame_v1", 0) => {
                self.send(sender, 1, &[Arg::Uint(0)])?;
                self.send(sender, 2, &[Arg::Uint(0), Arg::Uint(0), Arg::Uint(0)])?;
            }
            _ => {}
        }
        Ok(())
    }

    fn output(&self, object: u32) -> Option<FakeOutput> {
        self.outputs.get(&object).map(|&i| self.config.outputs[i])
    }

    fn send(&mut self, object: u32, opcode: u16, args: &[Arg<'_>]) -> io::Result<()> {
        let mut body = Vec::new();
        for arg in args {
            match arg {
                Arg::Uint(v) => body.extend_from_slice(&v.to_ne_bytes()),
                Arg::Int(v) => body.extend_from_slice(&v.to_ne_bytes()),
                Arg::Str(s) => {
                    body.extend_from_slice(&(s.len() as u32 + 1).to_ne_bytes());
                    body.extend_from_slice(s.as_bytes());
                    body.push(0);
                    body.resize(body.len().next_multiple_of(4), 0);
                }
            }
        }

        let size = 8 + body.len() as u32;
        let mut message = Vec::with_capacity(size as usize);
        message.extend_from_slice(&object.to_ne_bytes());
        message.extend_from_slice(&((size << 16) | u32::from(opcode)).to_ne_bytes());
        message.extend_from_slice(&body);
        self.stream.write_all(&message)
    }
}

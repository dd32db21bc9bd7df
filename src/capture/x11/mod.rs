//! X11 backend using x11rb
//!
//! Screenshots travel through a MIT-SHM segment that is handed to the caller
//! as a zero-copy [`CaptureImage`]; the cursor comes from XFIXES; window
//! enumeration walks the tree with pipelined requests (see [`window_tree`]).
//!
//! # Examples
//!
//! ```rust,no_run
//! use sharks_platform::{capture::x11::X11Backend, model::Geometry};
//!
//! let backend = X11Backend::connect().unwrap();
//! let image = backend.screenshot(Geometry::new(0, 0, 1920, 1080)).unwrap();
//! assert_eq!(image.dimensions(), (1920, 1080));
//! ```

pub mod atoms;
pub mod shm;
pub mod window_tree;

use x11rb::{
    connection::{Connection as _, RequestConnection as _},
    protocol::{
        shm::{self as xshm, ConnectionExt as _},
        xfixes::{self, ConnectionExt as _},
        xproto::{ConnectionExt as _, ImageFormat, ImageOrder, Screen},
    },
    rust_connection::RustConnection,
};

use self::{
    atoms::AtomTable,
    shm::ShmSegment,
    window_tree::{X11TreeSource, walk_windows},
};
use super::{
    constants::{BYTES_PER_PIXEL, SUPPORTED_X11_DEPTHS},
    image_buffer::{CaptureImage, CursorImage, PixelFormat},
};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{BackendType, Geometry, OpenWindowInfo, Point},
};

/// X11 display-server backend
///
/// Owns the connection and the atom table for the lifetime of the process.
pub struct X11Backend {
    conn:       RustConnection,
    screen_num: usize,
    atoms:      AtomTable,
    has_shm:    bool,
    has_xfixes: bool,
}

impl std::fmt::Debug for X11Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X11Backend")
            .field("screen_num", &self.screen_num)
            .field("has_shm", &self.has_shm)
            .field("has_xfixes", &self.has_xfixes)
            .finish_non_exhaustive()
    }
}

impl X11Backend {
    /// Connects to `$DISPLAY`, interns atoms and negotiates extensions.
    ///
    /// Missing extensions are not fatal: the matching operation reports
    /// [`CaptureError::CapabilityAbsent`] and the facade falls back.
    pub fn connect() -> CaptureResult<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(|e| {
            tracing::debug!("Failed to connect to X11: {}", e);
            CaptureError::BackendNotAvailable {
                backend: BackendType::X11,
            }
        })?;
        tracing::debug!("X11 connection established (screen {})", screen_num);

        let atoms = AtomTable::intern(&conn);

        let has_shm = match conn.extension_information(xshm::X11_EXTENSION_NAME) {
            Ok(Some(_)) => true,
            Ok(None) => {
                tracing::warn!("X server lacks MIT-SHM, screenshots use the fallback path");
                false
            }
            Err(e) => {
                tracing::warn!("Failed to query MIT-SHM: {}", e);
                false
            }
        };

        // XFIXES requires a version handshake before any other request.
        let has_xfixes = match conn
            .xfixes_query_version(5, 0)
            .map_err(|e| e.to_string())
            .and_then(|c| c.reply().map_err(|e| e.to_string()))
        {
            Ok(version) => {
                tracing::debug!("XFIXES {}.{}", version.major_version, version.minor_version);
                true
            }
            Err(e) => {
                tracing::warn!("XFIXES unavailable: {}", e);
                false
            }
        };

        Ok(Self {
            conn,
            screen_num,
            atoms,
            has_shm,
            has_xfixes,
        })
    }

    fn screen(&self) -> CaptureResult<&Screen> {
        self.conn
            .setup()
            .roots
            .get(self.screen_num)
            .ok_or_else(|| CaptureError::negotiation("setup", "screen index out of range"))
    }

    /// Root window size
    pub fn virtual_desktop(&self) -> CaptureResult<Geometry> {
        let screen = self.screen()?;
        Ok(Geometry::new(
            0,
            0,
            u32::from(screen.width_in_pixels),
            u32::from(screen.height_in_pixels),
        ))
    }

    /// Grabs `geometry` of the root window through a shared-memory segment.
    ///
    /// The returned image is a zero-copy view of the segment in
    /// [`PixelFormat::Bgrx`]; canonicalising it makes every pixel opaque.
    pub fn screenshot(&self, geometry: Geometry) -> CaptureResult<CaptureImage> {
        let (x, y, width, height) = wire_rect(geometry)?;
        let screen = self.screen()?;

        if !SUPPORTED_X11_DEPTHS.contains(&screen.root_depth) {
            tracing::warn!("Using slow screen grab because root is {} bpp", screen.root_depth);
            return Err(CaptureError::UnsupportedDepth {
                depth: screen.root_depth,
            });
        }
        if !self.has_shm {
            return Err(CaptureError::absent(xshm::X11_EXTENSION_NAME));
        }

        let size = usize::from(width) * usize::from(height) * BYTES_PER_PIXEL;
        let segment = ShmSegment::create(size).map_err(|e| {
            tracing::warn!("Unable to create shared memory: {}", e);
            CaptureError::IoError(e)
        })?;

        let seg = self
            .conn
            .generate_id()
            .map_err(|e| CaptureError::negotiation("generate_id", e))?;

        // attach, get_image and detach go out back to back; the attach is
        // checked only after the image request is queued.
        let attach = self.conn.shm_attach(seg, segment.id(), false);
        let get_image = self.conn.shm_get_image(
            screen.root,
            x,
            y,
            width,
            height,
            !0,
            u8::from(ImageFormat::Z_PIXMAP),
            seg,
            0,
        );
        if let Ok(detach) = self.conn.shm_detach(seg) {
            detach.ignore_error();
        }

        attach
            .map_err(|e| CaptureError::negotiation("shm_attach", e))?
            .check()
            .map_err(|e| {
                tracing::warn!("Unable to attach shmem: {}", e);
                CaptureError::negotiation("shm_attach", e)
            })?;

        let reply = get_image
            .map_err(|e| CaptureError::negotiation("shm_get_image", e))?
            .reply()
            .map_err(|e| {
                tracing::warn!("Unable to get screenshot with xshm: {}", e);
                CaptureError::negotiation("shm_get_image", e)
            })?;

        if !SUPPORTED_X11_DEPTHS.contains(&reply.depth) {
            tracing::warn!("Somehow got a {} bpp image", reply.depth);
            return Err(CaptureError::UnsupportedDepth { depth: reply.depth });
        }

        let mapping = segment.map()?;
        tracing::debug!("Captured {} via MIT-SHM", geometry);

        CaptureImage::from_mapping(
            u32::from(width),
            u32::from(height),
            usize::from(width) * BYTES_PER_PIXEL,
            PixelFormat::Bgrx,
            Box::new(mapping),
        )
    }

    /// Grabs `geometry` of the root window with a plain `GetImage`.
    ///
    /// Slower than [`X11Backend::screenshot`] but needs neither MIT-SHM nor a
    /// 24/32-bit root, so it serves as the fallback for both.
    pub fn screenshot_core(&self, geometry: Geometry) -> CaptureResult<CaptureImage> {
        let (x, y, width, height) = wire_rect(geometry)?;
        let root = self.screen()?.root;

        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, root, x, y, width, height, !0)
            .map_err(|e| CaptureError::negotiation("get_image", e))?
            .reply()
            .map_err(|e| CaptureError::negotiation("get_image", e))?;

        let setup = self.conn.setup();
        let layout = setup
            .pixmap_formats
            .iter()
            .find(|f| f.depth == reply.depth)
            .ok_or(CaptureError::UnsupportedDepth { depth: reply.depth })?;
        tracing::debug!("Captured {} via core GetImage ({} bpp)", geometry, layout.bits_per_pixel);

        decode_core_image(
            reply.data,
            ZPixmapLayout {
                width:          u32::from(width),
                height:         u32::from(height),
                depth:          reply.depth,
                bits_per_pixel: layout.bits_per_pixel,
                scanline_pad:   layout.scanline_pad,
                lsb_first:      setup.image_byte_order == ImageOrder::LSB_FIRST,
            },
        )
    }

    /// Current cursor image and hotspot via XFIXES
    pub fn cursor_image(&self) -> CaptureResult<CursorImage> {
        if !self.has_xfixes {
            return Err(CaptureError::absent(xfixes::X11_EXTENSION_NAME));
        }

        let reply = self
            .conn
            .xfixes_get_cursor_image()
            .map_err(|e| CaptureError::negotiation("xfixes_get_cursor_image", e))?
            .reply()
            .map_err(|e| CaptureError::negotiation("xfixes_get_cursor_image", e))?;

        let width = u32::from(reply.width);
        let height = u32::from(reply.height);
        let data = unpremultiply_argb(&reply.cursor_image);
        let image =
            CaptureImage::from_owned(width, height, width as usize * 4, PixelFormat::Bgra, data)?;

        Ok(CursorImage::new(
            image,
            Point::new(i32::from(reply.xhot), i32::from(reply.yhot)),
        ))
    }

    /// Selectable, visible top-level windows
    pub fn open_windows(&self) -> CaptureResult<Vec<OpenWindowInfo>> {
        let root = self.screen()?.root;
        walk_windows(&X11TreeSource::new(&self.conn, root), &self.atoms)
    }
}

/// Converts a rectangle to the protocol's 16-bit fields
fn wire_rect(geometry: Geometry) -> CaptureResult<(i16, i16, u16, u16)> {
    let invalid = |reason: &str| CaptureError::InvalidGeometry {
        geometry,
        reason: reason.to_string(),
    };

    if geometry.is_empty() {
        return Err(invalid("zero width or height"));
    }
    let x = i16::try_from(geometry.x).map_err(|_| invalid("x outside the 16-bit range"))?;
    let y = i16::try_from(geometry.y).map_err(|_| invalid("y outside the 16-bit range"))?;
    let width = u16::try_from(geometry.width).map_err(|_| invalid("width exceeds 65535"))?;
    let height = u16::try_from(geometry.height).map_err(|_| invalid("height exceeds 65535"))?;
    Ok((x, y, width, height))
}

/// Shape of a `ZPixmap` reply, taken from the reply and the server setup
#[derive(Debug, Clone, Copy)]
struct ZPixmapLayout {
    width:          u32,
    height:         u32,
    depth:          u8,
    bits_per_pixel: u8,
    scanline_pad:   u8,
    lsb_first:      bool,
}

impl ZPixmapLayout {
    fn stride(&self) -> usize {
        let pad = usize::from(self.scanline_pad.max(8));
        let bits = self.width as usize * usize::from(self.bits_per_pixel);
        bits.div_ceil(pad) * pad / 8
    }
}

/// Decodes TrueColor `ZPixmap` data (888 in 32 bits, or 565 in 16 bits)
fn decode_core_image(data: Vec<u8>, layout: ZPixmapLayout) -> CaptureResult<CaptureImage> {
    let stride = layout.stride();
    if data.len() < stride * layout.height as usize {
        return Err(CaptureError::negotiation("get_image", "reply shorter than the image"));
    }

    match (layout.bits_per_pixel, layout.depth) {
        (32, 24 | 32) if layout.lsb_first => {
            CaptureImage::from_owned(layout.width, layout.height, stride, PixelFormat::Bgrx, data)
        }
        (32, 24 | 32) => Ok(expand_pixels(&data, layout, stride, 4, |px| {
            let word = u32::from_be_bytes([px[0], px[1], px[2], px[3]]);
            [(word >> 16) as u8, (word >> 8) as u8, word as u8]
        })),
        (16, 15 | 16) => Ok(expand_pixels(&data, layout, stride, 2, |px| {
            let word = if layout.lsb_first {
                u16::from_le_bytes([px[0], px[1]])
            } else {
                u16::from_be_bytes([px[0], px[1]])
            };
            rgb565(word)
        })),
        (_, depth) => {
            tracing::warn!("No decoder for {} bpp / depth {} images", layout.bits_per_pixel, depth);
            Err(CaptureError::UnsupportedDepth { depth })
        }
    }
}

fn expand_pixels(
    data: &[u8],
    layout: ZPixmapLayout,
    stride: usize,
    bytes_per_pixel: usize,
    rgb: impl Fn(&[u8]) -> [u8; 3],
) -> CaptureImage {
    let mut canvas = image::RgbaImage::new(layout.width, layout.height);
    for (row, line) in data.chunks(stride).take(layout.height as usize).enumerate() {
        for (col, px) in line.chunks_exact(bytes_per_pixel).take(layout.width as usize).enumerate() {
            let [r, g, b] = rgb(px);
            canvas.put_pixel(col as u32, row as u32, image::Rgba([r, g, b, 0xFF]));
        }
    }
    CaptureImage::from_rgba(canvas)
}

fn rgb565(word: u16) -> [u8; 3] {
    let r = ((word >> 11) & 0x1F) as u8;
    let g = ((word >> 5) & 0x3F) as u8;
    let b = (word & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// ARGB32 premultiplied words to straight B, G, R, A bytes
fn unpremultiply_argb(words: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 4);
    for word in words {
        let [b, g, r, a] = word.to_le_bytes();
        let straight = |c: u8| -> u8 {
            if a == 0 {
                0
            } else {
                ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
            }
        };
        out.extend_from_slice(&[straight(b), straight(g), straight(r), a]);
    }
    out
}

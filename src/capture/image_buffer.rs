//! Pixel buffers handed out by the capture backends
//!
//! A [`CaptureImage`] either owns its bytes or borrows a native mapping (an
//! X11 shared-memory segment) that is released through a backend-specific
//! guard when the image drops. Backends produce whatever channel order the
//! protocol delivers; [`CaptureImage::into_canonical`] converts to straight
//! RGBA before the image leaves the facade.
//!
//! # Examples
//!
//! ```
//! use sharks_platform::capture::{CaptureImage, PixelFormat};
//!
//! // One XRGB8888 pixel as delivered by the wire: B, G, R, X
//! let img = CaptureImage::from_owned(1, 1, 4, PixelFormat::Bgrx, vec![0x30, 0x20, 0x10, 0x00])
//!     .unwrap()
//!     .into_canonical();
//!
//! assert_eq!(img.pixel(0, 0), Some([0x10, 0x20, 0x30, 0xFF]));
//! ```

use std::fmt;

use image::RgbaImage;

use crate::{
    error::{CaptureError, CaptureResult},
    model::{Geometry, Point},
};

/// Memory order of the channels of one pixel
///
/// Names spell the byte order in memory, not the little-endian word layout
/// used by `wl_shm` and X11 format names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// R, G, B, A. The facade's output order.
    Rgba,
    /// B, G, R, A with meaningful alpha (XFIXES cursor, ARGB32).
    Bgra,
    /// B, G, R, padding (X11 24/32 bpp Z-pixmap, `wl_shm` XRGB8888).
    Bgrx,
    /// B, G, R (`wl_shm` RGB888).
    Bgr,
    /// R, G, B (`wl_shm` BGR888).
    Rgb,
}

impl PixelFormat {
    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra | PixelFormat::Bgrx => 4,
            PixelFormat::Bgr | PixelFormat::Rgb => 3,
        }
    }

    /// Decodes one pixel to straight RGBA
    #[inline]
    pub fn decode(self, px: &[u8]) -> [u8; 4] {
        match self {
            PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
            PixelFormat::Bgrx | PixelFormat::Bgr => [px[2], px[1], px[0], 0xFF],
            PixelFormat::Rgb => [px[0], px[1], px[2], 0xFF],
        }
    }
}

/// Native pixel memory not owned by the Rust allocator
///
/// Implementors release the mapping in their `Drop`.
pub trait MappedPixels {
    /// The mapped bytes
    fn bytes(&self) -> &[u8];
    /// The mapped bytes, writable
    fn bytes_mut(&mut self) -> &mut [u8];
}

enum Storage {
    Owned(Vec<u8>),
    Mapped(Box<dyn MappedPixels>),
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Mapped(m) => m.bytes(),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Mapped(m) => m.bytes_mut(),
        }
    }
}

/// Captured pixels with their layout
pub struct CaptureImage {
    width:   u32,
    height:  u32,
    stride:  usize,
    format:  PixelFormat,
    storage: Storage,
}

impl fmt::Debug for CaptureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("zero_copy", &self.is_zero_copy())
            .finish()
    }
}

fn required_len(width: u32, height: u32, stride: usize, format: PixelFormat) -> Option<usize> {
    if width == 0 || height == 0 {
        return Some(0);
    }
    let row = (width as usize).checked_mul(format.bytes_per_pixel())?;
    if stride < row {
        return None;
    }
    stride.checked_mul(height as usize - 1)?.checked_add(row)
}

impl CaptureImage {
    fn validate(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        len: usize,
    ) -> CaptureResult<()> {
        match required_len(width, height, stride, format) {
            Some(needed) if needed <= len => Ok(()),
            _ => Err(CaptureError::InvalidGeometry {
                geometry: Geometry::new(0, 0, width, height),
                reason:   format!(
                    "buffer of {len} bytes with stride {stride} cannot hold {format:?} pixels"
                ),
            }),
        }
    }

    /// Wraps an owned byte buffer
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> CaptureResult<Self> {
        Self::validate(width, height, stride, format, data.len())?;
        Ok(Self {
            width,
            height,
            stride,
            format,
            storage: Storage::Owned(data),
        })
    }

    /// Wraps a native mapping without copying; the mapping is released when
    /// the image drops.
    pub fn from_mapping(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        mapping: Box<dyn MappedPixels>,
    ) -> CaptureResult<Self> {
        Self::validate(width, height, stride, format, mapping.bytes().len())?;
        Ok(Self {
            width,
            height,
            stride,
            format,
            storage: Storage::Mapped(mapping),
        })
    }

    /// Takes ownership of an RGBA image
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * 4,
            format: PixelFormat::Rgba,
            storage: Storage::Owned(image.into_raw()),
        }
    }

    /// Fully transparent RGBA image
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_rgba(RgbaImage::new(width, height))
    }

    /// Zero-sized image
    pub fn empty() -> Self {
        Self::blank(0, 0)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes between the starts of two rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Channel order of the stored bytes
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// True when the image has no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the pixels live in a native mapping
    pub fn is_zero_copy(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// Raw bytes, `stride` per row
    pub fn as_bytes(&self) -> &[u8] {
        self.storage.bytes()
    }

    /// One row of pixels without padding
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        self.as_bytes().get(start..start + len)
    }

    /// One pixel decoded to straight RGBA
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let row = self.row(y)?;
        let start = x as usize * bpp;
        Some(self.format.decode(&row[start..start + bpp]))
    }

    /// Converts to straight RGBA.
    ///
    /// Four-byte formats are swizzled in place, so a zero-copy image stays
    /// zero-copy. Three-byte formats are expanded into a new owned buffer.
    /// Formats without alpha come out opaque.
    pub fn into_canonical(mut self) -> Self {
        match self.format {
            PixelFormat::Rgba => self,
            PixelFormat::Bgra | PixelFormat::Bgrx => {
                let format = self.format;
                let row_len = self.width as usize * 4;
                let stride = self.stride;
                let height = self.height as usize;
                let bytes = self.storage.bytes_mut();
                for y in 0..height {
                    let start = y * stride;
                    for px in bytes[start..start + row_len].chunks_exact_mut(4) {
                        px.swap(0, 2);
                        if format == PixelFormat::Bgrx {
                            px[3] = 0xFF;
                        }
                    }
                }
                self.format = PixelFormat::Rgba;
                self
            }
            PixelFormat::Bgr | PixelFormat::Rgb => Self::from_rgba(self.to_rgba_image()),
        }
    }

    /// Copies into a tightly packed RGBA image
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        if self.is_empty() {
            return out;
        }
        let bpp = self.format.bytes_per_pixel();
        for (y, dst_row) in out.chunks_exact_mut(self.width as usize * 4).enumerate() {
            let Some(src_row) = self.row(y as u32) else {
                break;
            };
            if self.format == PixelFormat::Rgba {
                dst_row.copy_from_slice(src_row);
                continue;
            }
            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(bpp)) {
                dst.copy_from_slice(&self.format.decode(src));
            }
        }
        out
    }

    /// Consumes into a tightly packed RGBA image, reusing the allocation
    /// when the layout already matches.
    pub fn into_rgba_image(self) -> RgbaImage {
        let Self {
            width,
            height,
            stride,
            format,
            storage,
        } = self;

        match storage {
            Storage::Owned(mut data) if format == PixelFormat::Rgba && stride == width as usize * 4 => {
                data.truncate(width as usize * height as usize * 4);
                RgbaImage::from_raw(width, height, data)
                    .unwrap_or_else(|| RgbaImage::new(width, height))
            }
            storage => Self {
                width,
                height,
                stride,
                format,
                storage,
            }
            .to_rgba_image(),
        }
    }

    /// Crops or pads to exactly `width` x `height`, anchored at the top-left
    /// corner. Padding is transparent.
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self;
        }
        let src = self.into_rgba_image();
        let mut canvas = RgbaImage::new(width, height);
        image::imageops::replace(&mut canvas, &src, 0, 0);
        Self::from_rgba(canvas)
    }
}

/// Cursor bitmap with its hotspot
#[derive(Debug)]
pub struct CursorImage {
    image:   CaptureImage,
    hotspot: Point,
}

impl CursorImage {
    /// Creates a cursor image, clamping the hotspot into the image bounds
    pub fn new(image: CaptureImage, hotspot: Point) -> Self {
        let hotspot = if image.is_empty() {
            Point::default()
        } else {
            let max_x = i32::try_from(image.width() - 1).unwrap_or(i32::MAX);
            let max_y = i32::try_from(image.height() - 1).unwrap_or(i32::MAX);
            Point::new(hotspot.x.clamp(0, max_x), hotspot.y.clamp(0, max_y))
        };
        Self { image, hotspot }
    }

    /// No cursor available
    pub fn empty() -> Self {
        Self::new(CaptureImage::empty(), Point::default())
    }

    /// The cursor bitmap
    pub fn image(&self) -> &CaptureImage {
        &self.image
    }

    /// Hotspot offset inside the bitmap
    pub fn hotspot(&self) -> Point {
        self.hotspot
    }

    /// True when no cursor bitmap is available
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Converts the bitmap to straight RGBA
    pub fn into_canonical(self) -> Self {
        Self {
            image:   self.image.into_canonical(),
            hotspot: self.hotspot,
        }
    }

    /// Splits into bitmap and hotspot
    pub fn into_parts(self) -> (CaptureImage, Point) {
        (self.image, self.hotspot)
    }
}

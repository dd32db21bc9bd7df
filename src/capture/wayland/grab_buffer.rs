//! Per-output, per-capture screencopy buffer
//!
//! A [`GrabBuffer`] lives for exactly one `grab()`: it owns the screencopy
//! frame, the memfd-backed `wl_buffer` the compositor copies into, and the
//! local mapping of that memfd. Dropping it destroys the protocol objects and
//! unmaps the memory.

use std::{
    ffi::CStr,
    fs::File,
    io,
    os::fd::{AsFd, FromRawFd, OwnedFd},
};

use memmap2::MmapMut;
use wayland_client::{
    Dispatch, QueueHandle, WEnum,
    protocol::{wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm, wl_shm_pool::WlShmPool},
};
use wayland_protocols_wlr::screencopy::v1::client::zwlr_screencopy_frame_v1::ZwlrScreencopyFrameV1;

use crate::{
    capture::image_buffer::{CaptureImage, PixelFormat},
    error::{CaptureError, CaptureResult},
};

/// `wl_shm` XRGB8888
pub const WL_SHM_XRGB8888: u32 = 1;
/// `wl_shm` RGB888 (`RG24`)
pub const WL_SHM_RGB888: u32 = 0x3432_4752;
/// `wl_shm` BGR888 (`BG24`)
pub const WL_SHM_BGR888: u32 = 0x3432_4742;

/// Memory layout of an allow-listed `wl_shm` format
pub fn pixel_format_for(raw: u32) -> CaptureResult<PixelFormat> {
    match raw {
        WL_SHM_XRGB8888 => Ok(PixelFormat::Bgrx),
        WL_SHM_RGB888 => Ok(PixelFormat::Bgr),
        WL_SHM_BGR888 => Ok(PixelFormat::Rgb),
        format => Err(CaptureError::UnsupportedPixelFormat { format }),
    }
}

fn raw_format(format: WEnum<wl_shm::Format>) -> u32 {
    match format {
        WEnum::Value(f) => f.into(),
        WEnum::Unknown(raw) => raw,
    }
}

/// Decodes a copied frame to canonical RGBA, undoing y-inversion
pub fn decode_frame(
    bytes: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    raw_format: u32,
    y_invert: bool,
) -> CaptureResult<CaptureImage> {
    let format = pixel_format_for(raw_format)?;
    if stride == 0 {
        return Err(CaptureError::negotiation("screencopy buffer", "zero stride"));
    }

    let data = if y_invert {
        let mut flipped = Vec::with_capacity(stride * height as usize);
        for row in bytes.chunks(stride).take(height as usize).rev() {
            flipped.extend_from_slice(row);
            // a short last row still occupies a full stride after flipping
            flipped.resize(flipped.len().next_multiple_of(stride), 0);
        }
        flipped
    } else {
        bytes.to_vec()
    };

    Ok(CaptureImage::from_owned(width, height, stride, format, data)?.into_canonical())
}

/// Progress of one output's frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrabStatus {
    #[default]
    Pending,
    Ready,
    Failed,
}

/// Status of one frame, apart from the protocol objects behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameProgress {
    status: GrabStatus,
}

impl FrameProgress {
    pub fn status(&self) -> GrabStatus {
        self.status
    }

    /// Marks the frame finished. Returns true on the first transition out
    /// of [`GrabStatus::Pending`] only.
    pub fn finish(&mut self, status: GrabStatus) -> bool {
        if self.status != GrabStatus::Pending || status == GrabStatus::Pending {
            return false;
        }
        self.status = status;
        true
    }
}

struct ShmStorage {
    buffer: WlBuffer,
    map:    MmapMut,
    _file:  File,
}

/// One output's screencopy frame and its backing memory
pub struct GrabBuffer {
    frame:    ZwlrScreencopyFrameV1,
    storage:  Option<ShmStorage>,
    format:   u32,
    width:    u32,
    height:   u32,
    stride:   u32,
    y_invert: bool,
    progress: FrameProgress,
}

impl GrabBuffer {
    pub fn new(frame: ZwlrScreencopyFrameV1) -> Self {
        Self {
            frame,
            storage: None,
            format: 0,
            width: 0,
            height: 0,
            stride: 0,
            y_invert: false,
            progress: FrameProgress::default(),
        }
    }

    pub fn status(&self) -> GrabStatus {
        self.progress.status()
    }

    pub fn progress(&self) -> &FrameProgress {
        &self.progress
    }

    pub fn progress_mut(&mut self) -> &mut FrameProgress {
        &mut self.progress
    }

    pub fn has_buffer(&self) -> bool {
        self.storage.is_some()
    }

    pub fn set_y_invert(&mut self, y_invert: bool) {
        self.y_invert = y_invert;
    }

    /// Allocates a shared buffer matching the compositor's offer and asks
    /// for the copy.
    pub fn attach<D>(
        &mut self,
        shm: &WlShm,
        qh: &QueueHandle<D>,
        format: WEnum<wl_shm::Format>,
        width: u32,
        height: u32,
        stride: u32,
    ) -> CaptureResult<()>
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        let raw = raw_format(format);
        self.format = raw;
        self.width = width;
        self.height = height;
        self.stride = stride;

        pixel_format_for(raw)?;
        let WEnum::Value(shm_format) = format else {
            return Err(CaptureError::UnsupportedPixelFormat { format: raw });
        };

        let invalid = |reason: &str| CaptureError::negotiation("screencopy buffer", reason);
        let size = u64::from(stride) * u64::from(height);
        let pool_size = i32::try_from(size).map_err(|_| invalid("buffer exceeds i32 range"))?;
        if size == 0 {
            return Err(invalid("empty buffer"));
        }
        let width_i = i32::try_from(width).map_err(|_| invalid("width exceeds i32 range"))?;
        let height_i = i32::try_from(height).map_err(|_| invalid("height exceeds i32 range"))?;
        let stride_i = i32::try_from(stride).map_err(|_| invalid("stride exceeds i32 range"))?;

        let file = memfd(c"sharks-screencopy", size)?;
        // SAFETY: the memfd is private to this process and sized above.
        let map = unsafe { MmapMut::map_mut(&file)? };

        let pool = shm.create_pool(file.as_fd(), pool_size, qh, ());
        let buffer = pool.create_buffer(0, width_i, height_i, stride_i, shm_format, qh, ());
        pool.destroy();

        self.frame.copy(&buffer);
        self.storage = Some(ShmStorage {
            buffer,
            map,
            _file: file,
        });
        Ok(())
    }

    /// Decodes the copied pixels
    pub fn to_image(&self) -> CaptureResult<CaptureImage> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| CaptureError::negotiation("screencopy", "no buffer was attached"))?;

        decode_frame(
            &storage.map,
            self.width,
            self.height,
            self.stride as usize,
            self.format,
            self.y_invert,
        )
    }
}

impl Drop for GrabBuffer {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            storage.buffer.destroy();
        }
        self.frame.destroy();
    }
}

/// Anonymous shared-memory file of `size` bytes
fn memfd(name: &CStr, size: u64) -> io::Result<File> {
    // SAFETY: name is a valid NUL-terminated string.
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd was just created and is owned by nobody else.
    let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });
    file.set_len(size)?;
    Ok(file)
}

//! wlr-screencopy grabber
//!
//! Runs on its own event queue so the caller's queue is never dispatched
//! behind its back. Outputs are tracked by registry name, which is also the
//! user data of every per-output proxy.

use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum, delegate_noop,
    protocol::{
        wl_buffer::WlBuffer,
        wl_output::{self, WlOutput},
        wl_registry::{self, WlRegistry},
        wl_shm::WlShm,
        wl_shm_pool::WlShmPool,
    },
};
use wayland_protocols::xdg::xdg_output::zv1::client::{
    zxdg_output_manager_v1::ZxdgOutputManagerV1,
    zxdg_output_v1::{self, ZxdgOutputV1},
};
use wayland_protocols_wlr::screencopy::v1::client::{
    zwlr_screencopy_frame_v1::{self, ZwlrScreencopyFrameV1},
    zwlr_screencopy_manager_v1::ZwlrScreencopyManagerV1,
};

use super::{
    composite::{OutputLayer, Rotation, composite_outputs},
    grab_buffer::{FrameProgress, GrabBuffer, GrabStatus},
};
use crate::{
    capture::image_buffer::CaptureImage,
    error::{CaptureError, CaptureResult},
    model::Geometry,
};

/// One bound `wl_output` and what we know about its placement
struct OutputDescriptor {
    name:       u32,
    output:     WlOutput,
    xdg_output: Option<ZxdgOutputV1>,
    logical:    Geometry,
    transform:  u32,
    grab:       Option<GrabBuffer>,
}

impl OutputDescriptor {
    fn new(name: u32, output: WlOutput) -> Self {
        Self {
            name,
            output,
            xdg_output: None,
            logical: Geometry::default(),
            transform: 0,
            grab: None,
        }
    }
}

impl Drop for OutputDescriptor {
    fn drop(&mut self) {
        self.grab = None;
        if let Some(xdg_output) = self.xdg_output.take() {
            xdg_output.destroy();
        }
        // wl_output.release exists since version 3
        if self.output.version() >= 3 {
            self.output.release();
        }
    }
}

/// Frames of the current grab that have seen neither `ready` nor `failed`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PendingFrames(usize);

impl PendingFrames {
    fn start(&mut self, frames: usize) {
        self.0 = frames;
    }

    fn is_idle(&self) -> bool {
        self.0 == 0
    }

    /// A frame reported `ready` or `failed`; counted once per frame
    fn settle(&mut self, progress: &mut FrameProgress, status: GrabStatus) {
        if progress.finish(status) {
            self.0 = self.0.saturating_sub(1);
        }
    }

    /// The output behind a frame went away before the frame finished
    fn forget(&mut self, progress: &FrameProgress) {
        if progress.status() == GrabStatus::Pending {
            self.0 = self.0.saturating_sub(1);
        }
    }
}

/// Required globals found by the initial roundtrips
fn check_globals(state: &GrabberState) -> CaptureResult<ZxdgOutputManagerV1> {
    if state.shm.is_none() {
        return Err(CaptureError::absent("wl_shm"));
    }
    if state.copy_manager.is_none() {
        return Err(CaptureError::absent("zwlr_screencopy_manager_v1"));
    }
    let xdg_manager = state
        .xdg_output_manager
        .clone()
        .ok_or_else(|| CaptureError::absent("zxdg_output_manager_v1"))?;
    if state.outputs.is_empty() {
        return Err(CaptureError::NoOutputs);
    }
    Ok(xdg_manager)
}

/// Dispatch state for the grabber's private queue
#[derive(Default)]
struct GrabberState {
    shm:                Option<WlShm>,
    copy_manager:       Option<ZwlrScreencopyManagerV1>,
    xdg_output_manager: Option<ZxdgOutputManagerV1>,
    outputs:            Vec<OutputDescriptor>,
    outstanding:        PendingFrames,
}

impl GrabberState {
    fn output_mut(&mut self, name: u32) -> Option<&mut OutputDescriptor> {
        self.outputs.iter_mut().find(|o| o.name == name)
    }

    fn finish_grab(&mut self, name: u32, status: GrabStatus) {
        let grab = self
            .outputs
            .iter_mut()
            .find(|o| o.name == name)
            .and_then(|o| o.grab.as_mut());
        if let Some(grab) = grab {
            self.outstanding.settle(grab.progress_mut(), status);
        }
    }

    /// Queues the destructor requests for everything bound so far. Safe to
    /// call more than once.
    fn release(&mut self) {
        self.outputs.clear();
        if let Some(manager) = self.copy_manager.take() {
            manager.destroy();
        }
        if let Some(manager) = self.xdg_output_manager.take() {
            manager.destroy();
        }
        self.shm = None;
    }
}

impl Drop for GrabberState {
    fn drop(&mut self) {
        self.release();
    }
}

/// Captures every output and composites them into one image
pub struct ScreencopyGrabber {
    conn:      Connection,
    queue:     EventQueue<GrabberState>,
    state:     GrabberState,
    _registry: WlRegistry,
}

impl std::fmt::Debug for ScreencopyGrabber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreencopyGrabber")
            .field("outputs", &self.state.outputs.len())
            .finish_non_exhaustive()
    }
}

impl ScreencopyGrabber {
    /// Binds the globals the grabber needs.
    ///
    /// Fails when `wl_shm`, the screencopy manager or the xdg-output manager
    /// is missing, or when no output is advertised.
    pub fn init(conn: &Connection) -> CaptureResult<Self> {
        let queue = conn.new_event_queue();
        let qh = queue.handle();
        let registry = conn.display().get_registry(&qh, ());

        // from here on every early return drops the grabber, which destroys
        // whatever was bound and flushes
        let mut grabber = Self {
            conn: conn.clone(),
            queue,
            state: GrabberState::default(),
            _registry: registry,
        };

        // globals first, then the events of the objects bound on the way
        grabber.roundtrip()?;
        grabber.roundtrip()?;
        let xdg_manager = check_globals(&grabber.state)?;

        // outputs announced before the xdg manager have no xdg_output yet
        for output in grabber.state.outputs.iter_mut().filter(|o| o.xdg_output.is_none()) {
            output.xdg_output = Some(xdg_manager.get_xdg_output(&output.output, &qh, output.name));
        }
        grabber.roundtrip()?;

        tracing::debug!("wlr-screencopy ready with {} output(s)", grabber.state.outputs.len());
        Ok(grabber)
    }

    fn roundtrip(&mut self) -> CaptureResult<()> {
        self.queue
            .roundtrip(&mut self.state)
            .map(|_| ())
            .map_err(|e| CaptureError::negotiation("wl_display.roundtrip", e))
    }

    /// Bounding box of every output's logical rectangle
    pub fn virtual_desktop(&self) -> CaptureResult<Geometry> {
        let rects: Vec<Geometry> = self.state.outputs.iter().map(|o| o.logical).collect();
        Geometry::bounding(&rects).ok_or(CaptureError::NoOutputs)
    }

    /// Captures all outputs and paints them into a `geometry`-sized image.
    ///
    /// Outputs whose frame fails, or whose pixel format is not supported,
    /// leave their rectangle transparent.
    pub fn grab(&mut self, geometry: Geometry) -> CaptureResult<CaptureImage> {
        if geometry.is_empty() {
            return Err(CaptureError::InvalidGeometry {
                geometry,
                reason: "zero width or height".to_string(),
            });
        }
        let manager = self
            .state
            .copy_manager
            .clone()
            .ok_or_else(|| CaptureError::absent("zwlr_screencopy_manager_v1"))?;
        let qh = self.queue.handle();

        for output in &mut self.state.outputs {
            let frame = manager.capture_output(0, &output.output, &qh, output.name);
            output.grab = Some(GrabBuffer::new(frame));
        }
        self.state.outstanding.start(self.state.outputs.len());

        while !self.state.outstanding.is_idle() {
            if let Err(e) = self.queue.blocking_dispatch(&mut self.state) {
                tracing::warn!("Wayland dispatch failed during screencopy: {}", e);
                break;
            }
        }

        let mut layers = Vec::with_capacity(self.state.outputs.len());
        for output in &mut self.state.outputs {
            let Some(grab) = output.grab.take() else {
                continue;
            };
            if grab.status() != GrabStatus::Ready {
                tracing::debug!("Failed to grab display at {}", output.logical);
                continue;
            }
            match grab.to_image() {
                Ok(image) => layers.push(OutputLayer {
                    x:        output.logical.x,
                    y:        output.logical.y,
                    rotation: Rotation::from_wl_transform(output.transform),
                    image:    image.into_rgba_image(),
                }),
                Err(e) => tracing::warn!("Dropping output at {}: {}", output.logical, e),
            }
        }

        tracing::debug!("Compositing {} output(s) into {}", layers.len(), geometry);
        Ok(CaptureImage::from_rgba(composite_outputs(geometry, &layers)))
    }
}

impl Drop for ScreencopyGrabber {
    fn drop(&mut self) {
        // fields drop after this body, so release now to get the flush in
        self.state.release();
        if let Err(e) = self.conn.flush() {
            tracing::debug!("Failed to flush Wayland teardown: {}", e);
        }
    }
}

impl Dispatch<WlRegistry, ()> for GrabberState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => match interface.as_str() {
                "wl_shm" => {
                    state.shm = Some(registry.bind::<WlShm, _, _>(name, 1, qh, ()));
                }
                "zwlr_screencopy_manager_v1" => {
                    state.copy_manager =
                        Some(registry.bind::<ZwlrScreencopyManagerV1, _, _>(name, 1, qh, ()));
                }
                "zxdg_output_manager_v1" => {
                    state.xdg_output_manager = Some(registry.bind::<ZxdgOutputManagerV1, _, _>(
                        name,
                        version.min(2),
                        qh,
                        (),
                    ));
                }
                "wl_output" => {
                    let output = registry.bind::<WlOutput, _, _>(name, version.min(3), qh, name);
                    let mut descriptor = OutputDescriptor::new(name, output);
                    if let Some(manager) = &state.xdg_output_manager {
                        descriptor.xdg_output =
                            Some(manager.get_xdg_output(&descriptor.output, qh, name));
                    }
                    tracing::debug!("Bound wl_output {} (v{})", name, version.min(3));
                    state.outputs.push(descriptor);
                }
                _ => {}
            },
            wl_registry::Event::GlobalRemove { name } => {
                let Some(index) = state.outputs.iter().position(|o| o.name == name) else {
                    return;
                };
                let removed = state.outputs.remove(index);
                if let Some(grab) = &removed.grab {
                    state.outstanding.forget(grab.progress());
                }
                tracing::debug!("wl_output {} removed", name);
            }
            _ => {}
        }
    }
}

impl Dispatch<WlOutput, u32> for GrabberState {
    fn event(
        state: &mut Self,
        _output: &WlOutput,
        event: wl_output::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Geometry { transform, .. } = event {
            if let Some(output) = state.output_mut(*name) {
                output.transform = match transform {
                    WEnum::Value(t) => t.into(),
                    WEnum::Unknown(raw) => raw,
                };
            }
        }
    }
}

impl Dispatch<ZxdgOutputV1, u32> for GrabberState {
    fn event(
        state: &mut Self,
        _xdg_output: &ZxdgOutputV1,
        event: zxdg_output_v1::Event,
        name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(output) = state.output_mut(*name) else {
            return;
        };
        match event {
            zxdg_output_v1::Event::LogicalPosition { x, y } => {
                output.logical.x = x;
                output.logical.y = y;
            }
            zxdg_output_v1::Event::LogicalSize { width, height } => {
                output.logical.width = width.max(0) as u32;
                output.logical.height = height.max(0) as u32;
            }
            _ => {}
        }
    }
}

impl Dispatch<ZwlrScreencopyFrameV1, u32> for GrabberState {
    fn event(
        state: &mut Self,
        _frame: &ZwlrScreencopyFrameV1,
        event: zwlr_screencopy_frame_v1::Event,
        name: &u32,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_screencopy_frame_v1::Event::Buffer {
                format,
                width,
                height,
                stride,
            } => {
                let Some(shm) = state.shm.as_ref() else {
                    return;
                };
                let Some(output) = state.outputs.iter_mut().find(|o| o.name == *name) else {
                    return;
                };
                let Some(grab) = output.grab.as_mut().filter(|g| !g.has_buffer()) else {
                    return;
                };
                if let Err(e) = grab.attach(shm, qh, format, width, height, stride) {
                    tracing::warn!("Cannot capture output {}: {}", name, e);
                    state.finish_grab(*name, GrabStatus::Failed);
                }
            }
            zwlr_screencopy_frame_v1::Event::Flags { flags } => {
                let y_invert = match flags {
                    WEnum::Value(f) => f.contains(zwlr_screencopy_frame_v1::Flags::YInvert),
                    WEnum::Unknown(raw) => raw & 1 != 0,
                };
                if let Some(grab) = state.output_mut(*name).and_then(|o| o.grab.as_mut()) {
                    grab.set_y_invert(y_invert);
                }
            }
            zwlr_screencopy_frame_v1::Event::Ready { .. } => {
                state.finish_grab(*name, GrabStatus::Ready);
            }
            zwlr_screencopy_frame_v1::Event::Failed => {
                tracing::warn!("Compositor failed to copy output {}", name);
                state.finish_grab(*name, GrabStatus::Failed);
            }
            _ => {}
        }
    }
}

delegate_noop!(GrabberState: ignore WlShm);
delegate_noop!(GrabberState: ignore WlBuffer);
delegate_noop!(GrabberState: WlShmPool);
delegate_noop!(GrabberState: ZwlrScreencopyManagerV1);
delegate_noop!(GrabberState: ZxdgOutputManagerV1);

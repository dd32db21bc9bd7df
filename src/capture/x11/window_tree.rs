//! Enumeration of selectable top-level windows
//!
//! Walks the window tree level by level from the root. For every window on a
//! level six requests are issued before any reply is read, so one level costs
//! a single round trip regardless of its width.
//!
//! Selection rules:
//! - windows that are not viewable are skipped with their subtree
//! - `_NET_WM_STATE_HIDDEN` windows are skipped with their subtree
//! - windows with a selectable `_NET_WM_WINDOW_TYPE` are emitted and not
//!   descended into
//! - any other window is a container: its children are walked with the
//!   container's position added to their own

use x11rb::{
    connection::RequestConnection,
    cookie::Cookie,
    errors::ConnectionError,
    protocol::xproto::{Atom, AtomEnum, ConnectionExt as _, GetPropertyReply, MapState, Window},
    x11_utils::TryParse,
};

use super::atoms::{AtomTable, WellKnownAtom};
use crate::{
    error::{CaptureError, CaptureResult},
    model::{Geometry, OpenWindowInfo},
};

/// Everything the walker needs to know about one window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowProbe {
    pub window:   Window,
    pub children: Vec<Window>,
    /// Position relative to the parent
    pub x:        i16,
    pub y:        i16,
    pub width:    u16,
    pub height:   u16,
    pub viewable: bool,
    pub types:    Vec<Atom>,
    pub states:   Vec<Atom>,
    pub name:     Vec<u8>,
}

/// Source of window-tree data
pub trait WindowTreeSource {
    /// Direct children of the root window
    fn root_children(&self) -> CaptureResult<Vec<Window>>;

    /// Probes every window of one level. Returns one entry per input window,
    /// in order; an `Err` entry means that window's replies failed.
    fn probe_batch(&self, windows: &[Window], atoms: &AtomTable) -> Vec<CaptureResult<WindowProbe>>;
}

/// Walks the tree and returns every selectable, visible window
pub fn walk_windows<S>(source: &S, atoms: &AtomTable) -> CaptureResult<Vec<OpenWindowInfo>>
where
    S: WindowTreeSource + ?Sized,
{
    let mut out = Vec::new();
    let mut level: Vec<(Window, (i32, i32))> = source
        .root_children()?
        .into_iter()
        .map(|w| (w, (0, 0)))
        .collect();

    while !level.is_empty() {
        let windows: Vec<Window> = level.iter().map(|(w, _)| *w).collect();
        let probes = source.probe_batch(&windows, atoms);
        let mut next = Vec::new();

        for ((window, (px, py)), probe) in level.iter().zip(probes) {
            let probe = match probe {
                Ok(probe) => probe,
                Err(e) => {
                    tracing::debug!("Skipping window 0x{:x}: {}", window, e);
                    continue;
                }
            };

            if !probe.viewable {
                continue;
            }

            let x = px + i32::from(probe.x);
            let y = py + i32::from(probe.y);

            if atoms.is_hidden_state(&probe.states) {
                tracing::trace!("Skipping hidden window 0x{:x}", window);
                continue;
            }

            if atoms.is_selectable_type(&probe.types) {
                let geometry = Geometry::new(x, y, u32::from(probe.width), u32::from(probe.height));
                let name = String::from_utf8_lossy(&probe.name).into_owned();
                tracing::trace!("Selectable window 0x{:x}: {} at {}", window, name, geometry);
                out.push(OpenWindowInfo::new(geometry, name));
                continue;
            }

            next.extend(probe.children.into_iter().map(|child| (child, (x, y))));
        }

        level = next;
    }

    tracing::debug!("Enumerated {} selectable windows", out.len());
    Ok(out)
}

/// [`WindowTreeSource`] backed by a live X connection
pub struct X11TreeSource<'a, C> {
    conn: &'a C,
    root: Window,
}

impl<'a, C> X11TreeSource<'a, C> {
    pub fn new(conn: &'a C, root: Window) -> Self {
        Self { conn, root }
    }
}

fn wait<C, R>(
    operation: &'static str,
    cookie: Result<Cookie<'_, C, R>, ConnectionError>,
) -> CaptureResult<R>
where
    C: RequestConnection + ?Sized,
    R: TryParse,
{
    cookie
        .map_err(|e| CaptureError::negotiation(operation, e))?
        .reply()
        .map_err(|e| CaptureError::negotiation(operation, e))
}

fn atom_values(reply: GetPropertyReply) -> Vec<Atom> {
    reply
        .value32()
        .map(|values| values.collect())
        .unwrap_or_default()
}

impl<C: RequestConnection> WindowTreeSource for X11TreeSource<'_, C> {
    fn root_children(&self) -> CaptureResult<Vec<Window>> {
        Ok(wait("query_tree(root)", self.conn.query_tree(self.root))?.children)
    }

    fn probe_batch(&self, windows: &[Window], atoms: &AtomTable) -> Vec<CaptureResult<WindowProbe>> {
        let conn = self.conn;
        let type_atom = atoms.get(WellKnownAtom::NetWmWindowType);
        let state_atom = atoms.get(WellKnownAtom::NetWmState);

        // An uninterned property atom would fail the whole window with
        // BadAtom, so such properties are treated as empty instead.
        let atom_list = |w: Window, prop: Atom| {
            (prop != 0).then(|| conn.get_property(false, w, prop, AtomEnum::ATOM, 0, 32))
        };

        let pending: Vec<_> = windows
            .iter()
            .map(|&w| {
                (
                    w,
                    conn.query_tree(w),
                    conn.get_geometry(w),
                    conn.get_window_attributes(w),
                    atom_list(w, type_atom),
                    atom_list(w, state_atom),
                    conn.get_property(false, w, AtomEnum::WM_NAME, AtomEnum::ANY, 0, 64),
                )
            })
            .collect();

        pending
            .into_iter()
            .map(|(window, tree, geometry, attributes, types, states, name)| {
                let tree = wait("query_tree", tree)?;
                let geometry = wait("get_geometry", geometry)?;
                let attributes = wait("get_window_attributes", attributes)?;
                let types = match types {
                    Some(cookie) => atom_values(wait("get_property(_NET_WM_WINDOW_TYPE)", cookie)?),
                    None => Vec::new(),
                };
                let states = match states {
                    Some(cookie) => atom_values(wait("get_property(_NET_WM_STATE)", cookie)?),
                    None => Vec::new(),
                };
                let name = wait("get_property(WM_NAME)", name)?.value;

                Ok(WindowProbe {
                    window,
                    children: tree.children,
                    x: geometry.x,
                    y: geometry.y,
                    width: geometry.width,
                    height: geometry.height,
                    viewable: attributes.map_state == MapState::VIEWABLE,
                    types,
                    states,
                    name,
                })
            })
            .collect()
    }
}

//! Well-known EWMH atoms, interned once per connection

use x11rb::{
    connection::Connection,
    protocol::xproto::{Atom, ConnectionExt as _},
};

/// Atoms the window walker matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownAtom {
    NetWmWindowType,
    NetWmWindowTypeDock,
    NetWmWindowTypeToolbar,
    NetWmWindowTypeMenu,
    NetWmWindowTypeUtility,
    NetWmWindowTypeSplash,
    NetWmWindowTypeDialog,
    NetWmWindowTypeNotification,
    NetWmWindowTypeNormal,
    NetWmState,
    NetWmStateHidden,
}

impl WellKnownAtom {
    /// Every declared atom, in table order
    pub const ALL: [WellKnownAtom; 11] = [
        WellKnownAtom::NetWmWindowType,
        WellKnownAtom::NetWmWindowTypeDock,
        WellKnownAtom::NetWmWindowTypeToolbar,
        WellKnownAtom::NetWmWindowTypeMenu,
        WellKnownAtom::NetWmWindowTypeUtility,
        WellKnownAtom::NetWmWindowTypeSplash,
        WellKnownAtom::NetWmWindowTypeDialog,
        WellKnownAtom::NetWmWindowTypeNotification,
        WellKnownAtom::NetWmWindowTypeNormal,
        WellKnownAtom::NetWmState,
        WellKnownAtom::NetWmStateHidden,
    ];

    /// Window types a user can pick as a capture target
    pub const SELECTABLE_TYPES: [WellKnownAtom; 8] = [
        WellKnownAtom::NetWmWindowTypeDialog,
        WellKnownAtom::NetWmWindowTypeDock,
        WellKnownAtom::NetWmWindowTypeMenu,
        WellKnownAtom::NetWmWindowTypeNormal,
        WellKnownAtom::NetWmWindowTypeNotification,
        WellKnownAtom::NetWmWindowTypeSplash,
        WellKnownAtom::NetWmWindowTypeToolbar,
        WellKnownAtom::NetWmWindowTypeUtility,
    ];

    /// Protocol name of the atom
    pub fn name(self) -> &'static str {
        match self {
            WellKnownAtom::NetWmWindowType => "_NET_WM_WINDOW_TYPE",
            WellKnownAtom::NetWmWindowTypeDock => "_NET_WM_WINDOW_TYPE_DOCK",
            WellKnownAtom::NetWmWindowTypeToolbar => "_NET_WM_WINDOW_TYPE_TOOLBAR",
            WellKnownAtom::NetWmWindowTypeMenu => "_NET_WM_WINDOW_TYPE_MENU",
            WellKnownAtom::NetWmWindowTypeUtility => "_NET_WM_WINDOW_TYPE_UTILITY",
            WellKnownAtom::NetWmWindowTypeSplash => "_NET_WM_WINDOW_TYPE_SPLASH",
            WellKnownAtom::NetWmWindowTypeDialog => "_NET_WM_WINDOW_TYPE_DIALOG",
            WellKnownAtom::NetWmWindowTypeNotification => "_NET_WM_WINDOW_TYPE_NOTIFICATION",
            WellKnownAtom::NetWmWindowTypeNormal => "_NET_WM_WINDOW_TYPE_NORMAL",
            WellKnownAtom::NetWmState => "_NET_WM_STATE",
            WellKnownAtom::NetWmStateHidden => "_NET_WM_STATE_HIDDEN",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Interned atom ids, immutable after construction
///
/// An atom the server does not know (or failed to intern) stays `0`
/// (`NONE`) and never matches a property value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomTable {
    ids: [Atom; WellKnownAtom::ALL.len()],
}

impl AtomTable {
    /// Interns every declared atom with `only_if_exists`, pipelining all
    /// requests before reading any reply.
    pub fn intern<C: Connection>(conn: &C) -> Self {
        let cookies: Vec<_> = WellKnownAtom::ALL
            .iter()
            .map(|atom| (*atom, conn.intern_atom(true, atom.name().as_bytes())))
            .collect();

        let mut table = AtomTable::default();
        for (atom, cookie) in cookies {
            let reply = cookie
                .map_err(|e| e.to_string())
                .and_then(|c| c.reply().map_err(|e| e.to_string()));
            match reply {
                Ok(reply) => table.ids[atom.index()] = reply.atom,
                Err(e) => tracing::warn!("Failed to intern atom {}: {}", atom.name(), e),
            }
        }

        tracing::debug!(
            "Interned {} of {} EWMH atoms",
            table.ids.iter().filter(|id| **id != 0).count(),
            WellKnownAtom::ALL.len()
        );
        table
    }

    /// Builds a table from explicit ids
    pub fn from_pairs(pairs: &[(WellKnownAtom, Atom)]) -> Self {
        let mut table = AtomTable::default();
        for (atom, id) in pairs {
            table.ids[atom.index()] = *id;
        }
        table
    }

    /// Id of `atom`, `0` when not interned
    pub fn get(&self, atom: WellKnownAtom) -> Atom {
        self.ids[atom.index()]
    }

    /// True when any of `types` is a selectable window type
    pub fn is_selectable_type(&self, types: &[Atom]) -> bool {
        WellKnownAtom::SELECTABLE_TYPES
            .iter()
            .map(|atom| self.get(*atom))
            .filter(|id| *id != 0)
            .any(|id| types.contains(&id))
    }

    /// True when `states` contains `_NET_WM_STATE_HIDDEN`
    pub fn is_hidden_state(&self, states: &[Atom]) -> bool {
        let hidden = self.get(WellKnownAtom::NetWmStateHidden);
        hidden != 0 && states.contains(&hidden)
    }
}

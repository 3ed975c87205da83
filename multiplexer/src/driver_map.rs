//! Driver Map (C2): binds a major device number to a driver endpoint plus the policy
//! handlers and style flags that govern how the file server talks to it.

use bitflags::bitflags;
use devmux_shared::constants::NR_DEVICES;
use devmux_shared::endpoint::Endpoint;

bitflags! {
    /// Driver capability flags (`DRV_SG` and friends in the original `dmap_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DriverStyle: u8 {
        /// Driver accepts scatter/gather requests directly.
        const SCATTER_GATHER = 0b0000_0001;
    }
}

/// Which open/close policy a major uses (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenCloseHandler {
    Generic,
    Tty,
    ControllingTty,
    Clone,
    /// No device occupies this slot.
    Absent,
}

/// Which I/O policy a major uses (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoHandler {
    Generic,
    ControllingTty,
    Absent,
}

/// One Driver Map slot. `endpoint == None` if and only if both handlers are their
/// `Absent` variant — `bind`/`unmap_by_endpoint` are the only ways to change a binding,
/// and both maintain that invariant.
#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub endpoint: Option<Endpoint>,
    pub open_close: OpenCloseHandler,
    pub io: IoHandler,
    pub style: DriverStyle,
}

impl Binding {
    pub const ABSENT: Binding = Binding {
        endpoint: None,
        open_close: OpenCloseHandler::Absent,
        io: IoHandler::Absent,
        style: DriverStyle::empty(),
    };

    pub fn is_bound(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// Fixed-size table of `NR_DEVICES` bindings, indexed by major number.
pub struct DriverMap {
    bindings: [Binding; NR_DEVICES],
}

impl DriverMap {
    pub fn new() -> Self {
        DriverMap { bindings: [Binding::ABSENT; NR_DEVICES] }
    }

    /// Masks `major` to the table's range the same way on every call path — the
    /// original applied this inconsistently between `dev_open` and `dev_close`
    /// (spec §9 open question); this rewrite normalizes it to a single place.
    fn index(major: u8) -> Option<usize> {
        let major = major as usize;
        if major < NR_DEVICES {
            Some(major)
        } else {
            None
        }
    }

    /// Out-of-range majors and unbound slots both yield `Binding::ABSENT`.
    pub fn lookup(&self, major: u8) -> Binding {
        match Self::index(major) {
            Some(i) => self.bindings[i],
            None => Binding::ABSENT,
        }
    }

    /// Installs a new binding. Out-of-range majors are silently ignored: a caller that
    /// validated the major already knows this; one that didn't gets no binding rather
    /// than a panic.
    pub fn bind(
        &mut self,
        major: u8,
        endpoint: Endpoint,
        open_close: OpenCloseHandler,
        io: IoHandler,
        style: DriverStyle,
    ) {
        if let Some(i) = Self::index(major) {
            self.bindings[i] = Binding { endpoint: Some(endpoint), open_close, io, style };
        }
    }

    /// Clears every binding that references `endpoint`, restoring each to `ABSENT`.
    pub fn unmap_by_endpoint(&mut self, endpoint: Endpoint) {
        for b in self.bindings.iter_mut() {
            if b.endpoint == Some(endpoint) {
                *b = Binding::ABSENT;
            }
        }
    }

    /// True if `major` is still bound to `expected` — guards the window between a
    /// `lookup` and actually dispatching to it, in case a status probe or restart raced
    /// ahead and rebound the major out from under the in-flight call.
    pub fn binding_is_current(&self, major: u8, expected: Endpoint) -> bool {
        self.lookup(major).endpoint == Some(expected)
    }

    /// True if any slot currently points at `endpoint` — used by the status handler to
    /// decide whether an unsolicited probe reply is from a driver it still recognizes.
    pub fn any_binding_for(&self, endpoint: Endpoint) -> bool {
        self.bindings.iter().any(|b| b.endpoint == Some(endpoint))
    }
}

impl Default for DriverMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_major_is_absent() {
        let map = DriverMap::new();
        assert!(!map.lookup(3).is_bound());
    }

    #[test]
    fn out_of_range_major_is_absent_not_clamped() {
        let map = DriverMap::new();
        let binding = map.lookup(200);
        assert!(!binding.is_bound());
        assert_eq!(binding.open_close, OpenCloseHandler::Absent);
    }

    #[test]
    fn bind_then_unmap_restores_absent() {
        let mut map = DriverMap::new();
        map.bind(3, 42, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
        assert!(map.lookup(3).is_bound());
        map.unmap_by_endpoint(42);
        assert!(!map.lookup(3).is_bound());
    }

    #[test]
    fn unmap_clears_every_major_for_that_endpoint() {
        let mut map = DriverMap::new();
        map.bind(1, 7, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
        map.bind(2, 7, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
        map.unmap_by_endpoint(7);
        assert!(!map.lookup(1).is_bound());
        assert!(!map.lookup(2).is_bound());
    }

    #[test]
    fn binding_is_current_detects_rebind() {
        let mut map = DriverMap::new();
        map.bind(3, 42, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
        assert!(map.binding_is_current(3, 42));
        map.bind(3, 99, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
        assert!(!map.binding_is_current(3, 42));
    }
}

//! Process table: the session/controlling-tty bookkeeping the open/close policies
//! (C6) need. Suspension state lives in `SuspensionRegistry` instead — the two tables
//! cover disjoint parts of what the original's single `fproc` struct held, each owned
//! by the `Multiplexer` facade.

use devmux_shared::constants::NR_PROCS;
use devmux_shared::endpoint::Endpoint;
use devmux_shared::DeviceNumber;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct ProcessRecord {
    pub pid: u32,
    pub session_leader: bool,
    pub controlling_tty: Option<DeviceNumber>,
}

/// Keyed by endpoint rather than a fixed array index; `NR_PROCS` is still enforced as a
/// capacity bound at registration time, preserving the original's fixed-table flavor
/// without needing a real fixed-size array.
pub struct ProcessTable {
    records: HashMap<Endpoint, ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        ProcessTable { records: HashMap::new() }
    }

    pub fn register(&mut self, endpoint: Endpoint, pid: u32) {
        assert!(
            self.records.len() < NR_PROCS || self.records.contains_key(&endpoint),
            "process table exhausted (NR_PROCS = {NR_PROCS})"
        );
        self.records
            .insert(endpoint, ProcessRecord { pid, session_leader: false, controlling_tty: None });
    }

    pub fn remove(&mut self, endpoint: Endpoint) {
        self.records.remove(&endpoint);
    }

    pub fn get(&self, endpoint: Endpoint) -> Option<&ProcessRecord> {
        self.records.get(&endpoint)
    }

    pub fn get_mut(&mut self, endpoint: Endpoint) -> Option<&mut ProcessRecord> {
        self.records.get_mut(&endpoint)
    }

    /// Makes `endpoint` a session leader with no controlling tty yet, mirroring
    /// `pm_setsid`. Idempotent: calling it again just clears the controlling tty again.
    pub fn setsid(&mut self, endpoint: Endpoint) {
        if let Some(rec) = self.get_mut(endpoint) {
            rec.session_leader = true;
            rec.controlling_tty = None;
        }
    }

    /// True if any registered process already has `device` as its controlling tty —
    /// used by `tty_open` to decide whether a second session may acquire it.
    pub fn any_controls(&self, device: DeviceNumber) -> bool {
        self.records.values().any(|r| r.controlling_tty == Some(device))
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setsid_clears_controlling_tty() {
        let mut table = ProcessTable::new();
        table.register(5, 100);
        table.get_mut(5).unwrap().controlling_tty = Some(DeviceNumber::new(4, 0));
        table.setsid(5);
        let rec = table.get(5).unwrap();
        assert!(rec.session_leader);
        assert_eq!(rec.controlling_tty, None);
    }

    #[test]
    fn any_controls_detects_existing_claim() {
        let mut table = ProcessTable::new();
        table.register(5, 100);
        let dev = DeviceNumber::new(4, 0);
        assert!(!table.any_controls(dev));
        table.get_mut(5).unwrap().controlling_tty = Some(dev);
        assert!(table.any_controls(dev));
    }
}

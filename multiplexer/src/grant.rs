//! Grant Broker (C1): mints capability grants over caller memory and tracks them until
//! revoked. A `Grant` is a linear value — it must be handed back to
//! `GrantBroker::revoke`, or moved whole into the Suspension Registry, exactly once.
//! Dropping a live grant any other way is a bookkeeping bug, not a recoverable error.

use devmux_shared::endpoint::Endpoint;
use devmux_shared::message::GrantId;
use std::collections::HashMap;

/// Which side of the grant gets which access. Named from the driver's point of view,
/// matching `CPF_READ`/`CPF_WRITE` in the original grant API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The driver reads the caller's buffer (e.g. `write(2)`).
    DriverReads,
    /// The driver writes the caller's buffer (e.g. `read(2)`).
    DriverWrites,
    /// Both directions, used for the outer grant over a scatter/gather vector.
    Both,
    /// Neither direction: a directionless `ioctl` code grants no buffer access at all
    /// (`access` starts at `0` and is never set in the original's `do_ioctl`).
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct GrantRecord {
    pub driver: Endpoint,
    pub owner: Endpoint,
    pub addr: usize,
    pub len: usize,
    pub direction: Direction,
}

/// A minted capability. Move-only: there is no `Clone`, and `Drop` asserts it was
/// revoked first. Transferring a grant into the Suspension Registry is just moving this
/// value into that registry's storage — ordinary Rust ownership already gives us the
/// "revoked or transferred, never both" invariant spec'd for grants.
#[derive(Debug)]
pub struct Grant {
    id: GrantId,
    live: bool,
}

impl Grant {
    pub fn id(&self) -> GrantId {
        self.id
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        debug_assert!(!self.live, "grant {} dropped without being revoked", self.id);
    }
}

/// Mints and revokes grants. Backed by a map rather than the original's fixed-size
/// table: in Rust there is no "table full" failure mode to reproduce, since minting
/// never needs a bound tighter than the id space itself.
pub struct GrantBroker {
    next_id: GrantId,
    live: HashMap<GrantId, GrantRecord>,
}

impl GrantBroker {
    pub fn new() -> Self {
        GrantBroker { next_id: 0, live: HashMap::new() }
    }

    /// Grants over memory in `owner`'s address space (the usual case: `owner` is the
    /// calling process).
    pub fn grant_buffer(
        &mut self,
        driver: Endpoint,
        owner: Endpoint,
        addr: usize,
        len: usize,
        direction: Direction,
    ) -> Grant {
        self.mint(GrantRecord { driver, owner, addr, len, direction })
    }

    /// Grants over memory in the file server's own address space (e.g. a server-local
    /// scatter/gather vector).
    pub fn grant_direct(
        &mut self,
        driver: Endpoint,
        addr: usize,
        len: usize,
        direction: Direction,
    ) -> Grant {
        self.mint(GrantRecord {
            driver,
            owner: devmux_shared::endpoint::FS_ENDPOINT,
            addr,
            len,
            direction,
        })
    }

    fn mint(&mut self, record: GrantRecord) -> Grant {
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .expect("grant id space exhausted: programming error, the id space is not meant to wrap");
        self.live.insert(id, record);
        Grant { id, live: true }
    }

    /// Revokes a held grant. Panics if `grant` is not one this broker currently tracks
    /// (double revoke, or a grant from a different broker).
    pub fn revoke(&mut self, mut grant: Grant) {
        self.live
            .remove(&grant.id)
            .expect("revoke called on a grant id this broker is not tracking");
        grant.live = false;
    }

    /// Idempotent revoke for the "invalid grant" case: a `None` here stands in for the
    /// original's `GRANT_INVALID` sentinel.
    pub fn revoke_opt(&mut self, grant: Option<Grant>) {
        if let Some(g) = grant {
            self.revoke(g);
        }
    }

    pub fn record(&self, id: GrantId) -> Option<&GrantRecord> {
        self.live.get(&id)
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl Default for GrantBroker {
    fn default() -> Self {
        Self::new()
    }
}

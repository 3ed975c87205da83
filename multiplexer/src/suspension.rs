//! Suspension Registry (C5): holds the grant of a caller parked on `SUSPEND`, keyed by
//! that caller's endpoint, until a revive, a cancel, or the caller's own exit resolves
//! it.

use crate::grant::{Grant, GrantBroker};
use devmux_shared::endpoint::Endpoint;
use devmux_shared::ipc::{IpcError, Transport};
use devmux_shared::message::{GrantId, WireKind, WireMessage};
use devmux_shared::status::Status;
use std::collections::HashMap;

struct SuspendedCall {
    driver: Endpoint,
    grant: Grant,
}

/// At most one outstanding suspension per caller — a second `suspend` for an already
/// suspended caller is a bookkeeping bug upstream (the file server should not have let
/// the same process issue two blocking calls at once).
pub struct SuspensionRegistry {
    by_caller: HashMap<Endpoint, SuspendedCall>,
}

impl SuspensionRegistry {
    pub fn new() -> Self {
        SuspensionRegistry { by_caller: HashMap::new() }
    }

    pub fn suspend(&mut self, caller: Endpoint, driver: Endpoint, grant: Grant) {
        let prior = self.by_caller.insert(caller, SuspendedCall { driver, grant });
        debug_assert!(prior.is_none(), "process {caller} was already suspended");
    }

    /// Finds the caller a `DEV_REVIVE` grant belongs to. There is at most one match
    /// while the grant is live, since grant ids are never reused.
    pub fn find_suspended(&self, driver: Endpoint, grant: GrantId) -> Option<Endpoint> {
        self.by_caller
            .iter()
            .find(|(_, call)| call.driver == driver && call.grant.id() == grant)
            .map(|(caller, _)| *caller)
    }

    /// Delivers a late reply to `caller`: revokes the held grant and returns the status
    /// to hand back as that caller's syscall result. `None` if `caller` was not
    /// suspended (a stray or duplicate revive).
    pub fn revive(&mut self, caller: Endpoint, status: Status, broker: &mut GrantBroker) -> Option<Status> {
        let call = self.by_caller.remove(&caller)?;
        broker.revoke(call.grant);
        Some(status)
    }

    /// Cancels `caller`'s outstanding call: sends `Cancel` carrying the held grant,
    /// waits for the driver's acknowledgment, then revokes regardless of whether the
    /// acknowledgment arrived — the caller is exiting either way and this grant must
    /// not outlive it.
    pub fn cancel(&mut self, caller: Endpoint, transport: &dyn Transport, broker: &mut GrantBroker) {
        let Some(call) = self.by_caller.remove(&caller) else { return };
        let mut msg = WireMessage::request(WireKind::Cancel, 0, caller);
        msg.grant = Some(call.grant.id());
        if let Err(e) = cancel_send_receive(transport, call.driver, &msg) {
            log::warn!("cancel for {caller} on driver {} did not complete cleanly: {e}", call.driver);
        }
        broker.revoke(call.grant);
    }

    #[cfg(test)]
    pub fn is_suspended(&self, caller: Endpoint) -> bool {
        self.by_caller.contains_key(&caller)
    }
}

fn cancel_send_receive(transport: &dyn Transport, driver: Endpoint, msg: &WireMessage) -> Result<(), IpcError> {
    transport.send_receive(driver, msg).map(|_| ())
}

impl Default for SuspensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devmux_shared::endpoint::NONE;
    use devmux_shared::ipc::IpcError;
    use std::cell::RefCell;

    struct StubTransport {
        reply: RefCell<Option<Result<WireMessage, IpcError>>>,
    }

    impl Transport for StubTransport {
        fn send(&self, _to: Endpoint, _msg: &WireMessage) -> Result<(), IpcError> {
            Ok(())
        }
        fn receive(&self, _from: Endpoint) -> Result<WireMessage, IpcError> {
            self.reply.borrow_mut().take().unwrap_or(Err(IpcError::DestinationDied))
        }
    }

    #[test]
    fn revive_returns_status_and_revokes() {
        let mut broker = GrantBroker::new();
        let mut registry = SuspensionRegistry::new();
        let grant = broker.grant_buffer(9, 5, 0, 16, crate::grant::Direction::DriverWrites);
        let id = grant.id();
        registry.suspend(5, 9, grant);
        assert!(registry.is_suspended(5));
        let status = registry.revive(5, 3, &mut broker);
        assert_eq!(status, Some(3));
        assert!(!registry.is_suspended(5));
        assert!(broker.record(id).is_none());
    }

    #[test]
    fn revive_on_unknown_caller_returns_none() {
        let mut broker = GrantBroker::new();
        let mut registry = SuspensionRegistry::new();
        assert_eq!(registry.revive(NONE, 0, &mut broker), None);
    }

    #[test]
    fn cancel_revokes_even_when_driver_never_answers() {
        let mut broker = GrantBroker::new();
        let mut registry = SuspensionRegistry::new();
        let grant = broker.grant_buffer(9, 5, 0, 16, crate::grant::Direction::DriverReads);
        let id = grant.id();
        registry.suspend(5, 9, grant);
        let transport = StubTransport { reply: RefCell::new(None) };
        registry.cancel(5, &transport, &mut broker);
        assert!(!registry.is_suspended(5));
        assert!(broker.record(id).is_none());
    }
}

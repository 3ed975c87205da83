//! The IPC primitive the multiplexer is built on (spec §1 Non-goals: this core assumes
//! it, it does not implement it).

use crate::endpoint::Endpoint;
use crate::message::WireMessage;
use thiserror::Error;

/// Failure codes the underlying IPC primitive can report. Named after the originals
/// (`EDEADSRCDST`, `EDSTDIED`, `ESRCDIED`, `ELOCKED`) so the three "peer is dead" codes
/// stay distinguishable from the fourth, recoverable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IpcError {
    /// Destination does not exist or already died before the call was made.
    #[error("dead source/destination")]
    DeadSourceDestination,
    /// Destination died while the call was outstanding.
    #[error("destination died")]
    DestinationDied,
    /// Source (the caller on whose behalf this IPC was issued) died.
    #[error("source died")]
    SourceDied,
    /// The peer is transiently locked (e.g. mid-revival); not a dead-peer condition.
    #[error("peer locked")]
    Locked,
}

impl IpcError {
    /// True for the three "this peer is never coming back" codes.
    pub fn is_dead_peer(self) -> bool {
        matches!(
            self,
            IpcError::DeadSourceDestination | IpcError::DestinationDied | IpcError::SourceDied
        )
    }
}

/// The three IPC primitives the core relies on. Implementations deliver messages to
/// and from driver/authority endpoints; the multiplexer never looks inside the
/// transport beyond this trait.
pub trait Transport: Send + Sync {
    fn send(&self, to: Endpoint, msg: &WireMessage) -> Result<(), IpcError>;
    fn receive(&self, from: Endpoint) -> Result<WireMessage, IpcError>;
    fn send_receive(&self, to: Endpoint, msg: &WireMessage) -> Result<WireMessage, IpcError> {
        self.send(to, msg)?;
        self.receive(to)
    }
}

/// A binding change announced by the reincarnation authority (`fs_devctl` in the
/// original), observed by `block_io`'s driver-restart loop while it waits for a dead
/// block driver to come back.
#[derive(Debug, Clone, Copy)]
pub struct DevCtl {
    pub request: DevCtlRequest,
    pub major: u8,
    pub driver: Endpoint,
    pub style: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevCtlRequest {
    MapDriver,
    UnmapDriver,
}

/// The narrow channel to the reincarnation authority: receive the next binding change,
/// acknowledge having applied it. Kept separate from `Transport` since it speaks a
/// different protocol to a different, fixed peer.
pub trait AuthorityChannel: Send + Sync {
    fn receive_devctl(&self) -> Result<DevCtl, IpcError>;
    fn acknowledge(&self, result: i32) -> Result<(), IpcError>;
}

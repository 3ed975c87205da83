//! Message Adapter (C3): rewrites a logical I/O request into its grant-bearing wire
//! form. Every op this adapter handles carries a payload — rewriting is mandatory here,
//! since every driver in this system is a modern, grant-aware one (spec §4.3).

use crate::grant::{Direction, Grant, GrantBroker};
use devmux_shared::endpoint::{Endpoint, FS_ENDPOINT};
use devmux_shared::ioctl::{IoctlCode, IoctlDirection};
use devmux_shared::message::{WireKind, WireMessage};
use devmux_shared::DeviceNumber;

/// One fragment of a scatter/gather vector: an address/length pair in the caller's
/// address space.
#[derive(Debug, Clone, Copy)]
pub struct IoVecEntry {
    pub addr: usize,
    pub len: usize,
}

/// A logical I/O operation, already validated against the binding it will be sent to.
/// Each variant carries exactly the payload that operation needs — there is no
/// "no-payload" case here, since open/close bypass the adapter entirely (spec §4.1).
pub enum IoOp {
    Read { addr: usize, len: usize },
    Write { addr: usize, len: usize },
    Gather(Vec<IoVecEntry>),
    Scatter(Vec<IoVecEntry>),
    Ioctl { addr: usize, code: IoctlCode },
}

pub struct RawRequest {
    pub op: IoOp,
    pub device: DeviceNumber,
    /// Whose address space the payload lives in (usually the calling process).
    pub io_endpoint: Endpoint,
    pub position: i64,
}

/// The outcome of rewriting one request: the wire message to send, plus every grant
/// minted for it. The caller owns revoking (or transferring, on suspend) all of them.
pub struct Adapted {
    pub outer_grant: Option<Grant>,
    pub sub_grants: Vec<Grant>,
    pub wire: WireMessage,
}

fn ioctl_direction_to_grant(dir: IoctlDirection) -> Direction {
    let reads = dir.contains(IoctlDirection::READ);
    let writes = dir.contains(IoctlDirection::WRITE);
    match (reads, writes) {
        (true, true) => Direction::Both,
        (true, false) => Direction::DriverReads,
        (false, true) => Direction::DriverWrites,
        (false, false) => Direction::None,
    }
}

/// Rewrites `req` into its grant-bearing wire form, minting every grant the payload
/// needs from `broker`.
pub fn adapt(broker: &mut GrantBroker, driver: Endpoint, req: &RawRequest) -> Adapted {
    let mut wire = WireMessage::request(wire_kind(&req.op), req.device.minor(), FS_ENDPOINT);
    wire.position = req.position;

    match &req.op {
        IoOp::Read { addr, len } => {
            let grant = broker.grant_buffer(driver, req.io_endpoint, *addr, *len, Direction::DriverWrites);
            wire.count = *len as i32;
            wire.grant = Some(grant.id());
            Adapted { outer_grant: Some(grant), sub_grants: Vec::new(), wire }
        }
        IoOp::Write { addr, len } => {
            let grant = broker.grant_buffer(driver, req.io_endpoint, *addr, *len, Direction::DriverReads);
            wire.count = *len as i32;
            wire.grant = Some(grant.id());
            Adapted { outer_grant: Some(grant), sub_grants: Vec::new(), wire }
        }
        IoOp::Gather(entries) | IoOp::Scatter(entries) => {
            if entries.len() > devmux_shared::constants::NR_IOREQS {
                panic!(
                    "scatter/gather vector of {} fragments exceeds NR_IOREQS: programming error, \
                     the caller must split the request first",
                    entries.len()
                );
            }
            let gathering = matches!(req.op, IoOp::Gather(_));
            let sub_direction = if gathering { Direction::DriverWrites } else { Direction::DriverReads };
            let mut sub_grants = Vec::with_capacity(entries.len());
            for entry in entries {
                sub_grants.push(broker.grant_buffer(driver, req.io_endpoint, entry.addr, entry.len, sub_direction));
            }
            let vector_bytes = entries.len() * std::mem::size_of::<IoVecEntry>();
            let outer = broker.grant_direct(driver, 0, vector_bytes, Direction::Both);
            wire.count = entries.len() as i32;
            wire.grant = Some(outer.id());
            Adapted { outer_grant: Some(outer), sub_grants, wire }
        }
        IoOp::Ioctl { addr, code } => {
            let direction = ioctl_direction_to_grant(code.direction());
            let grant = broker.grant_buffer(driver, req.io_endpoint, *addr, code.size(), direction);
            wire.count = code.raw as i32;
            wire.grant = Some(grant.id());
            // Preserves the original's field-overload quirk: `position` carries the
            // caller's endpoint, not a byte offset, for ioctl (spec §9).
            wire.position = req.io_endpoint as i64;
            Adapted { outer_grant: Some(grant), sub_grants: Vec::new(), wire }
        }
    }
}

fn wire_kind(op: &IoOp) -> WireKind {
    match op {
        IoOp::Read { .. } => WireKind::ReadSafe,
        IoOp::Write { .. } => WireKind::WriteSafe,
        IoOp::Gather(_) => WireKind::GatherSafe,
        IoOp::Scatter(_) => WireKind::ScatterSafe,
        IoOp::Ioctl { .. } => WireKind::IoctlSafe,
    }
}

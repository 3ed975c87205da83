//! Open/close and per-kind I/O policies (C6): the handful of ways a binding's open,
//! close or I/O call can be carried out, selected by `DriverMap`'s `OpenCloseHandler` /
//! `IoHandler` for the target major.

use crate::dispatch::{dispatch, DispatchError};
use crate::driver_map::DriverMap;
use crate::external::{FileDescriptor, InodeAllocator};
use crate::process::ProcessRecord;
use bitflags::bitflags;
use devmux_shared::endpoint::Endpoint;
use devmux_shared::ipc::Transport;
use devmux_shared::message::{WireKind, WireMessage};
use devmux_shared::status::Status;
use devmux_shared::{DeviceError, DeviceNumber};

bitflags! {
    /// `open(2)`-style flags relevant to device policy. `NO_CTTY` is set internally by
    /// `tty_open`, not by the caller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ     = 0b0001;
        const WRITE    = 0b0010;
        const NO_CTTY  = 0b0100;
    }
}

/// Sends a bare `Open` and returns the driver's reply status unchanged — it may be a
/// new minor (clone devices), an ordinary success code, or a negative errno the driver
/// chose itself.
pub fn generic_open(
    transport: &dyn Transport,
    driver: Endpoint,
    device: DeviceNumber,
    caller: Endpoint,
    flags: OpenFlags,
) -> Status {
    let mut msg = WireMessage::request(WireKind::Open, device.minor(), caller);
    msg.count = flags.bits() as i32;
    match transport.send_receive(driver, &msg) {
        Ok(reply) => reply.status,
        Err(e) => {
            log::error!("open of {device} on driver {driver} failed: {e}");
            DeviceError::Io.as_status()
        }
    }
}

/// Sends a bare `Close`. Errors are logged, not propagated: `close` never fails from
/// the caller's point of view.
pub fn generic_close(transport: &dyn Transport, driver: Endpoint, device: DeviceNumber) {
    let msg = WireMessage::request(WireKind::Close, device.minor(), devmux_shared::endpoint::NONE);
    if let Err(e) = transport.send_receive(driver, &msg) {
        log::warn!("close of {device} on driver {driver} did not complete cleanly: {e}");
    }
}

/// Opens a tty device. A process may only acquire it as a controlling tty if it is
/// already a session leader with none, and no other process already claims it (spec
/// §9: kept as an open question the original leaves unresolved, preserved here).
pub fn tty_open(
    transport: &dyn Transport,
    driver: Endpoint,
    device: DeviceNumber,
    caller: Endpoint,
    mut flags: OpenFlags,
    caller_record: &mut ProcessRecord,
    any_other_process_controls_it: bool,
) -> Status {
    let may_acquire =
        caller_record.session_leader && caller_record.controlling_tty.is_none() && !any_other_process_controls_it;
    if !may_acquire {
        flags |= OpenFlags::NO_CTTY;
    }

    let status = generic_open(transport, driver, device, caller, flags);
    if status == 1 {
        debug_assert!(may_acquire, "driver acquired a controlling tty we told it not to");
        caller_record.controlling_tty = Some(device);
        return 0;
    }
    status
}

/// Opens `/dev/tty`: never talks to a driver, just checks the caller already has a
/// controlling tty.
pub fn controlling_tty_open(caller_record: &ProcessRecord) -> Status {
    match caller_record.controlling_tty {
        Some(_) => 0,
        None => DeviceError::NoSuchDeviceOrAddress.as_status(),
    }
}

/// Opens a clone device: if the driver accepts and hands back a different minor, the
/// caller's fd is rebound to a freshly allocated inode for that minor. A failure to
/// allocate the inode is compensated with a close of the new minor before propagating.
pub fn clone_open(
    transport: &dyn Transport,
    driver: Endpoint,
    device: DeviceNumber,
    caller: Endpoint,
    flags: OpenFlags,
    inode_alloc: &mut dyn InodeAllocator,
    fd: &mut dyn FileDescriptor,
) -> Result<Status, DeviceError> {
    let status = generic_open(transport, driver, device, caller, flags);
    if status < 0 {
        return Ok(status);
    }
    let new_minor = status as u8;
    if new_minor != device.minor() {
        let new_device = device.with_minor(new_minor);
        match inode_alloc.allocate_char_special(new_device) {
            Ok(inode) => fd.rebind_inode(inode),
            Err(e) => {
                generic_close(transport, driver, new_device);
                return Err(e);
            }
        }
    }
    Ok(0)
}

/// The outcome of a character I/O call: either it ran to completion (with a driver or
/// synthesized status), or the driver parked the caller on `SUSPEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Completed(Status),
    Suspended,
}

/// No device occupies this slot: every open fails with `ENODEV`.
pub fn absent_open() -> Result<Status, DeviceError> {
    Err(DeviceError::NoSuchDevice)
}

/// No device occupies this slot: every I/O call fails with `EIO`, no message sent.
pub fn absent_io() -> Result<CallOutcome, DeviceError> {
    Err(DeviceError::Io)
}

/// Ordinary char I/O: dispatch and translate dead/locked/protocol outcomes into the
/// taxonomy `char_io` exposes to its own caller.
pub fn generic_io(
    transport: &dyn Transport,
    driver_map: &mut DriverMap,
    driver: Endpoint,
    msg: &WireMessage,
) -> Result<WireMessage, GenericIoError> {
    match dispatch(transport, driver_map, driver, msg) {
        Ok(reply) => Ok(reply),
        Err(DispatchError::Dead(_)) | Err(DispatchError::Protocol) => Err(GenericIoError::Io),
        Err(DispatchError::Locked) => Err(GenericIoError::Locked),
    }
}

pub enum GenericIoError {
    Io,
    Locked,
}

//! The multiplexer facade (Request Engine, C4, plus the entry points that stitch the
//! other six components together). This is the surface the file server proper calls.

use crate::dispatch::{dispatch, DispatchError};
use crate::driver_map::{Binding, DriverMap, DriverStyle, IoHandler, OpenCloseHandler};
use crate::external::{FileDescriptor, InodeAllocator};
use crate::grant::GrantBroker;
pub use crate::policy::CallOutcome;
use crate::message_adapter::{self, Adapted, IoOp, RawRequest};
use crate::policy::{self, GenericIoError, OpenFlags};
use crate::process::ProcessTable;
use crate::recovery::{MountTable, OpenFileTable};
use crate::suspension::SuspensionRegistry;
use bitflags::bitflags;
use devmux_shared::endpoint::{Endpoint, FS_ENDPOINT};
use devmux_shared::ipc::{AuthorityChannel, DevCtl, DevCtlRequest, Transport};
use devmux_shared::message::{CallKind, StatusReply, WireKind, WireMessage};
use devmux_shared::status::{Status, EINTR, ELOCKED, SUSPEND};
use devmux_shared::{DeviceError, DeviceNumber};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IoFlags: u8 {
        const NON_BLOCKING = 0b01;
    }
}

/// A status-handler event surfaced to the file server after a `DEV_STATUS` sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// A previously suspended caller can now be resumed with `status`.
    Revived { caller: Endpoint, status: Status },
    /// Unsolicited "I/O ready" notification for the select subsystem (out of scope
    /// here; just forwarded).
    IoReady { minor: u8, ops: u32 },
}

/// Owns the seven components and exposes the operations the file server drives device
/// I/O through.
pub struct Multiplexer {
    grants: GrantBroker,
    driver_map: DriverMap,
    suspension: SuspensionRegistry,
    processes: ProcessTable,
}

impl Multiplexer {
    pub fn new() -> Self {
        Multiplexer {
            grants: GrantBroker::new(),
            driver_map: DriverMap::new(),
            suspension: SuspensionRegistry::new(),
            processes: ProcessTable::new(),
        }
    }

    pub fn processes_mut(&mut self) -> &mut ProcessTable {
        &mut self.processes
    }

    fn revoke_adapted(&mut self, adapted: Adapted) {
        self.grants.revoke_opt(adapted.outer_grant);
        for grant in adapted.sub_grants {
            self.grants.revoke(grant);
        }
    }

    // ---- C2: driver map plumbing ---------------------------------------------

    pub fn bind(
        &mut self,
        major: u8,
        endpoint: Endpoint,
        open_close: OpenCloseHandler,
        io: IoHandler,
        style: DriverStyle,
    ) {
        self.driver_map.bind(major, endpoint, open_close, io, style);
    }

    pub fn driver_down(&mut self, endpoint: Endpoint) {
        self.driver_map.unmap_by_endpoint(endpoint);
    }

    pub fn binding(&self, major: u8) -> Binding {
        self.driver_map.lookup(major)
    }

    // ---- C7: recovery ----------------------------------------------------------

    /// Reopens every mounted filesystem and open character-special file bound to
    /// `major`. Assumes the binding itself was already installed (via `bind` or a
    /// `devctl` from the reincarnation authority) before this is called.
    pub fn driver_up(
        &mut self,
        major: u8,
        mounts: &MountTable,
        files: &mut OpenFileTable,
        transport: &dyn Transport,
    ) {
        for mount in mounts.entries.iter().filter(|m| m.device.major() == major) {
            let flags = if mount.read_only {
                OpenFlags::READ
            } else {
                OpenFlags::READ | OpenFlags::WRITE
            };
            if let Err(e) = self.reopen_plain(mount.device, FS_ENDPOINT, flags, transport) {
                log::error!("driver_up: failed to remount {}: {e}", mount.device);
            }
        }
        for filp in files.filps.iter_mut().filter(|f| f.is_special && f.device.major() == major) {
            if let Err(e) = self.reopen_plain(filp.device, FS_ENDPOINT, OpenFlags::READ | OpenFlags::WRITE, transport) {
                log::error!("driver_up: failed to reopen {}: {e}", filp.device);
                filp.invalidated = true;
            }
        }
    }

    /// `dev_open` restricted to the handlers relevant during recovery: clone devices
    /// are treated as generic here rather than re-running clone minor allocation,
    /// since mounts and already-open char-specials are never clone targets in
    /// practice (documented simplification, see DESIGN.md).
    fn reopen_plain(
        &mut self,
        device: DeviceNumber,
        caller: Endpoint,
        flags: OpenFlags,
        transport: &dyn Transport,
    ) -> Result<Status, DeviceError> {
        let binding = self.driver_map.lookup(device.major());
        match binding.open_close {
            OpenCloseHandler::Absent => policy::absent_open(),
            OpenCloseHandler::ControllingTty => Ok(0),
            OpenCloseHandler::Generic | OpenCloseHandler::Tty | OpenCloseHandler::Clone => {
                let driver = binding.endpoint.expect("bound slot without an endpoint");
                Ok(policy::generic_open(transport, driver, device, caller, flags))
            }
        }
    }

    // ---- C6: open / close / setsid ----------------------------------------------

    pub fn open(
        &mut self,
        device: DeviceNumber,
        caller: Endpoint,
        flags: OpenFlags,
        transport: &dyn Transport,
        inode_alloc: &mut dyn InodeAllocator,
        fd: &mut dyn FileDescriptor,
    ) -> Result<Status, DeviceError> {
        let binding = self.driver_map.lookup(device.major());
        match binding.open_close {
            OpenCloseHandler::Absent => policy::absent_open(),
            OpenCloseHandler::Generic => {
                let driver = binding.endpoint.expect("bound slot without an endpoint");
                Ok(policy::generic_open(transport, driver, device, caller, flags))
            }
            OpenCloseHandler::Tty => {
                let driver = binding.endpoint.expect("bound slot without an endpoint");
                let any_other = self.processes.any_controls(device);
                let record = self
                    .processes
                    .get_mut(caller)
                    .expect("tty_open called for an unregistered process");
                Ok(policy::tty_open(transport, driver, device, caller, flags, record, any_other))
            }
            OpenCloseHandler::ControllingTty => {
                let record = self
                    .processes
                    .get(caller)
                    .expect("controlling_tty_open called for an unregistered process");
                Ok(policy::controlling_tty_open(record))
            }
            OpenCloseHandler::Clone => {
                let driver = binding.endpoint.expect("bound slot without an endpoint");
                policy::clone_open(transport, driver, device, caller, flags, inode_alloc, fd)
            }
        }
    }

    pub fn close(&mut self, device: DeviceNumber, transport: &dyn Transport) {
        let binding = self.driver_map.lookup(device.major());
        match binding.open_close {
            OpenCloseHandler::Absent | OpenCloseHandler::ControllingTty => {}
            OpenCloseHandler::Generic | OpenCloseHandler::Tty | OpenCloseHandler::Clone => {
                if let Some(driver) = binding.endpoint {
                    policy::generic_close(transport, driver, device);
                }
            }
        }
    }

    pub fn setsid(&mut self, caller: Endpoint) {
        self.processes.setsid(caller);
    }

    // ---- C4: request engine ------------------------------------------------------

    /// Character (and vectored) I/O. Never synthesizes a retry the way `block_io`
    /// does: a dead or stale driver always surfaces as `EIO`.
    #[allow(clippy::too_many_arguments)]
    pub fn char_io(
        &mut self,
        op: IoOp,
        device: DeviceNumber,
        caller: Endpoint,
        io_endpoint: Endpoint,
        position: i64,
        flags: IoFlags,
        call_kind: CallKind,
        transport: &dyn Transport,
    ) -> Result<CallOutcome, DeviceError> {
        let binding = self.driver_map.lookup(device.major());

        // `/dev/tty` I/O is redirected to the caller's actual controlling tty before
        // anything else happens: the device (and so the driver, and so which grants
        // get minted for which driver) the rest of this call operates on changes here.
        let (device, driver) = match binding.io {
            IoHandler::Absent => return policy::absent_io(),
            IoHandler::Generic => {
                let driver = binding.endpoint.ok_or(DeviceError::NoSuchDeviceOrAddress)?;
                (device, driver)
            }
            IoHandler::ControllingTty => {
                let ctty = self
                    .processes
                    .get(caller)
                    .expect("controlling_tty_io called for an unregistered process")
                    .controlling_tty
                    .ok_or(DeviceError::Io)?;
                let ctty_binding = self.driver_map.lookup(ctty.major());
                let driver = ctty_binding.endpoint.ok_or(DeviceError::Io)?;
                (ctty, driver)
            }
        };

        let req = RawRequest { op, device, io_endpoint, position };
        let adapted = message_adapter::adapt(&mut self.grants, driver, &req);
        let is_vectored = matches!(adapted.wire.kind, WireKind::GatherSafe | WireKind::ScatterSafe);

        // Re-validate the endpoint right before dispatch, not only at the lookup above:
        // a status sweep or a restart could have rebound this major to a different
        // driver in between (`isokendpt` in the original).
        if !self.driver_map.binding_is_current(device.major(), driver) {
            log::error!("char_io: driver {driver} for major {} is stale, dropping the call", device.major());
            self.revoke_adapted(adapted);
            return Err(DeviceError::Io);
        }

        let reply = match policy::generic_io(transport, &mut self.driver_map, driver, &adapted.wire) {
            Ok(reply) => reply,
            Err(GenericIoError::Locked) => {
                self.revoke_adapted(adapted);
                return Ok(CallOutcome::Completed(ELOCKED));
            }
            Err(GenericIoError::Io) => {
                self.revoke_adapted(adapted);
                return Err(DeviceError::Io);
            }
        };

        if reply.status == SUSPEND {
            if is_vectored {
                panic!("char_io: driver returned SUSPEND on vectored I/O, which is forbidden");
            }
            if flags.contains(IoFlags::NON_BLOCKING) {
                return Ok(self.cancel_non_blocking(adapted, device, io_endpoint, call_kind, driver, transport));
            }
            let grant = adapted
                .outer_grant
                .expect("SUSPEND reply carried no outer grant to transfer into the suspension registry");
            debug_assert!(adapted.sub_grants.is_empty(), "vectored I/O cannot suspend");
            self.suspension.suspend(caller, driver, grant);
            return Ok(CallOutcome::Suspended);
        }

        self.revoke_adapted(adapted);
        Ok(CallOutcome::Completed(reply.status))
    }

    fn cancel_non_blocking(
        &mut self,
        adapted: Adapted,
        device: DeviceNumber,
        io_endpoint: Endpoint,
        call_kind: CallKind,
        driver: Endpoint,
        transport: &dyn Transport,
    ) -> CallOutcome {
        let grant_id = adapted.outer_grant.as_ref().map(|g| g.id());
        let mut cancel = WireMessage::request(WireKind::Cancel, device.minor(), io_endpoint);
        cancel.grant = grant_id;
        cancel.count = call_kind.cancel_mode_bits();
        let outcome = match transport.send_receive(driver, &cancel) {
            Ok(r) if r.status == EINTR => CallOutcome::Completed(DeviceError::WouldBlock.as_status()),
            Ok(r) => CallOutcome::Completed(r.status),
            Err(e) => {
                log::warn!("cancel of non-blocking call to {driver} did not complete cleanly: {e}");
                CallOutcome::Completed(DeviceError::WouldBlock.as_status())
            }
        };
        self.revoke_adapted(adapted);
        outcome
    }

    /// Resolves `fd` against `files`, rejecting an fd that names no open file
    /// (`EBADF`, `get_filp` in the original) and a non-special file (`ENOTTY`) before
    /// ever touching the Request Engine.
    #[allow(clippy::too_many_arguments)]
    pub fn ioctl(
        &mut self,
        fd: i32,
        files: &dyn crate::external::FileTable,
        code: devmux_shared::ioctl::IoctlCode,
        arg_addr: usize,
        caller: Endpoint,
        transport: &dyn Transport,
    ) -> Result<CallOutcome, DeviceError> {
        let file = files.resolve(fd, caller).ok_or(DeviceError::BadFileDescriptor)?;
        if !file.is_special {
            return Err(DeviceError::NotATypewriter);
        }
        self.char_io(
            IoOp::Ioctl { addr: arg_addr, code },
            file.device,
            caller,
            caller,
            0,
            IoFlags::empty(),
            CallKind::Other,
            transport,
        )
    }

    /// Block I/O: always issued on the file server's own behalf, never suspends, and
    /// retries across a driver restart rather than surfacing the gap to its caller.
    pub fn block_io(
        &mut self,
        op: BlockOp,
        device: DeviceNumber,
        buffer_addr: usize,
        position: i64,
        length: usize,
        transport: &dyn Transport,
        authority: &dyn AuthorityChannel,
    ) -> Status {
        loop {
            let binding = self.driver_map.lookup(device.major());
            let driver = match binding.endpoint {
                Some(e) => e,
                None => {
                    log::error!("block_io: no driver bound for major {}", device.major());
                    return DeviceError::NoSuchDeviceOrAddress.as_status();
                }
            };

            let op_kind = match op {
                BlockOp::Read => IoOp::Read { addr: buffer_addr, len: length },
                BlockOp::Write => IoOp::Write { addr: buffer_addr, len: length },
            };
            let req = RawRequest { op: op_kind, device, io_endpoint: FS_ENDPOINT, position };
            let adapted = message_adapter::adapt(&mut self.grants, driver, &req);

            // Same staleness re-check `char_io` does: a devctl could have rebound this
            // major to a different driver in the window between the lookup above and
            // this point.
            if !self.driver_map.binding_is_current(device.major(), driver) {
                self.revoke_adapted(adapted);
                log::warn!(
                    "block_io: driver for major {} changed before dispatch, waiting for restart",
                    device.major()
                );
                self.wait_for_driver_restart(device.major(), authority);
                continue;
            }

            match dispatch(transport, &mut self.driver_map, driver, &adapted.wire) {
                Ok(reply) => {
                    self.revoke_adapted(adapted);
                    if reply.status == SUSPEND {
                        panic!("block_io: driver returned SUSPEND, which is forbidden for block I/O");
                    }
                    return reply.status;
                }
                Err(DispatchError::Locked) => {
                    self.revoke_adapted(adapted);
                    log::warn!("block_io: ELOCKED talking to driver {driver}, retrying");
                    continue;
                }
                Err(DispatchError::Protocol) => {
                    self.revoke_adapted(adapted);
                    log::error!("block_io: protocol error talking to driver {driver}");
                    return DeviceError::Io.as_status();
                }
                Err(DispatchError::Dead(_)) => {
                    self.revoke_adapted(adapted);
                    log::warn!(
                        "block_io: driver for major {} vanished mid-request, waiting for restart",
                        device.major()
                    );
                    self.wait_for_driver_restart(device.major(), authority);
                    log::info!("block_io: retrying with the new driver for major {}", device.major());
                }
            }
        }
    }

    /// Blocks on the reincarnation authority until `major` is bound to a driver again,
    /// applying every devctl it announces along the way.
    fn wait_for_driver_restart(&mut self, major: u8, authority: &dyn AuthorityChannel) {
        loop {
            let ctl = authority
                .receive_devctl()
                .expect("block_io: unable to receive from the reincarnation authority");
            self.apply_devctl(&ctl);
            authority
                .acknowledge(0)
                .expect("block_io: unable to acknowledge devctl application");
            if self.driver_map.lookup(major).endpoint.is_some() {
                break;
            }
        }
    }

    fn apply_devctl(&mut self, ctl: &DevCtl) {
        match ctl.request {
            DevCtlRequest::MapDriver => self.driver_map.bind(
                ctl.major,
                ctl.driver,
                OpenCloseHandler::Generic,
                IoHandler::Generic,
                DriverStyle::from_bits_truncate(ctl.style),
            ),
            DevCtlRequest::UnmapDriver => self.driver_map.unmap_by_endpoint(ctl.driver),
        }
    }

    // ---- Status handler / cancellation -------------------------------------------

    /// Drains `driver`'s queued status replies: revives each suspended caller it names
    /// and forwards any "I/O ready" notices. Silently drops the rest of the batch if
    /// the driver dies mid-sweep — a fresh probe will follow once it restarts.
    pub fn status_received(&mut self, driver: Endpoint, transport: &dyn Transport) -> Vec<StatusEvent> {
        if !self.driver_map.any_binding_for(driver) {
            return Vec::new();
        }
        let mut events = Vec::new();
        loop {
            let probe = WireMessage::request(WireKind::StatusProbe, 0, driver);
            let reply = match transport.send_receive(driver, &probe) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("DEV_STATUS probe to {driver} failed: {e}");
                    return events;
                }
            };
            match reply.status_kind {
                StatusReply::Revive => {
                    let target = if reply.reply_endpoint == FS_ENDPOINT {
                        match reply.grant.and_then(|g| self.suspension.find_suspended(driver, g)) {
                            Some(ep) => ep,
                            None => {
                                log::error!("DEV_REVIVE from {driver} names no suspended process, dropping");
                                continue;
                            }
                        }
                    } else {
                        reply.reply_endpoint
                    };
                    if let Some(status) = self.suspension.revive(target, reply.status, &mut self.grants) {
                        events.push(StatusEvent::Revived { caller: target, status });
                    }
                }
                StatusReply::IoReady => {
                    events.push(StatusEvent::IoReady { minor: reply.device, ops: reply.count as u32 });
                }
                StatusReply::NoStatus => break,
                StatusReply::Unknown(code) => {
                    log::error!("DEV_STATUS reply from {driver} had an unrecognized kind ({code})");
                    break;
                }
            }
        }
        events
    }

    /// Cancels a suspended caller's outstanding call (process exit or a signal).
    pub fn cancel_suspended(&mut self, caller: Endpoint, transport: &dyn Transport) {
        self.suspension.cancel(caller, transport, &mut self.grants);
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    Read,
    Write,
}

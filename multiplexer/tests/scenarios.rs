//! End-to-end scenarios exercising the multiplexer against a scripted driver side.

use devmux_multiplexer::driver_map::{DriverStyle, IoHandler, OpenCloseHandler};
use devmux_multiplexer::external::{FileDescriptor, FileTable, InodeAllocator, InodeId, OpenFile};
use devmux_multiplexer::{BlockOp, CallOutcome, IoFlags, IoOp, Multiplexer, StatusEvent};
use devmux_shared::ioctl::IoctlCode;
use devmux_shared::endpoint::FS_ENDPOINT;
use devmux_shared::ipc::{AuthorityChannel, DevCtl, DevCtlRequest, IpcError, Transport};
use devmux_shared::message::{CallKind, StatusReply, WireKind, WireMessage, SUSPEND};
use devmux_shared::status::{self, EINTR};
use devmux_shared::{DeviceError, DeviceNumber};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::cell::RefCell;
use std::collections::HashMap;

/// A driver side whose replies are scripted in advance, one channel per endpoint.
struct ScriptedTransport {
    channels: RefCell<HashMap<i32, (Sender<Result<WireMessage, IpcError>>, Receiver<Result<WireMessage, IpcError>>)>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        ScriptedTransport { channels: RefCell::new(HashMap::new()) }
    }

    fn queue(&self, endpoint: i32, reply: Result<WireMessage, IpcError>) {
        let mut channels = self.channels.borrow_mut();
        let (tx, _) = channels.entry(endpoint).or_insert_with(unbounded);
        tx.send(reply).expect("scripted channel for this endpoint was dropped");
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, _to: i32, _msg: &WireMessage) -> Result<(), IpcError> {
        Ok(())
    }

    fn receive(&self, from: i32) -> Result<WireMessage, IpcError> {
        let channels = self.channels.borrow();
        let (_, rx) = channels.get(&from).unwrap_or_else(|| panic!("no scripted channel for endpoint {from}"));
        rx.try_recv().unwrap_or_else(|_| panic!("no scripted reply queued for endpoint {from}"))
    }
}

/// Devctl announcements queued up front, delivered in order.
struct ScriptedAuthority {
    devctl_rx: Receiver<DevCtl>,
}

impl ScriptedAuthority {
    fn new(devctls: Vec<DevCtl>) -> Self {
        let (tx, rx) = unbounded();
        for ctl in devctls {
            tx.send(ctl).expect("devctl channel should accept the scripted entries");
        }
        ScriptedAuthority { devctl_rx: rx }
    }
}

impl AuthorityChannel for ScriptedAuthority {
    fn receive_devctl(&self) -> Result<DevCtl, IpcError> {
        self.devctl_rx.try_recv().map_err(|_| IpcError::DestinationDied)
    }

    fn acknowledge(&self, _result: i32) -> Result<(), IpcError> {
        Ok(())
    }
}

struct NoopInodeAllocator;
impl InodeAllocator for NoopInodeAllocator {
    fn allocate_char_special(&mut self, _device: DeviceNumber) -> Result<InodeId, DeviceError> {
        Ok(42)
    }
}

#[derive(Default)]
struct RecordingFd {
    rebound_to: Option<InodeId>,
}
impl FileDescriptor for RecordingFd {
    fn rebind_inode(&mut self, inode: InodeId) {
        self.rebound_to = Some(inode);
    }
}

/// A plain reply with `status` set, echoing `FS_ENDPOINT` the way every grant-bearing
/// request's rewritten `io_endpoint` does.
fn reply(status: i32) -> WireMessage {
    let mut msg = WireMessage::request(WireKind::Open, 0, FS_ENDPOINT);
    msg.status = status;
    msg.reply_endpoint = FS_ENDPOINT;
    msg
}

const DRIVER: i32 = 10;
const CALLER: i32 = 200;
const MAJOR: u8 = 4;

#[test]
fn plain_read_returns_the_drivers_byte_count() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    transport.queue(DRIVER, Ok(reply(128)));

    let outcome = mux
        .char_io(
            IoOp::Read { addr: 0x4000, len: 128 },
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            CALLER,
            0,
            IoFlags::empty(),
            CallKind::Read,
            &transport,
        )
        .unwrap();

    assert_eq!(outcome, CallOutcome::Completed(128));
}

#[test]
fn non_blocking_read_on_empty_pipe_is_cancelled_and_reports_would_block() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    transport.queue(DRIVER, Ok(reply(SUSPEND)));
    // The cancel's own reply is what actually resolves the call; EINTR maps to EAGAIN.
    transport.queue(DRIVER, Ok(reply(EINTR)));

    let outcome = mux
        .char_io(
            IoOp::Read { addr: 0x4000, len: 64 },
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            CALLER,
            0,
            IoFlags::NON_BLOCKING,
            CallKind::Read,
            &transport,
        )
        .unwrap();

    assert_eq!(outcome, CallOutcome::Completed(status::EAGAIN));
}

#[test]
fn blocking_terminal_read_suspends_then_revives() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    transport.queue(DRIVER, Ok(reply(SUSPEND)));

    let outcome = mux
        .char_io(
            IoOp::Read { addr: 0x5000, len: 16 },
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            CALLER,
            0,
            IoFlags::empty(),
            CallKind::Read,
            &transport,
        )
        .unwrap();
    assert_eq!(outcome, CallOutcome::Suspended);

    // Some time later, the driver's status queue carries a DEV_REVIVE naming the grant
    // that was handed to it for this read (the first, and so far only, grant minted).
    let mut status_reply = WireMessage::request(WireKind::StatusProbe, 0, DRIVER);
    status_reply.status_kind = StatusReply::Revive;
    status_reply.reply_endpoint = FS_ENDPOINT;
    status_reply.status = 16;
    status_reply.grant = Some(0);
    transport.queue(DRIVER, Ok(status_reply));
    let mut no_status = WireMessage::request(WireKind::StatusProbe, 0, DRIVER);
    no_status.status_kind = StatusReply::NoStatus;
    transport.queue(DRIVER, Ok(no_status));

    let events = mux.status_received(DRIVER, &transport);
    assert_eq!(events, vec![StatusEvent::Revived { caller: CALLER, status: 16 }]);
}

#[test]
fn clone_open_rebinds_the_file_descriptor_to_a_new_minor() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Clone, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    transport.queue(DRIVER, Ok(reply(7))); // driver hands back minor 7

    let mut alloc = NoopInodeAllocator;
    let mut fd = RecordingFd::default();
    let status = mux
        .open(
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            devmux_multiplexer::policy::OpenFlags::READ,
            &transport,
            &mut alloc,
            &mut fd,
        )
        .unwrap();

    assert_eq!(status, 0);
    assert_eq!(fd.rebound_to, Some(42));
}

#[test]
fn driver_crash_mid_block_read_retries_after_devctl_rebind() {
    let mut mux = Multiplexer::new();
    const OLD_DRIVER: i32 = 10;
    const NEW_DRIVER: i32 = 11;
    mux.bind(MAJOR, OLD_DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());

    let transport = ScriptedTransport::new();
    transport.queue(OLD_DRIVER, Err(IpcError::DestinationDied));
    transport.queue(NEW_DRIVER, Ok(reply(512)));

    let authority = ScriptedAuthority::new(vec![DevCtl {
        request: DevCtlRequest::MapDriver,
        major: MAJOR,
        driver: NEW_DRIVER,
        style: 0,
    }]);

    let status = mux.block_io(
        BlockOp::Read,
        DeviceNumber::new(MAJOR, 0),
        0x9000,
        0,
        512,
        &transport,
        &authority,
    );

    assert_eq!(status, 512);
    assert!(mux.binding(MAJOR).is_bound());
    assert_eq!(mux.binding(MAJOR).endpoint, Some(NEW_DRIVER));
}

#[test]
fn dev_tty_without_a_controlling_terminal_returns_enxio() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, 99, OpenCloseHandler::ControllingTty, IoHandler::ControllingTty, DriverStyle::empty());
    mux.processes_mut().register(CALLER, 1);
    let transport = ScriptedTransport::new();
    let mut alloc = NoopInodeAllocator;
    let mut fd = RecordingFd::default();

    let status = mux
        .open(
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            devmux_multiplexer::policy::OpenFlags::READ,
            &transport,
            &mut alloc,
            &mut fd,
        )
        .unwrap();

    assert_eq!(status, status::ENXIO);
}

#[test]
fn io_on_dev_tty_without_a_controlling_terminal_returns_eio() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, 99, OpenCloseHandler::ControllingTty, IoHandler::ControllingTty, DriverStyle::empty());
    mux.processes_mut().register(CALLER, 1);
    let transport = ScriptedTransport::new();

    let err = mux
        .char_io(
            IoOp::Read { addr: 0x6000, len: 16 },
            DeviceNumber::new(MAJOR, 0),
            CALLER,
            CALLER,
            0,
            IoFlags::empty(),
            CallKind::Read,
            &transport,
        )
        .unwrap_err();

    assert_eq!(err, DeviceError::Io);
}

/// Resolves exactly one fd (3) to an open character-special file; every other fd
/// misses, the way `get_filp` returns `EBADF` on an fd the process never opened.
struct SingleFileTable {
    fd: i32,
    file: OpenFile,
}
impl FileTable for SingleFileTable {
    fn resolve(&self, fd: i32, _owner: i32) -> Option<OpenFile> {
        (fd == self.fd).then_some(self.file)
    }
}

#[test]
fn ioctl_on_an_unopened_fd_returns_ebadf() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    let files = SingleFileTable { fd: 3, file: OpenFile { device: DeviceNumber::new(MAJOR, 0), is_special: true } };

    let err = mux
        .ioctl(7, &files, IoctlCode::new(0), 0x7000, CALLER, &transport)
        .unwrap_err();

    assert_eq!(err, DeviceError::BadFileDescriptor);
}

#[test]
fn ioctl_on_a_resolved_special_file_dispatches_to_its_driver() {
    let mut mux = Multiplexer::new();
    mux.bind(MAJOR, DRIVER, OpenCloseHandler::Generic, IoHandler::Generic, DriverStyle::empty());
    let transport = ScriptedTransport::new();
    transport.queue(DRIVER, Ok(reply(0)));
    let files = SingleFileTable { fd: 3, file: OpenFile { device: DeviceNumber::new(MAJOR, 0), is_special: true } };

    let outcome = mux.ioctl(3, &files, IoctlCode::new(0), 0x7000, CALLER, &transport).unwrap();

    assert_eq!(outcome, CallOutcome::Completed(0));
}

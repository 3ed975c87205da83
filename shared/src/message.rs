//! The fixed wire message exchanged between the file server and a driver (spec §6).
//!
//! The original C message is a union of slots reused across request types (`POSITION`
//! doubles as the pre-rewrite endpoint for `ioctl`, `COUNT` doubles as a mode-bit carrier
//! for `cancel`). A safer rewrite gives every field a real name, but two of those
//! overloads are an explicit wire contract with the driver side (spec §9 design notes)
//! and are preserved bit-for-bit rather than "fixed": `Ioctl`'s `original_endpoint` field
//! and `Cancel`'s `mode` field.

use crate::endpoint::Endpoint;

/// Opaque grant capability identifier, issued by the Grant Broker.
pub type GrantId = u32;

/// Discriminates the message `type` slot. Each data-carrying request has a
/// grant-bearing ("safe") counterpart that the Message Adapter converts it into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    Open,
    Close,
    Cancel,
    Read,
    ReadSafe,
    Write,
    WriteSafe,
    Scatter,
    ScatterSafe,
    Gather,
    GatherSafe,
    Ioctl,
    IoctlSafe,
    /// Probe sent by the status handler to pull the next queued reply from a driver.
    StatusProbe,
}

/// Reply-side discriminant returned in `status_probe`'s reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReply {
    Revive,
    IoReady,
    NoStatus,
    Unknown(i32),
}

/// The fixed-layout message passed to/from a driver.
#[derive(Debug, Clone)]
pub struct WireMessage {
    pub kind: WireKind,
    /// Minor device number (major is implied by which driver endpoint receives this).
    pub device: u8,
    /// `IO_ENDPT`: whose address space the buffer/grant refers to. Once a request has
    /// been rewritten into its grant-bearing form, this becomes the file server's own
    /// endpoint.
    pub io_endpoint: Endpoint,
    /// `IO_GRANT`: the capability covering the buffer, if this is a grant-bearing kind.
    pub grant: Option<GrantId>,
    /// `COUNT`: byte count for read/write/ioctl; for `Cancel`, the preserved mode-bit
    /// carrier described above (`R_BIT` = 1, `W_BIT` = 2, matching the original).
    pub count: i32,
    /// `POSITION`: byte position for read/write; for `Ioctl`/`IoctlSafe`, the original
    /// `io_endpoint` of the caller (see module docs).
    pub position: i64,
    pub high_position: i64,
    /// `REP_STATUS` / the original request code on the way down, reused on replies to
    /// carry the driver's returned status (bytes transferred, `SUSPEND`, or a negative
    /// errno-style code).
    pub status: i32,
    /// `REP_ENDPT`: echoed back by the driver; used by `gen_io`'s sanity check and by
    /// `dev_status`'s revive routing.
    pub reply_endpoint: Endpoint,
    /// Populated only on a `StatusProbe` reply; meaningless on any other kind.
    pub status_kind: StatusReply,
}

impl WireMessage {
    pub fn request(kind: WireKind, device: u8, io_endpoint: Endpoint) -> Self {
        WireMessage {
            kind,
            device,
            io_endpoint,
            grant: None,
            count: 0,
            position: 0,
            high_position: 0,
            status: 0,
            reply_endpoint: io_endpoint,
            status_kind: StatusReply::NoStatus,
        }
    }
}

pub const SUSPEND: i32 = -1000;

/// Mode bits preserved bit-for-bit in `Cancel`'s `count` field (spec §9).
pub const R_BIT: i32 = 1;
pub const W_BIT: i32 = 2;

/// Which syscall triggered a read/write, needed to compute the `Cancel` mode bit the
/// same way the original's `call_nr` check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Read,
    Write,
    Other,
}

impl CallKind {
    pub fn cancel_mode_bits(self) -> i32 {
        match self {
            CallKind::Read => R_BIT,
            CallKind::Write => W_BIT,
            CallKind::Other => 0,
        }
    }
}

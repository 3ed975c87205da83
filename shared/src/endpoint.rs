//! Stable process identities used by the IPC primitive.
//!
//! Endpoints stand in for whatever the kernel's scheduler actually hands out; the
//! multiplexer only ever compares them for equality and carries them across messages.

/// Stable process identity used by the IPC primitive.
pub type Endpoint = i32;

/// Sentinel meaning "no driver bound" / "no controlling tty" / "not currently suspended".
pub const NONE: Endpoint = -1;

/// The endpoint of the file server itself, used as the rewritten `io_endpoint` once a
/// request has been converted to its grant-bearing form (see `message_adapter`).
pub const FS_ENDPOINT: Endpoint = 1;

/// The endpoint of the reincarnation authority (the supervisor that restarts drivers
/// and announces `devctl` bindings).
pub const RS_ENDPOINT: Endpoint = 2;

//! Error taxonomy surfaced to callers of the multiplexer (spec §7).
//!
//! These are the only variants that may legitimately reach a caller; anything else
//! (grant-mint failure, an oversized scatter/gather vector, `SUSPEND` out of `block_io`)
//! is a programming error and is handled with `panic!`, not a `Result`.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Major out of range, or the driver endpoint is `NONE`/stale at request time.
    #[error("no such device or address")]
    NoSuchDeviceOrAddress,

    /// The "absent" open handler: nonexistent device slot.
    #[error("no such device")]
    NoSuchDevice,

    /// `ioctl` attempted on a file that is not a character/block special.
    #[error("inappropriate ioctl for device")]
    NotATypewriter,

    /// Driver died mid-request, an unexpected reply shape, controlling-tty I/O with no
    /// controlling tty, or `ctty` addressed at a stale driver.
    #[error("I/O error")]
    Io,

    /// A non-blocking call that the driver would otherwise have suspended on.
    #[error("resource temporarily unavailable")]
    WouldBlock,

    /// `ioctl` issued against a descriptor that does not resolve to an open file.
    #[error("bad file descriptor")]
    BadFileDescriptor,
}

//! The flat integer space a driver reply occupies: non-negative byte counts or driver-
//! chosen status, or one of a handful of reserved negative codes the multiplexer itself
//! synthesizes when it cannot even reach a driver.
//!
//! `Status` is deliberately untyped (a plain `i32`, like the original's `int`): a driver
//! is free to hand back any errno it likes, and that value must round-trip to the
//! caller unchanged. `DeviceError` covers only the failures the multiplexer detects on
//! its own, before or instead of a driver reply — see `DeviceError::as_status`.

use crate::errors::DeviceError;

pub type Status = i32;

pub const EIO: Status = -5;
pub const ENXIO: Status = -6;
pub const EBADF: Status = -9;
pub const EAGAIN: Status = -11;
pub const ENODEV: Status = -19;
pub const ENOTTY: Status = -25;
pub const EINTR: Status = -4;

/// Not a POSIX code; reserved for a transiently-locked peer (`ELOCKED` in the original),
/// propagated unchanged rather than folded into `EIO` (see SPEC_FULL.md §3).
pub const ELOCKED: Status = -1_000_001;

impl DeviceError {
    pub fn as_status(self) -> Status {
        match self {
            DeviceError::Io => EIO,
            DeviceError::NoSuchDeviceOrAddress => ENXIO,
            DeviceError::BadFileDescriptor => EBADF,
            DeviceError::WouldBlock => EAGAIN,
            DeviceError::NoSuchDevice => ENODEV,
            DeviceError::NotATypewriter => ENOTTY,
        }
    }
}

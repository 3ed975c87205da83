//! Table sizes and sentinels shared by every component in the multiplexer.
//!
//! These mirror the fixed-size arrays `dmap[NR_DEVICES]` and `fproc[NR_PROCS]` in the
//! original MINIX file server: the major number is an 8-bit field, but the driver table
//! is deliberately much smaller than 256 entries, so most of the major-number space is
//! unbound by default.

/// Number of major-device slots in the Driver Map.
pub const NR_DEVICES: usize = 32;

/// Number of process-table slots the Suspension Registry and process table cover.
pub const NR_PROCS: usize = 64;

/// Maximum number of fragments in a single scatter/gather request.
pub const NR_IOREQS: usize = 64;

/// Major number reserved for the null device. Not special-cased by the core itself,
/// but `DriverMap` never assigns it a driver by default.
pub const NULL_DEVICE_MAJOR: u8 = 0;

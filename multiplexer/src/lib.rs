//! The device I/O multiplexer: resolves a device number to a driver endpoint, converts
//! virtual addresses into capability grants, drives the request/reply protocol, and
//! recovers from driver suspension, cancellation and death.
//!
//! See `Multiplexer` in `server` for the facade external callers (the file server
//! proper) are expected to use; the other modules are its internal components.

pub mod dispatch;
pub mod driver_map;
pub mod external;
pub mod grant;
pub mod message_adapter;
pub mod policy;
pub mod process;
pub mod recovery;
pub mod server;
pub mod suspension;

pub use message_adapter::{IoOp, IoVecEntry};
pub use server::{BlockOp, CallOutcome, IoFlags, Multiplexer, StatusEvent};

pub mod constants;
pub mod device;
pub mod endpoint;
pub mod errors;
pub mod ioctl;
pub mod ipc;
pub mod message;
pub mod status;

pub use device::DeviceNumber;
pub use endpoint::Endpoint;
pub use errors::DeviceError;
pub use ipc::{AuthorityChannel, DevCtl, DevCtlRequest, IpcError, Transport};
pub use message::{CallKind, GrantId, StatusReply, WireKind, WireMessage};
pub use status::Status;

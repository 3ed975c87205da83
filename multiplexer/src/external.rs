//! Minimal stand-ins for the file server's other subsystems (inode table, open-file
//! table, mount table). None of this is a real VFS — it exists only so the policies in
//! this crate (clone-device minor rebinding, the `ioctl` fd lookup, driver-restart
//! reopening) have something to call that exercises their actual logic.

use devmux_shared::DeviceNumber;

/// Opaque identifier for whatever an allocated inode turns out to be.
pub type InodeId = u64;

/// Allocates (or finds) the in-core inode for a character-special device, used when a
/// clone-style open hands back a new minor number.
pub trait InodeAllocator {
    fn allocate_char_special(&mut self, device: DeviceNumber) -> Result<InodeId, devmux_shared::DeviceError>;
}

/// A single open file description: enough to let `clone_open` rebind it to the new
/// minor the driver picked.
pub trait FileDescriptor {
    fn rebind_inode(&mut self, inode: InodeId);
}

#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    pub device: DeviceNumber,
    pub is_special: bool,
}

/// Resolves a file descriptor (scoped to its owning process) to the open file it names
/// — what `ioctl`'s `fp_filp[fd]` lookup did in the original.
pub trait FileTable {
    fn resolve(&self, fd: i32, owner: devmux_shared::Endpoint) -> Option<OpenFile>;
}

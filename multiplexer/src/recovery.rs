//! Recovery Controller (C7): reopens mounted filesystems and open character-special
//! files once a major's driver comes back up. Binding installation itself is C2's job
//! (`DriverMap::bind`, or `block_io`'s own `apply_devctl`); this module only handles
//! the reopen pass that follows it.

use devmux_shared::DeviceNumber;

#[derive(Debug, Clone, Copy)]
pub struct MountEntry {
    pub device: DeviceNumber,
    pub read_only: bool,
}

pub struct MountTable {
    pub entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new() -> Self {
        MountTable { entries: Vec::new() }
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One open character-special file, tracked only so a dead driver's reopen failure can
/// mark it unusable (`FILP_CLOSED` equivalent) rather than silently going stale.
pub struct FilpEntry {
    pub device: DeviceNumber,
    pub is_special: bool,
    pub invalidated: bool,
}

pub struct OpenFileTable {
    pub filps: Vec<FilpEntry>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        OpenFileTable { filps: Vec::new() }
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

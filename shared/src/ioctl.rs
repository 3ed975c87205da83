//! Decoding of an `ioctl` request code into the direction and payload size the Message
//! Adapter needs to mint the right kind of grant.
//!
//! Mirrors the `_MINIX_IOCTL_IOR` / `_MINIX_IOCTL_IOW` / `_MINIX_IOCTL_BIG` /
//! `_MINIX_IOCTL_SIZE[_BIG]` macros from `sys/ioc_tty.h`: the low bits of the request
//! code carry a size, two high bits carry read/write direction, and one bit says the
//! size field should be read from an alternate ("big") location.
use bitflags::bitflags;

const IOC_IN: u32 = 0x4000_0000;
const IOC_OUT: u32 = 0x8000_0000;
const IOC_BIG: u32 = 0x2000_0000;
const IOC_SIZE_MASK: u32 = 0x0FFF;
const IOC_SIZE_BIG_MASK: u32 = 0x00FF_FFFF;

bitflags! {
    /// Direction of data flow an `ioctl` grant must permit. Matches `CPF_READ`/`CPF_WRITE`
    /// in the original: `read` means the driver reads the caller's buffer (write-ioctl),
    /// `write` means the driver writes it (read-ioctl).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IoctlDirection: u8 {
        const READ  = 0b01;
        const WRITE = 0b10;
    }
}

/// A decoded `ioctl` request code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlCode {
    pub raw: u32,
}

impl IoctlCode {
    pub const fn new(raw: u32) -> Self {
        IoctlCode { raw }
    }

    pub fn direction(self) -> IoctlDirection {
        let mut dir = IoctlDirection::empty();
        if self.raw & IOC_OUT != 0 {
            dir |= IoctlDirection::WRITE;
        }
        if self.raw & IOC_IN != 0 {
            dir |= IoctlDirection::READ;
        }
        dir
    }

    pub fn is_big(self) -> bool {
        self.raw & IOC_BIG != 0
    }

    /// Payload size in bytes, honoring the "big" variant's wider size field.
    pub fn size(self) -> usize {
        if self.is_big() {
            (self.raw & IOC_SIZE_BIG_MASK) as usize
        } else {
            (self.raw & IOC_SIZE_MASK) as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_read_write_and_size() {
        let code = IoctlCode::new(IOC_IN | IOC_OUT | 128);
        assert_eq!(
            code.direction(),
            IoctlDirection::READ | IoctlDirection::WRITE
        );
        assert_eq!(code.size(), 128);
        assert!(!code.is_big());
    }

    #[test]
    fn big_variant_reads_wider_size_field() {
        let code = IoctlCode::new(IOC_IN | IOC_BIG | 4096);
        assert!(code.is_big());
        assert_eq!(code.size(), 4096);
    }
}

//! Command numbers, encoded like Linux `_IOC`.

use core::mem::size_of;

use deffib_layout::PageHeader;

pub const DEVICE_NAME: &str = "deffib";
pub const DEVICE_CLASS: &str = "fib";

pub const IOC_WRITE: u32 = 1;
pub const IOC_READ: u32 = 2;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

/// `_IOC(dir, ty, nr, size)`. Fields are OR-ed without masking, as the C macro does.
pub const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> u32 {
    (dir << IOC_DIRSHIFT) | (ty << IOC_TYPESHIFT) | (nr << IOC_NRSHIFT) | (size << IOC_SIZESHIFT)
}

/// `_IOW(0xABCD, 0, struct page *)`: the argument is the address of the caller's page.
pub const DISPATCH_CMD: u32 = ioc(
    IOC_WRITE,
    0xABCD,
    0,
    size_of::<*mut PageHeader>() as u32,
);

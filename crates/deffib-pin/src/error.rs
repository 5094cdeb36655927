use thiserror::Error;

/// Reasons [`crate::acquire`] can refuse a region.
///
/// All of these are reported before any worker starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("address {addr:#x} is not aligned to {align} bytes")]
    InvalidAlignment { addr: usize, align: usize },

    #[error("region of {len} bytes has no room for value slots")]
    RegionTooSmall { len: usize },

    #[error("region {addr:#x}..+{len:#x} is not readable and writable")]
    InaccessibleRegion { addr: usize, len: usize },

    /// Bookkeeping allocation or mapping failed. May be transient.
    #[error("out of memory")]
    OutOfMemory,

    #[error("failed to pin region: {}", os_error(.errno))]
    PinFailure { errno: i32 },
}

impl AcquireError {
    /// Negative errno reported to the caller of the dispatch command.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidAlignment { .. } | Self::RegionTooSmall { .. } => -libc::EINVAL,
            Self::InaccessibleRegion { .. } => -libc::EACCES,
            Self::OutOfMemory => -libc::ENOMEM,
            Self::PinFailure { errno } if *errno != 0 => -errno.abs(),
            // A pin that failed without a reason must still read as a failure.
            Self::PinFailure { .. } => -libc::EFAULT,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OutOfMemory => true,
            Self::PinFailure { errno } => matches!(*errno, libc::EAGAIN | libc::ENOMEM | libc::EINTR),
            _ => false,
        }
    }
}

fn os_error(errno: &i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(*errno)
}

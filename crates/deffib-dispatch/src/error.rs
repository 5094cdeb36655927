use std::io;

use deffib_pin::AcquireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error("region {addr:#x} already has a worker in flight")]
    RegionBusy { addr: usize },

    #[error("failed to start worker")]
    Spawn(#[source] io::Error),
}

impl DispatchError {
    /// Negative errno returned from the command surface.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Acquire(err) => err.errno(),
            Self::RegionBusy { .. } => -libc::EBUSY,
            Self::Spawn(_) => -libc::EAGAIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("device `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("no device named `{0}`")]
    NotFound(String),
}

impl RegistryError {
    pub fn errno(&self) -> i32 {
        match self {
            Self::AlreadyRegistered(_) => -libc::EEXIST,
            Self::NotFound(_) => -libc::ENOENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errno_mapping() {
        let cases = [
            (
                DispatchError::from(AcquireError::InvalidAlignment { addr: 8, align: 4096 }),
                -libc::EINVAL,
            ),
            (
                AcquireError::InaccessibleRegion { addr: 0, len: 4096 }.into(),
                -libc::EACCES,
            ),
            (AcquireError::OutOfMemory.into(), -libc::ENOMEM),
            (
                AcquireError::PinFailure { errno: libc::EFAULT }.into(),
                -libc::EFAULT,
            ),
            (DispatchError::RegionBusy { addr: 0x1000 }, -libc::EBUSY),
            (
                DispatchError::Spawn(io::Error::from(io::ErrorKind::WouldBlock)),
                -libc::EAGAIN,
            ),
        ];
        for (err, errno) in cases {
            assert_eq!(err.errno(), errno, "{err}");
        }
    }

    #[test]
    fn acquire_errors_display_transparently() {
        let err = DispatchError::from(AcquireError::OutOfMemory);
        assert_eq!(err.to_string(), "out of memory");
    }

    #[test]
    fn registry_errno_mapping() {
        assert_eq!(
            RegistryError::AlreadyRegistered("x".into()).errno(),
            -libc::EEXIST
        );
        assert_eq!(RegistryError::NotFound("x".into()).errno(), -libc::ENOENT);
    }
}

//! Turning a caller-supplied page address into a buffer a background worker may own.
//!
//! [`acquire`] validates the address, allocates the per-request bookkeeping, pins the page and
//! maps it, unwinding in reverse order on any failure. The result is an [`AcquiredBuffer`]: a
//! single-owner token that keeps the page pinned and mapped until [`AcquiredBuffer::release`].
//!
//! The memory primitives themselves sit behind [`PageHost`] so the acquisition protocol can be
//! exercised against [`TrackedHost`] with injected faults.

mod acquire;
mod error;
mod host;
#[cfg(target_os = "linux")]
mod process;
mod tracked;

pub use acquire::{acquire, AcquiredBuffer};
pub use error::AcquireError;
pub use host::{PageHost, PinHandle, PinMode, WorkSlot};
#[cfg(target_os = "linux")]
pub use process::{system_page_size, ProcessPageHost};
pub use tracked::{Fault, HostCounters, TrackedHost};

//! Shared page layout used to hand a deferred computation back to its caller.
//!
//! A single page-sized, page-aligned region is split into a progress header and a value array:
//!
//! ```text
//! offset 0                 values_offset()                         region_size
//! +------------------------+----------------------------------------+
//! | progress (AtomicUsize) | values[0] values[1] ... values[cap-1]  |
//! +------------------------+----------------------------------------+
//! ```
//!
//! The worker is the only writer. It stores `values[i]` with plain writes and then publishes
//! `progress = i + 1` with a release store. Readers load `progress` with acquire ordering and may
//! read any index below the observed value.
//!
//! - [`PageWriter`]: unique write handle owned by the worker
//! - [`PageReader`]: shared read handle for consumers
//! - [`AlignedPage`]: caller-side page allocation (used by the CLI and tests)
//! - [`verify_recurrence`]: consumer-side validation of a completed page

mod page;
mod recurrence;

pub use page::{AlignedPage, PageReader, PageWriter};
pub use recurrence::{fibonacci, verify_recurrence, RecurrenceError};

use core::mem::{align_of, size_of};
use core::sync::atomic::AtomicUsize;

/// Size in bytes of one value slot.
pub const VALUE_BYTES: usize = size_of::<u64>();

/// Header at the start of every shared page.
///
/// Only the counter lives here; the value array follows at [`values_offset`].
#[repr(C)]
pub struct PageHeader {
    /// Number of leading value slots that hold their final value.
    pub progress: AtomicUsize,
}

#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte offset of `values[0]` from the start of the page.
#[inline]
pub const fn values_offset() -> usize {
    align_up(size_of::<PageHeader>(), align_of::<u64>())
}

/// Number of value slots that fit in a region of `region_size` bytes.
#[inline]
pub const fn capacity(region_size: usize) -> usize {
    region_size.saturating_sub(values_offset()) / VALUE_BYTES
}

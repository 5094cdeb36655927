//! Deferred Fibonacci fill over a caller-owned shared page.
//!
//! A caller hands the [`Dispatcher`] the address of one page-aligned region. The dispatcher
//! validates and pins it, then a background worker fills it with the sequence while the caller
//! polls the page's progress counter:
//!
//! ```text
//!  caller                        dispatcher / worker
//!  ------                        -------------------
//!  ioctl(DISPATCH_CMD, addr) --> acquire: validate, slot, pin, map
//!                          <--   0 (or -errno)
//!  poll progress (acquire) <--   write value, publish progress (release)
//!  ...                           ...
//!  progress == capacity    <--   release: unmap, unpin
//! ```
//!
//! The pieces live in their own crates and are re-exported here.

pub use deffib_backoff as backoff;
pub use deffib_dispatch as dispatch;
pub use deffib_layout as layout;
pub use deffib_pin as pin;
pub use deffib_tags as tags;
pub use deffib_worker as worker;

pub use deffib_backoff::Backoff;
pub use deffib_dispatch::{DispatchError, Dispatcher, DispatcherConfig, DISPATCH_CMD};
pub use deffib_layout::{capacity, verify_recurrence, AlignedPage, PageReader};
pub use deffib_pin::{acquire, AcquireError, AcquiredBuffer, PageHost};
pub use deffib_worker::{FillWorker, WorkerOptions};

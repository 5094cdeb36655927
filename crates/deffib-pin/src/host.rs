use core::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Per-request bookkeeping created during acquisition and handed to the worker.
#[derive(Debug)]
pub struct WorkSlot {
    id: u64,
    addr: usize,
    len: usize,
    created: Instant,
}

impl WorkSlot {
    pub fn new(addr: usize, len: usize) -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            addr,
            len,
            created: Instant::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.addr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn created(&self) -> Instant {
        self.created
    }
}

/// Proof that `[addr, addr + len)` is pinned. Must be handed back to [`PageHost::unpin`].
#[derive(Debug, PartialEq, Eq)]
pub struct PinHandle {
    addr: usize,
    len: usize,
}

impl PinHandle {
    pub fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.addr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Memory primitives acquisition is built on.
///
/// Implementations must pair every successful `pin` with exactly one `unpin`, and every
/// successful `map` with exactly one `unmap`; [`crate::AcquiredBuffer`] guarantees it calls them
/// that way.
pub trait PageHost: Send + Sync + 'static {
    /// Size and alignment of one shared region.
    fn region_size(&self) -> usize;

    /// Whether the whole range is readable and writable by the caller.
    fn check_access(&self, addr: usize, len: usize) -> bool;

    /// Allocates the bookkeeping for one request. `None` means out of memory.
    fn alloc_slot(&self, addr: usize, len: usize) -> Option<Box<WorkSlot>> {
        Some(Box::new(WorkSlot::new(addr, len)))
    }

    /// Pins the range for writing. Errors are positive errno values.
    fn pin(&self, addr: usize, len: usize) -> Result<PinHandle, i32>;

    /// Maps pinned pages into the worker's address space.
    fn map(&self, pages: &PinHandle) -> Option<NonNull<u8>>;

    fn unmap(&self, pages: &PinHandle, mapped: NonNull<u8>);

    fn unpin(&self, pages: PinHandle);
}

/// How a host keeps pinned pages resident.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// `mlock`/`munlock` the region. Subject to `RLIMIT_MEMLOCK`.
    #[default]
    Lock,
    /// Only hold the pin handle; the pages stay swappable.
    Reference,
}

impl std::str::FromStr for PinMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "lock" => Ok(Self::Lock),
            "reference" => Ok(Self::Reference),
            other => Err(format!("unknown pin mode `{other}` (expected `lock` or `reference`)")),
        }
    }
}

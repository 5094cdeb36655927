use core::ptr::NonNull;
use std::sync::Arc;

use deffib_layout::{capacity, PageReader, PageWriter};

use crate::error::AcquireError;
use crate::host::{PageHost, PinHandle, WorkSlot};

struct Mapping {
    pages: PinHandle,
    mapped: NonNull<u8>,
}

/// Exclusive, pinned and mapped view of a caller's page.
///
/// Created by [`acquire`] and released exactly once, either explicitly through
/// [`AcquiredBuffer::release`] or, as a fallback, when dropped.
#[must_use = "an acquired buffer keeps its page pinned until released"]
pub struct AcquiredBuffer<H: PageHost> {
    host: Arc<H>,
    addr: usize,
    len: usize,
    slot: Option<Box<WorkSlot>>,
    mapping: Option<Mapping>,
}

// The mapping is owned by this token alone; moving the token moves sole write access with it.
unsafe impl<H: PageHost> Send for AcquiredBuffer<H> {}

/// Validates `addr` and takes a pinned, writable mapping of the region starting there.
///
/// The region size is [`PageHost::region_size`]. Partial work is undone in reverse order on
/// failure, so a rejected request leaves no pin or mapping behind.
pub fn acquire<H: PageHost>(host: Arc<H>, addr: usize) -> Result<AcquiredBuffer<H>, AcquireError> {
    let len = host.region_size();
    if capacity(len) == 0 {
        return Err(AcquireError::RegionTooSmall { len });
    }
    if addr % len != 0 {
        return Err(AcquireError::InvalidAlignment { addr, align: len });
    }
    if addr.checked_add(len).is_none() || !host.check_access(addr, len) {
        return Err(AcquireError::InaccessibleRegion { addr, len });
    }

    let slot = host.alloc_slot(addr, len).ok_or(AcquireError::OutOfMemory)?;

    let pages = match host.pin(addr, len) {
        Ok(pages) => pages,
        Err(errno) => {
            tracing::debug!(addr, errno, "pin failed");
            drop(slot);
            return Err(AcquireError::PinFailure { errno });
        }
    };

    let mapped = match host.map(&pages) {
        Some(mapped) => mapped,
        None => {
            tracing::debug!(addr, "map failed");
            host.unpin(pages);
            drop(slot);
            return Err(AcquireError::OutOfMemory);
        }
    };

    tracing::debug!(addr, len, slot = slot.id(), "acquired buffer");

    Ok(AcquiredBuffer {
        host,
        addr,
        len,
        slot: Some(slot),
        mapping: Some(Mapping { pages, mapped }),
    })
}

impl<H: PageHost> AcquiredBuffer<H> {
    /// Caller address the buffer was acquired from.
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
    pub fn capacity(&self) -> usize {
        capacity(self.len)
    }

    #[inline]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Id of the request bookkeeping, while it is still attached.
    pub fn slot_id(&self) -> Option<u64> {
        self.slot.as_ref().map(|slot| slot.id())
    }

    /// Detaches the request bookkeeping so its new owner can free it.
    pub fn take_slot(&mut self) -> Option<Box<WorkSlot>> {
        self.slot.take()
    }

    pub fn writer(&mut self) -> PageWriter<'_> {
        let mapped = self.mapped();
        unsafe { PageWriter::from_raw(mapped, self.len) }
    }

    pub fn reader(&self) -> PageReader<'_> {
        let mapped = self.mapped();
        unsafe { PageReader::from_raw(mapped, self.len) }
    }

    /// Unmaps the buffer and unpins its pages.
    pub fn release(mut self) {
        self.release_mapping();
    }

    fn mapped(&self) -> NonNull<u8> {
        match &self.mapping {
            Some(mapping) => mapping.mapped,
            // `mapping` is only cleared by `release`/`drop`, both of which consume the token.
            None => unreachable!("buffer used after release"),
        }
    }

    fn release_mapping(&mut self) {
        if let Some(Mapping { pages, mapped }) = self.mapping.take() {
            self.host.unmap(&pages, mapped);
            self.host.unpin(pages);
            tracing::debug!(addr = self.addr, "released buffer");
        }
    }
}

impl<H: PageHost> Drop for AcquiredBuffer<H> {
    fn drop(&mut self) {
        if self.mapping.is_some() {
            tracing::warn!(
                addr = self.addr,
                panicking = std::thread::panicking(),
                "acquired buffer dropped without release"
            );
            self.release_mapping();
        }
    }
}

impl<H: PageHost> core::fmt::Debug for AcquiredBuffer<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AcquiredBuffer")
            .field("addr", &format_args!("{:#x}", self.addr))
            .field("len", &self.len)
            .field("slot", &self.slot_id())
            .field("mapped", &self.mapping.is_some())
            .finish()
    }
}

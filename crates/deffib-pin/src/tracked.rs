use core::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::host::{PageHost, PinHandle, WorkSlot};

/// Failure to inject into a [`TrackedHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    SlotAlloc,
    /// Fail `pin` with this errno.
    Pin(i32),
    Map,
}

/// Calls that reached the wrapped host.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostCounters {
    pub slots: u64,
    pub pins: u64,
    pub unpins: u64,
    pub maps: u64,
    pub unmaps: u64,
}

impl HostCounters {
    pub fn total(&self) -> u64 {
        self.slots + self.pins + self.unpins + self.maps + self.unmaps
    }
}

/// [`PageHost`] decorator that counts pin/map traffic and can be made to fail.
///
/// Injected faults stay active until [`TrackedHost::clear_fault`].
pub struct TrackedHost<H> {
    inner: H,
    slots: AtomicU64,
    pins: AtomicU64,
    unpins: AtomicU64,
    maps: AtomicU64,
    unmaps: AtomicU64,
    fault: Mutex<Option<Fault>>,
}

impl<H: PageHost> TrackedHost<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            slots: AtomicU64::new(0),
            pins: AtomicU64::new(0),
            unpins: AtomicU64::new(0),
            maps: AtomicU64::new(0),
            unmaps: AtomicU64::new(0),
            fault: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn inject(&self, fault: Fault) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = Some(fault);
    }

    pub fn clear_fault(&self) {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn counters(&self) -> HostCounters {
        HostCounters {
            slots: self.slots.load(Ordering::SeqCst),
            pins: self.pins.load(Ordering::SeqCst),
            unpins: self.unpins.load(Ordering::SeqCst),
            maps: self.maps.load(Ordering::SeqCst),
            unmaps: self.unmaps.load(Ordering::SeqCst),
        }
    }

    /// Pins plus mappings not yet undone.
    pub fn outstanding(&self) -> u64 {
        let c = self.counters();
        c.pins.saturating_sub(c.unpins) + c.maps.saturating_sub(c.unmaps)
    }

    fn fault(&self) -> Option<Fault> {
        *self.fault.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<H: PageHost> PageHost for TrackedHost<H> {
    fn region_size(&self) -> usize {
        self.inner.region_size()
    }

    fn check_access(&self, addr: usize, len: usize) -> bool {
        self.inner.check_access(addr, len)
    }

    fn alloc_slot(&self, addr: usize, len: usize) -> Option<Box<WorkSlot>> {
        if self.fault() == Some(Fault::SlotAlloc) {
            return None;
        }
        let slot = self.inner.alloc_slot(addr, len)?;
        self.slots.fetch_add(1, Ordering::SeqCst);
        Some(slot)
    }

    fn pin(&self, addr: usize, len: usize) -> Result<PinHandle, i32> {
        if let Some(Fault::Pin(errno)) = self.fault() {
            return Err(errno);
        }
        let pages = self.inner.pin(addr, len)?;
        self.pins.fetch_add(1, Ordering::SeqCst);
        Ok(pages)
    }

    fn map(&self, pages: &PinHandle) -> Option<NonNull<u8>> {
        if self.fault() == Some(Fault::Map) {
            return None;
        }
        let mapped = self.inner.map(pages)?;
        self.maps.fetch_add(1, Ordering::SeqCst);
        Some(mapped)
    }

    fn unmap(&self, pages: &PinHandle, mapped: NonNull<u8>) {
        self.inner.unmap(pages, mapped);
        self.unmaps.fetch_add(1, Ordering::SeqCst);
    }

    fn unpin(&self, pages: PinHandle) {
        self.inner.unpin(pages);
        self.unpins.fetch_add(1, Ordering::SeqCst);
    }
}

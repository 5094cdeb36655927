use core::alloc::Layout;
use core::marker::PhantomData;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{capacity, values_offset};

/// Exclusive write access to a shared page.
///
/// There is exactly one writer per page. Values are written with plain stores and become
/// visible to readers only once [`PageWriter::publish`] moves `progress` past them.
pub struct PageWriter<'a> {
    base: NonNull<u8>,
    capacity: usize,
    _region: PhantomData<&'a mut [u8]>,
}

// The writer only touches memory it was handed exclusively; readers synchronize through the
// release/acquire pair on `progress`.
unsafe impl Send for PageWriter<'_> {}

impl<'a> PageWriter<'a> {
    /// # Safety
    ///
    /// `base` must point to a region of at least `region_size` bytes that is aligned to
    /// `align_of::<u64>()`, readable and writable for `'a`, and not written by anyone else for
    /// that lifetime.
    pub unsafe fn from_raw(base: NonNull<u8>, region_size: usize) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % core::mem::align_of::<u64>(), 0);
        Self {
            base,
            capacity: capacity(region_size),
            _region: PhantomData,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last value stored by [`PageWriter::publish`].
    #[inline]
    pub fn published(&self) -> usize {
        self.progress_cell().load(Ordering::Relaxed)
    }

    /// Reads back a slot previously written through this handle.
    pub fn value(&self, index: usize) -> u64 {
        assert!(index < self.capacity, "slot {index} out of range");
        unsafe { self.values_ptr().add(index).read() }
    }

    /// Stores `value` into slot `index` without publishing it.
    pub fn write_value(&mut self, index: usize, value: u64) {
        assert!(index < self.capacity, "slot {index} out of range");
        unsafe { self.values_ptr().add(index).write(value) }
    }

    /// Makes slots `[0, progress)` visible to readers.
    ///
    /// Every `write_value` issued before this call happens-before any acquire load that
    /// observes `progress`.
    pub fn publish(&mut self, progress: usize) {
        assert!(
            progress <= self.capacity,
            "progress {progress} exceeds capacity {}",
            self.capacity
        );
        self.progress_cell().store(progress, Ordering::Release);
    }

    #[inline]
    fn progress_cell(&self) -> &AtomicUsize {
        unsafe { &*(self.base.as_ptr() as *const AtomicUsize) }
    }

    #[inline]
    fn values_ptr(&self) -> *mut u64 {
        unsafe { self.base.as_ptr().add(values_offset()) as *mut u64 }
    }
}

/// Shared read access to a page that a worker may still be filling.
#[derive(Clone, Copy)]
pub struct PageReader<'a> {
    base: NonNull<u8>,
    capacity: usize,
    _region: PhantomData<&'a [u8]>,
}

unsafe impl Send for PageReader<'_> {}
unsafe impl Sync for PageReader<'_> {}

impl<'a> PageReader<'a> {
    /// # Safety
    ///
    /// `base` must point to a region of at least `region_size` bytes that is aligned to
    /// `align_of::<u64>()` and stays readable for `'a`. Slots at or above the published
    /// progress may only be written by a single [`PageWriter`].
    pub unsafe fn from_raw(base: NonNull<u8>, region_size: usize) -> Self {
        Self {
            base,
            capacity: capacity(region_size),
            _region: PhantomData,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire load of the progress counter.
    #[inline]
    pub fn progress(&self) -> usize {
        let cell = unsafe { &*(self.base.as_ptr() as *const AtomicUsize) };
        cell.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.progress() >= self.capacity
    }

    /// Returns slot `index` if it has been published.
    pub fn value(&self, index: usize) -> Option<u64> {
        let visible = self.progress().min(self.capacity);
        if index >= visible {
            return None;
        }
        Some(unsafe { self.values_ptr().add(index).read() })
    }

    /// Copies out every slot published at the time of the call.
    pub fn published(&self) -> Vec<u64> {
        let visible = self.progress().min(self.capacity);
        let mut out = Vec::with_capacity(visible);
        unsafe {
            core::ptr::copy_nonoverlapping(self.values_ptr(), out.as_mut_ptr(), visible);
            out.set_len(visible);
        }
        out
    }

    #[inline]
    fn values_ptr(&self) -> *const u64 {
        unsafe { self.base.as_ptr().add(values_offset()) as *const u64 }
    }
}

/// A zeroed, self-aligned heap region standing in for the caller's page.
///
/// The allocation is aligned to its own size so it satisfies the same alignment check a real
/// page would.
pub struct AlignedPage {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for AlignedPage {}
unsafe impl Sync for AlignedPage {}

impl AlignedPage {
    /// Allocates `region_size` bytes aligned to `region_size`.
    ///
    /// Returns `None` for a zero or non-power-of-two size, or when the allocator fails.
    pub fn new(region_size: usize) -> Option<Self> {
        Self::with_alignment(region_size, region_size)
    }

    /// Allocates `size` bytes aligned to `align`.
    pub fn with_alignment(size: usize, align: usize) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, align).ok()?;
        let ptr = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;
        Some(Self { ptr, layout })
    }

    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn reader(&self) -> PageReader<'_> {
        unsafe { PageReader::from_raw(self.ptr, self.layout.size()) }
    }

    /// Exclusive writer over the page, for producing a page in-process.
    pub fn writer(&mut self) -> PageWriter<'_> {
        unsafe { PageWriter::from_raw(self.ptr, self.layout.size()) }
    }

    /// Clears the page so it can be handed out again.
    pub fn clear(&mut self) {
        unsafe { core::ptr::write_bytes(self.ptr.as_ptr(), 0, self.layout.size()) }
    }
}

impl Drop for AlignedPage {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

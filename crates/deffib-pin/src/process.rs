//! [`PageHost`] for the current process.
//!
//! The worker runs on a thread of the same process, so "mapping" the caller's page is the
//! identity; pinning locks it into RAM with `mlock(2)`.

use core::ptr::NonNull;
use std::io;

use crate::host::{PageHost, PinHandle, PinMode};

/// Host page size from `sysconf(_SC_PAGESIZE)`, or 4096 if the query fails.
pub fn system_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

#[derive(Debug, Clone)]
pub struct ProcessPageHost {
    region_size: usize,
    pin_mode: PinMode,
}

impl Default for ProcessPageHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessPageHost {
    pub fn new() -> Self {
        Self::with_region_size(system_page_size())
    }

    /// Uses `region_size` instead of the host page size, e.g. 4096 on a 16K-page kernel.
    pub fn with_region_size(region_size: usize) -> Self {
        Self {
            region_size,
            pin_mode: PinMode::default(),
        }
    }

    pub fn pin_mode(mut self, pin_mode: PinMode) -> Self {
        self.pin_mode = pin_mode;
        self
    }
}

impl PageHost for ProcessPageHost {
    fn region_size(&self) -> usize {
        self.region_size
    }

    fn check_access(&self, addr: usize, len: usize) -> bool {
        match std::fs::read_to_string("/proc/self/maps") {
            Ok(maps) => range_is_read_write(&maps, addr, len),
            Err(err) => {
                tracing::warn!(%err, "failed to read /proc/self/maps");
                false
            }
        }
    }

    fn pin(&self, addr: usize, len: usize) -> Result<PinHandle, i32> {
        if self.pin_mode == PinMode::Lock {
            let rc = unsafe { libc::mlock(addr as *const libc::c_void, len) };
            if rc != 0 {
                return Err(io::Error::last_os_error()
                    .raw_os_error()
                    .unwrap_or(libc::EFAULT));
            }
        }
        Ok(PinHandle::new(addr, len))
    }

    fn map(&self, pages: &PinHandle) -> Option<NonNull<u8>> {
        NonNull::new(pages.addr() as *mut u8)
    }

    fn unmap(&self, _pages: &PinHandle, _mapped: NonNull<u8>) {}

    fn unpin(&self, pages: PinHandle) {
        if self.pin_mode == PinMode::Lock {
            let rc = unsafe { libc::munlock(pages.addr() as *const libc::c_void, pages.len()) };
            if rc != 0 {
                tracing::warn!(
                    addr = pages.addr(),
                    err = %io::Error::last_os_error(),
                    "munlock failed"
                );
            }
        }
    }
}

/// Whether `[addr, addr + len)` is covered by contiguous `rw` mappings in a `/proc/<pid>/maps`
/// listing.
fn range_is_read_write(maps: &str, addr: usize, len: usize) -> bool {
    let Some(end) = addr.checked_add(len) else {
        return false;
    };
    let mut cursor = addr;
    for line in maps.lines() {
        let Some((start, stop, perms)) = parse_maps_line(line) else {
            continue;
        };
        if stop <= cursor {
            continue;
        }
        if start > cursor {
            // The listing is sorted, so a gap here leaves part of the range unmapped.
            return false;
        }
        if !(perms.starts_with("rw")) {
            return false;
        }
        cursor = stop;
        if cursor >= end {
            return true;
        }
    }
    cursor >= end
}

fn parse_maps_line(line: &str) -> Option<(usize, usize, &str)> {
    let mut fields = line.split_ascii_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?;
    let (start, stop) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let stop = usize::from_str_radix(stop, 16).ok()?;
    Some((start, stop, perms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use deffib_layout::AlignedPage;

    const MAPS: &str = "\
00400000-00452000 r-xp 00000000 08:02 173521      /usr/bin/app
00651000-00652000 r--p 00051000 08:02 173521      /usr/bin/app
00652000-00655000 rw-p 00052000 08:02 173521      /usr/bin/app
00655000-00656000 rw-p 00000000 00:00 0           [heap]
7ffd0000-7ffd2000 rw-p 00000000 00:00 0           [stack]
";

    #[test]
    fn rw_mapping_covers_range() {
        assert!(range_is_read_write(MAPS, 0x652000, 0x1000));
        assert!(range_is_read_write(MAPS, 0x7ffd1000, 0x1000));
    }

    #[test]
    fn range_spanning_adjacent_rw_mappings_is_accessible() {
        assert!(range_is_read_write(MAPS, 0x654000, 0x2000));
    }

    #[test]
    fn read_only_or_executable_mappings_are_rejected() {
        assert!(!range_is_read_write(MAPS, 0x400000, 0x1000));
        assert!(!range_is_read_write(MAPS, 0x651000, 0x1000));
        assert!(!range_is_read_write(MAPS, 0x651000, 0x2000));
    }

    #[test]
    fn unmapped_holes_are_rejected() {
        assert!(!range_is_read_write(MAPS, 0x0, 0x1000));
        assert!(!range_is_read_write(MAPS, 0x700000, 0x1000));
        assert!(!range_is_read_write(MAPS, 0x655000, 0x2000));
        assert!(!range_is_read_write(MAPS, 0x7ffd1000, 0x2000));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let maps = "garbage\n00655000-00656000 rw-p 00000000 00:00 0 [heap]\n";
        assert!(range_is_read_write(maps, 0x655000, 0x1000));
    }

    #[test]
    fn system_page_size_is_a_power_of_two() {
        assert!(system_page_size().is_power_of_two());
    }

    #[test]
    fn pin_mode_parses() {
        assert_eq!("lock".parse::<PinMode>().unwrap(), PinMode::Lock);
        assert_eq!(" reference ".parse::<PinMode>().unwrap(), PinMode::Reference);
        assert!("pin".parse::<PinMode>().is_err());
    }

    #[test]
    fn heap_page_is_accessible_and_null_is_not() {
        let host = ProcessPageHost::with_region_size(4096);
        let page = AlignedPage::new(4096).unwrap();
        assert!(host.check_access(page.addr(), page.len()));
        assert!(!host.check_access(0, 4096));
    }

    #[test]
    fn reference_pin_maps_identity() {
        let host = ProcessPageHost::with_region_size(4096).pin_mode(PinMode::Reference);
        let page = AlignedPage::new(4096).unwrap();
        let pages = host.pin(page.addr(), page.len()).unwrap();
        let mapped = host.map(&pages).unwrap();
        assert_eq!(mapped.as_ptr(), page.as_ptr());
        host.unmap(&pages, mapped);
        host.unpin(pages);
    }

    #[test]
    fn lock_pin_succeeds_or_reports_errno() {
        let host = ProcessPageHost::with_region_size(4096);
        let page = AlignedPage::new(4096).unwrap();
        match host.pin(page.addr(), page.len()) {
            Ok(pages) => host.unpin(pages),
            // Sandboxes may run with RLIMIT_MEMLOCK = 0.
            Err(errno) => assert!(
                matches!(errno, libc::EPERM | libc::ENOMEM | libc::EAGAIN),
                "unexpected errno {errno}"
            ),
        }
    }
}

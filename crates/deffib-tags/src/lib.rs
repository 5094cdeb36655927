//! Small per-caller tag records.
//!
//! Each caller (identified by a numeric id, typically its pid) owns at most one tag. Writing
//! replaces the previous tag wholesale; readers work on `Arc` snapshots, so an entry replaced
//! mid-read is reclaimed only after the last reader lets go of it.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Longest tag kept, in bytes. Longer writes are truncated.
pub const MAX_TAG_LEN: usize = 255;

/// Upper bound on the rendered listing returned by [`TagStore::read`].
pub const LISTING_CAPACITY: usize = 2048;

pub type CallerId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub caller: CallerId,
    pub tag: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct TagStore {
    entries: RwLock<BTreeMap<CallerId, Arc<TagEntry>>>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` (truncated to [`MAX_TAG_LEN`]) as `caller`'s tag.
    ///
    /// Returns the number of input bytes consumed, which is always `bytes.len()`.
    pub fn write(&self, caller: CallerId, bytes: &[u8]) -> usize {
        let kept = &bytes[..bytes.len().min(MAX_TAG_LEN)];
        let entry = Arc::new(TagEntry {
            caller,
            tag: kept.to_vec(),
        });
        let previous = self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(caller, entry);
        tracing::debug!(
            caller,
            len = kept.len(),
            truncated = bytes.len() > kept.len(),
            replaced = previous.is_some(),
            "tag written"
        );
        bytes.len()
    }

    pub fn get(&self, caller: CallerId) -> Option<Arc<TagEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&caller)
            .cloned()
    }

    pub fn remove(&self, caller: CallerId) -> Option<Arc<TagEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&caller)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry at the time of the call, ordered by caller.
    pub fn snapshot(&self) -> Vec<Arc<TagEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Renders `"<caller>: <tag>\n"` lines, capped at [`LISTING_CAPACITY`] bytes.
    ///
    /// A line that does not fit is cut at the cap rather than dropped.
    pub fn listing(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LISTING_CAPACITY);
        for entry in self.snapshot() {
            if out.len() >= LISTING_CAPACITY {
                break;
            }
            let mut line = format!("{}: ", entry.caller).into_bytes();
            line.extend_from_slice(&entry.tag);
            line.push(b'\n');
            let room = LISTING_CAPACITY - out.len();
            out.extend_from_slice(&line[..line.len().min(room)]);
        }
        out
    }

    /// Copies the listing starting at `offset` into `buf`. Returns 0 at or past the end.
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> usize {
        let listing = self.listing();
        if offset >= listing.len() {
            return 0;
        }
        let n = buf.len().min(listing.len() - offset);
        buf[..n].copy_from_slice(&listing[offset..offset + n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_previous_tag() {
        let store = TagStore::new();
        assert_eq!(store.write(7, b"first"), 5);
        assert_eq!(store.write(7, b"second"), 6);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().tag, b"second");
    }

    #[test]
    fn long_tags_are_truncated_but_fully_consumed() {
        let store = TagStore::new();
        let long = vec![b'x'; 1000];
        assert_eq!(store.write(1, &long), 1000);
        assert_eq!(store.get(1).unwrap().tag.len(), MAX_TAG_LEN);
    }

    #[test]
    fn readers_keep_replaced_entries_alive() {
        let store = TagStore::new();
        store.write(3, b"old");
        let held = store.get(3).unwrap();
        store.write(3, b"new");
        assert_eq!(held.tag, b"old");
        assert_eq!(Arc::strong_count(&held), 1);
        assert_eq!(store.get(3).unwrap().tag, b"new");
    }

    #[test]
    fn listing_is_ordered_by_caller() {
        let store = TagStore::new();
        store.write(20, b"b");
        store.write(4, b"a");
        assert_eq!(store.listing(), b"4: a\n20: b\n");
    }

    #[test]
    fn read_honours_offset_and_buffer_size() {
        let store = TagStore::new();
        store.write(1, b"hello");
        let mut buf = [0u8; 4];
        assert_eq!(store.read(0, &mut buf), 4);
        assert_eq!(&buf, b"1: h");
        assert_eq!(store.read(4, &mut buf), 4);
        assert_eq!(&buf, b"ello");
        assert_eq!(store.read(8, &mut buf), 1);
        assert_eq!(buf[0], b'\n');
        assert_eq!(store.read(9, &mut buf), 0);
        assert_eq!(store.read(100, &mut buf), 0);
    }

    #[test]
    fn listing_is_capped() {
        let store = TagStore::new();
        for caller in 0..64 {
            store.write(caller, &[b'y'; MAX_TAG_LEN]);
        }
        assert_eq!(store.listing().len(), LISTING_CAPACITY);
    }

    #[test]
    fn remove_drops_the_entry() {
        let store = TagStore::new();
        store.write(9, b"tag");
        assert_eq!(store.remove(9).unwrap().caller, 9);
        assert!(store.is_empty());
        assert!(store.remove(9).is_none());
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let store = Arc::new(TagStore::new());
        let mut threads = Vec::new();
        for caller in 0..4u32 {
            let store = store.clone();
            threads.push(std::thread::spawn(move || {
                for round in 0..200 {
                    store.write(caller, format!("round {round}").as_bytes());
                    let listing = store.listing();
                    assert!(listing.len() <= LISTING_CAPACITY);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(store.len(), 4);
        for caller in 0..4 {
            assert_eq!(store.get(caller).unwrap().tag, b"round 199");
        }
    }
}

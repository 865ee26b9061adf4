//! The name→offset directory and bump arena backing `SegmentManager`.
//!
//! A fixed-size header, a directory of entries, and a raw byte arena that
//! entries point into: a small linear directory of named typed objects,
//! since the segment never holds more than a few dozen objects (a
//! configurable maximum, default 64) and is built once.

use std::mem::{align_of, size_of};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::SegmentError;

const NAME_CAP: usize = 32;

/// Default directory capacity. Covers the control block plus the four
/// scalar-record vectors with head-room for a handful of test-only
/// objects.
pub const DEFAULT_DIRECTORY_CAPACITY: usize = 64;

#[repr(C)]
struct DirEntry {
    name: [u8; NAME_CAP],
    name_len: u32,
    offset: u32,
    len: u32,
}

#[repr(C)]
struct Header {
    object_count: AtomicU32,
    arena_used: AtomicU32,
    capacity: u32,
    arena_size: u32,
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Total bytes needed for a segment able to hold `capacity` named objects
/// and `arena_bytes` of payload.
pub fn layout_size(capacity: usize, arena_bytes: usize) -> usize {
    let header = align_up(size_of::<Header>(), align_of::<DirEntry>());
    let dir = capacity * size_of::<DirEntry>();
    align_up(header + dir, 16) + arena_bytes
}

/// A bump-allocating, name-keyed directory living at the front of a
/// mapped region. `capacity` and the arena boundary are fixed the moment
/// the region is created; every later `insert` either succeeds within
/// that budget or fails — the directory never grows or relocates objects.
pub struct Arena {
    base: *mut u8,
    region_len: usize,
    header_off: usize,
    dir_off: usize,
    arena_off: usize,
}

impl Arena {
    /// Initializes a freshly mapped, zeroed region as an empty arena with
    /// room for `capacity` directory entries.
    pub fn init(base: *mut u8, region_len: usize, capacity: usize) -> Self {
        let header_off = 0;
        let dir_off = align_up(size_of::<Header>(), align_of::<DirEntry>());
        let arena_off = align_up(dir_off + capacity * size_of::<DirEntry>(), 16);
        let arena = Arena {
            base,
            region_len,
            header_off,
            dir_off,
            arena_off,
        };
        let header = arena.header_mut();
        header.object_count.store(0, Ordering::Relaxed);
        header.arena_used.store(0, Ordering::Relaxed);
        header.capacity = capacity as u32;
        header.arena_size = (region_len - arena_off) as u32;
        arena
    }

    /// Attaches to an already-initialized region (back-end `open` path).
    pub fn attach(base: *mut u8, region_len: usize) -> Self {
        let header_off = 0;
        // Capacity is read back from the header once mapped, so the dir
        // and arena offsets below are recomputed from the stored value.
        let capacity = unsafe { &*(base as *const Header) }.capacity as usize;
        let dir_off = align_up(size_of::<Header>(), align_of::<DirEntry>());
        let arena_off = align_up(dir_off + capacity * size_of::<DirEntry>(), 16);
        Arena {
            base,
            region_len,
            header_off,
            dir_off,
            arena_off,
        }
    }

    fn header_mut(&self) -> &mut Header {
        unsafe { &mut *(self.base.add(self.header_off) as *mut Header) }
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.base.add(self.header_off) as *const Header) }
    }

    fn entries(&self) -> &[DirEntry] {
        let capacity = self.header().capacity as usize;
        unsafe { std::slice::from_raw_parts(self.base.add(self.dir_off) as *const DirEntry, capacity) }
    }

    fn entries_mut(&self) -> &mut [DirEntry] {
        let capacity = self.header().capacity as usize;
        unsafe { std::slice::from_raw_parts_mut(self.base.add(self.dir_off) as *mut DirEntry, capacity) }
    }

    fn name_matches(entry: &DirEntry, name: &str) -> bool {
        entry.name_len as usize == name.len() && &entry.name[..name.len()] == name.as_bytes()
    }

    fn lookup(&self, name: &str) -> Option<&DirEntry> {
        let count = self.header().object_count.load(Ordering::Acquire) as usize;
        self.entries()[..count].iter().find(|e| Self::name_matches(e, name))
    }

    /// Reserves `size` bytes aligned to `align` under `name`, returning a
    /// pointer to the start of the reserved region. Fails if the name is
    /// already used, the directory is full, or the arena has no more room.
    pub fn allocate(&self, name: &str, size: usize, align: usize) -> Result<*mut u8, SegmentError> {
        if name.len() > NAME_CAP {
            return Err(SegmentError::InvalidName(name.to_string()));
        }
        if self.lookup(name).is_some() {
            return Err(SegmentError::NameTaken(name.to_string()));
        }
        let header = self.header();
        let capacity = header.capacity as usize;
        let count = header.object_count.load(Ordering::Acquire) as usize;
        if count >= capacity {
            return Err(SegmentError::DirectoryFull(capacity));
        }

        let used = header.arena_used.load(Ordering::Acquire) as usize;
        let aligned_start = align_up(used, align);
        let needed_end = aligned_start + size;
        let arena_size = header.arena_size as usize;
        if needed_end > arena_size {
            return Err(SegmentError::OutOfSpace {
                needed: needed_end - used,
                available: arena_size - used,
            });
        }

        let mut entry = DirEntry {
            name: [0u8; NAME_CAP],
            name_len: name.len() as u32,
            offset: (self.arena_off + aligned_start) as u32,
            len: size as u32,
        };
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        self.entries_mut()[count] = entry;

        let header = self.header_mut();
        header.arena_used.store(needed_end as u32, Ordering::Release);
        header.object_count.store((count + 1) as u32, Ordering::Release);

        Ok(unsafe { self.base.add(self.arena_off + aligned_start) })
    }

    /// Locates a previously allocated object by name, verifying the byte
    /// length matches what the caller expects.
    pub fn find(&self, name: &str, expected_len: usize) -> Result<*mut u8, SegmentError> {
        let entry = self
            .lookup(name)
            .ok_or_else(|| SegmentError::ObjectNotFound(name.to_string()))?;
        if entry.len as usize != expected_len {
            return Err(SegmentError::ObjectNotFound(format!(
                "{name} (size mismatch: stored {}, expected {expected_len})",
                entry.len
            )));
        }
        Ok(unsafe { self.base.add(entry.offset as usize) })
    }

    /// Byte length a named object was constructed with, for callers that
    /// need to discover a vector's element count rather than assume it
    /// (the back-end side knows variable names, not counts, until it asks;
    /// grounded on `IPCSlave::retrieveScalars` fetching a whole named
    /// collection without the caller pre-declaring its size).
    pub fn entry_len(&self, name: &str) -> Option<usize> {
        self.lookup(name).map(|e| e.len as usize)
    }

    pub fn object_count(&self) -> usize {
        self.header().object_count.load(Ordering::Acquire) as usize
    }

    pub fn capacity(&self) -> usize {
        self.header().capacity as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_buffer<R>(capacity: usize, arena_bytes: usize, f: impl FnOnce(&Arena) -> R) -> R {
        let total = layout_size(capacity, arena_bytes);
        let mut buf = vec![0u8; total];
        let arena = Arena::init(buf.as_mut_ptr(), total, capacity);
        f(&arena)
    }

    #[test]
    fn allocate_then_find_round_trips() {
        with_buffer(8, 256, |arena| {
            let ptr = arena.allocate("alpha", 8, 8).unwrap();
            unsafe { *(ptr as *mut u64) = 0xDEAD_BEEF };
            let found = arena.find("alpha", 8).unwrap();
            assert_eq!(unsafe { *(found as *const u64) }, 0xDEAD_BEEF);
        });
    }

    #[test]
    fn duplicate_name_rejected() {
        with_buffer(8, 256, |arena| {
            arena.allocate("a", 4, 4).unwrap();
            assert!(matches!(arena.allocate("a", 4, 4), Err(SegmentError::NameTaken(_))));
        });
    }

    #[test]
    fn directory_full_rejected() {
        with_buffer(1, 256, |arena| {
            arena.allocate("a", 4, 4).unwrap();
            assert!(matches!(arena.allocate("b", 4, 4), Err(SegmentError::DirectoryFull(1))));
        });
    }

    #[test]
    fn out_of_space_rejected() {
        with_buffer(8, 8, |arena| {
            assert!(matches!(
                arena.allocate("big", 64, 8),
                Err(SegmentError::OutOfSpace { .. })
            ));
        });
    }

    #[test]
    fn missing_object_rejected() {
        with_buffer(8, 64, |arena| {
            assert!(matches!(arena.find("nope", 4), Err(SegmentError::ObjectNotFound(_))));
        });
    }
}

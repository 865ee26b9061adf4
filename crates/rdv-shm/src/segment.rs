//! Shared-Segment Manager: typed allocation inside a named region plus
//! the two-semaphore rendezvous primitives.

use std::mem::size_of;

use crate::arena::{layout_size, Arena, DEFAULT_DIRECTORY_CAPACITY};
use crate::error::SegmentError;
use crate::platform::{MappedRegion, NamedSemaphore, RegionHandle};

fn master_sem_name(segment_id: &str) -> String {
    format!("{segment_id}_sem_master")
}

fn slave_sem_name(segment_id: &str) -> String {
    format!("{segment_id}_sem_slave")
}

/// Owns one mapped region, its directory/arena, and the matching
/// master/slave semaphore pair. A manager that failed to `create`/`open`
/// is left `operational() == false` rather than panicking.
pub struct SegmentManager {
    segment_id: String,
    region: Option<MappedRegion>,
    arena: Option<Arena>,
    sem_master: Option<NamedSemaphore>,
    sem_slave: Option<NamedSemaphore>,
}

impl SegmentManager {
    /// Allocates a new segment named `segment_id` able to hold
    /// `arena_bytes` of objects under `DEFAULT_DIRECTORY_CAPACITY` names,
    /// and creates the master (count 1) / slave (count 0) semaphore pair.
    pub fn create(segment_id: &str, arena_bytes: usize) -> Result<Self, SegmentError> {
        Self::create_with_capacity(segment_id, arena_bytes, DEFAULT_DIRECTORY_CAPACITY)
    }

    pub fn create_with_capacity(
        segment_id: &str,
        arena_bytes: usize,
        directory_capacity: usize,
    ) -> Result<Self, SegmentError> {
        if segment_id.is_empty() {
            return Err(SegmentError::InvalidName(segment_id.to_string()));
        }
        let total = layout_size(directory_capacity, arena_bytes);
        let handle = RegionHandle::create(segment_id, total).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                SegmentError::AlreadyExists(segment_id.to_string())
            } else {
                SegmentError::Allocation {
                    name: segment_id.to_string(),
                    requested: total,
                    source: e,
                }
            }
        })?;
        let mut region = handle
            .map()
            .map_err(|e| SegmentError::Allocation {
                name: segment_id.to_string(),
                requested: total,
                source: e,
            })?;
        let arena = Arena::init(region.as_slice_mut().as_mut_ptr(), region.len(), directory_capacity);

        let sem_master = NamedSemaphore::create(&master_sem_name(segment_id), 1)
            .map_err(|e| SegmentError::Semaphore(master_sem_name(segment_id), e))?;
        let sem_slave = NamedSemaphore::create(&slave_sem_name(segment_id), 0)
            .map_err(|e| SegmentError::Semaphore(slave_sem_name(segment_id), e))?;

        Ok(SegmentManager {
            segment_id: segment_id.to_string(),
            region: Some(region),
            arena: Some(arena),
            sem_master: Some(sem_master),
            sem_slave: Some(sem_slave),
        })
    }

    /// Attaches to an existing segment and its semaphore pair. Non-
    /// operational on any missing piece — callers wanting a bounded retry
    /// should use [`crate::channel::RendezvousChannel::open`] instead of
    /// calling this directly.
    pub fn open(segment_id: &str) -> Result<Self, SegmentError> {
        let handle =
            RegionHandle::open(segment_id).map_err(|_| SegmentError::NotFound(segment_id.to_string()))?;
        let region = handle
            .map()
            .map_err(|_| SegmentError::NotFound(segment_id.to_string()))?;
        let arena = Arena::attach(region.as_ptr(), region.len());

        let sem_master = NamedSemaphore::open(&master_sem_name(segment_id))
            .map_err(|e| SegmentError::Semaphore(master_sem_name(segment_id), e))?;
        let sem_slave = NamedSemaphore::open(&slave_sem_name(segment_id))
            .map_err(|e| SegmentError::Semaphore(slave_sem_name(segment_id), e))?;

        Ok(SegmentManager {
            segment_id: segment_id.to_string(),
            region: Some(region),
            arena: Some(arena),
            sem_master: Some(sem_master),
            sem_slave: Some(sem_slave),
        })
    }

    /// A manager that failed partway through `create`/`open` reports
    /// `false` here instead of being usable in a half-built state.
    pub fn is_operational(&self) -> bool {
        self.region.is_some() && self.arena.is_some() && self.sem_master.is_some() && self.sem_slave.is_some()
    }

    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    fn arena(&self) -> Result<&Arena, SegmentError> {
        self.arena.as_ref().ok_or(SegmentError::NotOperational)
    }

    /// Places one `T` under `name`, returning a pointer into shared
    /// memory. `T` must be `Copy` — shared-memory objects never run a
    /// `Drop` impl, since the process that unmaps them is not necessarily
    /// the process that reads them last.
    pub fn construct_object<T: Copy>(&self, name: &str, value: T) -> Result<*mut T, SegmentError> {
        let ptr = self
            .arena()?
            .allocate(name, size_of::<T>(), std::mem::align_of::<T>())? as *mut T;
        unsafe { ptr.write(value) };
        Ok(ptr)
    }

    /// Places a vector of `n` copies of `value` under `name`, returning
    /// pointers to each element in order.
    pub fn construct_vector<T: Copy>(
        &self,
        name: &str,
        n: usize,
        value: T,
    ) -> Result<Vec<*mut T>, SegmentError> {
        let bytes = n * size_of::<T>();
        let base = self.arena()?.allocate(name, bytes, std::mem::align_of::<T>())? as *mut T;
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let ptr = unsafe { base.add(i) };
            unsafe { ptr.write(value) };
            out.push(ptr);
        }
        Ok(out)
    }

    pub fn find_object<T: Copy>(&self, name: &str) -> Result<*mut T, SegmentError> {
        Ok(self.arena()?.find(name, size_of::<T>())? as *mut T)
    }

    pub fn find_vector<T: Copy>(&self, name: &str, n: usize) -> Result<Vec<*mut T>, SegmentError> {
        let base = self.arena()?.find(name, n * size_of::<T>())? as *mut T;
        Ok((0..n).map(|i| unsafe { base.add(i) }).collect())
    }

    /// Locates a previously constructed vector without the caller knowing
    /// its element count in advance, deriving it from the stored byte
    /// length instead.
    pub fn find_vector_all<T: Copy>(&self, name: &str) -> Result<Vec<*mut T>, SegmentError> {
        let arena = self.arena()?;
        let len = arena
            .entry_len(name)
            .ok_or_else(|| SegmentError::ObjectNotFound(name.to_string()))?;
        let count = len / size_of::<T>();
        let base = arena.find(name, len)? as *mut T;
        Ok((0..count).map(|i| unsafe { base.add(i) }).collect())
    }

    fn sem_master(&self) -> Result<&NamedSemaphore, SegmentError> {
        self.sem_master.as_ref().ok_or(SegmentError::NotOperational)
    }

    fn sem_slave(&self) -> Result<&NamedSemaphore, SegmentError> {
        self.sem_slave.as_ref().ok_or(SegmentError::NotOperational)
    }

    /// Master waits on its own semaphore, then this side may touch shared
    /// data.
    pub fn master_wait_for_slave(&self) -> Result<(), SegmentError> {
        self.sem_master()?.wait().map_err(|e| SegmentError::Semaphore(master_sem_name(&self.segment_id), e))
    }

    /// Master hands the turn to the slave.
    pub fn master_signal_to_slave(&self) -> Result<(), SegmentError> {
        self.sem_slave()?.post().map_err(|e| SegmentError::Semaphore(slave_sem_name(&self.segment_id), e))
    }

    pub fn slave_wait_for_master(&self) -> Result<(), SegmentError> {
        self.sem_slave()?.wait().map_err(|e| SegmentError::Semaphore(slave_sem_name(&self.segment_id), e))
    }

    pub fn slave_signal_to_master(&self) -> Result<(), SegmentError> {
        self.sem_master()?.post().map_err(|e| SegmentError::Semaphore(master_sem_name(&self.segment_id), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn unique_id(tag: &str) -> String {
        format!("/rdv-test-seg-{}-{}-{}", tag, std::process::id(), fastrand::u32(..))
    }

    #[test]
    #[serial]
    fn create_then_open_share_objects() {
        let id = unique_id("a");
        let creator = SegmentManager::create(&id, 4096).unwrap();
        assert!(creator.is_operational());
        let ptr = creator.construct_object::<f64>("x", 3.25).unwrap();
        unsafe { assert_eq!(*ptr, 3.25) };

        let opener = SegmentManager::open(&id).unwrap();
        assert!(opener.is_operational());
        let found = opener.find_object::<f64>("x").unwrap();
        unsafe { assert_eq!(*found, 3.25) };
    }

    #[test]
    #[serial]
    fn open_missing_segment_is_not_operational() {
        let err = SegmentManager::open(&unique_id("missing")).unwrap_err();
        assert!(matches!(err, SegmentError::NotFound(_)));
    }

    #[test]
    #[serial]
    fn create_duplicate_name_fails() {
        let id = unique_id("dup");
        let _first = SegmentManager::create(&id, 4096).unwrap();
        let err = SegmentManager::create(&id, 4096).unwrap_err();
        assert!(matches!(err, SegmentError::AlreadyExists(_)));
    }

    #[test]
    #[serial]
    fn turn_taking_round_trips() {
        let id = unique_id("turn");
        let master = SegmentManager::create(&id, 4096).unwrap();
        let slave = SegmentManager::open(&id).unwrap();

        master.master_wait_for_slave().unwrap();
        master.master_signal_to_slave().unwrap();
        slave.slave_wait_for_master().unwrap();
        slave.slave_signal_to_master().unwrap();
    }
}

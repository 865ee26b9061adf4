// Named POSIX shared memory + named POSIX semaphores.
//
// `nix` wraps `shm_open`/`mmap`/`munmap` for the region itself, but it
// does not wrap the named-semaphore family (`sem_open`/`sem_wait`/
// `sem_post`/`sem_close`/`sem_unlink`), so those go through `libc`
// directly.

use std::ffi::CString;
use std::io;
use std::num::NonZeroUsize;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr;

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;

fn page_aligned(size: usize) -> usize {
    let page = page_size::get();
    ((size + page - 1) / page) * page
}

/// An open (but not yet mapped) named shared-memory region.
pub struct RegionHandle {
    fd: RawFd,
    size: usize,
    name: CString,
    owns_name: bool,
}

impl RegionHandle {
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let size = page_aligned(size.max(1));
        let fd = shm_open(
            cname.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(io::Error::from)?;
        if let Err(e) = ftruncate(fd, size as libc::off_t) {
            let _ = nix::unistd::close(fd);
            let _ = shm_unlink(cname.as_c_str());
            return Err(io::Error::from(e));
        }
        Ok(RegionHandle {
            fd,
            size,
            name: cname,
            owns_name: true,
        })
    }

    pub fn open(name: &str) -> io::Result<Self> {
        let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let fd = shm_open(cname.as_c_str(), OFlag::O_RDWR, Mode::empty()).map_err(io::Error::from)?;
        let size = nix::sys::stat::fstat(fd)
            .map(|st| st.st_size as usize)
            .map_err(io::Error::from)?;
        Ok(RegionHandle {
            fd,
            size,
            name: cname,
            owns_name: false,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn map(self) -> io::Result<MappedRegion> {
        let len = NonZeroUsize::new(self.size).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot map a zero-sized region")
        })?;
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                self.fd,
                0,
            )
            .map_err(io::Error::from)?
        };
        Ok(MappedRegion {
            ptr: ptr.as_ptr() as *mut u8,
            size: self.size,
            _region: self,
        })
    }
}

impl AsRawFd for RegionHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for RegionHandle {
    fn drop(&mut self) {
        let _ = nix::unistd::close(self.fd);
        if self.owns_name {
            let _ = shm_unlink(self.name.as_c_str());
        }
    }
}

/// A shared-memory region mapped into this process's address space.
pub struct MappedRegion {
    ptr: *mut u8,
    size: usize,
    _region: RegionHandle,
}

// SAFETY: the memory is shared deliberately; synchronization across
// processes is the caller's job (the rendezvous semaphore pair).
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(ptr::NonNull::new_unchecked(self.ptr as *mut _), self.size);
        }
    }
}

/// A named POSIX counting semaphore, used in pairs for the rendezvous
/// protocol (`<segment>_sem_master`, `<segment>_sem_slave`).
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
    owns_name: bool,
}

// SAFETY: POSIX named semaphores are safe to share across threads/processes;
// the kernel serializes access to the semaphore's internal state.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    pub fn create(name: &str, initial_count: u32) -> io::Result<Self> {
        let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // Clear out any stale semaphore left behind by a crashed previous
        // instance under the same name before creating a fresh one.
        unsafe { libc::sem_unlink(cname.as_ptr()) };
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600u32,
                initial_count,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(NamedSemaphore {
            sem: sem as *mut libc::sem_t,
            name: cname,
            owns_name: true,
        })
    }

    pub fn open(name: &str) -> io::Result<Self> {
        let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(NamedSemaphore {
            sem: sem as *mut libc::sem_t,
            name: cname,
            owns_name: false,
        })
    }

    /// Blocks until the semaphore can be decremented.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            let rc = unsafe { libc::sem_wait(self.sem) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Increments the semaphore, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        let rc = unsafe { libc::sem_post(self.sem) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
        if self.owns_name {
            unsafe { libc::sem_unlink(self.name.as_ptr()) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_round_trips_bytes() {
        let name = format!("/rdv-test-region-{}", std::process::id());
        let handle = RegionHandle::create(&name, 64).unwrap();
        let mut mapped = handle.map().unwrap();
        mapped.as_slice_mut()[0] = 42;
        assert_eq!(mapped.as_slice()[0], 42);
    }

    #[test]
    fn semaphore_wait_post_round_trip() {
        let name = format!("/rdv-test-sem-{}-a", std::process::id());
        let sem = NamedSemaphore::create(&name, 0).unwrap();
        sem.post().unwrap();
        sem.wait().unwrap();
    }

    #[test]
    fn semaphore_open_sees_same_count() {
        let name = format!("/rdv-test-sem-{}-b", std::process::id());
        let a = NamedSemaphore::create(&name, 1).unwrap();
        let b = NamedSemaphore::open(&name).unwrap();
        b.wait().unwrap();
        a.post().unwrap();
        b.wait().unwrap();
    }
}

// Named file-mapping objects + named semaphores, the Windows counterpart
// of `unix.rs`. Uses `CreateFileMappingW`/`MapViewOfFile` via the
// `windows-sys` bindings.

use std::io;

use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, WAIT_OBJECT_0};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
    PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateSemaphoreW, OpenSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
    SEMAPHORE_ALL_ACCESS,
};

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

pub struct RegionHandle {
    mapping: HANDLE,
    size: usize,
}

impl RegionHandle {
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let wname = wide(name);
        let mapping = unsafe {
            CreateFileMappingW(
                windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                0,
                size as u32,
                wname.as_ptr(),
            )
        };
        if mapping == 0 {
            return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
        }
        Ok(RegionHandle { mapping, size })
    }

    pub fn open(name: &str) -> io::Result<Self> {
        let wname = wide(name);
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wname.as_ptr()) };
        if mapping == 0 {
            return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
        }
        // Size is only known by convention (the front-end writes it into
        // the header the back-end then reads); callers pass it separately
        // when it matters for `mmap`-style sizing.
        Ok(RegionHandle { mapping, size: 0 })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn map(self) -> io::Result<MappedRegion> {
        let ptr = unsafe { MapViewOfFile(self.mapping, FILE_MAP_ALL_ACCESS, 0, 0, self.size) };
        if ptr.Value.is_null() {
            return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
        }
        Ok(MappedRegion {
            ptr: ptr.Value as *mut u8,
            size: self.size,
            _region: self,
        })
    }
}

impl Drop for RegionHandle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.mapping) };
    }
}

pub struct MappedRegion {
    ptr: *mut u8,
    size: usize,
    _region: RegionHandle,
}

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
            UnmapViewOfFile(std::mem::transmute(self.ptr));
        }
    }
}

pub struct NamedSemaphore {
    handle: HANDLE,
}

unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    pub fn create(name: &str, initial_count: u32) -> io::Result<Self> {
        let wname = wide(name);
        let handle = unsafe {
            CreateSemaphoreW(std::ptr::null(), initial_count as i32, i32::MAX, wname.as_ptr())
        };
        if handle == 0 {
            return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
        }
        Ok(NamedSemaphore { handle })
    }

    pub fn open(name: &str) -> io::Result<Self> {
        let wname = wide(name);
        let handle = unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, wname.as_ptr()) };
        if handle == 0 {
            return Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32));
        }
        Ok(NamedSemaphore { handle })
    }

    pub fn wait(&self) -> io::Result<()> {
        let rc = unsafe { WaitForSingleObject(self.handle, INFINITE) };
        if rc == WAIT_OBJECT_0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32))
        }
    }

    pub fn post(&self) -> io::Result<()> {
        let ok = unsafe { ReleaseSemaphore(self.handle, 1, std::ptr::null_mut()) };
        if ok != 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(unsafe { GetLastError() } as i32))
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}

//! Windows path: the child is assigned to a job object configured with
//! `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE`, so closing our handle to the job
//! kills the whole tree.

use std::io;
use std::mem::size_of;
use std::os::windows::io::AsRawHandle;
use std::process::Child;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, JobObjectExtendedLimitInformation,
    SetInformationJobObject, JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
};

pub struct JobHandle(HANDLE);

// SAFETY: a job object handle is safe to hold across threads; all access
// here goes through the Win32 API, which synchronizes internally.
unsafe impl Send for JobHandle {}
unsafe impl Sync for JobHandle {}

impl JobHandle {
    /// Creates a new job object with kill-on-close semantics and assigns
    /// `child` to it.
    pub fn create_and_assign(child: &Child) -> io::Result<Self> {
        let job = unsafe { CreateJobObjectW(std::ptr::null(), std::ptr::null()) };
        if job == 0 {
            return Err(io::Error::last_os_error());
        }

        let mut info: JOBOBJECT_EXTENDED_LIMIT_INFORMATION = unsafe { std::mem::zeroed() };
        info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
        let ok = unsafe {
            SetInformationJobObject(
                job,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const _,
                size_of::<JOBOBJECT_EXTENDED_LIMIT_INFORMATION>() as u32,
            )
        };
        if ok == 0 {
            unsafe { CloseHandle(job) };
            return Err(io::Error::last_os_error());
        }

        let process_handle = child.as_raw_handle() as HANDLE;
        let assigned = unsafe { AssignProcessToJobObject(job, process_handle) };
        if assigned == 0 {
            unsafe { CloseHandle(job) };
            return Err(io::Error::last_os_error());
        }

        Ok(JobHandle(job))
    }
}

impl Drop for JobHandle {
    /// Closing the job handle kills every process still assigned to it
    /// (`JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE`) — this is the whole teardown
    /// story on Windows; no explicit `TerminateProcess` call is needed.
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

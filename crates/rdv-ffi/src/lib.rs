//! Master-facing C ABI: a C-callable surface identical in shape to the
//! co-simulation standard this adapter targets, so an existing master
//! implementation can link this crate instead of the vendor's own
//! library.
//!
//! Follows the usual `*-ffi` crate conventions: an opaque [`Handle<T>`]
//! wrapping a boxed Rust value, `#[no_mangle] pub unsafe extern "C" fn`
//! entry points that take and return raw pointers, and `Handle::take`/
//! `Drop` for the free-instance call. The varargs logger callback the
//! standard specifies is never handled inside `rdv-frontend` itself —
//! this crate formats it into a `String` once at the boundary and
//! forwards it through the typed [`rdv_common::LogSink`] port.

mod handle;
mod logger_shim;

use std::ffi::{c_char, CStr};
use std::path::Path;
use std::sync::Arc;

use rdv_common::{Status, ValueRef};
use rdv_frontend::{AdapterConfig, FrontEndAdapter};

pub use handle::Handle;
use handle::ToInner;
use logger_shim::{CallbackLogSink, LoggerCallback};

/// Status codes returned across the ABI, numerically aligned with
/// [`rdv_common::Status`] so a C caller can switch on the raw integer:
/// OK, Warning, Discard, Error, Fatal, Pending.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdvStatus {
    Ok = 0,
    Warning = 1,
    Discard = 2,
    Error = 3,
    Fatal = 4,
    Pending = 5,
}

impl From<Status> for RdvStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => RdvStatus::Ok,
            Status::Warning => RdvStatus::Warning,
            Status::Discard => RdvStatus::Discard,
            Status::Error => RdvStatus::Error,
            Status::Fatal => RdvStatus::Fatal,
            Status::Pending => RdvStatus::Pending,
        }
    }
}

unsafe fn str_from_c<'a>(ptr: *const c_char) -> Result<&'a str, RdvStatus> {
    if ptr.is_null() {
        return Err(RdvStatus::Error);
    }
    CStr::from_ptr(ptr).to_str().map_err(|_| RdvStatus::Error)
}

/// Creates a new adapter instance. Returns a null pointer on any
/// configuration or resource error — the caller has no handle to free in
/// that case.
///
/// # Safety
/// `instance_name`, `guid` and `location` must be valid, NUL-terminated
/// UTF-8 C strings; `logger_callback` (if not null) must remain valid for
/// as long as the returned instance is alive.
#[no_mangle]
pub unsafe extern "C" fn rdv_create_instance(
    instance_name: *const c_char,
    guid: *const c_char,
    location: *const c_char,
    logger_callback: Option<LoggerCallback>,
) -> *mut Handle<FrontEndAdapter> {
    let instance_name = match str_from_c(instance_name) {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    let guid = match str_from_c(guid) {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };
    let location = match str_from_c(location) {
        Ok(s) => s,
        Err(_) => return std::ptr::null_mut(),
    };

    let sink: Arc<dyn rdv_common::LogSink> = match logger_callback {
        Some(cb) => Arc::new(CallbackLogSink::new(cb)),
        None => Arc::new(rdv_common::TracingSink),
    };

    let config = AdapterConfig::default();
    match FrontEndAdapter::instantiate_with_sink(instance_name, guid, Path::new(location), &config, sink) {
        Ok(adapter) => Box::into_raw(Box::new(Handle::from(adapter))),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Frees an instance created by [`rdv_create_instance`]. Safe to call
/// with a null pointer (no-op).
///
/// # Safety
/// `handle` must either be null or a pointer previously returned by
/// [`rdv_create_instance`] and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn rdv_free_instance(handle: *mut Handle<FrontEndAdapter>) {
    if handle.is_null() {
        return;
    }
    drop(Box::from_raw(handle));
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_set_debug_logging(mut handle: *mut Handle<FrontEndAdapter>, enabled: bool) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => {
            adapter.set_debug_logging(enabled);
            RdvStatus::Ok
        }
        Err(_) => RdvStatus::Error,
    }
}

/// Convenience wrapper around [`rdv_set_debug_logging`] with `false`.
///
/// # Safety
/// Same preconditions as [`rdv_set_debug_logging`].
#[no_mangle]
pub unsafe extern "C" fn rdv_reset_debug_logging(mut handle: *mut Handle<FrontEndAdapter>) -> RdvStatus {
    rdv_set_debug_logging(handle, false)
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_initialize_slave(
    mut handle: *mut Handle<FrontEndAdapter>,
    start: f64,
    stop_defined: bool,
    stop: f64,
) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.initialize_slave(start, stop_defined, stop).into(),
        Err(_) => RdvStatus::Error,
    }
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_do_step(
    mut handle: *mut Handle<FrontEndAdapter>,
    comm_point: f64,
    step_size: f64,
    no_set_state_prior: bool,
) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.do_step(comm_point, step_size, no_set_state_prior).into(),
        Err(_) => RdvStatus::Error,
    }
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_terminate_slave(mut handle: *mut Handle<FrontEndAdapter>) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.terminate().into(),
        Err(_) => RdvStatus::Error,
    }
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`]; `out`
/// must point to a valid, writable `f64`.
#[no_mangle]
pub unsafe extern "C" fn rdv_get_real(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, out: *mut f64) -> RdvStatus {
    let adapter = match handle.to_inner_mut() {
        Ok(a) => a,
        Err(_) => return RdvStatus::Error,
    };
    let (status, value) = adapter.get_real(ValueRef(value_ref));
    if !out.is_null() {
        *out = value;
    }
    status.into()
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_set_real(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, value: f64) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.set_real(ValueRef(value_ref), value).into(),
        Err(_) => RdvStatus::Error,
    }
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`]; `out`
/// must point to a valid, writable `i32`.
#[no_mangle]
pub unsafe extern "C" fn rdv_get_integer(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, out: *mut i32) -> RdvStatus {
    let adapter = match handle.to_inner_mut() {
        Ok(a) => a,
        Err(_) => return RdvStatus::Error,
    };
    let (status, value) = adapter.get_integer(ValueRef(value_ref));
    if !out.is_null() {
        *out = value;
    }
    status.into()
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_set_integer(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, value: i32) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.set_integer(ValueRef(value_ref), value).into(),
        Err(_) => RdvStatus::Error,
    }
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`]; `out`
/// must point to a valid, writable `bool`.
#[no_mangle]
pub unsafe extern "C" fn rdv_get_boolean(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, out: *mut bool) -> RdvStatus {
    let adapter = match handle.to_inner_mut() {
        Ok(a) => a,
        Err(_) => return RdvStatus::Error,
    };
    let (status, value) = adapter.get_boolean(ValueRef(value_ref));
    if !out.is_null() {
        *out = value;
    }
    status.into()
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`].
#[no_mangle]
pub unsafe extern "C" fn rdv_set_boolean(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, value: bool) -> RdvStatus {
    match handle.to_inner_mut() {
        Ok(adapter) => adapter.set_boolean(ValueRef(value_ref), value).into(),
        Err(_) => RdvStatus::Error,
    }
}

/// Writes at most `out_capacity - 1` bytes of the string value plus a NUL
/// terminator into `out`, and always reports the value's true length
/// (NUL included) in `out_len` so the caller can retry with a larger
/// buffer — the usual C "ask, then size, then fetch" string convention.
///
/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`]; `out`
/// must be writable for `out_capacity` bytes if `out_capacity > 0`;
/// `out_len` must point to a valid, writable `usize`.
#[no_mangle]
pub unsafe extern "C" fn rdv_get_string(
    mut handle: *mut Handle<FrontEndAdapter>,
    value_ref: u32,
    out: *mut c_char,
    out_capacity: usize,
    out_len: *mut usize,
) -> RdvStatus {
    let adapter = match handle.to_inner_mut() {
        Ok(a) => a,
        Err(_) => return RdvStatus::Error,
    };
    let (status, value) = adapter.get_string(ValueRef(value_ref));
    let bytes = value.as_bytes();
    if !out_len.is_null() {
        *out_len = bytes.len() + 1;
    }
    if !out.is_null() && out_capacity > 0 {
        let copy_len = bytes.len().min(out_capacity - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), out as *mut u8, copy_len);
        *out.add(copy_len) = 0;
    }
    status.into()
}

/// # Safety
/// `handle` must be a live pointer from [`rdv_create_instance`]; `value`
/// must be a valid, NUL-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn rdv_set_string(mut handle: *mut Handle<FrontEndAdapter>, value_ref: u32, value: *const c_char) -> RdvStatus {
    let adapter = match handle.to_inner_mut() {
        Ok(a) => a,
        Err(_) => return RdvStatus::Error,
    };
    let value = match str_from_c(value) {
        Ok(s) => s,
        Err(status) => return status,
    };
    adapter.set_string(ValueRef(value_ref), value).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_numerically_stable() {
        assert_eq!(RdvStatus::from(Status::Ok) as i32, 0);
        assert_eq!(RdvStatus::from(Status::Warning) as i32, 1);
        assert_eq!(RdvStatus::from(Status::Discard) as i32, 2);
        assert_eq!(RdvStatus::from(Status::Error) as i32, 3);
        assert_eq!(RdvStatus::from(Status::Fatal) as i32, 4);
        assert_eq!(RdvStatus::from(Status::Pending) as i32, 5);
    }

    #[test]
    fn free_instance_tolerates_null() {
        unsafe { rdv_free_instance(std::ptr::null_mut()) };
    }

    #[test]
    fn create_instance_returns_null_on_missing_model_description() {
        use std::ffi::CString;
        let dir = tempfile::tempdir().unwrap();
        let name = CString::new("inst").unwrap();
        let guid = CString::new("guid").unwrap();
        let location = CString::new(dir.path().to_str().unwrap()).unwrap();
        let handle = unsafe { rdv_create_instance(name.as_ptr(), guid.as_ptr(), location.as_ptr(), None) };
        assert!(handle.is_null());
    }
}

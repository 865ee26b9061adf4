//! Opaque handle wrapper for values crossing the C ABI.
//!
//! A `#[repr(C)]` struct holding a raw pointer the C side must never
//! dereference itself, `take()` nulling the pointer before dropping so a
//! double-free degrades to a no-op instead of undefined behavior, and a
//! blanket `ToInner` conversion implemented for both `Handle<T>` and
//! `*mut Handle<T>` so call sites write `handle.to_inner_mut()` directly
//! and get the null-pointer check for free, instead of dereferencing a
//! possibly-null pointer by hand first.

use anyhow::Context;

#[repr(C)]
pub struct Handle<T> {
    inner: *mut T,
}

pub trait ToInner<T> {
    /// # Safety
    /// The handle must hold a valid `inner` pointer that has been
    /// allocated and not yet freed.
    unsafe fn to_inner_mut(&mut self) -> anyhow::Result<&mut T>;
}

impl<T> ToInner<T> for Handle<T> {
    unsafe fn to_inner_mut(&mut self) -> anyhow::Result<&mut T> {
        self.inner.as_mut().context("inner pointer was null, indicates use after free")
    }
}

impl<T> ToInner<T> for *mut Handle<T> {
    unsafe fn to_inner_mut(&mut self) -> anyhow::Result<&mut T> {
        self.as_mut().context("null handle pointer")?.to_inner_mut()
    }
}

impl<T> Handle<T> {
    pub fn take(&mut self) -> Option<Box<T>> {
        let raw = std::mem::replace(&mut self.inner, std::ptr::null_mut());
        if raw.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(raw) })
        }
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Handle { inner: Box::into_raw(Box::new(value)) }
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        drop(self.take())
    }
}

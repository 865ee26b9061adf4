//! Platform seam: named shared memory and named semaphores.
//!
//! A named region is opened/created on each side under the same string
//! name and mapped with read/write access; the only OS-specific code
//! lives behind this module.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{MappedRegion, NamedSemaphore, RegionHandle};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{MappedRegion, NamedSemaphore, RegionHandle};

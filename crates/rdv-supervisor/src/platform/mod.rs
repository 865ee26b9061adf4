//! Platform seam for process-group / job-object teardown semantics.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{kill_group, place_in_new_group};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::JobHandle;

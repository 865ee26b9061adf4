//! Back-End Client Runtime and Application Skeleton: the library linked
//! into the worker process and the `main`-loop host built on top of it.

pub mod client;
pub mod error;
pub mod skeleton;

pub use client::{BackEndClientRuntime, DEFAULT_ATTACH_TIMEOUT};
pub use error::BackendError;
pub use skeleton::{BackEndApplication, DeclaredVariables, ScalarBuffers};

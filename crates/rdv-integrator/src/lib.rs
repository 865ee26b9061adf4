//! Incremental Self-Integrating Wrapper and Integrator Core: an
//! in-process alternative to the rendezvous protocol for a model linked
//! directly into the adapter, stepped by a pluggable ODE stepper family.

pub mod error;
pub mod incremental;
pub mod model;
pub mod stepper;

pub use error::IntegratorError;
pub use incremental::{HistoryEntry, IncrementalConfig, IncrementalWrapper};
pub use model::BlackBoxModel;
pub use stepper::{Observer, Rhs, Stepper, StepperKind};

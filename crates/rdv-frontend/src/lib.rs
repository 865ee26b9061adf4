//! Front-End Adapter: the master-facing half of the rendezvous runtime.
//! Parses the FMU's model description, launches the
//! worker process, creates the shared segment, and exposes the
//! slave-side contract (`instantiate`, `initializeSlave`, `setX`/`getX`,
//! `doStep`, `terminate`) that a master co-simulation engine drives.

pub mod adapter;
pub mod config;
pub mod model_description;
pub mod uri;

pub use adapter::FrontEndAdapter;
pub use config::AdapterConfig;
pub use model_description::{ModelDescription, ModelDescriptionError, VendorAnnotations};

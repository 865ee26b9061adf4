//! Error taxonomy for the self-integrating wrapper.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegratorError {
    #[error("lookAheadHorizon, lookAheadStepSize and integratorStepSize must all be positive")]
    InvalidConfig,

    #[error("embedded model rejected its initial values during instantiation")]
    InstantiationFailed,

    #[error("embedded model failed to initialize")]
    InitializationFailed,

    #[error("requested time {requested} lies outside the stored prediction window [{oldest}, {newest}]")]
    OutsideWindow { requested: f64, oldest: f64, newest: f64 },

    #[error("sync() called before init()")]
    NotInitialized,
}

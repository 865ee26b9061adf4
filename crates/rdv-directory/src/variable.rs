//! The declared shape of one model variable, as read off the model
//! description's variable list, built once during `instantiate`.

use rdv_common::{Causality, ValueRef, ValueType, Variability};

/// A variable's starting value, tagged by the same four kinds a scalar
/// record can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum StartValue {
    Real(f64),
    Integer(i32),
    Boolean(bool),
    String(String),
}

impl StartValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            StartValue::Real(_) => ValueType::Real,
            StartValue::Integer(_) => ValueType::Integer,
            StartValue::Boolean(_) => ValueType::Boolean,
            StartValue::String(_) => ValueType::String,
        }
    }
}

/// One declared variable: identity plus starting value. `VariableSpec`s
/// are produced by model-description parsing (`rdv-frontend`) and consumed
/// once, in order, to build the [`crate::VariableDirectory`].
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    pub name: String,
    pub handle: ValueRef,
    pub causality: Causality,
    pub variability: Variability,
    pub start: StartValue,
}

impl VariableSpec {
    pub fn new(
        name: impl Into<String>,
        handle: ValueRef,
        causality: Causality,
        variability: Variability,
        start: StartValue,
    ) -> Self {
        VariableSpec {
            name: name.into(),
            handle,
            causality,
            variability,
            start,
        }
    }
}

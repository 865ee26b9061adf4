//! `AdapterConfig`: tunables that are otherwise heuristic or hard-coded
//! (segment-size padding, rendezvous retry timeout, default
//! debug-logging). Deserialized with `serde` + `toml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rdv_directory::VariableSpec;

/// Base padding added to the per-variable size estimate. The estimate is a
/// heuristic, so this default is pluggable rather than derived.
const DEFAULT_BASE_HEADER_BYTES: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Extra bytes reserved on top of the per-variable estimate, to absorb
    /// directory/arena overhead and leave slack for debugging tools.
    pub segment_base_header_bytes: usize,
    /// How long the front-end waits for the worker's first rendezvous
    /// signal during `instantiate` before giving up. Sizes the retry
    /// loop only; it is not a per-step deadline.
    #[serde(with = "duration_secs")]
    pub rendezvous_timeout: Duration,
    /// Default state of the shared `debugLoggingOn` control slot before
    /// the master calls `setDebugLogging`.
    pub debug_logging_default: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            segment_base_header_bytes: DEFAULT_BASE_HEADER_BYTES,
            rendezvous_timeout: Duration::from_secs(5),
            debug_logging_default: false,
        }
    }
}

impl AdapterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Default segment-size estimator: base header plus one record per
    /// declared variable, sized per the record's real in-memory layout.
    /// Exposed as a method rather than a free function so a caller can
    /// override the estimate.
    pub fn estimate_segment_size(&self, variables: &[VariableSpec]) -> usize {
        use rdv_shm::{BooleanRecord, IntegerRecord, RealRecord, StringRecord};
        use std::mem::size_of;

        let mut reals = 0usize;
        let mut ints = 0usize;
        let mut bools = 0usize;
        let mut strings = 0usize;
        for v in variables {
            match v.start {
                rdv_directory::StartValue::Real(_) => reals += 1,
                rdv_directory::StartValue::Integer(_) => ints += 1,
                rdv_directory::StartValue::Boolean(_) => bools += 1,
                rdv_directory::StartValue::String(_) => strings += 1,
            }
        }

        self.segment_base_header_bytes
            + reals * size_of::<RealRecord>()
            + ints * size_of::<IntegerRecord>()
            + bools * size_of::<BooleanRecord>()
            + strings * size_of::<StringRecord>()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AdapterConfig::default();
        assert_eq!(cfg.segment_base_header_bytes, DEFAULT_BASE_HEADER_BYTES);
        assert!(!cfg.debug_logging_default);
    }

    #[test]
    fn parses_from_toml() {
        let cfg = AdapterConfig::from_toml_str(
            "segment_base_header_bytes = 8192\nrendezvous_timeout = 10\ndebug_logging_default = true\n",
        )
        .unwrap();
        assert_eq!(cfg.segment_base_header_bytes, 8192);
        assert_eq!(cfg.rendezvous_timeout, Duration::from_secs(10));
        assert!(cfg.debug_logging_default);
    }

    #[test]
    fn estimate_grows_with_variable_count() {
        use rdv_common::{Causality, ValueRef, Variability};
        use rdv_directory::StartValue;

        let cfg = AdapterConfig::default();
        let empty = cfg.estimate_segment_size(&[]);
        let one = cfg.estimate_segment_size(&[VariableSpec::new(
            "x",
            ValueRef(1),
            Causality::Input,
            Variability::Continuous,
            StartValue::Real(0.0),
        )]);
        assert!(one > empty);
    }
}

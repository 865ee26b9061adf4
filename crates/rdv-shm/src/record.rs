//! Layout of the data that actually lives inside the segment: the control
//! block and the four typed scalar-record vectors.
//!
//! Every type here is `#[repr(C)]` and `Copy` — plain bytes that mean the
//! same thing on both sides of the segment, with no pointers and no
//! destructors to run when a side unmaps. Strings are the one field that
//! cannot be a fixed Rust primitive; a scalar string value still needs its
//! bytes living inside the segment rather than on the allocating party's
//! heap. Rather than a relocatable managed string (which would need the
//! whole segment to support mid-life growth and every stored pointer to
//! become an offset), `StringValue` uses a generous fixed inline capacity
//! written once at `instantiate` time — simpler than a growable backing
//! store, at the cost of a hard per-value length cap (see DESIGN.md).

use rdv_common::{Causality, FixedName, ValueRef, Variability};

/// Capacity of a string scalar's inline buffer, including the NUL
/// terminator. Generous enough for path-like and short textual values;
/// longer values are rejected at `instantiate` (see `rdv-directory`).
pub const STRING_VALUE_CAPACITY: usize = 1024;

/// The nine control slots, laid out as one fixed-size block constructed
/// once by the front-end and found by name by the back-end.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ControlBlock {
    pub current_communication_point: f64,
    pub communication_step_size: f64,
    pub stop_time: f64,
    pub stop_time_defined: bool,
    pub enforce_time_step: bool,
    pub reject_step: bool,
    pub slave_has_terminated: bool,
    pub protocol_version: i32,
    pub debug_logging_on: bool,
}

impl Default for ControlBlock {
    fn default() -> Self {
        ControlBlock {
            current_communication_point: 0.0,
            communication_step_size: 0.0,
            stop_time: 0.0,
            stop_time_defined: false,
            enforce_time_step: false,
            reject_step: false,
            slave_has_terminated: false,
            protocol_version: 1,
            debug_logging_on: false,
        }
    }
}

/// Name under which the control block is constructed in every segment.
pub const CONTROL_BLOCK_NAME: &str = "control";
pub const REAL_VECTOR_NAME: &str = "real_scalars";
pub const INTEGER_VECTOR_NAME: &str = "integer_scalars";
pub const BOOLEAN_VECTOR_NAME: &str = "boolean_scalars";
pub const STRING_VECTOR_NAME: &str = "string_scalars";

/// A fixed-capacity string value stored entirely inside the segment.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct StringValue {
    len: u16,
    bytes: [u8; STRING_VALUE_CAPACITY - 2],
}

impl StringValue {
    pub fn empty() -> Self {
        StringValue {
            len: 0,
            bytes: [0u8; STRING_VALUE_CAPACITY - 2],
        }
    }

    pub fn set(&mut self, s: &str) -> Result<(), StringTooLong> {
        let raw = s.as_bytes();
        if raw.len() > self.bytes.len() {
            return Err(StringTooLong);
        }
        self.bytes[..raw.len()].copy_from_slice(raw);
        self.bytes[raw.len()..].iter_mut().for_each(|b| *b = 0);
        self.len = raw.len() as u16;
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl std::fmt::Debug for StringValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StringValue").field(&self.as_str()).finish()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("string value exceeds the {} byte inline capacity", STRING_VALUE_CAPACITY - 2)]
pub struct StringTooLong;

/// A generic scalar record: identity fields that are immutable after
/// `instantiate`, plus one mutable value slot.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ScalarRecord<T: Copy> {
    pub name: FixedName,
    pub handle: ValueRef,
    pub causality: Causality,
    pub variability: Variability,
    pub value: T,
}

impl<T: Copy> ScalarRecord<T> {
    pub fn new(
        name: FixedName,
        handle: ValueRef,
        causality: Causality,
        variability: Variability,
        value: T,
    ) -> Self {
        ScalarRecord {
            name,
            handle,
            causality,
            variability,
            value,
        }
    }
}

pub type RealRecord = ScalarRecord<f64>;
pub type IntegerRecord = ScalarRecord<i32>;
pub type BooleanRecord = ScalarRecord<bool>;
pub type StringRecord = ScalarRecord<StringValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_value_round_trips() {
        let mut v = StringValue::empty();
        v.set("hello world").unwrap();
        assert_eq!(v.as_str(), "hello world");
    }

    #[test]
    fn string_value_rejects_overflow() {
        let mut v = StringValue::empty();
        let too_long = "x".repeat(STRING_VALUE_CAPACITY);
        assert_eq!(v.set(&too_long), Err(StringTooLong));
    }

    #[test]
    fn scalar_record_is_plain_old_data() {
        let rec = RealRecord::new(
            FixedName::new("p").unwrap(),
            ValueRef(1),
            Causality::Parameter,
            Variability::Fixed,
            3.5,
        );
        assert_eq!(rec.value, 3.5);
        let copy = rec;
        assert_eq!(copy.handle, ValueRef(1));
    }
}

//! Variable Directory: the front-end-only maps from name and from handle
//! to the scalar records living in shared memory, built once during
//! `instantiate` and consulted on every set/get.

mod error;
mod variable;

pub use error::DirectoryError;
pub use variable::{StartValue, VariableSpec};

use std::collections::BTreeMap;

use rdv_common::{Causality, FixedName, Status, ValueRef, ValueType};
use rdv_shm::{
    BooleanRecord, IntegerRecord, RealRecord, RendezvousChannel, ScalarRecord, StringRecord, StringValue,
    BOOLEAN_VECTOR_NAME, INTEGER_VECTOR_NAME, REAL_VECTOR_NAME, STRING_VECTOR_NAME,
};

/// Name→handle and name→type maps plus the four handle→pointer maps.
/// Lookup by handle must stay O(log n), hence `BTreeMap` rather than a
/// hash map throughout.
pub struct VariableDirectory {
    name_to_handle: BTreeMap<String, ValueRef>,
    name_to_type: BTreeMap<String, ValueType>,
    reals: BTreeMap<ValueRef, *mut RealRecord>,
    integers: BTreeMap<ValueRef, *mut IntegerRecord>,
    booleans: BTreeMap<ValueRef, *mut BooleanRecord>,
    strings: BTreeMap<ValueRef, *mut StringRecord>,
}

fn split_by_type(specs: &[VariableSpec]) -> (Vec<&VariableSpec>, Vec<&VariableSpec>, Vec<&VariableSpec>, Vec<&VariableSpec>) {
    let mut reals = Vec::new();
    let mut integers = Vec::new();
    let mut booleans = Vec::new();
    let mut strings = Vec::new();
    for spec in specs {
        match spec.start.value_type() {
            ValueType::Real => reals.push(spec),
            ValueType::Integer => integers.push(spec),
            ValueType::Boolean => booleans.push(spec),
            ValueType::String => strings.push(spec),
        }
    }
    (reals, integers, booleans, strings)
}

impl VariableDirectory {
    /// Constructs the four record vectors in the segment, sized exactly
    /// to the declared variable counts (never resized after instantiation),
    /// and indexes every record by name and by handle.
    pub fn build(channel: &RendezvousChannel, specs: &[VariableSpec]) -> Result<Self, DirectoryError> {
        let mut name_to_handle = BTreeMap::new();
        let mut name_to_type = BTreeMap::new();
        for spec in specs {
            if name_to_handle.insert(spec.name.clone(), spec.handle).is_some() {
                return Err(DirectoryError::DuplicateName(spec.name.clone()));
            }
            name_to_type.insert(spec.name.clone(), spec.start.value_type());
        }

        let (real_specs, int_specs, bool_specs, string_specs) = split_by_type(specs);

        let reals = build_vector(channel, REAL_VECTOR_NAME, &real_specs, |s| match &s.start {
            StartValue::Real(v) => *v,
            _ => unreachable!(),
        })?;
        let integers = build_vector(channel, INTEGER_VECTOR_NAME, &int_specs, |s| match &s.start {
            StartValue::Integer(v) => *v,
            _ => unreachable!(),
        })?;
        let booleans = build_vector(channel, BOOLEAN_VECTOR_NAME, &bool_specs, |s| match &s.start {
            StartValue::Boolean(v) => *v,
            _ => unreachable!(),
        })?;

        let mut string_values = Vec::with_capacity(string_specs.len());
        for s in &string_specs {
            let StartValue::String(text) = &s.start else { unreachable!() };
            let mut v = StringValue::empty();
            v.set(text).map_err(|_| DirectoryError::StringTooLong(s.name.clone()))?;
            string_values.push(v);
        }
        let strings = build_vector_with(channel, STRING_VECTOR_NAME, &string_specs, &string_values)?;

        Ok(VariableDirectory {
            name_to_handle,
            name_to_type,
            reals,
            integers,
            booleans,
            strings,
        })
    }

    pub fn value_type(&self, name: &str) -> Option<ValueType> {
        self.name_to_type.get(name).copied()
    }

    pub fn handle_of(&self, name: &str) -> Option<ValueRef> {
        self.name_to_handle.get(name).copied()
    }

    pub fn get_real(&self, handle: ValueRef) -> (Status, f64) {
        match self.reals.get(&handle) {
            Some(ptr) => (Status::Ok, unsafe { (**ptr).value }),
            None => (Status::Warning, 0.0),
        }
    }

    pub fn set_real(&self, handle: ValueRef, value: f64) -> Status {
        match self.reals.get(&handle) {
            Some(ptr) => set_if_writable(*ptr, value),
            None => Status::Warning,
        }
    }

    pub fn get_integer(&self, handle: ValueRef) -> (Status, i32) {
        match self.integers.get(&handle) {
            Some(ptr) => (Status::Ok, unsafe { (**ptr).value }),
            None => (Status::Warning, 0),
        }
    }

    pub fn set_integer(&self, handle: ValueRef, value: i32) -> Status {
        match self.integers.get(&handle) {
            Some(ptr) => set_if_writable(*ptr, value),
            None => Status::Warning,
        }
    }

    pub fn get_boolean(&self, handle: ValueRef) -> (Status, bool) {
        match self.booleans.get(&handle) {
            Some(ptr) => (Status::Ok, unsafe { (**ptr).value }),
            None => (Status::Warning, false),
        }
    }

    pub fn set_boolean(&self, handle: ValueRef, value: bool) -> Status {
        match self.booleans.get(&handle) {
            Some(ptr) => set_if_writable(*ptr, value),
            None => Status::Warning,
        }
    }

    pub fn get_string(&self, handle: ValueRef) -> (Status, String) {
        match self.strings.get(&handle) {
            Some(ptr) => (Status::Ok, unsafe { (**ptr).value.as_str().to_string() }),
            None => (Status::Warning, String::new()),
        }
    }

    pub fn set_string(&self, handle: ValueRef, value: &str) -> Status {
        match self.strings.get(&handle) {
            Some(ptr) => {
                let record = unsafe { &mut **ptr };
                if !record.causality.master_writable() {
                    return Status::Warning;
                }
                match record.value.set(value) {
                    Ok(()) => Status::Ok,
                    Err(_) => Status::Warning,
                }
            }
            None => Status::Warning,
        }
    }
}

fn set_if_writable<T: Copy>(ptr: *mut ScalarRecord<T>, value: T) -> Status {
    let record = unsafe { &mut *ptr };
    if !record.causality.master_writable() {
        return Status::Warning;
    }
    record.value = value;
    Status::Ok
}

fn build_vector<T: Copy>(
    channel: &RendezvousChannel,
    vector_name: &str,
    specs: &[&VariableSpec],
    value_of: impl Fn(&VariableSpec) -> T,
) -> Result<BTreeMap<ValueRef, *mut ScalarRecord<T>>, DirectoryError>
where
    T: Default,
{
    if specs.is_empty() {
        return Ok(BTreeMap::new());
    }
    let values: Vec<T> = specs.iter().map(|s| value_of(s)).collect();
    let default_record = ScalarRecord::new(
        FixedName::new("").unwrap(),
        ValueRef(0),
        Causality::None,
        rdv_common::Variability::Constant,
        T::default(),
    );
    let ptrs = channel.construct_vector(vector_name, specs.len(), default_record)?;
    let mut map = BTreeMap::new();
    for ((ptr, spec), value) in ptrs.into_iter().zip(specs.iter()).zip(values.into_iter()) {
        let record = ScalarRecord::new(
            FixedName::new(&spec.name).unwrap_or_else(|_| FixedName::new("").unwrap()),
            spec.handle,
            spec.causality,
            spec.variability,
            value,
        );
        unsafe { ptr.write(record) };
        map.insert(spec.handle, ptr);
    }
    Ok(map)
}

fn build_vector_with(
    channel: &RendezvousChannel,
    vector_name: &str,
    specs: &[&VariableSpec],
    values: &[StringValue],
) -> Result<BTreeMap<ValueRef, *mut StringRecord>, DirectoryError> {
    if specs.is_empty() {
        return Ok(BTreeMap::new());
    }
    let default_record = ScalarRecord::new(
        FixedName::new("").unwrap(),
        ValueRef(0),
        Causality::None,
        rdv_common::Variability::Constant,
        StringValue::empty(),
    );
    let ptrs = channel.construct_vector(vector_name, specs.len(), default_record)?;
    let mut map = BTreeMap::new();
    for ((ptr, spec), value) in ptrs.into_iter().zip(specs.iter()).zip(values.iter()) {
        let record = ScalarRecord::new(
            FixedName::new(&spec.name).unwrap_or_else(|_| FixedName::new("").unwrap()),
            spec.handle,
            spec.causality,
            spec.variability,
            *value,
        );
        unsafe { ptr.write(record) };
        map.insert(spec.handle, ptr);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdv_common::{Logger, Variability};
    use serial_test::serial;

    fn unique_id(tag: &str) -> String {
        format!("/rdv-test-dir-{}-{}-{}", tag, std::process::id(), fastrand::u32(..))
    }

    #[test]
    #[serial]
    fn builds_and_round_trips_every_type() {
        let channel =
            RendezvousChannel::create(&unique_id("a"), 8192, Logger::with_default_sink("t")).unwrap();
        let specs = vec![
            VariableSpec::new("r", ValueRef(1), Causality::Parameter, Variability::Fixed, StartValue::Real(1.5)),
            VariableSpec::new("i", ValueRef(2), Causality::Input, Variability::Discrete, StartValue::Integer(7)),
            VariableSpec::new("b", ValueRef(3), Causality::Output, Variability::Discrete, StartValue::Boolean(true)),
            VariableSpec::new(
                "s",
                ValueRef(4),
                Causality::Parameter,
                Variability::Fixed,
                StartValue::String("hi".into()),
            ),
        ];
        let dir = VariableDirectory::build(&channel, &specs).unwrap();

        assert_eq!(dir.get_real(ValueRef(1)), (Status::Ok, 1.5));
        assert_eq!(dir.get_integer(ValueRef(2)), (Status::Ok, 7));
        assert_eq!(dir.get_boolean(ValueRef(3)), (Status::Ok, true));
        assert_eq!(dir.get_string(ValueRef(4)).1, "hi");
        assert_eq!(dir.handle_of("r"), Some(ValueRef(1)));
    }

    #[test]
    #[serial]
    fn output_write_is_rejected_without_state_change() {
        let channel =
            RendezvousChannel::create(&unique_id("b"), 8192, Logger::with_default_sink("t")).unwrap();
        let specs = vec![VariableSpec::new(
            "out",
            ValueRef(1),
            Causality::Output,
            Variability::Continuous,
            StartValue::Real(2.0),
        )];
        let dir = VariableDirectory::build(&channel, &specs).unwrap();

        let status = dir.set_real(ValueRef(1), 99.0);
        assert_eq!(status, Status::Warning);
        assert_eq!(dir.get_real(ValueRef(1)), (Status::Ok, 2.0));
    }

    #[test]
    #[serial]
    fn unknown_handle_is_warning_and_zeroed() {
        let channel =
            RendezvousChannel::create(&unique_id("c"), 8192, Logger::with_default_sink("t")).unwrap();
        let dir = VariableDirectory::build(&channel, &[]).unwrap();
        assert_eq!(dir.get_real(ValueRef(42)), (Status::Warning, 0.0));
    }
}

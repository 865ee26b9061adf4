//! Back-End Client Runtime: the library linked into the worker process.
//!
//! Attaches with bounded retry, then retrieves the control slots;
//! declaration matches requested names against the whole retrieved
//! record vector (`find_vector_all`) rather than resolving one record at
//! a time; and the per-type bulk get/set pairs cover
//! inputs/outputs/parameters.

use std::time::Duration;

use rdv_common::{Causality, Logger, Status};
use rdv_shm::{
    BooleanRecord, ControlBlock, IntegerRecord, RealRecord, RendezvousChannel, ScalarRecord, StringRecord,
    StringValue, BOOLEAN_VECTOR_NAME, CONTROL_BLOCK_NAME, INTEGER_VECTOR_NAME, REAL_VECTOR_NAME,
    STRING_VECTOR_NAME,
};

use crate::error::BackendError;

/// Default bound on how long the worker retries attaching to the segment
/// before giving up.
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BackEndClientRuntime {
    channel: RendezvousChannel,
    control: *mut ControlBlock,
    logger: Logger,

    real_inputs: Vec<*mut RealRecord>,
    real_outputs: Vec<*mut RealRecord>,
    real_parameters: Vec<*mut RealRecord>,
    integer_inputs: Vec<*mut IntegerRecord>,
    integer_outputs: Vec<*mut IntegerRecord>,
    integer_parameters: Vec<*mut IntegerRecord>,
    boolean_inputs: Vec<*mut BooleanRecord>,
    boolean_outputs: Vec<*mut BooleanRecord>,
    boolean_parameters: Vec<*mut BooleanRecord>,
    string_inputs: Vec<*mut StringRecord>,
    string_outputs: Vec<*mut StringRecord>,
    string_parameters: Vec<*mut StringRecord>,
}

// SAFETY: `control` and the record pointers alias the shared segment owned
// by `channel`; the worker drives this runtime from a single thread.
unsafe impl Send for BackEndClientRuntime {}

impl BackEndClientRuntime {
    /// Computes the segment name, attaches with bounded retry, takes the
    /// slave's first turn, and resolves every control slot.
    pub fn start_initialization(
        identifier: Option<&str>,
        timeout: Duration,
        logger: Logger,
    ) -> Result<Self, BackendError> {
        let segment_id = identifier
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("FMI_SEGMENT_PID{}", std::process::id()));

        let channel = RendezvousChannel::open(&segment_id, timeout, logger.clone())?;

        // Acquire the slave turn: the master's semaphore pair starts at
        // {1, 0}, so the first thing the worker does is block until the
        // master's rendezvous-wait in `instantiate` hands over the turn.
        if channel.slave_wait_for_master().is_fatal() {
            return Err(BackendError::Rendezvous);
        }

        let control = channel.find_object::<ControlBlock>(CONTROL_BLOCK_NAME)?;

        Ok(BackEndClientRuntime {
            channel,
            control,
            logger,
            real_inputs: Vec::new(),
            real_outputs: Vec::new(),
            real_parameters: Vec::new(),
            integer_inputs: Vec::new(),
            integer_outputs: Vec::new(),
            integer_parameters: Vec::new(),
            boolean_inputs: Vec::new(),
            boolean_outputs: Vec::new(),
            boolean_parameters: Vec::new(),
            string_inputs: Vec::new(),
            string_outputs: Vec::new(),
            string_parameters: Vec::new(),
        })
    }

    /// Resolves `names`, in order, against the named vector `vector_name`,
    /// verifying each record's causality matches `role`; on mismatch,
    /// logs and returns an error.
    fn declare<T: Copy>(
        &self,
        vector_name: &str,
        names: &[&str],
        role: Causality,
    ) -> Result<Vec<*mut ScalarRecord<T>>, BackendError> {
        let all: Vec<*mut ScalarRecord<T>> = self.channel.find_vector_all(vector_name)?;
        let mut out = Vec::with_capacity(names.len());
        for &name in names {
            let found = all.iter().find(|ptr| unsafe { (***ptr).name.as_str() == name });
            match found {
                Some(ptr) => {
                    let causality = unsafe { (**ptr).causality };
                    if causality != role {
                        self.logger
                            .warning(format!("variable '{name}' has causality {causality:?}, expected {role:?}"));
                        return Err(BackendError::CausalityMismatch(name.to_string()));
                    }
                    out.push(*ptr);
                }
                None => {
                    self.logger.warning(format!("variable '{name}' not found in segment"));
                    return Err(BackendError::UnknownVariable(name.to_string()));
                }
            }
        }
        Ok(out)
    }

    pub fn initialize_real_inputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.real_inputs = self.declare(REAL_VECTOR_NAME, names, Causality::Input)?;
        Ok(())
    }
    pub fn initialize_real_outputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.real_outputs = self.declare(REAL_VECTOR_NAME, names, Causality::Output)?;
        Ok(())
    }
    pub fn initialize_real_parameters(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.real_parameters = self.declare(REAL_VECTOR_NAME, names, Causality::Parameter)?;
        Ok(())
    }

    pub fn initialize_integer_inputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.integer_inputs = self.declare(INTEGER_VECTOR_NAME, names, Causality::Input)?;
        Ok(())
    }
    pub fn initialize_integer_outputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.integer_outputs = self.declare(INTEGER_VECTOR_NAME, names, Causality::Output)?;
        Ok(())
    }
    pub fn initialize_integer_parameters(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.integer_parameters = self.declare(INTEGER_VECTOR_NAME, names, Causality::Parameter)?;
        Ok(())
    }

    pub fn initialize_boolean_inputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.boolean_inputs = self.declare(BOOLEAN_VECTOR_NAME, names, Causality::Input)?;
        Ok(())
    }
    pub fn initialize_boolean_outputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.boolean_outputs = self.declare(BOOLEAN_VECTOR_NAME, names, Causality::Output)?;
        Ok(())
    }
    pub fn initialize_boolean_parameters(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.boolean_parameters = self.declare(BOOLEAN_VECTOR_NAME, names, Causality::Parameter)?;
        Ok(())
    }

    pub fn initialize_string_inputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.string_inputs = self.declare(STRING_VECTOR_NAME, names, Causality::Input)?;
        Ok(())
    }
    pub fn initialize_string_outputs(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.string_outputs = self.declare(STRING_VECTOR_NAME, names, Causality::Output)?;
        Ok(())
    }
    pub fn initialize_string_parameters(&mut self, names: &[&str]) -> Result<(), BackendError> {
        self.string_parameters = self.declare(STRING_VECTOR_NAME, names, Causality::Parameter)?;
        Ok(())
    }

    pub fn real_input_count(&self) -> usize {
        self.real_inputs.len()
    }
    pub fn real_output_count(&self) -> usize {
        self.real_outputs.len()
    }

    pub fn get_real_inputs(&self, out: &mut [f64]) -> Status {
        copy_out(&self.real_inputs, out)
    }
    pub fn set_real_outputs(&self, values: &[f64]) -> Status {
        copy_in(&self.real_outputs, values)
    }
    pub fn get_real_parameters(&self, out: &mut [f64]) -> Status {
        copy_out(&self.real_parameters, out)
    }

    pub fn get_integer_inputs(&self, out: &mut [i32]) -> Status {
        copy_out(&self.integer_inputs, out)
    }
    pub fn set_integer_outputs(&self, values: &[i32]) -> Status {
        copy_in(&self.integer_outputs, values)
    }
    pub fn get_integer_parameters(&self, out: &mut [i32]) -> Status {
        copy_out(&self.integer_parameters, out)
    }

    pub fn get_boolean_inputs(&self, out: &mut [bool]) -> Status {
        copy_out(&self.boolean_inputs, out)
    }
    pub fn set_boolean_outputs(&self, values: &[bool]) -> Status {
        copy_in(&self.boolean_outputs, values)
    }
    pub fn get_boolean_parameters(&self, out: &mut [bool]) -> Status {
        copy_out(&self.boolean_parameters, out)
    }

    pub fn get_string_inputs(&self, out: &mut [String]) -> Status {
        if out.len() != self.string_inputs.len() {
            return Status::Error;
        }
        for (slot, ptr) in out.iter_mut().zip(&self.string_inputs) {
            *slot = unsafe { (**ptr).value.as_str().to_string() };
        }
        Status::Ok
    }
    pub fn set_string_outputs(&self, values: &[String]) -> Status {
        if values.len() != self.string_outputs.len() {
            return Status::Error;
        }
        for (ptr, value) in self.string_outputs.iter().zip(values) {
            let record = unsafe { &mut **ptr };
            if record.value.set(value).is_err() {
                self.logger.warning(format!("string output '{value}' exceeds inline capacity"));
                return Status::Warning;
            }
        }
        Status::Ok
    }
    pub fn get_string_parameters(&self, out: &mut [String]) -> Status {
        if out.len() != self.string_parameters.len() {
            return Status::Error;
        }
        for (slot, ptr) in out.iter_mut().zip(&self.string_parameters) {
            *slot = unsafe { (**ptr).value.as_str().to_string() };
        }
        Status::Ok
    }

    /// Hands the first `doStep` turn to the master.
    pub fn end_initialization(&self) -> Status {
        self.channel.slave_signal_to_master()
    }

    pub fn wait_for_master(&self) -> Status {
        self.channel.slave_wait_for_master()
    }

    pub fn signal_to_master(&self) -> Status {
        self.channel.slave_signal_to_master()
    }

    pub fn get_current_communication_point(&self) -> f64 {
        unsafe { (*self.control).current_communication_point }
    }

    pub fn get_communication_step_size(&self) -> f64 {
        unsafe { (*self.control).communication_step_size }
    }

    pub fn debug_logging_on(&self) -> bool {
        unsafe { (*self.control).debug_logging_on }
    }

    /// Sets both the enforcement flag and the next step size together,
    /// so the master observes a single demand rather than a torn read.
    pub fn enforce_time_step(&mut self, delta: f64) {
        let control = unsafe { &mut *self.control };
        control.communication_step_size = delta;
        control.enforce_time_step = true;
    }

    pub fn reject_step(&mut self) {
        unsafe { (*self.control).reject_step = true };
    }

    /// Marks termination, then posts one last signal so a master blocked
    /// in `doStep` is not left waiting forever.
    fn terminate(&mut self) {
        unsafe { (*self.control).slave_has_terminated = true };
        self.channel.slave_signal_to_master();
    }
}

impl Drop for BackEndClientRuntime {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn copy_out<T: Copy>(records: &[*mut ScalarRecord<T>], out: &mut [T]) -> Status {
    if out.len() != records.len() {
        return Status::Error;
    }
    for (slot, ptr) in out.iter_mut().zip(records) {
        *slot = unsafe { (**ptr).value };
    }
    Status::Ok
}

fn copy_in<T: Copy>(records: &[*mut ScalarRecord<T>], values: &[T]) -> Status {
    if values.len() != records.len() {
        return Status::Error;
    }
    for (ptr, value) in records.iter().zip(values) {
        unsafe { (**ptr).value = *value };
    }
    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdv_common::{Variability};
    use rdv_shm::CONTROL_BLOCK_NAME as CTRL;
    use serial_test::serial;
    use std::thread;

    fn unique_id(tag: &str) -> String {
        format!("/rdv-backend-test-{}-{}-{}", tag, std::process::id(), fastrand::u32(..))
    }

    #[test]
    #[serial]
    fn attach_resolves_declared_inputs_and_rejects_wrong_causality() {
        let id = unique_id("declare");
        let master = RendezvousChannel::create(&id, 8192, Logger::with_default_sink("master")).unwrap();
        let _control = master.construct_object(CTRL, ControlBlock::default()).unwrap();
        let _reals = master
            .construct_vector::<RealRecord>(
                REAL_VECTOR_NAME,
                1,
                RealRecord::new(
                    rdv_common::FixedName::new("u").unwrap(),
                    rdv_common::ValueRef(1),
                    Causality::Input,
                    Variability::Continuous,
                    0.0,
                ),
            )
            .unwrap();

        let id_for_thread = id.clone();
        let handle = thread::spawn(move || {
            master.master_signal_to_slave();
        });

        let mut runtime = BackEndClientRuntime::start_initialization(
            Some(&id_for_thread),
            Duration::from_secs(2),
            Logger::with_default_sink("worker"),
        )
        .unwrap();
        handle.join().unwrap();

        runtime.initialize_real_inputs(&["u"]).unwrap();
        assert_eq!(runtime.real_input_count(), 1);

        let err = runtime.initialize_real_outputs(&["u"]).unwrap_err();
        assert!(matches!(err, BackendError::CausalityMismatch(_)));
    }
}

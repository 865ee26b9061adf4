//! Front-End Adapter: the master-facing slave-side contract.
//!
//! `instantiate` sequences: parse the model description, start the worker,
//! create the segment, rendezvous, then construct the control block and
//! variable directory.

use std::fs;
use std::path::Path;

use std::sync::Arc;

use rdv_common::{InstantiateError, LogSink, Logger, Status, TracingSink, ValueRef};
use rdv_directory::VariableDirectory;
use rdv_shm::{ControlBlock, RendezvousChannel, CONTROL_BLOCK_NAME};
use rdv_supervisor::{LaunchConfig, WorkerSupervisor};

use crate::config::AdapterConfig;
use crate::model_description::ModelDescription;
use crate::uri;

/// Fixed epsilon for communication-point comparison in `do_step`.
const COM_POINT_PRECISION: f64 = 1e-9;

/// Default executable hint used when the model description names no
/// vendor executable URI (FMI 1.0 MIME-type path is out of scope here;
/// every FMU this adapter targets supplies `executableUri`).
const DEFAULT_EXECUTABLE_ANNOTATION_MISSING: &str = "vendor annotation 'executableUri' is required";

pub struct FrontEndAdapter {
    instance_name: String,
    channel: RendezvousChannel,
    control: *mut ControlBlock,
    directory: VariableDirectory,
    supervisor: WorkerSupervisor,
    logger: Logger,
    poisoned: bool,
    step_finished: Option<Box<dyn FnMut(Status) + Send>>,
}

// SAFETY: `control` points into the shared segment owned by `channel`,
// which outlives every use of the pointer; the adapter is used from a
// single thread at a time per the Non-goal "thread-safety of a single
// adapter instance against concurrent master calls".
unsafe impl Send for FrontEndAdapter {}

impl FrontEndAdapter {
    /// Parses the model description, verifies the GUID, stages additional
    /// input files, launches the worker, creates the segment, rendezvous,
    /// and populates the control block + variable directory. No time has
    /// passed and no step has been taken when this returns `Ok`.
    pub fn instantiate(
        instance_name: &str,
        guid: &str,
        location: &Path,
        config: &AdapterConfig,
    ) -> Result<Self, InstantiateError> {
        Self::instantiate_with_sink(instance_name, guid, location, config, Arc::new(TracingSink))
    }

    /// Same as [`FrontEndAdapter::instantiate`], but lets the caller
    /// install a custom [`LogSink`] instead of the default `tracing`
    /// sink — the seam the C ABI's varargs-logger shim plugs into.
    pub fn instantiate_with_sink(
        instance_name: &str,
        guid: &str,
        location: &Path,
        config: &AdapterConfig,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self, InstantiateError> {
        let logger = Logger::new(instance_name, sink);

        let md_path = location.join("modelDescription.xml");
        if !md_path.exists() {
            return Err(InstantiateError::ModelDescriptionMissing(md_path.display().to_string()));
        }
        let model_description = ModelDescription::parse_file(&md_path)
            .map_err(|e| InstantiateError::ModelDescriptionInvalid(e.into()))?;

        if model_description.guid != guid {
            return Err(InstantiateError::GuidMismatch {
                expected: guid.to_string(),
                found: model_description.guid.clone(),
            });
        }

        let executable_uri = model_description
            .vendor
            .executable_uri
            .as_deref()
            .ok_or_else(|| InstantiateError::WorkerLaunch(DEFAULT_EXECUTABLE_ANNOTATION_MISSING.to_string()))?;
        let executable = uri::resolve(executable_uri, location);
        let entry_point = model_description
            .vendor
            .entry_point_uri
            .as_deref()
            .map(|u| uri::resolve(u, location));

        let mut launch = LaunchConfig::new(executable);
        if let Some(entry) = &entry_point {
            launch = launch.with_entry_point(entry);
        }
        if let Some(pre) = &model_description.vendor.pre_arguments {
            launch = launch.with_pre_args(pre.clone());
        }
        if let Some(main) = &model_description.vendor.main_arguments {
            launch = launch.with_main_args(main.clone());
        }
        if let Some(post) = &model_description.vendor.post_arguments {
            launch = launch.with_post_args(post.clone());
        }

        let working_dir = launch.resolve_working_dir();
        copy_additional_input_files(&model_description, location, &working_dir, &logger)?;

        let mut supervisor = WorkerSupervisor::spawn(&launch)
            .map_err(|e| InstantiateError::WorkerLaunch(e.to_string()))?;

        let segment_id = format!("FMI_SEGMENT_PID{}", supervisor.pid());
        let segment_size = config.estimate_segment_size(&model_description.variables);
        let channel = match RendezvousChannel::create(&segment_id, segment_size, logger.clone()) {
            Ok(c) => c,
            Err(e) => {
                supervisor.terminate(false);
                return Err(InstantiateError::SegmentCreation(e.to_string()));
            }
        };

        // Rendezvous-wait for the worker's first signal. The segment is
        // created after spawn and before the master calls `initialize`;
        // the control slots are constructed right after this handshake.
        if channel.master_wait_for_slave().is_fatal() {
            supervisor.terminate(false);
            return Err(InstantiateError::RendezvousTimeout(config.rendezvous_timeout));
        }

        let control_block = ControlBlock {
            debug_logging_on: config.debug_logging_default,
            ..ControlBlock::default()
        };
        let control = channel
            .construct_object(CONTROL_BLOCK_NAME, control_block)
            .map_err(|e| InstantiateError::SegmentCreation(e.to_string()))?;

        let directory = VariableDirectory::build(&channel, &model_description.variables)
            .map_err(|e| InstantiateError::SegmentCreation(e.to_string()))?;

        Ok(FrontEndAdapter {
            instance_name: instance_name.to_string(),
            channel,
            control,
            directory,
            supervisor,
            logger,
            poisoned: false,
            step_finished: None,
        })
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn set_step_finished_callback(&mut self, cb: Box<dyn FnMut(Status) + Send>) {
        self.step_finished = Some(cb);
    }

    pub fn set_debug_logging(&mut self, enabled: bool) {
        self.logger.set_debug_logging(enabled);
        unsafe { (*self.control).debug_logging_on = enabled };
    }

    fn control(&self) -> &ControlBlock {
        unsafe { &*self.control }
    }

    fn control_mut(&mut self) -> &mut ControlBlock {
        unsafe { &mut *self.control }
    }

    pub fn current_communication_point(&self) -> f64 {
        self.control().current_communication_point
    }

    pub fn initialize_slave(&mut self, t_start: f64, stop_time_defined: bool, t_stop: f64) -> Status {
        if self.poisoned {
            return Status::Fatal;
        }
        {
            let control = self.control_mut();
            control.current_communication_point = t_start;
            control.stop_time_defined = stop_time_defined;
            control.stop_time = t_stop;
        }
        if self.channel.master_signal_to_slave().is_fatal() {
            self.poisoned = true;
            return Status::Fatal;
        }
        let status = self.channel.master_wait_for_slave();
        if status.is_fatal() {
            self.poisoned = true;
        }
        status
    }

    fn writable_set<T>(&self, handle: ValueRef, setter: impl FnOnce(ValueRef, T) -> Status, value: T) -> Status {
        setter(handle, value)
    }

    pub fn set_real(&self, handle: ValueRef, value: f64) -> Status {
        self.writable_set(handle, |h, v| self.directory.set_real(h, v), value)
    }

    pub fn set_integer(&self, handle: ValueRef, value: i32) -> Status {
        self.writable_set(handle, |h, v| self.directory.set_integer(h, v), value)
    }

    pub fn set_boolean(&self, handle: ValueRef, value: bool) -> Status {
        self.writable_set(handle, |h, v| self.directory.set_boolean(h, v), value)
    }

    pub fn set_string(&self, handle: ValueRef, value: &str) -> Status {
        self.directory.set_string(handle, value)
    }

    pub fn get_real(&self, handle: ValueRef) -> (Status, f64) {
        self.directory.get_real(handle)
    }

    pub fn get_integer(&self, handle: ValueRef) -> (Status, i32) {
        self.directory.get_integer(handle)
    }

    pub fn get_boolean(&self, handle: ValueRef) -> (Status, bool) {
        self.directory.get_boolean(handle)
    }

    pub fn get_string(&self, handle: ValueRef) -> (Status, String) {
        self.directory.get_string(handle)
    }

    /// Name-based lookup used by the variable directory's name-keyed
    /// maps; also O(log n) like the handle-based path.
    pub fn handle_of(&self, name: &str) -> Option<ValueRef> {
        self.directory.handle_of(name)
    }

    fn call_step_finished(&mut self, status: Status) {
        if let Some(cb) = self.step_finished.as_mut() {
            cb(status);
        }
    }

    pub fn do_step(&mut self, com_point: f64, step_size: f64, _no_set_state_prior: bool) -> Status {
        if self.poisoned {
            return Status::Fatal;
        }

        if self.control().slave_has_terminated {
            self.logger.abort("slave has terminated");
            self.poisoned = true;
            self.call_step_finished(Status::Fatal);
            return Status::Fatal;
        }

        if (self.control().current_communication_point - com_point).abs() > COM_POINT_PRECISION {
            self.logger.discard_step(format!(
                "internal time ({}) does not match communication point ({})",
                self.control().current_communication_point,
                com_point
            ));
            self.call_step_finished(Status::Discard);
            return Status::Discard;
        }

        if self.control().enforce_time_step {
            let expected = self.control().communication_step_size;
            self.control_mut().enforce_time_step = false;
            if step_size != expected {
                self.logger.discard_step("enforce time step: wrong step size");
                self.call_step_finished(Status::Discard);
                return Status::Discard;
            }
        } else {
            self.control_mut().communication_step_size = step_size;
        }

        self.logger.debug("start synchronization with slave ...");
        if self.channel.master_signal_to_slave().is_fatal() {
            self.poisoned = true;
            self.call_step_finished(Status::Fatal);
            return Status::Fatal;
        }
        let wait_status = self.channel.master_wait_for_slave();
        if wait_status.is_fatal() {
            self.poisoned = true;
            self.call_step_finished(Status::Fatal);
            return Status::Fatal;
        }
        self.logger.debug("... DONE");

        if self.control().reject_step {
            self.control_mut().reject_step = false;
            self.logger.discard_step("step rejected by slave");
            self.call_step_finished(Status::Discard);
            return Status::Discard;
        }

        self.control_mut().current_communication_point += step_size;
        self.call_step_finished(Status::Ok);
        Status::Ok
    }

    /// Kills the worker only if it has not already reported termination,
    /// then releases the segment (dropping `channel` unmaps/unlinks it).
    pub fn terminate(&mut self) -> Status {
        let already_terminated = self.control().slave_has_terminated;
        self.supervisor.terminate(already_terminated);
        Status::Ok
    }
}

impl Drop for FrontEndAdapter {
    fn drop(&mut self) {
        let already_terminated = self.control().slave_has_terminated;
        self.supervisor.terminate(already_terminated);
    }
}

fn copy_additional_input_files(
    model_description: &ModelDescription,
    fmu_location: &Path,
    working_dir: &Path,
    logger: &Logger,
) -> Result<(), InstantiateError> {
    for rel in &model_description.vendor.additional_input_files {
        let src = fmu_location.join(rel);
        let file_name = Path::new(rel).file_name().ok_or_else(|| {
            InstantiateError::ModelDescriptionInvalid(anyhow::anyhow!("invalid additional input file path '{rel}'"))
        })?;
        let dst = working_dir.join(file_name);
        if let Err(e) = fs::copy(&src, &dst) {
            logger.warning(format!("failed to copy additional input file '{rel}': {e}"));
        }
    }
    Ok(())
}

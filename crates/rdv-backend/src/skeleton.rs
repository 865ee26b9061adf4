//! Back-End Application Skeleton: hosts the worker process's `main`,
//! wiring a user-supplied [`BackEndApplication`] to a
//! [`BackEndClientRuntime`].
//!
//! Sequences declare-scalars, retry-attach, the user hooks, and
//! push-back-initial-values during startup, then a per-turn
//! wait/read/step/write/signal loop, plus a `--only-write-variable-names`
//! dry run for build-time variable discovery. There is no pointer-taking
//! way to alias a local struct field in safe Rust, so user hooks are
//! handed owned [`ScalarBuffers`] instead of raw pointers.

use std::fs;
use std::path::Path;
use std::time::Duration;

use rdv_common::Logger;

use crate::client::{BackEndClientRuntime, DEFAULT_ATTACH_TIMEOUT};
use crate::error::BackendError;

/// Names of every scalar variable the back-end declares, grouped by type
/// and role. Only `vars.add_*` calls are expected during declaration.
#[derive(Debug, Default, Clone)]
pub struct DeclaredVariables {
    pub real_inputs: Vec<String>,
    pub real_outputs: Vec<String>,
    pub real_parameters: Vec<String>,
    pub integer_inputs: Vec<String>,
    pub integer_outputs: Vec<String>,
    pub integer_parameters: Vec<String>,
    pub boolean_inputs: Vec<String>,
    pub boolean_outputs: Vec<String>,
    pub boolean_parameters: Vec<String>,
    pub string_inputs: Vec<String>,
    pub string_outputs: Vec<String>,
    pub string_parameters: Vec<String>,
}

macro_rules! declare_adder {
    ($method:ident, $field:ident) => {
        pub fn $method(&mut self, name: &str) {
            self.$field.push(name.to_string());
        }
    };
}

impl DeclaredVariables {
    declare_adder!(add_real_input, real_inputs);
    declare_adder!(add_real_output, real_outputs);
    declare_adder!(add_real_parameter, real_parameters);
    declare_adder!(add_integer_input, integer_inputs);
    declare_adder!(add_integer_output, integer_outputs);
    declare_adder!(add_integer_parameter, integer_parameters);
    declare_adder!(add_boolean_input, boolean_inputs);
    declare_adder!(add_boolean_output, boolean_outputs);
    declare_adder!(add_boolean_parameter, boolean_parameters);
    declare_adder!(add_string_input, string_inputs);
    declare_adder!(add_string_output, string_outputs);
    declare_adder!(add_string_parameter, string_parameters);
}

fn as_str_slice(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

/// Owned local storage for every declared scalar's current value, read and
/// written by the user's [`BackEndApplication`] hooks.
#[derive(Debug, Default, Clone)]
pub struct ScalarBuffers {
    pub real_inputs: Vec<f64>,
    pub real_outputs: Vec<f64>,
    pub real_parameters: Vec<f64>,
    pub integer_inputs: Vec<i32>,
    pub integer_outputs: Vec<i32>,
    pub integer_parameters: Vec<i32>,
    pub boolean_inputs: Vec<bool>,
    pub boolean_outputs: Vec<bool>,
    pub boolean_parameters: Vec<bool>,
    pub string_inputs: Vec<String>,
    pub string_outputs: Vec<String>,
    pub string_parameters: Vec<String>,
}

impl ScalarBuffers {
    fn for_declared(vars: &DeclaredVariables) -> Self {
        ScalarBuffers {
            real_inputs: vec![0.0; vars.real_inputs.len()],
            real_outputs: vec![0.0; vars.real_outputs.len()],
            real_parameters: vec![0.0; vars.real_parameters.len()],
            integer_inputs: vec![0; vars.integer_inputs.len()],
            integer_outputs: vec![0; vars.integer_outputs.len()],
            integer_parameters: vec![0; vars.integer_parameters.len()],
            boolean_inputs: vec![false; vars.boolean_inputs.len()],
            boolean_outputs: vec![false; vars.boolean_outputs.len()],
            boolean_parameters: vec![false; vars.boolean_parameters.len()],
            string_inputs: vec![String::new(); vars.string_inputs.len()],
            string_outputs: vec![String::new(); vars.string_outputs.len()],
            string_parameters: vec![String::new(); vars.string_parameters.len()],
        }
    }
}

/// User hooks a worker-side model implements to plug into
/// [`run_back_end_application`].
pub trait BackEndApplication {
    /// Declares every input, output and parameter this model exposes.
    /// Only `vars.add_*` calls are expected here — no rendezvous channel
    /// exists yet.
    fn initialize_scalar_variables(&mut self, vars: &mut DeclaredVariables);

    /// Initializes everything except the scalar variables: command-line
    /// arguments are whatever the model description's vendor annotations
    /// supplied as the worker's argument list.
    fn initialize_back_end(&mut self, args: &[String]) -> Result<(), BackendError>;

    /// Sets initial parameter values. `buffers` already holds whatever
    /// start values the master applied before launching the worker; care
    /// must be taken not to clobber them unintentionally.
    fn initialize_parameter_values(&mut self, buffers: &mut ScalarBuffers);

    /// Advances the model from `last_sync_time` to `sync_time`, reading
    /// `buffers`' inputs/parameters and writing its outputs.
    fn do_step(&mut self, sync_time: f64, last_sync_time: f64, buffers: &mut ScalarBuffers) -> Result<(), BackendError>;
}

/// Hosts a [`BackEndApplication`]'s `main`: recognizes the
/// `--only-write-variable-names` dry run, otherwise runs the full
/// attach / initialize / step-forever loop.
///
/// An ordinary function rather than a macro: the worker's `main` calls it
/// once.
pub fn run_back_end_application<A: BackEndApplication>(mut app: A) -> Result<(), BackendError> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 2 && args[1] == "--only-write-variable-names" {
        let mut vars = DeclaredVariables::default();
        app.initialize_scalar_variables(&mut vars);
        return write_variable_names_to_files(&vars, Path::new("."));
    }

    let logger = Logger::with_default_sink("rdv-backend");
    let mut runtime = BackEndClientRuntime::start_initialization(None, DEFAULT_ATTACH_TIMEOUT, logger)?;

    let mut vars = DeclaredVariables::default();
    app.initialize_scalar_variables(&mut vars);

    runtime.initialize_real_inputs(&as_str_slice(&vars.real_inputs))?;
    runtime.initialize_real_outputs(&as_str_slice(&vars.real_outputs))?;
    runtime.initialize_real_parameters(&as_str_slice(&vars.real_parameters))?;
    runtime.initialize_integer_inputs(&as_str_slice(&vars.integer_inputs))?;
    runtime.initialize_integer_outputs(&as_str_slice(&vars.integer_outputs))?;
    runtime.initialize_integer_parameters(&as_str_slice(&vars.integer_parameters))?;
    runtime.initialize_boolean_inputs(&as_str_slice(&vars.boolean_inputs))?;
    runtime.initialize_boolean_outputs(&as_str_slice(&vars.boolean_outputs))?;
    runtime.initialize_boolean_parameters(&as_str_slice(&vars.boolean_parameters))?;
    runtime.initialize_string_inputs(&as_str_slice(&vars.string_inputs))?;
    runtime.initialize_string_outputs(&as_str_slice(&vars.string_outputs))?;
    runtime.initialize_string_parameters(&as_str_slice(&vars.string_parameters))?;

    let mut buffers = ScalarBuffers::for_declared(&vars);

    // The values defined in the model description are already applied to
    // the shared parameter records at this point; read them in before the
    // user hook runs so it can see (and choose not to overwrite) them.
    runtime.get_real_parameters(&mut buffers.real_parameters);
    runtime.get_integer_parameters(&mut buffers.integer_parameters);
    runtime.get_boolean_parameters(&mut buffers.boolean_parameters);
    runtime.get_string_parameters(&mut buffers.string_parameters);

    app.initialize_parameter_values(&mut buffers);
    app.initialize_back_end(&args)?;

    // Push whatever the hooks computed for outputs back to the front end
    // before the master takes its first turn.
    runtime.set_real_outputs(&buffers.real_outputs);
    runtime.set_integer_outputs(&buffers.integer_outputs);
    runtime.set_boolean_outputs(&buffers.boolean_outputs);
    runtime.set_string_outputs(&buffers.string_outputs);

    let mut last_sync_time = runtime.get_current_communication_point();
    runtime.end_initialization();

    loop {
        runtime.wait_for_master();

        let sync_time = runtime.get_current_communication_point() + runtime.get_communication_step_size();

        runtime.get_real_parameters(&mut buffers.real_parameters);
        runtime.get_integer_parameters(&mut buffers.integer_parameters);
        runtime.get_boolean_parameters(&mut buffers.boolean_parameters);
        runtime.get_string_parameters(&mut buffers.string_parameters);
        runtime.get_real_inputs(&mut buffers.real_inputs);
        runtime.get_integer_inputs(&mut buffers.integer_inputs);
        runtime.get_boolean_inputs(&mut buffers.boolean_inputs);
        runtime.get_string_inputs(&mut buffers.string_inputs);

        let step_result = app.do_step(sync_time, last_sync_time, &mut buffers);
        if step_result.is_err() {
            runtime.reject_step();
        }

        runtime.set_real_outputs(&buffers.real_outputs);
        runtime.set_integer_outputs(&buffers.integer_outputs);
        runtime.set_boolean_outputs(&buffers.boolean_outputs);
        runtime.set_string_outputs(&buffers.string_outputs);

        last_sync_time = sync_time;
        runtime.signal_to_master();

        step_result?;
    }
}

fn write_variable_names_to_files(vars: &DeclaredVariables, dir: &Path) -> Result<(), BackendError> {
    write_names(dir, "real.param", &vars.real_parameters)?;
    write_names(dir, "integer.param", &vars.integer_parameters)?;
    write_names(dir, "boolean.param", &vars.boolean_parameters)?;
    write_names(dir, "string.param", &vars.string_parameters)?;

    write_names(dir, "real.in", &vars.real_inputs)?;
    write_names(dir, "integer.in", &vars.integer_inputs)?;
    write_names(dir, "boolean.in", &vars.boolean_inputs)?;
    write_names(dir, "string.in", &vars.string_inputs)?;

    write_names(dir, "real.out", &vars.real_outputs)?;
    write_names(dir, "integer.out", &vars.integer_outputs)?;
    write_names(dir, "boolean.out", &vars.boolean_outputs)?;
    write_names(dir, "string.out", &vars.string_outputs)?;

    Ok(())
}

fn write_names(dir: &Path, filename: &str, names: &[String]) -> Result<(), BackendError> {
    if names.is_empty() {
        return Ok(());
    }
    let mut contents = String::new();
    for name in names {
        contents.push_str(name);
        contents.push('\n');
    }
    fs::write(dir.join(filename), contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn declares_add_names_in_order() {
        let mut vars = DeclaredVariables::default();
        vars.add_real_input("u");
        vars.add_real_input("v");
        vars.add_real_output("y");
        assert_eq!(vars.real_inputs, vec!["u".to_string(), "v".to_string()]);
        assert_eq!(vars.real_outputs, vec!["y".to_string()]);
    }

    #[test]
    fn buffers_are_sized_to_match_declarations() {
        let mut vars = DeclaredVariables::default();
        vars.add_real_input("u");
        vars.add_boolean_output("done");
        let buffers = ScalarBuffers::for_declared(&vars);
        assert_eq!(buffers.real_inputs.len(), 1);
        assert_eq!(buffers.boolean_outputs.len(), 1);
        assert_eq!(buffers.real_outputs.len(), 0);
    }

    #[test]
    fn dry_run_writes_only_nonempty_declarations() {
        let mut vars = DeclaredVariables::default();
        vars.add_real_input("u");
        vars.add_real_output("y");

        let dir = tempdir().unwrap();
        write_variable_names_to_files(&vars, dir.path()).unwrap();

        assert!(dir.path().join("real.in").exists());
        assert!(dir.path().join("real.out").exists());
        assert!(!dir.path().join("integer.in").exists());

        let contents = fs::read_to_string(dir.path().join("real.in")).unwrap();
        assert_eq!(contents, "u\n");
    }
}

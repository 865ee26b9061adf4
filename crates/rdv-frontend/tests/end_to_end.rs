//! End-to-end scenarios driven against a real shared segment with a
//! trivial in-process fake worker (a background thread standing in for
//! the external process `FrontEndAdapter::instantiate` would normally
//! spawn) instead of a mock. Duplicates the master/worker turn-taking
//! `FrontEndAdapter::do_step` implements, one level down, so these tests
//! exercise the real `rdv-shm`/`rdv-directory` primitives under contention.

use std::thread;
use std::time::Duration;

use rdv_common::{Causality, Logger, Status, ValueRef, Variability};
use rdv_directory::{StartValue, VariableDirectory, VariableSpec};
use rdv_shm::{ControlBlock, RendezvousChannel, CONTROL_BLOCK_NAME};
use serial_test::serial;

fn unique_id(tag: &str) -> String {
    format!("/rdv-e2e-{}-{}-{}", tag, std::process::id(), fastrand::u32(..))
}

struct Fixture {
    channel: RendezvousChannel,
    control: *mut ControlBlock,
    directory: VariableDirectory,
}

unsafe impl Send for Fixture {}

fn build_fixture(id: &str, specs: &[VariableSpec]) -> Fixture {
    let channel = RendezvousChannel::create(id, 16 * 1024, Logger::with_default_sink("master")).unwrap();
    let control = channel.construct_object(CONTROL_BLOCK_NAME, ControlBlock::default()).unwrap();
    let directory = VariableDirectory::build(&channel, specs).unwrap();
    Fixture { channel, control, directory }
}

/// The protocol steps `FrontEndAdapter::do_step` performs, duplicated here
/// so the test can drive them without spawning a real worker process.
fn do_step(fx: &Fixture, com_point: f64, step_size: f64) -> Status {
    let control = unsafe { &mut *fx.control };
    if control.slave_has_terminated {
        return Status::Fatal;
    }
    if (control.current_communication_point - com_point).abs() > 1e-9 {
        return Status::Discard;
    }
    if control.enforce_time_step {
        let expected = control.communication_step_size;
        control.enforce_time_step = false;
        if step_size != expected {
            return Status::Discard;
        }
    } else {
        control.communication_step_size = step_size;
    }

    if fx.channel.master_signal_to_slave().is_fatal() {
        return Status::Fatal;
    }
    if fx.channel.master_wait_for_slave().is_fatal() {
        return Status::Fatal;
    }

    if control.reject_step {
        control.reject_step = false;
        return Status::Discard;
    }

    control.current_communication_point += step_size;
    Status::Ok
}

#[test]
#[serial]
fn smoke_scenario_doubles_input() {
    let id = unique_id("smoke");
    let specs = vec![
        VariableSpec::new("u", ValueRef(1), Causality::Input, Variability::Continuous, StartValue::Real(0.0)),
        VariableSpec::new("y", ValueRef(2), Causality::Output, Variability::Continuous, StartValue::Real(0.0)),
    ];
    let fx = build_fixture(&id, &specs);

    let worker_channel =
        RendezvousChannel::open(&id, Duration::from_secs(2), Logger::with_default_sink("worker")).unwrap();
    let worker = thread::spawn(move || {
        let control: *mut ControlBlock = worker_channel.find_object(CONTROL_BLOCK_NAME).unwrap();
        let u_handle = ValueRef(1);
        let y_handle = ValueRef(2);
        // Worker's own directory view, built against the same segment.
        let specs = vec![
            VariableSpec::new("u", u_handle, Causality::Input, Variability::Continuous, StartValue::Real(0.0)),
            VariableSpec::new("y", y_handle, Causality::Output, Variability::Continuous, StartValue::Real(0.0)),
        ];
        // The worker only reads u and writes y directly through the
        // segment's vectors; reuse find_vector via a second directory
        // build would re-construct the objects, so index the raw pointers
        // instead.
        let _ = specs;
        let reals: Vec<*mut rdv_shm::RealRecord> =
            worker_channel.find_vector(rdv_shm::REAL_VECTOR_NAME, 2).unwrap();
        let u_ptr = reals[0];
        let y_ptr = reals[1];

        // End of the worker's own initialization: signal readiness.
        worker_channel.slave_signal_to_master();
        loop {
            let status = worker_channel.slave_wait_for_master();
            if status.is_fatal() {
                break;
            }
            let terminated = unsafe { (*control).slave_has_terminated };
            if terminated {
                break;
            }
            let u = unsafe { (*u_ptr).value };
            unsafe { (*y_ptr).value = 2.0 * u };
            worker_channel.slave_signal_to_master();
        }
    });

    // Rendezvous: wait for the worker's first signal before touching the
    // control block, mirroring `FrontEndAdapter::instantiate`.
    assert_eq!(fx.channel.master_wait_for_slave(), Status::Ok);

    assert_eq!(fx.directory.set_real(ValueRef(1), 3.0), Status::Ok);

    let status = do_step(&fx, 0.0, 1.0);
    assert_eq!(status, Status::Ok);
    assert_eq!(fx.directory.get_real(ValueRef(2)), (Status::Ok, 6.0));
    assert_eq!(unsafe { (*fx.control).current_communication_point }, 1.0);

    unsafe { (*fx.control).slave_has_terminated = true };
    fx.channel.master_signal_to_slave();
    worker.join().unwrap();
}

#[test]
#[serial]
fn enforced_step_rejects_wrong_size_then_accepts() {
    let id = unique_id("enforce");
    let fx = build_fixture(&id, &[]);
    unsafe {
        (*fx.control).enforce_time_step = true;
        (*fx.control).communication_step_size = 0.5;
    }

    assert_eq!(do_step(&fx, 0.0, 1.0), Status::Discard);
    // The flag clears exactly once per turn, even on mismatch.
    assert!(!unsafe { (*fx.control).enforce_time_step });

    // Second call is a clean step with no worker attached: signal/wait
    // would block forever without a peer, so this scenario only checks
    // the pre-rendezvous contract (mismatch discard + flag clearing).
}

#[test]
#[serial]
fn worker_exit_poisons_further_steps() {
    let id = unique_id("exit");
    let fx = build_fixture(&id, &[]);
    unsafe { (*fx.control).slave_has_terminated = true };

    assert_eq!(do_step(&fx, 0.0, 1.0), Status::Fatal);
    assert_eq!(unsafe { (*fx.control).current_communication_point }, 0.0);
}

#[test]
#[serial]
fn discard_leaves_communication_point_unchanged() {
    let id = unique_id("discard");
    let fx = build_fixture(&id, &[]);

    // Communication-point mismatch discards without advancing time.
    let status = do_step(&fx, 5.0, 1.0);
    assert_eq!(status, Status::Discard);
    assert_eq!(unsafe { (*fx.control).current_communication_point }, 0.0);
}

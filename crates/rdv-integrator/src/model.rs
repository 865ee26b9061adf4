//! The in-process black-box model consumed by the self-integrating
//! wrapper and the integrator core.
//!
//! The wrapper never talks to a concrete simulation model directly, it
//! talks to this trait; a linked-in-process model (no IPC) implements
//! it. `rdv-integrator` ships no concrete implementation — one is
//! supplied by whatever links this crate.

use rdv_common::ValueRef;

/// A black-box continuous-time model: state, derivatives, event
/// indicators, and named value access, with no notion of shared memory
/// or rendezvous.
pub trait BlackBoxModel {
    /// Number of continuous states (`x` in `x' = f(t, x)`).
    fn n_states(&self) -> usize;

    /// Number of event indicators tracked for state-event detection.
    fn n_event_indicators(&self) -> usize;

    fn get_time(&self) -> f64;
    fn set_time(&mut self, time: f64);

    fn get_continuous_states(&self, out: &mut [f64]);
    fn set_continuous_states(&mut self, states: &[f64]);

    /// Evaluates `dx/dt` at the model's current time and state.
    fn get_derivatives(&mut self, out: &mut [f64]);

    fn get_event_indicators(&mut self, out: &mut [f64]);

    /// Raises an internal event so the model reconciles guessed initial
    /// values against any guessed initial state.
    fn raise_event(&mut self);

    /// Runs whatever event-update iteration the model needs once an event
    /// has been raised or detected, up to time `t`.
    fn handle_events(&mut self, t: f64);

    /// The next model-declared time event, if any. Time events are
    /// treated identically to state events after integration.
    fn next_event_time(&self) -> Option<f64>;

    fn get_real(&self, handle: ValueRef) -> f64;
    fn set_real(&mut self, handle: ValueRef, value: f64);
    fn get_integer(&self, handle: ValueRef) -> i32;
    fn set_integer(&mut self, handle: ValueRef, value: i32);
    fn get_boolean(&self, handle: ValueRef) -> bool;
    fn set_boolean(&mut self, handle: ValueRef, value: bool);
    fn get_string(&self, handle: ValueRef) -> String;
    fn set_string(&mut self, handle: ValueRef, value: &str);
}

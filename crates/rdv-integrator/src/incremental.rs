//! Incremental Self-Integrating Wrapper.
//!
//! The wrapper keeps a look-ahead window of predicted states, lets the
//! master read interpolated values anywhere inside that window via
//! [`IncrementalWrapper::get_state`], and re-predicts the window every time
//! new inputs arrive via [`IncrementalWrapper::sync`]. Event handling
//! bisects the last integrator interval down to the configured precision
//! when `stop_before_event` is not set.

use std::collections::VecDeque;

use crate::error::IntegratorError;
use crate::model::BlackBoxModel;
use crate::stepper::{Observer, Rhs, Stepper};
use rdv_common::ValueRef;

/// One point in the prediction history: model state plus whatever output
/// values the master might read, sampled at `time`.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub time: f64,
    pub state: Vec<f64>,
    pub real_outputs: Vec<f64>,
}

/// Static configuration for an [`IncrementalWrapper`]: look-ahead
/// horizon, look-ahead step size, integrator step size, and the
/// stop-before-event flag.
#[derive(Debug, Clone, Copy)]
pub struct IncrementalConfig {
    pub look_ahead_horizon: f64,
    pub look_ahead_step_size: f64,
    pub integrator_step_size: f64,
    pub stop_before_event: bool,
    pub event_search_precision: f64,
}

impl IncrementalConfig {
    fn validate(&self) -> Result<(), IntegratorError> {
        if self.look_ahead_horizon <= 0.0
            || self.look_ahead_step_size <= 0.0
            || self.integrator_step_size <= 0.0
        {
            return Err(IntegratorError::InvalidConfig);
        }
        Ok(())
    }
}

/// Drives a [`BlackBoxModel`] one look-ahead window at a time, exposing a
/// continuous "ask for the state at any time `t`" interface to callers
/// that themselves advance in irregular, possibly smaller steps than the
/// embedded model wants to be stepped.
pub struct IncrementalWrapper<M: BlackBoxModel> {
    model: M,
    stepper: Stepper,
    config: IncrementalConfig,
    real_output_refs: Vec<ValueRef>,
    predictions: VecDeque<HistoryEntry>,
    last_event_time: Option<f64>,
    initialized: bool,
}

struct ModelRhs<'a, M: BlackBoxModel> {
    model: &'a mut M,
}

impl<'a, M: BlackBoxModel> Rhs for ModelRhs<'a, M> {
    fn eval(&mut self, time: f64, state: &[f64], derivative: &mut [f64]) {
        self.model.set_time(time);
        self.model.set_continuous_states(state);
        self.model.get_derivatives(derivative);
    }
}

/// An [`Observer`] that never stops a step early; event detection for the
/// incremental wrapper happens once per look-ahead sub-step, after
/// [`Stepper::integrate`] returns, rather than mid-integration.
struct NullObserver;

impl Observer for NullObserver {
    fn step_completed(&mut self, _time: f64, _state: &[f64]) -> bool {
        false
    }
}

impl<M: BlackBoxModel> IncrementalWrapper<M> {
    pub fn new(model: M, stepper: Stepper, config: IncrementalConfig) -> Result<Self, IntegratorError> {
        config.validate()?;
        Ok(IncrementalWrapper {
            model,
            stepper,
            config,
            real_output_refs: Vec::new(),
            predictions: VecDeque::new(),
            last_event_time: None,
            initialized: false,
        })
    }

    /// Declares which real-valued variables should be sampled into each
    /// [`HistoryEntry::real_outputs`].
    pub fn define_real_outputs(&mut self, refs: &[ValueRef]) {
        self.real_output_refs = refs.to_vec();
    }

    /// Instantiates the embedded model, raises an internal event so it
    /// reconciles any guessed initial state, and predicts the first
    /// look-ahead window starting at `start_time`.
    pub fn init(&mut self, start_time: f64) -> Result<(), IntegratorError> {
        self.model.set_time(start_time);
        self.model.raise_event();
        self.model.handle_events(start_time);
        self.initialized = true;
        self.last_event_time = None;
        self.predict_from(start_time)
    }

    /// Advances the window so it covers `[t1, t1 + horizon]`, re-running
    /// the look-ahead prediction from the current model state. `t0` is
    /// accepted for symmetry with the two-argument `sync(t0, t1)` call
    /// shape, but the wrapper always resumes from whatever state it
    /// already predicted for `t1`.
    pub fn sync(&mut self, _t0: f64, t1: f64) -> Result<(), IntegratorError> {
        if !self.initialized {
            return Err(IntegratorError::NotInitialized);
        }
        let resume = self.get_state(t1)?;
        self.model.set_time(resume.time);
        self.model.set_continuous_states(&resume.state);

        if let Some(event_time) = self.last_event_time.take() {
            // The previous window stopped exactly at `event_time` with the
            // model still pre-event; take the deferred explicit-Euler
            // sub-step across the boundary now, then let the model handle
            // the event before resuming normal prediction.
            let mut state = resume.state.clone();
            let mut deriv = vec![0.0; state.len()];
            self.model.get_derivatives(&mut deriv);
            let micro_step = self.config.event_search_precision.max(1e-12);
            for d in 0..state.len() {
                state[d] += micro_step * deriv[d];
            }
            let post_event_time = event_time + micro_step;
            self.model.set_time(post_event_time);
            self.model.set_continuous_states(&state);
            self.model.handle_events(post_event_time);
            return self.predict_from(post_event_time);
        }

        self.predict_from(resume.time)
    }

    /// Returns the (possibly interpolated) state at `t`, which must lie
    /// inside the currently predicted window.
    pub fn get_state(&self, t: f64) -> Result<HistoryEntry, IntegratorError> {
        let oldest = self.predictions.front().ok_or(IntegratorError::NotInitialized)?.time;
        let newest = self.predictions.back().ok_or(IntegratorError::NotInitialized)?.time;
        if t < oldest - 1e-12 || t > newest + 1e-12 {
            return Err(IntegratorError::OutsideWindow { requested: t, oldest, newest });
        }

        // Reverse scan: the common case is a request near the tail of
        // the window.
        for pair in self.predictions.iter().rev().collect::<Vec<_>>().windows(2) {
            let (hi, lo) = (pair[0], pair[1]);
            if t <= hi.time + 1e-12 && t >= lo.time - 1e-12 {
                return Ok(interpolate(lo, hi, t));
            }
        }
        Ok(self.predictions.back().unwrap().clone())
    }

    fn predict_from(&mut self, start_time: f64) -> Result<(), IntegratorError> {
        self.predictions.clear();

        let mut state = vec![0.0; self.model.n_states()];
        self.model.get_continuous_states(&mut state);
        self.predictions.push_back(self.sample(start_time, &state));

        let horizon_end = start_time + self.config.look_ahead_horizon;
        let mut t = start_time;
        let n_indicators = self.model.n_event_indicators();

        while t < horizon_end - 1e-12 {
            let indicators_before = if n_indicators > 0 {
                self.model.set_continuous_states(&state);
                let mut v = vec![0.0; n_indicators];
                self.model.get_event_indicators(&mut v);
                v
            } else {
                Vec::new()
            };

            let step = self.config.look_ahead_step_size.min(horizon_end - t);
            let state_before_step = state.clone();
            let reached = {
                let mut rhs = ModelRhs { model: &mut self.model };
                self.stepper.integrate(
                    t,
                    &mut state,
                    step,
                    self.config.integrator_step_size,
                    &mut rhs,
                    &mut NullObserver,
                )
            };

            let event_detected = if n_indicators > 0 {
                self.model.set_continuous_states(&state);
                let mut indicators_after = vec![0.0; n_indicators];
                self.model.get_event_indicators(&mut indicators_after);
                sign_changed(&indicators_before, &indicators_after)
            } else {
                false
            };

            if event_detected {
                let (event_time, pre_event_state) =
                    self.bisect_event(t, reached, &state_before_step, &indicators_before);

                if self.config.stop_before_event {
                    // Stop exactly at the pre-event boundary; the deferred
                    // explicit-Euler cross-step and handle_events happen on
                    // the next `sync` call, once the caller has observed
                    // this time.
                    self.model.set_time(event_time);
                    self.model.set_continuous_states(&pre_event_state);
                    self.predictions.push_back(self.sample(event_time, &pre_event_state));
                    state = pre_event_state;
                    self.last_event_time = Some(event_time);
                    break;
                }

                // Cross the boundary now: one explicit-Euler sub-step from
                // the bisected pre-event time to the already-reached
                // post-step time, then let the model react before resuming
                // prediction.
                let mut crossed = pre_event_state.clone();
                let mut deriv = vec![0.0; crossed.len()];
                self.model.set_time(event_time);
                self.model.set_continuous_states(&pre_event_state);
                self.model.get_derivatives(&mut deriv);
                let cross_step = reached - event_time;
                for d in 0..crossed.len() {
                    crossed[d] += cross_step * deriv[d];
                }
                self.model.set_time(reached);
                self.model.set_continuous_states(&crossed);
                self.model.handle_events(reached);
                self.model.get_continuous_states(&mut crossed);
                state = crossed;
                self.predictions.push_back(self.sample(reached, &state));
                t = reached;
                continue;
            }

            if let Some(next_event) = self.model.next_event_time() {
                if next_event <= reached + 1e-12 {
                    self.model.set_time(next_event);
                    self.model.handle_events(next_event);
                    self.model.get_continuous_states(&mut state);
                    self.predictions.push_back(self.sample(next_event, &state));
                    self.last_event_time = Some(next_event);
                    t = next_event;
                    continue;
                }
            }

            t = reached;
            self.predictions.push_back(self.sample(t, &state));
        }

        Ok(())
    }

    /// Halves the interval `[t_start, t_stop]` until it is narrower than
    /// `event_search_precision`, returning the bisected pre-event time
    /// together with the model state estimated at that time. `state_start`
    /// is the (exact) state at `t_start`, the anchor the Euler sub-steps
    /// used during bisection are taken from.
    fn bisect_event(
        &mut self,
        t_start: f64,
        t_stop: f64,
        state_start: &[f64],
        indicators_before: &[f64],
    ) -> (f64, Vec<f64>) {
        let mut lo = t_start;
        let mut hi = t_stop;
        let mut base_state = state_start.to_vec();

        while hi - lo > self.config.event_search_precision {
            let mid = 0.5 * (lo + hi);
            let mut trial_state = base_state.clone();
            self.model.set_time(lo);
            self.model.set_continuous_states(&trial_state);
            let mut deriv = vec![0.0; trial_state.len()];
            self.model.get_derivatives(&mut deriv);
            let dt = mid - lo;
            for d in 0..trial_state.len() {
                trial_state[d] += dt * deriv[d];
            }

            let mut indicators_mid = vec![0.0; indicators_before.len()];
            self.model.set_continuous_states(&trial_state);
            self.model.get_event_indicators(&mut indicators_mid);

            if sign_changed(indicators_before, &indicators_mid) {
                hi = mid;
            } else {
                lo = mid;
                base_state = trial_state;
            }
        }
        (lo, base_state)
    }

    fn sample(&self, time: f64, state: &[f64]) -> HistoryEntry {
        let outputs = self.real_output_refs.iter().map(|r| self.model.get_real(*r)).collect();
        HistoryEntry { time, state: state.to_vec(), real_outputs: outputs }
    }
}

fn sign_changed(before: &[f64], after: &[f64]) -> bool {
    before.iter().zip(after).any(|(b, a)| b.signum() != a.signum() && (*b != 0.0 || *a != 0.0))
}

fn interpolate(lo: &HistoryEntry, hi: &HistoryEntry, t: f64) -> HistoryEntry {
    if (hi.time - lo.time).abs() < 1e-15 {
        return lo.clone();
    }
    let frac = (t - lo.time) / (hi.time - lo.time);
    let state = lo.state.iter().zip(&hi.state).map(|(a, b)| a + frac * (b - a)).collect();
    let real_outputs = lo
        .real_outputs
        .iter()
        .zip(&hi.real_outputs)
        .map(|(a, b)| a + frac * (b - a))
        .collect();
    HistoryEntry { time: t, state, real_outputs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stepper::StepperKind;

    struct LinearDrift {
        time: f64,
        state: Vec<f64>,
    }

    impl BlackBoxModel for LinearDrift {
        fn n_states(&self) -> usize {
            1
        }
        fn n_event_indicators(&self) -> usize {
            0
        }
        fn get_time(&self) -> f64 {
            self.time
        }
        fn set_time(&mut self, time: f64) {
            self.time = time;
        }
        fn get_continuous_states(&self, out: &mut [f64]) {
            out.copy_from_slice(&self.state);
        }
        fn set_continuous_states(&mut self, states: &[f64]) {
            self.state = states.to_vec();
        }
        fn get_derivatives(&mut self, out: &mut [f64]) {
            out[0] = 1.0;
        }
        fn get_event_indicators(&mut self, _out: &mut [f64]) {}
        fn raise_event(&mut self) {}
        fn handle_events(&mut self, _t: f64) {}
        fn next_event_time(&self) -> Option<f64> {
            None
        }
        fn get_real(&self, _handle: ValueRef) -> f64 {
            self.state[0]
        }
        fn set_real(&mut self, _handle: ValueRef, _value: f64) {}
        fn get_integer(&self, _handle: ValueRef) -> i32 {
            0
        }
        fn set_integer(&mut self, _handle: ValueRef, _value: i32) {}
        fn get_boolean(&self, _handle: ValueRef) -> bool {
            false
        }
        fn set_boolean(&mut self, _handle: ValueRef, _value: bool) {}
        fn get_string(&self, _handle: ValueRef) -> String {
            String::new()
        }
        fn set_string(&mut self, _handle: ValueRef, _value: &str) {}
    }

    /// Drifts at a constant rate and crosses a single state-event
    /// threshold at `state[0] == 0.5`; `handle_events` just counts its own
    /// calls, exposed as a real output so tests can observe whether the
    /// event was actually handled.
    struct EventFlip {
        time: f64,
        state: Vec<f64>,
        handle_count: i32,
    }

    impl BlackBoxModel for EventFlip {
        fn n_states(&self) -> usize {
            1
        }
        fn n_event_indicators(&self) -> usize {
            1
        }
        fn get_time(&self) -> f64 {
            self.time
        }
        fn set_time(&mut self, time: f64) {
            self.time = time;
        }
        fn get_continuous_states(&self, out: &mut [f64]) {
            out.copy_from_slice(&self.state);
        }
        fn set_continuous_states(&mut self, states: &[f64]) {
            self.state = states.to_vec();
        }
        fn get_derivatives(&mut self, out: &mut [f64]) {
            out[0] = 1.0;
        }
        fn get_event_indicators(&mut self, out: &mut [f64]) {
            out[0] = 0.5 - self.state[0];
        }
        fn raise_event(&mut self) {}
        fn handle_events(&mut self, _t: f64) {
            self.handle_count += 1;
        }
        fn next_event_time(&self) -> Option<f64> {
            None
        }
        fn get_real(&self, handle: ValueRef) -> f64 {
            if handle == ValueRef(99) {
                self.handle_count as f64
            } else {
                self.state[0]
            }
        }
        fn set_real(&mut self, _handle: ValueRef, _value: f64) {}
        fn get_integer(&self, _handle: ValueRef) -> i32 {
            0
        }
        fn set_integer(&mut self, _handle: ValueRef, _value: i32) {}
        fn get_boolean(&self, _handle: ValueRef) -> bool {
            false
        }
        fn set_boolean(&mut self, _handle: ValueRef, _value: bool) {}
        fn get_string(&self, _handle: ValueRef) -> String {
            String::new()
        }
        fn set_string(&mut self, _handle: ValueRef, _value: &str) {}
    }

    fn config() -> IncrementalConfig {
        IncrementalConfig {
            look_ahead_horizon: 1.0,
            look_ahead_step_size: 0.25,
            integrator_step_size: 0.05,
            stop_before_event: false,
            event_search_precision: 1e-6,
        }
    }

    #[test]
    fn rejects_non_positive_configuration() {
        let model = LinearDrift { time: 0.0, state: vec![0.0] };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut bad = config();
        bad.look_ahead_step_size = 0.0;
        let result = IncrementalWrapper::new(model, stepper, bad);
        assert!(matches!(result, Err(IntegratorError::InvalidConfig)));
    }

    #[test]
    fn predicts_window_and_interpolates_inside_it() {
        let model = LinearDrift { time: 0.0, state: vec![0.0] };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut wrapper = IncrementalWrapper::new(model, stepper, config()).unwrap();
        wrapper.init(0.0).unwrap();

        let at_half = wrapper.get_state(0.5).unwrap();
        assert!((at_half.state[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn out_of_window_request_is_rejected() {
        let model = LinearDrift { time: 0.0, state: vec![0.0] };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut wrapper = IncrementalWrapper::new(model, stepper, config()).unwrap();
        wrapper.init(0.0).unwrap();

        let result = wrapper.get_state(10.0);
        assert!(matches!(result, Err(IntegratorError::OutsideWindow { .. })));
    }

    #[test]
    fn sync_before_init_is_rejected() {
        let model = LinearDrift { time: 0.0, state: vec![0.0] };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut wrapper = IncrementalWrapper::new(model, stepper, config()).unwrap();
        assert!(matches!(wrapper.sync(0.0, 0.5), Err(IntegratorError::NotInitialized)));
    }

    #[test]
    fn sync_advances_the_window() {
        let model = LinearDrift { time: 0.0, state: vec![0.0] };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut wrapper = IncrementalWrapper::new(model, stepper, config()).unwrap();
        wrapper.init(0.0).unwrap();
        wrapper.sync(0.0, 0.75).unwrap();

        let at_1_5 = wrapper.get_state(1.5).unwrap();
        assert!((at_1_5.state[0] - 1.5).abs() < 1e-2);
    }

    #[test]
    fn event_continues_through_boundary_when_not_stopping_before_it() {
        let model = EventFlip { time: 0.0, state: vec![0.0], handle_count: 0 };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut cfg = config();
        cfg.stop_before_event = false;
        let mut wrapper = IncrementalWrapper::new(model, stepper, cfg).unwrap();
        wrapper.define_real_outputs(&[ValueRef(99)]);
        wrapper.init(0.0).unwrap();

        // The window spans the whole horizon; the event at state[0]==0.5
        // (t==0.5) must have been handled and prediction must continue
        // past it to the end of the window.
        let past_event = wrapper.get_state(0.9).unwrap();
        assert!((past_event.state[0] - 0.9).abs() < 1e-2);
        assert_eq!(past_event.real_outputs[0], 1.0);
    }

    #[test]
    fn event_stops_before_boundary_then_deferred_step_resumes_on_next_sync() {
        let model = EventFlip { time: 0.0, state: vec![0.0], handle_count: 0 };
        let stepper = Stepper::with_defaults(StepperKind::RungeKutta4);
        let mut cfg = config();
        cfg.stop_before_event = true;
        let mut wrapper = IncrementalWrapper::new(model, stepper, cfg).unwrap();
        wrapper.define_real_outputs(&[ValueRef(99)]);
        wrapper.init(0.0).unwrap();

        let at_event = wrapper.get_state(0.5).unwrap();
        assert!((at_event.state[0] - 0.5).abs() < 1e-3);
        assert_eq!(at_event.real_outputs[0], 0.0);

        // Syncing at the frozen window's end consumes the deferred
        // micro-step and hands the event to the model.
        wrapper.sync(0.5, 0.5).unwrap();
        let after_event = wrapper.get_state(0.6).unwrap();
        assert_eq!(after_event.real_outputs[0], 1.0);
    }
}

//! # Axon Sim
//!
//! The simulation driver: takes one validated, immutable run request,
//! drives the chosen integrator across a fixed time grid, and hands back
//! a completed trajectory with its derived ionic currents.
//!
//! ## Contract
//!
//! - Validation happens before the loop starts; a rejected request does
//!   no work.
//! - Stepping is strictly sequential: state `i` depends on state `i - 1`.
//! - A run either completes or fails; there is no partially filled result.
//! - A long run can block for a while (half a million implicit steps are
//!   real work), so the loop checks a cooperative [`CancelToken`] once per
//!   step. Interactive callers are expected to run on a worker thread and
//!   cancel from outside.

use axon_core::{AxonError, Method, Result, StateVector, Time, TimeGrid};
use axon_model::{
    HodgkinHuxley, ModelParameters, StimulusProfile, IDX_H, IDX_M, IDX_N, IDX_V,
};
use axon_solver::Stepper;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resting-state seed `[V, m, h, n]`: fixed constants, not derived
pub const INITIAL_STATE: [f64; 4] = [-65.0, 0.05, 0.5, 0.4];

// ============================================================================
// RUN REQUEST
// ============================================================================

/// One immutable run request
///
/// Constructed once by the caller (the presentation layer, a test, ...) and
/// passed in whole; the core never reads configuration from anywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub params: ModelParameters,
    pub stimulus: StimulusProfile,
    pub method: Method,
    /// Start time (ms)
    pub t0: Time,
    /// End time (ms), inclusive
    pub t1: Time,
    /// Step size (ms)
    pub h: f64,
}

impl SimulationConfig {
    /// Reject out-of-domain requests before any stepping happens
    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        if !self.t0.is_finite() || !self.t1.is_finite() {
            return Err(AxonError::InvalidParameters(
                "t0 and t1 must be finite".into(),
            ));
        }
        if self.t1 <= self.t0 {
            return Err(AxonError::InvalidParameters(format!(
                "t1 ({}) must be greater than t0 ({})",
                self.t1, self.t0
            )));
        }
        if !(self.h.is_finite() && self.h > 0.0) {
            return Err(AxonError::InvalidParameters(format!(
                "step size h ({}) must be finite and positive",
                self.h
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cooperative cancellation flag, checked once per step
///
/// Clone the token, hand one copy to the runner's thread, keep the other to
/// call [`CancelToken::cancel`] from the outside.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// One completed trajectory with derived ionic currents
///
/// Produced atomically by a successful run and immutable afterwards; a new
/// run supersedes it rather than mutating it. All columns are parallel and
/// indexed by the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Time axis (ms)
    pub time: Vec<Time>,
    /// Membrane potential (mV)
    pub v: Vec<f64>,
    /// Na+ activation gate
    pub m: Vec<f64>,
    /// Na+ inactivation gate
    pub h: Vec<f64>,
    /// K+ activation gate
    pub n: Vec<f64>,
    /// Na+ current (uA/cm^2)
    pub i_na: Vec<f64>,
    /// K+ current (uA/cm^2)
    pub i_k: Vec<f64>,
    /// Leak current (uA/cm^2)
    pub i_l: Vec<f64>,
    /// Parameters the run used (needed to derive conductance observables)
    pub params: ModelParameters,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Instantaneous Na+ conductance series `g_na * m^3 * h`
    pub fn g_na_series(&self) -> Vec<f64> {
        self.m
            .iter()
            .zip(&self.h)
            .map(|(m, h)| self.params.g_na * m.powi(3) * h)
            .collect()
    }

    /// Instantaneous K+ conductance series `g_k * n^4`
    pub fn g_k_series(&self) -> Vec<f64> {
        self.n
            .iter()
            .map(|n| self.params.g_k * n.powi(4))
            .collect()
    }
}

// ============================================================================
// RUNNER
// ============================================================================

/// Run a simulation to completion (never cancelled from outside)
pub fn run(config: &SimulationConfig) -> Result<SimulationResult> {
    run_with_cancel(config, &CancelToken::new())
}

/// Run a simulation, checking `token` once per step
pub fn run_with_cancel(config: &SimulationConfig, token: &CancelToken) -> Result<SimulationResult> {
    config.validate()?;

    let grid = TimeGrid::new(config.t0, config.t1, config.h)?;
    let model = HodgkinHuxley::new(config.params, config.stimulus.clone());
    let stepper = Stepper::new(config.method);

    log::info!(
        "run start: method={}, {} points on [{}, {}] ms, h={} ms",
        config.method,
        grid.len(),
        grid.t0(),
        grid.t1(),
        config.h
    );

    let mut trajectory: Vec<StateVector> = Vec::with_capacity(grid.len());
    let mut state = StateVector::from(INITIAL_STATE.to_vec());
    trajectory.push(state.clone());

    for i in 1..grid.len() {
        let t_prev = grid.point(i - 1);
        if token.is_cancelled() {
            log::info!("run cancelled at t = {t_prev} ms");
            return Err(AxonError::Cancelled { t: t_prev });
        }
        let dt = grid.interval(i - 1);
        state = stepper.step(&model, &state, t_prev, dt)?;
        trajectory.push(state.clone());
    }

    let result = assemble(&model, &grid, &trajectory);
    log::info!("run finished: {} samples", result.len());
    Ok(result)
}

/// Split the trajectory into parallel columns and derive the ionic currents
fn assemble(model: &HodgkinHuxley, grid: &TimeGrid, trajectory: &[StateVector]) -> SimulationResult {
    let len = trajectory.len();
    let mut v = Vec::with_capacity(len);
    let mut m = Vec::with_capacity(len);
    let mut h = Vec::with_capacity(len);
    let mut n = Vec::with_capacity(len);
    let mut i_na = Vec::with_capacity(len);
    let mut i_k = Vec::with_capacity(len);
    let mut i_l = Vec::with_capacity(len);

    for state in trajectory {
        let (sv, sm, sh, sn) = (state[IDX_V], state[IDX_M], state[IDX_H], state[IDX_N]);
        let (na, k, l) = model.ionic_currents(sv, sm, sh, sn);
        v.push(sv);
        m.push(sm);
        h.push(sh);
        n.push(sn);
        i_na.push(na);
        i_k.push(k);
        i_l.push(l);
    }

    SimulationResult {
        time: grid.points().to_vec(),
        v,
        m,
        h,
        n,
        i_na,
        i_k,
        i_l,
        params: *model.params(),
    }
}

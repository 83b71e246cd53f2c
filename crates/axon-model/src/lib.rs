//! # Axon Model
//!
//! The Hodgkin-Huxley squid-axon membrane model (Hodgkin & Huxley, 1952)
//! expressed as a 4-dimensional `OdeSystem`.
//!
//! ## State layout
//!
//! | Index | Variable | Meaning                          | Units |
//! |-------|----------|----------------------------------|-------|
//! | 0     | V        | Membrane potential               | mV    |
//! | 1     | m        | Na+ activation gate              | [0,1] |
//! | 2     | h        | Na+ inactivation gate            | [0,1] |
//! | 3     | n        | K+ activation gate               | [0,1] |
//!
//! Gating variables are not clamped here: a value escaping [0,1] is the
//! caller's signal of numerical instability, not something to paper over.

use axon_core::{AxonError, Conductance, Current, OdeSystem, Result, StateVector, Time, Voltage};
use serde::{Deserialize, Serialize};

/// Membrane potential index in the state vector
pub const IDX_V: usize = 0;
/// Na+ activation gate index
pub const IDX_M: usize = 1;
/// Na+ inactivation gate index
pub const IDX_H: usize = 2;
/// K+ activation gate index
pub const IDX_N: usize = 3;

/// State dimension of the model
pub const DIMENSION: usize = 4;

// ============================================================================
// PARAMETERS
// ============================================================================

/// Immutable physical constants of one membrane patch
///
/// Set once per run request and never mutated while stepping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Membrane capacitance (uF/cm^2)
    pub cm: f64,
    /// Maximal Na+ conductance (mS/cm^2)
    pub g_na: Conductance,
    /// Maximal K+ conductance (mS/cm^2)
    pub g_k: Conductance,
    /// Leak conductance (mS/cm^2)
    pub g_l: Conductance,
    /// Na+ reversal potential (mV)
    pub e_na: Voltage,
    /// K+ reversal potential (mV)
    pub e_k: Voltage,
    /// Leak reversal potential (mV)
    pub e_l: Voltage,
}

impl Default for ModelParameters {
    /// Classic squid-axon constants
    fn default() -> Self {
        Self {
            cm: 1.0,
            g_na: 120.0,
            g_k: 36.0,
            g_l: 0.3,
            e_na: 50.0,
            e_k: -77.0,
            e_l: -54.387,
        }
    }
}

impl ModelParameters {
    /// Check physical domain constraints before a run starts
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("cm", self.cm),
            ("g_na", self.g_na),
            ("g_k", self.g_k),
            ("g_l", self.g_l),
            ("e_na", self.e_na),
            ("e_k", self.e_k),
            ("e_l", self.e_l),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(AxonError::InvalidParameters(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.cm <= 0.0 {
            return Err(AxonError::InvalidParameters(format!(
                "cm must be positive, got {}",
                self.cm
            )));
        }
        for (name, value) in [("g_na", self.g_na), ("g_k", self.g_k), ("g_l", self.g_l)] {
            if value < 0.0 {
                return Err(AxonError::InvalidParameters(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// RATE FUNCTIONS
// ============================================================================

/// Voltage-dependent gate opening/closing rate (1/ms)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateFunction {
    /// `a*(V+b) / (1 - exp(-(V+b)/c))`
    ///
    /// Removable singularity at `V = -b`; evaluated as the analytic limit
    /// `a*c` there.
    LinearOverExp { a: f64, b: f64, c: f64 },
    /// `a * exp(-(V+b)/c)`
    Exponential { a: f64, b: f64, c: f64 },
    /// `a / (1 + exp(-(V+b)/c))`
    Sigmoid { a: f64, b: f64, c: f64 },
}

impl RateFunction {
    /// Evaluate the rate at a given membrane potential
    pub fn eval(&self, v: Voltage) -> f64 {
        match *self {
            Self::LinearOverExp { a, b, c } => {
                let x = (v + b) / c;
                if x.abs() < 1e-6 {
                    // L'Hopital at the singular point
                    a * c
                } else {
                    a * (v + b) / (1.0 - (-x).exp())
                }
            }
            Self::Exponential { a, b, c } => a * (-(v + b) / c).exp(),
            Self::Sigmoid { a, b, c } => a / (1.0 + (-(v + b) / c).exp()),
        }
    }
}

/// Na+ activation opening rate
pub const ALPHA_M: RateFunction = RateFunction::LinearOverExp {
    a: 0.1,
    b: 40.0,
    c: 10.0,
};
/// Na+ activation closing rate
pub const BETA_M: RateFunction = RateFunction::Exponential {
    a: 4.0,
    b: 65.0,
    c: 18.0,
};
/// Na+ inactivation opening rate
pub const ALPHA_H: RateFunction = RateFunction::Exponential {
    a: 0.07,
    b: 65.0,
    c: 20.0,
};
/// Na+ inactivation closing rate
pub const BETA_H: RateFunction = RateFunction::Sigmoid {
    a: 1.0,
    b: 35.0,
    c: 10.0,
};
/// K+ activation opening rate
pub const ALPHA_N: RateFunction = RateFunction::LinearOverExp {
    a: 0.01,
    b: 55.0,
    c: 10.0,
};
/// K+ activation closing rate
pub const BETA_N: RateFunction = RateFunction::Exponential {
    a: 0.125,
    b: 65.0,
    c: 80.0,
};

/// Voltage-clamp steady state of the m gate
pub fn m_inf(v: Voltage) -> f64 {
    let a = ALPHA_M.eval(v);
    a / (a + BETA_M.eval(v))
}

/// Voltage-clamp steady state of the h gate
pub fn h_inf(v: Voltage) -> f64 {
    let a = ALPHA_H.eval(v);
    a / (a + BETA_H.eval(v))
}

/// Voltage-clamp steady state of the n gate
pub fn n_inf(v: Voltage) -> f64 {
    let a = ALPHA_N.eval(v);
    a / (a + BETA_N.eval(v))
}

// ============================================================================
// STIMULUS
// ============================================================================

/// One constant-current injection window, closed on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusWindow {
    /// Window start (ms)
    pub start: Time,
    /// Window end (ms), inclusive
    pub end: Time,
    /// Injected current while active (uA/cm^2)
    pub amplitude: Current,
}

impl StimulusWindow {
    pub fn contains(&self, t: Time) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Piecewise-constant injected current profile
///
/// The profile is an ordered list of closed windows; outside every window
/// the current is zero. If windows overlap, the FIRST window in declaration
/// order wins. That rule exists only to make the profile deterministic; the
/// stock profiles never overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StimulusProfile {
    pub windows: Vec<StimulusWindow>,
}

impl StimulusProfile {
    /// No injected current at any time
    pub fn none() -> Self {
        Self::default()
    }

    /// A single injection window
    pub fn pulse(start: Time, end: Time, amplitude: Current) -> Self {
        Self {
            windows: vec![StimulusWindow {
                start,
                end,
                amplitude,
            }],
        }
    }

    /// The three-pulse protocol of the classic exercise:
    /// [10,50] -> 20, [100,150] -> 120, [300,350] -> -10 uA/cm^2
    pub fn classic() -> Self {
        Self {
            windows: vec![
                StimulusWindow {
                    start: 10.0,
                    end: 50.0,
                    amplitude: 20.0,
                },
                StimulusWindow {
                    start: 100.0,
                    end: 150.0,
                    amplitude: 120.0,
                },
                StimulusWindow {
                    start: 300.0,
                    end: 350.0,
                    amplitude: -10.0,
                },
            ],
        }
    }

    /// Injected current at time `t`
    pub fn current(&self, t: Time) -> Current {
        self.windows
            .iter()
            .find(|w| w.contains(t))
            .map(|w| w.amplitude)
            .unwrap_or(0.0)
    }
}

// ============================================================================
// MEMBRANE MODEL
// ============================================================================

/// Hodgkin-Huxley membrane patch: parameters plus stimulus protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HodgkinHuxley {
    params: ModelParameters,
    stimulus: StimulusProfile,
}

impl HodgkinHuxley {
    pub fn new(params: ModelParameters, stimulus: StimulusProfile) -> Self {
        Self { params, stimulus }
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn stimulus(&self) -> &StimulusProfile {
        &self.stimulus
    }

    /// Instantaneous Na+ conductance `g_na * m^3 * h`
    pub fn sodium_conductance(&self, m: f64, h: f64) -> Conductance {
        self.params.g_na * m.powi(3) * h
    }

    /// Instantaneous K+ conductance `g_k * n^4`
    pub fn potassium_conductance(&self, n: f64) -> Conductance {
        self.params.g_k * n.powi(4)
    }

    /// Ionic currents `(i_na, i_k, i_l)` at one sample
    pub fn ionic_currents(&self, v: Voltage, m: f64, h: f64, n: f64) -> (Current, Current, Current) {
        let i_na = self.sodium_conductance(m, h) * (v - self.params.e_na);
        let i_k = self.potassium_conductance(n) * (v - self.params.e_k);
        let i_l = self.params.g_l * (v - self.params.e_l);
        (i_na, i_k, i_l)
    }
}

impl OdeSystem for HodgkinHuxley {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn derivatives(&self, t: Time, y: &StateVector) -> StateVector {
        let v = y[IDX_V];
        let m = y[IDX_M];
        let h = y[IDX_H];
        let n = y[IDX_N];

        let (i_na, i_k, i_l) = self.ionic_currents(v, m, h, n);
        let i_inj = self.stimulus.current(t);

        let dv = (i_inj - i_na - i_k - i_l) / self.params.cm;
        let dm = ALPHA_M.eval(v) * (1.0 - m) - BETA_M.eval(v) * m;
        let dh = ALPHA_H.eval(v) * (1.0 - h) - BETA_H.eval(v) * h;
        let dn = ALPHA_N.eval(v) * (1.0 - n) - BETA_N.eval(v) * n;

        StateVector::from(vec![dv, dm, dh, dn])
    }
}

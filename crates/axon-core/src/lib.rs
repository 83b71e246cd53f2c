//! # Axon Core
//!
//! Shared types and utilities for the axon membrane-excitability workspace.
//!
//! ## What lives here
//!
//! 1. Scalar type aliases used across all crates
//! 2. The common error enum and `Result`
//! 3. The `OdeSystem` trait that decouples models from integrators
//! 4. `TimeGrid`, the fixed-step sampling of a simulation interval
//! 5. `Method`, the closed set of supported step integrators
//!
//! ## Design Philosophy
//!
//! 1. Models and integrators meet only through `OdeSystem`
//! 2. Configuration is validated up front, never inside the step loop
//! 3. Failures are typed, never downgraded to default values

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Common errors
#[derive(Debug, Error)]
pub enum AxonError {
    #[error("unknown integration method: {0}")]
    InvalidMethod(String),

    #[error("invalid parameter: {0}")]
    InvalidParameters(String),

    #[error("implicit step failed to converge at t = {t} ms (residual {residual:e})")]
    NonConvergence { t: f64, residual: f64 },

    #[error("format error: {0}")]
    Format(String),

    #[error("run cancelled at t = {t} ms")]
    Cancelled { t: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AxonError>;

/// Time point (ms)
pub type Time = f64;

/// Membrane potential (mV)
pub type Voltage = f64;

/// Current density (uA/cm^2)
pub type Current = f64;

/// Conductance (mS/cm^2)
pub type Conductance = f64;

/// State vector for ODE systems
pub type StateVector = Array1<f64>;

/// ODE system trait (implemented by membrane models)
pub trait OdeSystem {
    /// System dimension
    fn dimension(&self) -> usize;

    /// Compute derivatives: dy/dt = f(t, y)
    fn derivatives(&self, t: Time, y: &StateVector) -> StateVector;
}

/// Step integration method
///
/// A closed set: method choice is resolved once when a run is configured,
/// not re-branched on a name inside the step loop. `EulerModified` is the
/// sole implicit variant and requires a per-step nonlinear solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    EulerForward,
    RungeKutta2,
    RungeKutta4,
    EulerModified,
}

impl Method {
    /// Canonical name, matching the historical request keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::EulerForward => "eulerForward",
            Method::RungeKutta2 => "rungeKutta2",
            Method::RungeKutta4 => "rungeKutta4",
            Method::EulerModified => "eulerModified",
        }
    }

    /// True for methods that solve for the next state implicitly
    pub fn is_implicit(&self) -> bool {
        matches!(self, Method::EulerModified)
    }
}

impl FromStr for Method {
    type Err = AxonError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eulerForward" | "euler-forward" | "euler_forward" | "euler" => {
                Ok(Method::EulerForward)
            }
            "rungeKutta2" | "runge-kutta-2" | "runge_kutta_2" | "rk2" | "midpoint" => {
                Ok(Method::RungeKutta2)
            }
            "rungeKutta4" | "runge-kutta-4" | "runge_kutta_4" | "rk4" => Ok(Method::RungeKutta4),
            "eulerModified" | "euler-modified" | "euler_modified" => Ok(Method::EulerModified),
            other => Err(AxonError::InvalidMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative slack used to decide whether (t1 - t0) is an exact multiple of h
const GRID_ROUNDING_GUARD: f64 = 1e-9;

/// Fixed-step time grid over `[t0, t1]`, inclusive on both ends
///
/// Points are `t0 + i*h`; the final point is forced to exactly `t1`. When
/// the span is not a whole number of steps the grid rounds up, so the last
/// interval is shorter than `h` and `t1` is never truncated away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    points: Vec<Time>,
    h: f64,
}

impl TimeGrid {
    pub fn new(t0: Time, t1: Time, h: f64) -> Result<Self> {
        if !t0.is_finite() || !t1.is_finite() {
            return Err(AxonError::InvalidParameters(
                "t0 and t1 must be finite".into(),
            ));
        }
        if t1 <= t0 {
            return Err(AxonError::InvalidParameters(format!(
                "t1 ({t1}) must be greater than t0 ({t0})"
            )));
        }
        if !(h.is_finite() && h > 0.0) {
            return Err(AxonError::InvalidParameters(format!(
                "step size h ({h}) must be finite and positive"
            )));
        }

        let steps = (t1 - t0) / h;
        let rounded = steps.round();
        // Floating division of an exact multiple can land just under the
        // integer; snap to it instead of inventing an extra point.
        let n_steps = if (steps - rounded).abs() <= GRID_ROUNDING_GUARD * steps.max(1.0) {
            rounded as usize
        } else {
            steps.ceil() as usize
        };
        // A single over-long step still yields both endpoints.
        let n_steps = n_steps.max(1);

        let mut points = Vec::with_capacity(n_steps + 1);
        for i in 0..n_steps {
            points.push(t0 + i as f64 * h);
        }
        points.push(t1);

        Ok(Self { points, h })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, i: usize) -> Time {
        self.points[i]
    }

    pub fn points(&self) -> &[Time] {
        &self.points
    }

    pub fn t0(&self) -> Time {
        self.points[0]
    }

    pub fn t1(&self) -> Time {
        *self.points.last().expect("grid is never empty")
    }

    /// Nominal step size; the final interval may be shorter
    pub fn step_size(&self) -> f64 {
        self.h
    }

    /// Actual width of interval `i` (between points `i` and `i + 1`)
    pub fn interval(&self, i: usize) -> f64 {
        self.points[i + 1] - self.points[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!("rungeKutta4".parse::<Method>().unwrap(), Method::RungeKutta4);
        assert_eq!("rk2".parse::<Method>().unwrap(), Method::RungeKutta2);
        assert_eq!("euler".parse::<Method>().unwrap(), Method::EulerForward);
        assert_eq!(
            "eulerModified".parse::<Method>().unwrap(),
            Method::EulerModified
        );
        assert!(Method::EulerModified.is_implicit());
        assert!(!Method::RungeKutta4.is_implicit());
    }

    #[test]
    fn test_unknown_method_is_reported() {
        let err = "eulerBackward".parse::<Method>().unwrap_err();
        assert!(matches!(err, AxonError::InvalidMethod(name) if name == "eulerBackward"));
    }

    #[test]
    fn test_method_serde_round_trip() {
        let json = serde_json::to_string(&Method::RungeKutta2).unwrap();
        let back: Method = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Method::RungeKutta2);
    }

    #[test]
    fn test_grid_sizing_exact_multiple() {
        // 0..500 at h = 0.01 is the canonical full-run grid
        let grid = TimeGrid::new(0.0, 500.0, 0.01).unwrap();
        assert_eq!(grid.len(), 50001);
        assert_eq!(grid.t1(), 500.0);
        assert_eq!(grid.point(0), 0.0);
    }

    #[test]
    fn test_grid_rounds_up_to_include_t1() {
        let grid = TimeGrid::new(0.0, 1.0, 0.3).unwrap();
        assert_eq!(grid.points(), &[0.0, 0.3, 0.6, 0.8999999999999999, 1.0]);
        assert!(grid.interval(3) < grid.step_size());
        assert_eq!(grid.t1(), 1.0);
    }

    #[test]
    fn test_grid_rejects_bad_bounds() {
        assert!(matches!(
            TimeGrid::new(10.0, 10.0, 0.1),
            Err(AxonError::InvalidParameters(_))
        ));
        assert!(matches!(
            TimeGrid::new(0.0, 1.0, 0.0),
            Err(AxonError::InvalidParameters(_))
        ));
        assert!(matches!(
            TimeGrid::new(0.0, f64::NAN, 0.1),
            Err(AxonError::InvalidParameters(_))
        ));
        assert!(matches!(
            TimeGrid::new(0.0, 1.0, -0.5),
            Err(AxonError::InvalidParameters(_))
        ));
    }
}

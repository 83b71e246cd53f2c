//! # Axon Solver
//!
//! Fixed-step integration strategies for `OdeSystem`s, plus the multivariate
//! Newton root-finder that backs the implicit method.
//!
//! ## Methods
//!
//! | Method          | Kind     | Order | Per-step cost              |
//! |-----------------|----------|-------|----------------------------|
//! | `EulerForward`  | explicit | 1     | 1 derivative evaluation    |
//! | `RungeKutta2`   | explicit | 2     | 2 derivative evaluations   |
//! | `RungeKutta4`   | explicit | 4     | 4 derivative evaluations   |
//! | `EulerModified` | implicit | 1     | Newton solve per step      |
//!
//! Each step is pure and deterministic: state in, state out, no shared
//! mutable anything. Step `i` of a trajectory depends on step `i - 1`, so
//! there is nothing to parallelize inside a run.

use axon_core::{AxonError, Method, OdeSystem, Result, StateVector, Time};
use nalgebra::{DMatrix, DVector};

// ============================================================================
// NEWTON ROOT-FINDER
// ============================================================================

/// Why a Newton solve gave up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonFailure {
    /// Euclidean residual norm at the last iterate
    pub residual: f64,
    /// Iterations spent before giving up
    pub iterations: usize,
}

/// Multivariate Newton-Raphson with a finite-difference Jacobian
///
/// Both knobs are public so callers can trade accuracy against budget;
/// convergence failure is a value, not a panic, so the failure mode is
/// testable in isolation from any integrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSolver {
    /// Residual norm below which the iterate is accepted
    pub tolerance: f64,
    /// Iteration budget
    pub max_iterations: usize,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
        }
    }
}

/// Finite-difference perturbation for the Jacobian
const JACOBIAN_H: f64 = 1e-8;

impl NewtonSolver {
    /// Find `x` with `f(x) = 0`, starting from `seed`
    pub fn solve<F>(&self, f: F, seed: &StateVector) -> std::result::Result<StateVector, NewtonFailure>
    where
        F: Fn(&StateVector) -> StateVector,
    {
        let n = seed.len();
        let mut x = seed.clone();
        let mut residual = f64::INFINITY;

        for iteration in 0..self.max_iterations {
            let fx = f(&x);
            residual = fx.iter().map(|v| v * v).sum::<f64>().sqrt();
            if residual < self.tolerance {
                return Ok(x);
            }

            let jacobian = Self::numerical_jacobian(&f, &x, &fx);
            let j = DMatrix::from_row_slice(n, n, &jacobian);
            let rhs = DVector::from_iterator(n, fx.iter().map(|v| -v));

            match j.lu().solve(&rhs) {
                Some(delta) => {
                    for i in 0..n {
                        x[i] += delta[i];
                    }
                }
                // Singular Jacobian: no direction to move in
                None => {
                    return Err(NewtonFailure {
                        residual,
                        iterations: iteration,
                    })
                }
            }
        }

        Err(NewtonFailure {
            residual,
            iterations: self.max_iterations,
        })
    }

    /// Row-major Jacobian of `f` at `x` via forward differences
    fn numerical_jacobian<F>(f: &F, x: &StateVector, f0: &StateVector) -> Vec<f64>
    where
        F: Fn(&StateVector) -> StateVector,
    {
        let n = x.len();
        let mut jacobian = vec![0.0; n * n];

        for j in 0..n {
            let mut x_plus = x.clone();
            x_plus[j] += JACOBIAN_H;
            let f_plus = f(&x_plus);

            for i in 0..n {
                jacobian[i * n + j] = (f_plus[i] - f0[i]) / JACOBIAN_H;
            }
        }

        jacobian
    }
}

// ============================================================================
// STEP INTEGRATORS
// ============================================================================

/// One configured step strategy
///
/// Built once per run; the method is dispatched here, never by name inside
/// the step loop.
#[derive(Debug, Clone, Copy)]
pub struct Stepper {
    method: Method,
    newton: NewtonSolver,
}

impl Stepper {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            newton: NewtonSolver::default(),
        }
    }

    /// Same, with an explicit solver for the implicit method
    pub fn with_newton(method: Method, newton: NewtonSolver) -> Self {
        Self { method, newton }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Advance one state by `dt`, starting at time `t`
    pub fn step<S: OdeSystem>(
        &self,
        system: &S,
        y: &StateVector,
        t: Time,
        dt: f64,
    ) -> Result<StateVector> {
        match self.method {
            Method::EulerForward => Ok(euler_forward(system, y, t, dt)),
            Method::RungeKutta2 => Ok(runge_kutta_2(system, y, t, dt)),
            Method::RungeKutta4 => Ok(runge_kutta_4(system, y, t, dt)),
            Method::EulerModified => euler_modified(system, y, t, dt, &self.newton),
        }
    }
}

/// Explicit Euler: `y + dt * f(t, y)`
fn euler_forward<S: OdeSystem>(system: &S, y: &StateVector, t: Time, dt: f64) -> StateVector {
    let k = system.derivatives(t, y);
    y + &(k * dt)
}

/// Classical midpoint rule: evaluate the slope at the half step
fn runge_kutta_2<S: OdeSystem>(system: &S, y: &StateVector, t: Time, dt: f64) -> StateVector {
    let k1 = system.derivatives(t, y);
    let mid = y + &(k1 * (0.5 * dt));
    let k2 = system.derivatives(t + 0.5 * dt, &mid);
    y + &(k2 * dt)
}

/// Classical fourth-order Runge-Kutta
fn runge_kutta_4<S: OdeSystem>(system: &S, y: &StateVector, t: Time, dt: f64) -> StateVector {
    let k1 = system.derivatives(t, y);
    let y2 = y + &(&k1 * (0.5 * dt));
    let k2 = system.derivatives(t + 0.5 * dt, &y2);
    let y3 = y + &(&k2 * (0.5 * dt));
    let k3 = system.derivatives(t + 0.5 * dt, &y3);
    let y4 = y + &(&k3 * dt);
    let k4 = system.derivatives(t + dt, &y4);

    let weighted = k1 + k2 * 2.0 + k3 * 2.0 + k4;
    y + &(weighted * (dt / 6.0))
}

/// Implicit ("modified") Euler: solve `z - y - dt * f(t + dt, z) = 0` for
/// the next state `z`, seeded with the current state
fn euler_modified<S: OdeSystem>(
    system: &S,
    y: &StateVector,
    t: Time,
    dt: f64,
    newton: &NewtonSolver,
) -> Result<StateVector> {
    let t_next = t + dt;
    let residual_fn = |z: &StateVector| {
        let dz = system.derivatives(t_next, z);
        z - y - &(dz * dt)
    };

    newton.solve(residual_fn, y).map_err(|failure| {
        log::warn!(
            "implicit Euler: Newton gave up at t = {t_next} ms after {} iterations (residual {:e})",
            failure.iterations,
            failure.residual
        );
        AxonError::NonConvergence {
            t: t_next,
            residual: failure.residual,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_model::{HodgkinHuxley, ModelParameters, StimulusProfile, IDX_H, IDX_M, IDX_N};
    use float_cmp::approx_eq;
    use ndarray::array;

    /// dy/dt = -y, the usual integrator yardstick
    struct Decay;

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivatives(&self, _t: Time, y: &StateVector) -> StateVector {
            y * -1.0
        }
    }

    #[test]
    fn test_newton_scalar_root() {
        let solver = NewtonSolver::default();
        let root = solver
            .solve(|z| array![z[0] * z[0] - 4.0], &array![3.0])
            .unwrap();
        assert!(approx_eq!(f64, root[0], 2.0, epsilon = 1e-8));
    }

    #[test]
    fn test_newton_two_dimensional() {
        // x + y = 3, x * y = 2
        let solver = NewtonSolver::default();
        let root = solver
            .solve(
                |z| array![z[0] + z[1] - 3.0, z[0] * z[1] - 2.0],
                &array![0.5, 2.5],
            )
            .unwrap();
        assert!(approx_eq!(f64, root[0] + root[1], 3.0, epsilon = 1e-8));
        assert!(approx_eq!(f64, root[0] * root[1], 2.0, epsilon = 1e-8));
    }

    #[test]
    fn test_newton_budget_exhaustion() {
        // z^2 + 1 has no real root; the budget must run out, not spin
        let solver = NewtonSolver {
            tolerance: 1e-10,
            max_iterations: 8,
        };
        let failure = solver
            .solve(|z| array![z[0] * z[0] + 1.0], &array![1.0])
            .unwrap_err();
        assert_eq!(failure.iterations, 8);
        assert!(failure.residual.is_finite());
        assert!(failure.residual > 0.0);
    }

    #[test]
    fn test_newton_singular_jacobian() {
        let solver = NewtonSolver::default();
        let failure = solver.solve(|_| array![1.0], &array![0.0]).unwrap_err();
        assert_eq!(failure.residual, 1.0);
    }

    #[test]
    fn test_single_steps_on_decay() {
        let dt = 0.1;
        let y0 = array![1.0];

        let euler = Stepper::new(Method::EulerForward)
            .step(&Decay, &y0, 0.0, dt)
            .unwrap();
        assert!(approx_eq!(f64, euler[0], 1.0 - dt, epsilon = 1e-14));

        let rk2 = Stepper::new(Method::RungeKutta2)
            .step(&Decay, &y0, 0.0, dt)
            .unwrap();
        assert!(approx_eq!(f64, rk2[0], 1.0 - dt + dt * dt / 2.0, epsilon = 1e-14));

        let rk4 = Stepper::new(Method::RungeKutta4)
            .step(&Decay, &y0, 0.0, dt)
            .unwrap();
        let series4 = 1.0 - dt + dt * dt / 2.0 - dt * dt * dt / 6.0 + dt * dt * dt * dt / 24.0;
        assert!(approx_eq!(f64, rk4[0], series4, epsilon = 1e-14));

        // Implicit Euler on decay has the closed form y / (1 + dt)
        let implicit = Stepper::new(Method::EulerModified)
            .step(&Decay, &y0, 0.0, dt)
            .unwrap();
        assert!(approx_eq!(f64, implicit[0], 1.0 / (1.0 + dt), epsilon = 1e-7));
    }

    #[test]
    fn test_implicit_step_respects_tight_budget() {
        // Zero iterations can never reach the tolerance
        let starved = NewtonSolver {
            tolerance: 1e-15,
            max_iterations: 0,
        };
        let err = Stepper::with_newton(Method::EulerModified, starved)
            .step(&Decay, &array![1.0], 0.5, 0.1)
            .unwrap_err();
        match err {
            AxonError::NonConvergence { t, .. } => assert!(approx_eq!(f64, t, 0.6, ulps = 2)),
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }

    #[test]
    fn test_hh_step_stays_physical() {
        let model = HodgkinHuxley::new(ModelParameters::default(), StimulusProfile::classic());
        let y0 = array![-65.0, 0.05, 0.5, 0.4];

        for method in [
            Method::EulerForward,
            Method::RungeKutta2,
            Method::RungeKutta4,
            Method::EulerModified,
        ] {
            let y1 = Stepper::new(method).step(&model, &y0, 0.0, 0.01).unwrap();
            assert!(y1.iter().all(|v| v.is_finite()), "{method}");
            for idx in [IDX_M, IDX_H, IDX_N] {
                assert!((0.0..=1.0).contains(&y1[idx]), "{method} gate {idx}");
            }
        }
    }
}

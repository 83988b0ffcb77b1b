//! Conjugate Gradient Least Squares.
//!
//! Solves `min ‖J·dx − b‖²` for a [`GaussianFactorGraph`] by running conjugate gradient on
//! the normal equations `JᵀJ·dx = Jᵀb` without ever forming `JᵀJ`. Each iteration costs one
//! product with `J` and one with `Jᵀ` over the block-sparse Jacobian.
//!
//! ```text
//! r = b − J·dx,  s = Jᵀr,  p = s,  γ = ‖s‖²
//! loop:
//!     q  = J·p
//!     α  = γ / ‖q‖²
//!     dx = dx + α·p
//!     r  = r − α·q
//!     s  = Jᵀr
//!     γ' = ‖s‖²
//!     p  = s + (γ'/γ)·p
//! until ‖s‖ / ‖s₀‖ < precision or the iteration budget runs out
//! ```
//!
//! Running out of iterations is not an error: the caller receives the last iterate and a
//! [`CglsSummary`] saying how the loop ended.

use crate::core::gaussian_factor_graph::GaussianFactorGraph;
use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
};
use tracing::{debug, trace, warn};

/// How a CGLS run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CglsStatus {
    /// `‖s‖ / ‖s₀‖` dropped below the requested precision (or `s₀` was already zero)
    Converged,
    /// The iteration budget was exhausted first
    MaxIterationsReached,
    /// `‖J·p‖²` or `‖s‖²` became zero or non-finite; `dx` holds the last finite iterate
    Breakdown,
}

impl Display for CglsStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CglsStatus::Converged => write!(f, "Converged"),
            CglsStatus::MaxIterationsReached => write!(f, "Maximum iterations reached"),
            CglsStatus::Breakdown => write!(f, "Numerical breakdown"),
        }
    }
}

/// Outcome of [`Cgls::optimize`].
#[derive(Debug, Clone, PartialEq)]
pub struct CglsSummary {
    /// Iterations actually performed
    pub iterations: usize,
    pub status: CglsStatus,
    /// `‖Jᵀ(b − J·dx₀)‖`
    pub initial_gradient_norm: f64,
    /// `‖Jᵀ(b − J·dx)‖` at the returned iterate
    pub final_gradient_norm: f64,
}

impl Display for CglsSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CGLS {} after {} iterations (|s0| = {:.3e}, |s| = {:.3e})",
            self.status, self.iterations, self.initial_gradient_norm, self.final_gradient_norm
        )
    }
}

/// Conjugate gradient least-squares solver configuration.
///
/// ```
/// use apex_fusion::linalg::Cgls;
///
/// let solver = Cgls::new(1e-6, 500).with_max_iteration(100);
/// assert_eq!(solver.max_iteration, 100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cgls {
    /// Relative gradient reduction `‖s‖ / ‖s₀‖` at which the solver stops
    pub precision: f64,
    /// Upper bound on iterations
    pub max_iteration: usize,
}

impl Default for Cgls {
    fn default() -> Self {
        Self {
            precision: 1e-6,
            max_iteration: 500,
        }
    }
}

impl Cgls {
    pub fn new(precision: f64, max_iteration: usize) -> Self {
        Self {
            precision,
            max_iteration,
        }
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_max_iteration(mut self, max_iteration: usize) -> Self {
        self.max_iteration = max_iteration;
        self
    }

    /// Improve `dx` in place toward `argmin ‖J·dx − b‖²`.
    ///
    /// `dx` is both the starting point and the result. Entries beyond the Jacobian's column
    /// count are carried along untouched.
    ///
    /// # Panics
    /// If `dx` is shorter than the Jacobian's column count.
    pub fn optimize(&self, graph: &GaussianFactorGraph, dx: &mut DVector<f64>) -> CglsSummary {
        let jacobian = graph.jacobian();
        let n = dx.len();
        assert!(
            n >= jacobian.column_count(),
            "initial guess of length {n} is shorter than the {} Jacobian columns",
            jacobian.column_count()
        );
        let m = graph.row_count();

        // r = b - J·dx
        let mut r = vec![0.0; m];
        graph.bias().accumulate_into(&mut r);
        let mut q = vec![0.0; m];
        jacobian.accumulate_mul(dx.as_slice(), &mut q);
        r.iter_mut().zip(&q).for_each(|(ri, qi)| *ri -= qi);

        let mut s = vec![0.0; n];
        jacobian.accumulate_dual(&r, &mut s);
        let mut p = s.clone();
        let mut gamma = squared_norm(&s);
        let norm_s0 = gamma.sqrt();

        let summary = |iterations: usize, status: CglsStatus, gamma: f64| CglsSummary {
            iterations,
            status,
            initial_gradient_norm: norm_s0,
            final_gradient_norm: gamma.sqrt(),
        };

        if !norm_s0.is_finite() {
            warn!("CGLS: initial gradient is not finite, leaving the guess unchanged");
            return summary(0, CglsStatus::Breakdown, gamma);
        }
        if norm_s0 == 0.0 {
            debug!("CGLS: initial guess already minimizes the residual");
            return summary(0, CglsStatus::Converged, gamma);
        }

        for iteration in 1..=self.max_iteration {
            q.iter_mut().for_each(|qi| *qi = 0.0);
            jacobian.accumulate_mul(&p, &mut q);
            let q_squared = squared_norm(&q);
            if !q_squared.is_finite() || q_squared <= f64::MIN_POSITIVE {
                warn!(
                    "CGLS breakdown at iteration {}: |J·p|² = {:.3e}",
                    iteration, q_squared
                );
                return summary(iteration - 1, CglsStatus::Breakdown, gamma);
            }

            let alpha = gamma / q_squared;
            dx.iter_mut().zip(&p).for_each(|(x, pi)| *x += alpha * pi);
            r.iter_mut().zip(&q).for_each(|(ri, qi)| *ri -= alpha * qi);

            s.iter_mut().for_each(|si| *si = 0.0);
            jacobian.accumulate_dual(&r, &mut s);
            let gamma_next = squared_norm(&s);
            if !gamma_next.is_finite() {
                warn!(
                    "CGLS breakdown at iteration {}: |s|² is not finite",
                    iteration
                );
                return summary(iteration, CglsStatus::Breakdown, gamma);
            }

            let ratio = gamma_next.sqrt() / norm_s0;
            trace!("CGLS iteration {:>4}: |s|/|s0| = {:.3e}", iteration, ratio);
            if ratio < self.precision {
                debug!(
                    "CGLS converged after {} iterations (|s|/|s0| = {:.3e})",
                    iteration, ratio
                );
                return summary(iteration, CglsStatus::Converged, gamma_next);
            }

            let beta = gamma_next / gamma;
            p.iter_mut().zip(&s).for_each(|(pi, si)| *pi = si + beta * *pi);
            gamma = gamma_next;
        }

        debug!(
            "CGLS stopped after {} iterations without reaching precision {:.1e}",
            self.max_iteration, self.precision
        );
        summary(self.max_iteration, CglsStatus::MaxIterationsReached, gamma)
    }
}

fn squared_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{BlockMatrix, BlockVector};

    fn dense_graph(rows: &[Vec<f64>], bias: Vec<f64>) -> GaussianFactorGraph {
        GaussianFactorGraph::new(BlockMatrix::from_dense_rows(rows), BlockVector::new(bias))
    }

    #[test]
    fn test_default_configuration() {
        let cgls = Cgls::default();
        assert_eq!(cgls.precision, 1e-6);
        assert_eq!(cgls.max_iteration, 500);
        assert_eq!(
            Cgls::new(1e-3, 7),
            Cgls::default().with_precision(1e-3).with_max_iteration(7)
        );
    }

    #[test]
    fn test_square_system() {
        // [4 1] x = [1]
        // [1 3]     [2]
        let graph = dense_graph(&[vec![4.0, 1.0], vec![1.0, 3.0]], vec![1.0, 2.0]);
        let mut dx = DVector::zeros(2);
        let summary = Cgls::new(1e-12, 50).optimize(&graph, &mut dx);

        assert_eq!(summary.status, CglsStatus::Converged);
        assert!(summary.iterations <= 2);
        assert!((dx[0] - 1.0 / 11.0).abs() < 1e-10);
        assert!((dx[1] - 7.0 / 11.0).abs() < 1e-10);
    }

    #[test]
    fn test_overdetermined_system_matches_normal_equations() {
        let rows = vec![
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
            vec![1.0, 3.0],
        ];
        let bias = vec![1.0, 2.9, 5.1, 7.0];
        let graph = dense_graph(&rows, bias.clone());
        let mut dx = DVector::zeros(2);
        let summary = Cgls::new(1e-12, 50).optimize(&graph, &mut dx);
        assert_eq!(summary.status, CglsStatus::Converged);

        let j = graph.jacobian().to_dense();
        let b = DVector::from_vec(bias);
        let expected = (j.transpose() * &j)
            .try_inverse()
            .expect("full column rank")
            * j.transpose()
            * b;
        assert!((dx - expected).norm() < 1e-9);
    }

    #[test]
    fn test_exact_initial_guess_converges_immediately() {
        let graph = dense_graph(&[vec![2.0, 0.0], vec![0.0, 2.0]], vec![2.0, 4.0]);
        let mut dx = DVector::from_vec(vec![1.0, 2.0]);
        let summary = Cgls::default().optimize(&graph, &mut dx);
        assert_eq!(summary.status, CglsStatus::Converged);
        assert_eq!(summary.iterations, 0);
        assert_eq!(dx.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn test_iteration_budget_is_respected() {
        let graph = dense_graph(
            &[
                vec![4.0, 1.0, 0.0],
                vec![1.0, 3.0, 1.0],
                vec![0.0, 1.0, 2.0],
            ],
            vec![1.0, 2.0, 3.0],
        );
        let mut dx = DVector::zeros(3);
        let summary = Cgls::new(1e-14, 1).optimize(&graph, &mut dx);
        assert_eq!(summary.status, CglsStatus::MaxIterationsReached);
        assert_eq!(summary.iterations, 1);
        assert!(summary.final_gradient_norm > 0.0);
    }

    #[test]
    fn test_longer_guess_keeps_extra_entries() {
        let graph = dense_graph(&[vec![2.0]], vec![4.0]);
        let mut dx = DVector::from_vec(vec![0.0, 7.0]);
        Cgls::default().optimize(&graph, &mut dx);
        assert!((dx[0] - 2.0).abs() < 1e-12);
        assert_eq!(dx[1], 7.0);
    }

    #[test]
    fn test_non_finite_system_reports_breakdown() {
        let graph = dense_graph(&[vec![f64::NAN]], vec![1.0]);
        let mut dx = DVector::zeros(1);
        let summary = Cgls::default().optimize(&graph, &mut dx);
        assert_eq!(summary.status, CglsStatus::Breakdown);
        assert_eq!(dx[0], 0.0);
    }

    #[test]
    #[should_panic]
    fn test_short_guess_panics() {
        let graph = dense_graph(&[vec![1.0, 1.0]], vec![1.0]);
        let mut dx = DVector::zeros(1);
        Cgls::default().optimize(&graph, &mut dx);
    }
}

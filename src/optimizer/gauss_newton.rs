//! Gauss-Newton iteration over a nonlinear factor graph.
//!
//! Minimizes the total factor cost
//!
//! ```text
//! F(x) = Σᵢ ‖rᵢ(x)‖²
//! ```
//!
//! where each `rᵢ` is the residual of one factor and `x` ranges over a product of Lie groups.
//!
//! # Algorithm
//!
//! At each iteration k:
//!
//! 1. **Linearize** every factor at `xₖ`: `rᵢ(xₖ ⊕ h) ≈ rᵢ(xₖ) + Jᵢ·h`, stacked into one
//!    [`GaussianFactorGraph`](crate::core::gaussian_factor_graph::GaussianFactorGraph)
//!    `J·h ≈ -r`
//! 2. **Solve** `min ‖J·h + r‖²` with [`Cgls`], starting from `h = 0`
//! 3. **Retract** every variable along its slice of `h`: `xₖ₊₁ = xₖ ⊕ h`
//! 4. **Check** termination: non-finite values, timeout, iteration budget, step norm,
//!    relative cost change (in that order)
//!
//! The full step is always taken, so the method converges quadratically near a solution with
//! small residuals but can diverge from a poor initial guess.
//!
//! # Example
//!
//! ```
//! use apex_fusion::core::{factor_graph::NonlinearFactorGraph, values::Values};
//! use apex_fusion::factors::{BetweenFactor, PriorFactor};
//! use apex_fusion::manifold::Pose2;
//! use apex_fusion::optimizer::{GaussNewton, GaussNewtonConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = NonlinearFactorGraph::new();
//! graph += PriorFactor::new(0, Pose2::new(0.0, 0.0, 0.0));
//! graph += BetweenFactor::new(0, 1, Pose2::new(1.0, 0.0, 0.0));
//!
//! let mut values = Values::new();
//! values.insert(0, Pose2::new(0.2, -0.1, 0.05));
//! values.insert(1, Pose2::new(0.7, 0.3, -0.1));
//!
//! let solver = GaussNewton::with_config(GaussNewtonConfig::new().with_max_iterations(20));
//! let summary = solver.optimize(&graph, &mut values)?;
//! assert!(summary.final_cost < 1e-10);
//! # Ok(())
//! # }
//! ```

use crate::core::CoreError;
use crate::core::factor_graph::NonlinearFactorGraph;
use crate::core::values::Values;
use crate::error::ApexFusionResult;
use crate::linalg::{BlockVector, Cgls, CglsStatus};
use crate::optimizer::{OptimizationStatus, OptimizerError};
use nalgebra::DVector;
use std::fmt;
use tracing::{debug, info};
use web_time as time;

/// Summary statistics for one Gauss-Newton run.
#[derive(Debug, Clone)]
pub struct GaussNewtonSummary {
    /// Cost at the initial values
    pub initial_cost: f64,
    /// Cost at the returned values
    pub final_cost: f64,
    /// Total number of iterations performed
    pub iterations: usize,
    /// Largest `‖Jᵀr‖` seen at a linearization point
    pub max_gradient_norm: f64,
    /// `‖Jᵀr‖` at the last linearization point
    pub final_gradient_norm: f64,
    /// Largest step norm taken
    pub max_step_norm: f64,
    /// Norm of the last step
    pub final_step_norm: f64,
    /// CGLS iterations summed over all outer iterations
    pub linear_solver_iterations: usize,
    pub total_time: time::Duration,
    pub average_time_per_iteration: time::Duration,
    /// Per-iteration statistics, recorded only when DEBUG logging is enabled
    pub iteration_history: Vec<IterationStats>,
    pub status: OptimizationStatus,
}

/// Per-iteration statistics for the DEBUG progress table.
#[derive(Debug, Clone)]
pub struct IterationStats {
    /// Iteration number (0-indexed)
    pub iteration: usize,
    /// Cost after the step
    pub cost: f64,
    /// Cost before the step minus cost after it
    pub cost_change: f64,
    /// `‖Jᵀr‖` at the linearization point
    pub gradient_norm: f64,
    /// `‖h‖`
    pub step_norm: f64,
    /// CGLS iterations spent on this step
    pub cgls_iterations: usize,
    pub cgls_status: CglsStatus,
    pub iter_time_ms: f64,
    pub total_time_ms: f64,
}

impl IterationStats {
    pub fn print_header() {
        debug!(
            "{:>4}  {:>13}  {:>13}  {:>13}  {:>13}  {:>8}  {:>11}  {:>13}  {:>10}",
            "iter",
            "cost",
            "cost_change",
            "|gradient|",
            "|step|",
            "cgls_it",
            "iter_time",
            "total_time",
            "cgls"
        );
    }

    pub fn print_line(&self) {
        let cgls = match self.cgls_status {
            CglsStatus::Converged => "ok",
            CglsStatus::MaxIterationsReached => "max_iter",
            CglsStatus::Breakdown => "breakdown",
        };
        debug!(
            "{:>4}  {:>13.6e}  {:>13.2e}  {:>13.2e}  {:>13.2e}  {:>8}  {:>9.2}ms  {:>11.2}ms  {:>10}",
            self.iteration,
            self.cost,
            self.cost_change,
            self.gradient_norm,
            self.step_norm,
            self.cgls_iterations,
            self.iter_time_ms,
            self.total_time_ms,
            cgls
        );
    }
}

impl fmt::Display for GaussNewtonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gauss-Newton Final Result")?;
        if self.status.is_converged() {
            writeln!(f, "CONVERGED ({})", self.status)?;
        } else {
            writeln!(f, "NOT CONVERGED ({})", self.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Cost:")?;
        writeln!(f, "  Initial:   {:.6e}", self.initial_cost)?;
        writeln!(f, "  Final:     {:.6e}", self.final_cost)?;
        writeln!(
            f,
            "  Reduction: {:.6e} ({:.2}%)",
            self.initial_cost - self.final_cost,
            100.0 * (self.initial_cost - self.final_cost) / self.initial_cost.max(1e-12)
        )?;
        writeln!(f)?;
        writeln!(f, "Iterations:")?;
        writeln!(f, "  Outer: {}", self.iterations)?;
        writeln!(f, "  CGLS:  {}", self.linear_solver_iterations)?;
        writeln!(f)?;
        writeln!(f, "Gradient:")?;
        writeln!(f, "  Max norm:   {:.2e}", self.max_gradient_norm)?;
        writeln!(f, "  Final norm: {:.2e}", self.final_gradient_norm)?;
        writeln!(f)?;
        writeln!(f, "Step:")?;
        writeln!(f, "  Max norm:   {:.2e}", self.max_step_norm)?;
        writeln!(f, "  Final norm: {:.2e}", self.final_step_norm)?;
        writeln!(f)?;
        writeln!(f, "Performance:")?;
        writeln!(
            f,
            "  Total time:             {:.2}ms",
            self.total_time.as_secs_f64() * 1000.0
        )?;
        write!(
            f,
            "  Average per iteration:  {:.2}ms",
            self.average_time_per_iteration.as_secs_f64() * 1000.0
        )
    }
}

/// Configuration parameters for the Gauss-Newton optimizer.
///
/// ```
/// use apex_fusion::linalg::Cgls;
/// use apex_fusion::optimizer::GaussNewtonConfig;
///
/// let config = GaussNewtonConfig::new()
///     .with_max_iterations(20)
///     .with_cost_tolerance(1e-9)
///     .with_linear_solver(Cgls::new(1e-8, 1000));
/// assert_eq!(config.linear_solver.max_iteration, 1000);
/// ```
///
/// # Termination
///
/// The optimizer stops when ANY of the following holds after a step:
///
/// - **Invalid values**: the new cost or the step norm is NaN/Inf
/// - **Timeout**: `elapsed >= timeout`
/// - **Maximum iterations**: `iteration + 1 >= max_iterations`
/// - **Parameter tolerance** (from the second iteration on): `‖h‖ <= parameter_tolerance`
/// - **Cost tolerance** (from the second iteration on):
///   `|F_before - F_after| / max(F_before, 1e-10) < cost_tolerance`
#[derive(Debug, Clone)]
pub struct GaussNewtonConfig {
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    /// Relative cost change tolerance
    pub cost_tolerance: f64,
    /// Step norm tolerance
    pub parameter_tolerance: f64,
    pub timeout: Option<time::Duration>,
    /// Inner least-squares solver
    pub linear_solver: Cgls,
}

impl Default for GaussNewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            cost_tolerance: 1e-6,
            parameter_tolerance: 1e-8,
            timeout: None,
            linear_solver: Cgls::default(),
        }
    }
}

impl GaussNewtonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_cost_tolerance(mut self, cost_tolerance: f64) -> Self {
        self.cost_tolerance = cost_tolerance;
        self
    }

    pub fn with_parameter_tolerance(mut self, parameter_tolerance: f64) -> Self {
        self.parameter_tolerance = parameter_tolerance;
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_linear_solver(mut self, linear_solver: Cgls) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    /// Log the configuration at DEBUG level
    pub fn print_configuration(&self) {
        debug!(
            "\nConfiguration:\n  Solver:        Gauss-Newton\n  Linear solver: CGLS (precision {:.1e}, max {} iterations)\n  Convergence Criteria:\n  Max iterations:      {}\n  Cost tolerance:      {:.2e}\n  Parameter tolerance: {:.2e}\n  Timeout:             {:?}",
            self.linear_solver.precision,
            self.linear_solver.max_iteration,
            self.max_iterations,
            self.cost_tolerance,
            self.parameter_tolerance,
            self.timeout,
        );
    }
}

/// Gauss-Newton solver for factor graphs over Lie-group variables.
///
/// The solver holds only configuration; [`GaussNewton::optimize`] updates the given
/// [`Values`] in place and reports how the run ended.
#[derive(Debug, Clone, Default)]
pub struct GaussNewton {
    config: GaussNewtonConfig,
}

impl GaussNewton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GaussNewtonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GaussNewtonConfig {
        &self.config
    }

    fn check_convergence(
        &self,
        iteration: usize,
        cost_before: f64,
        cost_after: f64,
        step_norm: f64,
        elapsed: time::Duration,
    ) -> Option<OptimizationStatus> {
        if !cost_after.is_finite() || !step_norm.is_finite() {
            return Some(OptimizationStatus::InvalidNumericalValues);
        }

        if let Some(timeout) = self.config.timeout
            && elapsed >= timeout
        {
            return Some(OptimizationStatus::Timeout);
        }

        if iteration + 1 >= self.config.max_iterations {
            return Some(OptimizationStatus::MaxIterationsReached);
        }

        if iteration > 0 {
            if step_norm <= self.config.parameter_tolerance {
                return Some(OptimizationStatus::ParameterToleranceReached);
            }

            let relative_cost_change = (cost_before - cost_after).abs() / cost_before.max(1e-10);
            if relative_cost_change < self.config.cost_tolerance {
                return Some(OptimizationStatus::CostToleranceReached);
            }
        }

        None
    }

    fn validate(graph: &NonlinearFactorGraph, values: &Values) -> ApexFusionResult<()> {
        if values.is_empty() {
            return Err(OptimizerError::EmptyProblem.log().into());
        }
        if graph.is_empty() {
            return Err(OptimizerError::NoFactors.log().into());
        }
        graph.check_keys(values).map_err(|e| match e {
            CoreError::MissingKey(key) => {
                OptimizerError::UnknownKey { key }.log_with_source(e).into()
            }
            other => other.log().into(),
        })
    }

    /// Run Gauss-Newton from the current contents of `values`, leaving the result there.
    ///
    /// # Errors
    /// If `values` is empty, the graph has no factors, or a factor reads a key missing from
    /// `values`. Non-convergence is reported through [`GaussNewtonSummary::status`].
    pub fn optimize(
        &self,
        graph: &NonlinearFactorGraph,
        values: &mut Values,
    ) -> ApexFusionResult<GaussNewtonSummary> {
        Self::validate(graph, values)?;

        let start_time = time::Instant::now();
        let debug_enabled = tracing::enabled!(tracing::Level::DEBUG);
        if debug_enabled {
            self.config.print_configuration();
            IterationStats::print_header();
        }

        let initial_cost = graph.error(values);
        let mut current_cost = initial_cost;
        let mut max_gradient_norm: f64 = 0.0;
        let mut max_step_norm: f64 = 0.0;
        let mut linear_solver_iterations = 0;
        let mut iteration_history = Vec::new();
        let mut iteration = 0;

        loop {
            let iter_start = time::Instant::now();

            let linear = graph.linearized(values);
            let mut step = DVector::zeros(values.tangent_dimension());
            let cgls = self.config.linear_solver.optimize(&linear, &mut step);
            linear_solver_iterations += cgls.iterations;

            let step_norm = step.norm();
            values.try_move_along(&BlockVector::from(step))?;
            let new_cost = graph.error(values);

            max_gradient_norm = max_gradient_norm.max(cgls.initial_gradient_norm);
            max_step_norm = max_step_norm.max(step_norm);

            if debug_enabled {
                let stats = IterationStats {
                    iteration,
                    cost: new_cost,
                    cost_change: current_cost - new_cost,
                    gradient_norm: cgls.initial_gradient_norm,
                    step_norm,
                    cgls_iterations: cgls.iterations,
                    cgls_status: cgls.status,
                    iter_time_ms: iter_start.elapsed().as_secs_f64() * 1000.0,
                    total_time_ms: start_time.elapsed().as_secs_f64() * 1000.0,
                };
                stats.print_line();
                iteration_history.push(stats);
            }

            let cost_before = current_cost;
            current_cost = new_cost;

            let elapsed = start_time.elapsed();
            if let Some(status) =
                self.check_convergence(iteration, cost_before, new_cost, step_norm, elapsed)
            {
                let iterations = iteration + 1;
                let summary = GaussNewtonSummary {
                    initial_cost,
                    final_cost: current_cost,
                    iterations,
                    max_gradient_norm,
                    final_gradient_norm: cgls.initial_gradient_norm,
                    max_step_norm,
                    final_step_norm: step_norm,
                    linear_solver_iterations,
                    total_time: elapsed,
                    average_time_per_iteration: elapsed / iterations as u32,
                    iteration_history,
                    status,
                };
                info!("{}", summary);
                return Ok(summary);
            }

            iteration += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::differentiable::Tracked;
    use crate::error::ApexFusionError;
    use crate::factors::{BetweenFactor, Factor, NonlinearFactor, PriorFactor};
    use crate::manifold::{LieGroup, Pose2, Pose3, Vector1};

    /// r1 = 10(x2 - x1²)
    struct RosenbrockFactor1 {
        keys: [usize; 2],
    }

    impl Factor for RosenbrockFactor1 {
        fn keys(&self) -> &[usize] {
            &self.keys
        }
    }

    impl NonlinearFactor for RosenbrockFactor1 {
        fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>> {
            let x1 = values.tracked::<Vector1>(self.keys[0]);
            let x2 = values.tracked::<Vector1>(self.keys[1]);
            let (a, b) = (x1.value()[0], x2.value()[0]);
            Tracked::new(
                DVector::from_vec(vec![10.0 * (b - a * a)]),
                move |c: &DVector<f64>| {
                    x1.pullback(&DVector::from_vec(vec![-20.0 * a * c[0]]))
                        + x2.pullback(&DVector::from_vec(vec![10.0 * c[0]]))
                },
            )
        }
    }

    /// r2 = 1 - x1
    struct RosenbrockFactor2 {
        keys: [usize; 1],
    }

    impl Factor for RosenbrockFactor2 {
        fn keys(&self) -> &[usize] {
            &self.keys
        }
    }

    impl NonlinearFactor for RosenbrockFactor2 {
        fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>> {
            let x1 = values.tracked::<Vector1>(self.keys[0]).to_vector();
            &Tracked::constant(DVector::from_vec(vec![1.0])) - &x1
        }
    }

    #[test]
    fn test_rosenbrock_optimization() -> Result<(), Box<dyn std::error::Error>> {
        // Minimum of r1² + r2² is at (1, 1).
        let mut values = Values::new();
        values.insert(1, Vector1::new([-1.2]));
        values.insert(2, Vector1::new([1.0]));

        let mut graph = NonlinearFactorGraph::new();
        graph += RosenbrockFactor1 { keys: [1, 2] };
        graph += RosenbrockFactor2 { keys: [1] };

        let config = GaussNewtonConfig::new()
            .with_max_iterations(100)
            .with_cost_tolerance(1e-8)
            .with_parameter_tolerance(1e-8)
            .with_linear_solver(Cgls::new(1e-10, 100));
        let summary = GaussNewton::with_config(config).optimize(&graph, &mut values)?;

        let x1 = values.try_get::<Vector1>(1)?[0];
        let x2 = values.try_get::<Vector1>(2)?[0];
        assert!(summary.status.is_converged(), "status: {}", summary.status);
        assert!((x1 - 1.0).abs() < 1e-4, "x1 should converge to 1.0, got {x1}");
        assert!((x2 - 1.0).abs() < 1e-4, "x2 should converge to 1.0, got {x2}");
        assert!(summary.final_cost < 1e-6);
        assert!(summary.initial_cost > summary.final_cost);
        Ok(())
    }

    #[test]
    fn test_pose3_prior_and_between() -> Result<(), Box<dyn std::error::Error>> {
        let first = Pose3::from_translation_euler(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let odometry = Pose3::from_translation_euler(1.0, 0.5, -0.2, 0.1, -0.3, 0.4);

        let mut graph = NonlinearFactorGraph::new();
        graph += PriorFactor::new(0, first);
        graph += BetweenFactor::new(0, 1, odometry);

        let mut values = Values::new();
        values.insert(0, Pose3::from_translation_euler(0.1, -0.2, 0.05, 0.05, 0.02, -0.1));
        values.insert(1, Pose3::from_translation_euler(0.8, 0.7, 0.0, 0.0, -0.1, 0.2));

        let summary = GaussNewton::new().optimize(&graph, &mut values)?;
        assert!(summary.final_cost < 1e-10, "{summary}");
        assert!(values.try_get::<Pose3>(0)?.is_approx(&first, 1e-6));
        assert!(values.try_get::<Pose3>(1)?.is_approx(&odometry, 1e-6));
        Ok(())
    }

    #[test]
    fn test_max_iterations_status() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = NonlinearFactorGraph::new();
        graph += PriorFactor::new(0, Pose2::new(1.0, 2.0, 0.5));
        let mut values = Values::new();
        values.insert(0, Pose2::identity());

        let solver = GaussNewton::with_config(GaussNewtonConfig::new().with_max_iterations(1));
        let summary = solver.optimize(&graph, &mut values)?;
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.status, OptimizationStatus::MaxIterationsReached);
        Ok(())
    }

    #[test]
    fn test_already_optimal_stops_on_parameter_tolerance() -> Result<(), Box<dyn std::error::Error>>
    {
        let mut graph = NonlinearFactorGraph::new();
        graph += PriorFactor::new(0, Pose2::new(1.0, 2.0, 0.5));
        let mut values = Values::new();
        values.insert(0, Pose2::new(1.0, 2.0, 0.5));

        let summary = GaussNewton::new().optimize(&graph, &mut values)?;
        assert_eq!(summary.status, OptimizationStatus::ParameterToleranceReached);
        assert_eq!(summary.iterations, 2);
        assert!(summary.final_step_norm < 1e-12);
        Ok(())
    }

    #[test]
    fn test_validation_errors() {
        let mut graph = NonlinearFactorGraph::new();
        let mut values = Values::new();
        let solver = GaussNewton::new();

        assert!(matches!(
            solver.optimize(&graph, &mut values),
            Err(ApexFusionError::Optimizer(OptimizerError::EmptyProblem))
        ));

        values.insert(0, Pose2::identity());
        assert!(matches!(
            solver.optimize(&graph, &mut values),
            Err(ApexFusionError::Optimizer(OptimizerError::NoFactors))
        ));

        graph += BetweenFactor::new(0, 5, Pose2::identity());
        assert!(matches!(
            solver.optimize(&graph, &mut values),
            Err(ApexFusionError::Optimizer(OptimizerError::UnknownKey { key: 5 }))
        ));
    }

    #[test]
    fn test_summary_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = NonlinearFactorGraph::new();
        graph += PriorFactor::new(0, Pose2::new(1.0, 0.0, 0.0));
        let mut values = Values::new();
        values.insert(0, Pose2::identity());

        let summary = GaussNewton::new().optimize(&graph, &mut values)?;
        let rendered = summary.to_string();
        assert!(rendered.starts_with("Gauss-Newton Final Result"));
        assert!(summary.status.is_converged());
        assert!(rendered.contains("CONVERGED (Parameter tolerance reached)"));
        assert!(rendered.contains("Initial:   1.000000e0"));
        Ok(())
    }
}

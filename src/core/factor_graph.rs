//! Nonlinear factor graph: an ordered list of factors over a shared [`Values`] store.

use crate::core::gaussian_factor_graph::GaussianFactorGraph;
use crate::core::values::Values;
use crate::core::{CoreError, CoreResult};
use crate::factors::NonlinearFactor;
use std::collections::HashSet;
use std::fmt;
use std::ops::AddAssign;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Sum-of-squares objective `Σᵢ ‖rᵢ(x)‖²` over a list of factors.
///
/// Factor order is preserved: the rows of [`NonlinearFactorGraph::linearized`] are the
/// factors' rows stacked in insertion order.
#[derive(Default)]
pub struct NonlinearFactorGraph {
    factors: Vec<Box<dyn NonlinearFactor>>,
}

impl NonlinearFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: NonlinearFactor + 'static>(&mut self, factor: F) {
        self.factors.push(Box::new(factor));
    }

    pub fn add_boxed(&mut self, factor: Box<dyn NonlinearFactor>) {
        self.factors.push(factor);
    }

    pub fn factors(&self) -> &[Box<dyn NonlinearFactor>] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Every key read by some factor, each once, in order of first appearance.
    pub fn keys(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.factors
            .iter()
            .flat_map(|factor| factor.keys().iter().copied())
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Fails with the first key some factor reads that `values` does not hold.
    pub fn check_keys(&self, values: &Values) -> CoreResult<()> {
        match self.keys().into_iter().find(|key| !values.contains_key(*key)) {
            Some(key) => Err(CoreError::MissingKey(key)),
            None => Ok(()),
        }
    }

    /// Total cost `Σᵢ ‖rᵢ(x)‖²`.
    pub fn error(&self, values: &Values) -> f64 {
        self.factors.iter().map(|factor| factor.error(values)).sum()
    }

    /// Stack every factor's first-order model at `values` into one linear system.
    ///
    /// Factors are linearized independently (in parallel with the `parallel` feature) and
    /// stacked in insertion order.
    pub fn linearized(&self, values: &Values) -> GaussianFactorGraph {
        #[cfg(feature = "parallel")]
        let linear_factors: Vec<GaussianFactorGraph> = self
            .factors
            .par_iter()
            .map(|factor| factor.linearized(values))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let linear_factors: Vec<GaussianFactorGraph> = self
            .factors
            .iter()
            .map(|factor| factor.linearized(values))
            .collect();

        linear_factors
            .iter()
            .fold(GaussianFactorGraph::default(), |mut graph, linear| {
                graph += linear;
                graph
            })
    }
}

impl<F: NonlinearFactor + 'static> AddAssign<F> for NonlinearFactorGraph {
    fn add_assign(&mut self, factor: F) {
        self.add(factor);
    }
}

impl fmt::Debug for NonlinearFactorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearFactorGraph")
            .field("factors", &self.factors.len())
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, PriorFactor};
    use crate::manifold::{LieGroup, Pose2, Vector2};
    use nalgebra::DMatrix;

    fn chain() -> (NonlinearFactorGraph, Values) {
        let mut values = Values::new();
        values.insert(10, Pose2::new(0.1, 0.0, 0.0));
        values.insert(20, Pose2::new(1.0, 0.2, 0.1));
        values.insert(30, Vector2::new([1.0, 2.0]));

        let mut graph = NonlinearFactorGraph::new();
        graph += PriorFactor::new(10, Pose2::identity());
        graph += BetweenFactor::new(10, 20, Pose2::new(1.0, 0.0, 0.0));
        graph += PriorFactor::new(30, Vector2::new([1.0, 1.0]));
        (graph, values)
    }

    #[test]
    fn test_keys_in_first_appearance_order() {
        let (graph, _) = chain();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.keys(), vec![10, 20, 30]);
        assert!(!graph.is_empty());
        assert!(NonlinearFactorGraph::new().keys().is_empty());
    }

    #[test]
    fn test_error_is_sum_of_factor_errors() {
        let (graph, values) = chain();
        let expected: f64 = graph.factors().iter().map(|f| f.error(&values)).sum();
        assert!((graph.error(&values) - expected).abs() < 1e-15);
        assert!(graph.error(&values) > 0.0);
    }

    #[test]
    fn test_linearized_stacks_in_insertion_order() {
        let (graph, values) = chain();
        let linear = graph.linearized(&values);
        assert_eq!(linear.row_count(), 3 + 3 + 2);
        assert_eq!(linear.column_count(), 8);

        let dense = linear.jacobian().to_dense();
        // Third factor touches only the vector at columns 6..8, rows 6..8.
        assert_eq!(
            dense.view((6, 6), (2, 2)).into_owned(),
            DMatrix::identity(2, 2)
        );
        assert_eq!(dense.view((6, 0), (2, 6)).abs().max(), 0.0);
        assert_eq!(&linear.bias().to_dense().as_slice()[6..], &[0.0, -1.0]);

        // Zero step reproduces the nonlinear cost.
        let zero = nalgebra::DVector::zeros(values.tangent_dimension());
        assert!((linear.error(&zero) - graph.error(&values)).abs() < 1e-12);
    }

    #[test]
    fn test_check_keys() {
        let (mut graph, values) = chain();
        assert!(graph.check_keys(&values).is_ok());
        graph.add_boxed(Box::new(PriorFactor::new(99, Pose2::identity())));
        assert!(matches!(
            graph.check_keys(&values),
            Err(CoreError::MissingKey(99))
        ));
    }

    #[test]
    fn test_empty_graph_linearizes_to_empty_system() {
        let graph = NonlinearFactorGraph::new();
        let linear = graph.linearized(&Values::new());
        assert_eq!(linear, GaussianFactorGraph::default());
        assert_eq!(graph.error(&Values::new()), 0.0);
    }
}

//! # Apex Fusion
//!
//! Manifold-aware nonlinear least squares for factor-graph problems such as pose-graph SLAM and
//! sensor fusion.
//!
//! Variables live on Lie groups ([`manifold`]) inside a type-erased [`Values`] store. Factors
//! ([`factors`]) write their residuals against differentiable reads of that store, so their
//! Jacobians come out of reverse-mode differentiation. Linearizing a
//! [`NonlinearFactorGraph`] yields a block-sparse [`GaussianFactorGraph`], solved matrix-free by
//! [`Cgls`](linalg::Cgls); [`GaussNewton`] repeats linearize, solve and retract until
//! convergence.
//!
//! ```
//! use apex_fusion::{BetweenFactor, GaussNewton, NonlinearFactorGraph, PriorFactor, Values};
//! use apex_fusion::manifold::Pose2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = NonlinearFactorGraph::new();
//! graph += PriorFactor::new(0, Pose2::new(0.0, 0.0, 0.0));
//! graph += BetweenFactor::new(0, 1, Pose2::new(2.0, 0.0, 0.0));
//!
//! let mut values = Values::new();
//! values.insert(0, Pose2::new(0.0, 0.0, 0.0));
//! values.insert(1, Pose2::new(1.5, 0.1, 0.0));
//!
//! GaussNewton::new().optimize(&graph, &mut values)?;
//! assert!((values.get::<Pose2>(1).x() - 2.0).abs() < 1e-6);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `logging` (default): [`init_logger`] console subscriber
//! - `parallel` (default): rayon-parallel factor linearization

pub mod core;
pub mod error;
pub mod factors;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod manifold;
pub mod optimizer;

pub use crate::core::factor_graph::NonlinearFactorGraph;
pub use crate::core::gaussian_factor_graph::GaussianFactorGraph;
pub use crate::core::values::Values;
pub use crate::core::variable::Variable;
pub use error::{ApexFusionError, ApexFusionResult};
pub use factors::{BetweenFactor, Factor, NonlinearFactor, PriorFactor};
pub use linalg::{BlockMatrix, BlockVector, Cgls};
#[cfg(feature = "logging")]
pub use logger::{init_logger, init_logger_with_level};
pub use manifold::{LieGroup, Tangent};
pub use optimizer::{GaussNewton, GaussNewtonConfig, OptimizationStatus};

//! Differentiable Muskingum-Cunge river routing.

mod muskingum;
mod sparse;

pub use muskingum::{MuskingumCunge, RoutedFlow, SpatialParameters};
pub use sparse::{adjacency_matvec, solve_lower_triangular, CsrPattern, PatternMapper};

use crate::autograd::{add_scalar, scale, Tensor};

/// Denormalize neural-network outputs into the physical parameter space.
///
/// The network emits values in [0, 1]; the physical value is
/// `value * (upper - lower) + lower`.
pub fn denormalize(value: &Tensor, bounds: [f32; 2]) -> Tensor {
    add_scalar(&scale(value, bounds[1] - bounds[0]), bounds[0])
}

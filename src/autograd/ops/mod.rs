//! Tape-recorded tensor operations
//!
//! Arithmetic, element-wise transforms and the indexing ops the routing
//! formulation is built from, each registering its backward pass on the
//! result tensor.

mod basic;
mod elementwise;
mod select;

// Re-export all public operations
pub use basic::{add, add_scalar, div, mean, mul, scale, sub, sum};
pub use elementwise::{clamp, ln, powf, sigmoid, silu};
pub use select::{concat, gather, index_sum};

//! Differentiable river routing trained end to end.
//!
//! A Kolmogorov-Arnold network maps static reach attributes to normalized
//! routing parameters; a Muskingum-Cunge router propagates lateral inflow
//! through the river network with those parameters; RMSE against gauge
//! observations backpropagates through the router into the network.
//!
//! The [`cli`] module exposes the `train`, `evaluate`, `validate` and
//! `info` commands; [`train::Trainer`] is the programmatic entry point.

pub mod autograd;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod io;
pub mod kan;
pub mod metrics;
pub mod optim;
pub mod routing;
pub mod train;

pub use config::{load_config, Config};
pub use error::{DdrError, Result};
pub use train::Trainer;

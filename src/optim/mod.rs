//! Optimization: AdamW, gradient clipping and the epoch schedule.

mod adamw;
mod clip;
mod optimizer;
mod scheduler;

pub use adamw::AdamW;
pub use clip::{clip_grad_norm, clip_grad_norm_refs};
pub use optimizer::Optimizer;
pub use scheduler::{LRScheduler, PiecewiseLR};

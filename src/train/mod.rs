//! Training: loss, checkpointing and the epoch loop.

mod checkpoint;
mod loss;
mod trainer;

pub use checkpoint::{
    checkpoint_file, load_checkpoint, restore, save_checkpoint, OptimizerState, TrainState,
};
pub use loss::{midpoint_penalty, CompositeLoss, LossFn, RmseLoss};
pub use trainer::{EpochSummary, TrainReport, Trainer};

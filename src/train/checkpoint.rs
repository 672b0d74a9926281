//! Saving and restoring training runs.
//!
//! A checkpoint is one JSON file per saved position,
//! `_{name}_epoch_{epoch}_mb_{mb}.json` under the configured checkpoint
//! directory. It holds the network parameters in the model-state layout,
//! the optimizer buffers and the shuffle seed, so a resumed run continues
//! the original one exactly.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DdrError, Result};
use crate::io::{Model, ModelMetadata, ModelState};
use crate::kan::Kan;
use crate::optim::AdamW;

/// Optimizer buffers stored alongside the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    pub step_count: u64,
    pub first_moments: Vec<Option<Vec<f32>>>,
    pub second_moments: Vec<Option<Vec<f32>>>,
}

/// A saved training position: the epoch and mini-batch a resumed run
/// starts from, plus everything needed to continue identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainState {
    pub epoch: usize,
    pub mini_batch: usize,
    pub seed: u64,
    pub model: ModelState,
    pub optimizer: OptimizerState,
}

/// Checkpoint file name for a run name and position.
pub fn checkpoint_file(name: &str, epoch: usize, mini_batch: usize) -> String {
    format!("_{name}_epoch_{epoch}_mb_{mini_batch}.json")
}

/// Write a checkpoint and return its path.
///
/// `mini_batch` is the next window index to run within `epoch`; `None`
/// marks an end-of-epoch save, which records the next epoch at mini-batch
/// zero so resuming starts exactly where this run stopped.
pub fn save_checkpoint(
    dir: &Path,
    name: &str,
    epoch: usize,
    mini_batch: Option<usize>,
    kan: &Kan,
    optimizer: &AdamW,
    seed: u64,
) -> Result<PathBuf> {
    let (epoch, mini_batch) = match mini_batch {
        Some(mb) => (epoch, mb),
        None => (epoch + 1, 0),
    };

    let parameters = kan
        .named_parameters()
        .into_iter()
        .map(|(name, tensor)| (name, tensor.clone()))
        .collect();
    let model = Model::new(ModelMetadata::new(name, "kan"), parameters).to_state();

    let state = TrainState {
        epoch,
        mini_batch,
        seed,
        model,
        optimizer: OptimizerState {
            step_count: optimizer.step_count(),
            first_moments: moments_to_vecs(optimizer.first_moments()),
            second_moments: moments_to_vecs(optimizer.second_moments()),
        },
    };

    fs::create_dir_all(dir)
        .map_err(|e| DdrError::io(format!("creating checkpoint directory {}", dir.display()), e))?;
    let path = dir.join(checkpoint_file(name, epoch, mini_batch));
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| DdrError::Serialization { message: format!("encoding checkpoint: {e}") })?;
    fs::write(&path, json).map_err(|e| {
        DdrError::io(format!("writing checkpoint {}", path.display()), e)
    })?;
    log::debug!("checkpoint saved to {}", path.display());
    Ok(path)
}

/// Read a checkpoint back from disk.
pub fn load_checkpoint(path: &Path) -> Result<TrainState> {
    let text = fs::read_to_string(path)
        .map_err(|e| DdrError::io(format!("reading checkpoint {}", path.display()), e))?;
    serde_json::from_str(&text).map_err(|e| DdrError::Checkpoint {
        message: format!("{} does not parse: {e}", path.display()),
    })
}

/// Push a loaded state back into the network and the optimizer.
pub fn restore(state: &TrainState, kan: &mut Kan, optimizer: &mut AdamW) -> Result<()> {
    let model = Model::from_state(state.model.clone())?;
    for (name, tensor) in &model.parameters {
        kan.set_parameter(name, &tensor.data().to_vec())?;
    }

    optimizer.set_step_count(state.optimizer.step_count);
    for (idx, moment) in state.optimizer.first_moments.iter().enumerate() {
        if let Some(values) = moment {
            optimizer.set_first_moment(idx, Array1::from(values.clone()));
        }
    }
    for (idx, moment) in state.optimizer.second_moments.iter().enumerate() {
        if let Some(values) = moment {
            optimizer.set_second_moment(idx, Array1::from(values.clone()));
        }
    }
    Ok(())
}

fn moments_to_vecs(moments: &[Option<Array1<f32>>]) -> Vec<Option<Vec<f32>>> {
    moments.iter().map(|m| m.as_ref().map(|a| a.to_vec())).collect()
}

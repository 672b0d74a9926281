//! The training loop: windows, forward, backward, step, checkpoint.

use ndarray::{Array1, Array2};
use std::path::{Path, PathBuf};

use crate::autograd::{backward, Tensor};
use crate::config::Config;
use crate::dataset::TrainDataset;
use crate::error::{DdrError, Result};
use crate::io::{Model, ModelMetadata};
use crate::kan::{Kan, KanOutputs};
use crate::metrics::{log_eval_metrics, Metrics};
use crate::optim::{clip_grad_norm_refs, AdamW, LRScheduler, Optimizer, PiecewiseLR};
use crate::routing::{MuskingumCunge, SpatialParameters};
use crate::train::checkpoint::{load_checkpoint, restore, save_checkpoint};
use crate::train::loss::{CompositeLoss, RmseLoss};

/// Gradient clip threshold on the global norm.
const MAX_GRAD_NORM: f32 = 1.0;

/// Mean loss and learning rate of one completed epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub mean_loss: f32,
    pub lr: f32,
}

/// What a training run produced.
#[derive(Debug, Default)]
pub struct TrainReport {
    pub epochs: Vec<EpochSummary>,
    pub last_checkpoint: Option<PathBuf>,
}

/// Drives the KAN, the router and the optimizer over the configured
/// training period.
///
/// Epochs are one-indexed. Within an epoch the period is tiled into
/// rho-length windows; each window is one mini-batch. The router's
/// discharge state carries across mini-batches of an epoch and reseeds at
/// mini-batch zero.
pub struct Trainer<'a> {
    config: &'a Config,
    dataset: &'a TrainDataset,
    kan: Kan,
    router: MuskingumCunge,
    optimizer: AdamW,
    scheduler: PiecewiseLR,
    loss: CompositeLoss,
    seed: u64,
    start_epoch: usize,
    skip_mini_batches: usize,
}

impl<'a> Trainer<'a> {
    /// Build a trainer, resuming from `train.checkpoint` when configured.
    pub fn new(config: &'a Config, dataset: &'a TrainDataset) -> Result<Self> {
        let kan = Kan::new(&config.kan, config.train.seed)?;
        let router = MuskingumCunge::new(&config.params, &dataset.fabric)?;
        let scheduler = PiecewiseLR::new(config.train.learning_rate.clone());
        let optimizer = AdamW::default_params(scheduler.get_lr());
        let loss = CompositeLoss::new(Box::new(RmseLoss), config.train.alpha);

        let mut trainer = Trainer {
            config,
            dataset,
            kan,
            router,
            optimizer,
            scheduler,
            loss,
            seed: config.train.seed,
            start_epoch: 1,
            skip_mini_batches: 0,
        };
        if let Some(path) = &config.train.checkpoint {
            trainer.resume_from(path)?;
        }
        Ok(trainer)
    }

    fn resume_from(&mut self, path: &Path) -> Result<()> {
        let state = load_checkpoint(path)?;
        restore(&state, &mut self.kan, &mut self.optimizer)?;
        self.seed = state.seed;
        self.start_epoch = state.epoch.max(1);
        self.skip_mini_batches = state.mini_batch;
        log::info!(
            "resumed from {} at epoch {} mini-batch {}",
            path.display(),
            self.start_epoch,
            self.skip_mini_batches
        );
        Ok(())
    }

    pub fn kan(&self) -> &Kan {
        &self.kan
    }

    /// Snapshot of the trained parameters for [`crate::io::save_model`].
    pub fn model(&self) -> Model {
        let parameters = self
            .kan
            .named_parameters()
            .into_iter()
            .map(|(name, tensor)| (name, tensor.clone()))
            .collect();
        Model::new(ModelMetadata::new(self.config.name.as_str(), "kan"), parameters)
    }

    /// Overwrite the network parameters from a saved model.
    pub fn load_parameters(&mut self, model: &Model) -> Result<()> {
        for (name, tensor) in &model.parameters {
            self.kan.set_parameter(name, &tensor.data().to_vec())?;
        }
        Ok(())
    }

    /// Run the configured epochs, checkpointing after every mini-batch and
    /// at each epoch end.
    pub fn train(&mut self) -> Result<TrainReport> {
        let epochs = self.config.train.epochs;
        let attributes = self.dataset.attributes_tensor();
        let mut report = TrainReport::default();

        if self.start_epoch > epochs {
            log::info!("checkpoint is already past epoch {epochs}, nothing to train");
            return Ok(report);
        }

        for epoch in self.start_epoch..=epochs {
            self.scheduler.set_epoch(epoch);
            self.scheduler.apply(&mut self.optimizer);
            let lr = self.optimizer.lr();

            let shuffle_seed = self.seed.wrapping_add(epoch as u64);
            let origins = self
                .dataset
                .dates
                .window_origins(self.config.train.shuffle, shuffle_seed);
            let skip = if epoch == self.start_epoch {
                self.skip_mini_batches.min(origins.len())
            } else {
                0
            };

            let mut total = 0.0f64;
            let mut counted = 0usize;
            for (mini_batch, &origin) in origins.iter().enumerate().skip(skip) {
                let value = self.train_step(&attributes, origin, mini_batch)?;
                total += f64::from(value);
                counted += 1;
                log::debug!("epoch {epoch} mb {mini_batch} (origin {origin}): loss {value:.6}");
                report.last_checkpoint = Some(self.save(epoch, Some(mini_batch + 1))?);
            }

            let mean_loss = if counted == 0 {
                f32::NAN
            } else {
                (total / counted as f64) as f32
            };
            log::info!(
                "epoch {epoch}/{epochs}: mean {} {mean_loss:.6} (lr {lr})",
                self.loss.name()
            );
            report.last_checkpoint = Some(self.save(epoch, None)?);
            report.epochs.push(EpochSummary { epoch, mean_loss, lr });
        }
        Ok(report)
    }

    /// One mini-batch: forward through the network and the router, masked
    /// loss, backward, clip, step.
    fn train_step(&mut self, attributes: &Tensor, origin: usize, mini_batch: usize) -> Result<f32> {
        self.kan.zero_grad();

        let reaches = self.dataset.fabric.reaches();
        let outputs = self.kan.forward(attributes, reaches)?;
        let spatial = spatial_from_outputs(&outputs)?;

        let q_prime = self.dataset.forcings_window(origin);
        let flow = self
            .router
            .route(&q_prime, &spatial, &self.dataset.gauge_reaches, mini_batch)?;

        let target = observation_target(&self.dataset.observations_window(origin));
        let normalized: Vec<Tensor> = outputs.into_values().collect();
        let mut loss = self.loss.forward(&flow.discharge, &target, &normalized);
        let value = loss.data()[0];
        if !value.is_finite() {
            return Err(DdrError::NonFinitePrediction);
        }

        backward(&mut loss, None);
        let mut params = self.kan.parameters_mut();
        let norm = clip_grad_norm_refs(&mut params, MAX_GRAD_NORM);
        log::trace!("gradient norm {norm:.4} before clipping");
        self.optimizer.step_refs(&mut params);
        Ok(value)
    }

    /// Route the full configured period with the current parameters and
    /// score it against the observations.
    pub fn evaluate(&mut self) -> Result<Metrics> {
        let attributes = self.dataset.attributes_tensor();
        let reaches = self.dataset.fabric.reaches();
        let outputs = self.kan.forward(&attributes, reaches)?;
        let spatial = spatial_from_outputs(&outputs)?;

        self.router.reset_state();
        let flow = self
            .router
            .route(&self.dataset.forcings, &spatial, &self.dataset.gauge_reaches, 0)?;
        self.router.reset_state();

        let metrics = Metrics::new(&flow.to_matrix(), &self.dataset.observations)?;
        log_eval_metrics(&metrics);
        Ok(metrics)
    }

    fn save(&self, epoch: usize, mini_batch: Option<usize>) -> Result<PathBuf> {
        save_checkpoint(
            &self.config.data_sources.checkpoint_dir,
            &self.config.name,
            epoch,
            mini_batch,
            &self.kan,
            &self.optimizer,
            self.seed,
        )
    }
}

/// Pull the three routing parameters out of the network outputs.
fn spatial_from_outputs(outputs: &KanOutputs) -> Result<SpatialParameters> {
    let take = |name: &str| {
        outputs.get(name).cloned().ok_or_else(|| DdrError::ConfigValue {
            field: "kan.learnable_parameters".to_string(),
            message: format!("the network does not emit '{name}'"),
            suggestion: "List n, q_spatial and p_spatial as learnable parameters".to_string(),
        })
    };
    Ok(SpatialParameters {
        n: take("n")?,
        q_spatial: take("q_spatial")?,
        p_spatial: take("p_spatial")?,
    })
}

/// Flatten a gauges x timesteps window into the router's time-major
/// discharge layout.
fn observation_target(window: &Array2<f32>) -> Tensor {
    Tensor::new(Array1::from_iter(window.t().iter().copied()), false)
}

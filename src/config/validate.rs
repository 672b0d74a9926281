//! Run-configuration validation.
//!
//! Checks the schema-level properties a config must satisfy before any
//! data is touched: schedule shape, range ordering, attribute wiring,
//! period ordering and path well-formedness.

use chrono::NaiveDate;
use thiserror::Error;

use super::schema::Config;

/// Validation error type.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Run name '{name}' does not equal the '{interpolated}' interpolation of version and forcings")]
    NameMismatch { name: String, interpolated: String },

    #[error("Learning-rate schedule is empty (must map epoch -> lr)")]
    EmptySchedule,

    #[error("Learning-rate schedule must cover the first epoch (add a key for epoch 0 or 1)")]
    ScheduleMissesFirstEpoch,

    #[error("Invalid learning rate {lr} at epoch {epoch} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate { epoch: usize, lr: f32 },

    #[error("Parameter range for '{name}' is reversed: [{lower}, {upper}]")]
    ReversedRange { name: String, lower: f32, upper: f32 },

    #[error("Learnable parameter '{0}' has no entry in parameter_ranges.range")]
    MissingRange(String),

    #[error("kan.input_var_names entry '{0}' is not listed in params.attributes")]
    UnknownInputVariable(String),

    #[error("kan.output_size {output_size} does not match {learnable} learnable parameters")]
    OutputSizeMismatch { output_size: usize, learnable: usize },

    #[error("Invalid date '{value}' for {field} (expected YYYY/MM/DD)")]
    InvalidDate { field: String, value: String },

    #[error("Invalid period: start_time '{start}' is not before end_time '{end}'")]
    InvalidPeriod { start: String, end: String },

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid epochs: {0} (must be > 0)")]
    InvalidEpochs(usize),

    #[error("Invalid rho: {0} (must be > 0)")]
    InvalidRho(usize),

    #[error("Invalid hidden size: {0} (must be > 0)")]
    InvalidHiddenSize(usize),

    #[error("Invalid spline grid: {0} (must be >= 1)")]
    InvalidGrid(usize),

    #[error("Invalid spline order: {0} (must be >= 1)")]
    InvalidSplineOrder(usize),

    #[error("Invalid alpha: {0} (must be >= 0.0)")]
    InvalidAlpha(f32),

    #[error("Invalid factor: {0} (must be > 0.0)")]
    InvalidFactor(f32),

    #[error("Reversed basin-area bounds: [{lower}, {upper}]")]
    ReversedAreaBounds { lower: f32, upper: f32 },

    #[error("Invalid minimum_zones: {0} (must be >= 1)")]
    InvalidMinimumZones(usize),

    #[error("params.zones is empty (must name at least one region)")]
    EmptyZones,

    #[error("Data source path for '{name}' is not well-formed: {reason}")]
    MalformedPath { name: String, reason: String },

    #[error("Data source path for '{name}' does not exist: {path}")]
    DataPathNotFound { name: String, path: String },
}

fn parse_period_date(field: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y/%m/%d").map_err(|_| ValidationError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Validate a run configuration.
pub fn validate_config(config: &Config) -> Result<(), ValidationError> {
    // Run name equals the version/forcings interpolation.
    let interpolated = config.interpolated_name();
    if config.name != interpolated {
        return Err(ValidationError::NameMismatch {
            name: config.name.clone(),
            interpolated,
        });
    }

    // Learning-rate schedule: non-empty, covers the first epoch, sane rates.
    // Keys are usize in a BTreeMap, so non-negative and sorted by construction.
    let schedule = &config.train.learning_rate;
    if schedule.is_empty() {
        return Err(ValidationError::EmptySchedule);
    }
    if !schedule.contains_key(&0) && !schedule.contains_key(&1) {
        return Err(ValidationError::ScheduleMissesFirstEpoch);
    }
    for (&epoch, &lr) in schedule {
        if lr <= 0.0 || lr > 1.0 {
            return Err(ValidationError::InvalidLearningRate { epoch, lr });
        }
    }

    // Parameter ranges ordered, and every learnable parameter bounded.
    for (name, &[lower, upper]) in &config.params.parameter_ranges.range {
        if lower > upper {
            return Err(ValidationError::ReversedRange { name: name.clone(), lower, upper });
        }
    }
    for name in &config.kan.learnable_parameters {
        if !config.params.parameter_ranges.range.contains_key(name) {
            return Err(ValidationError::MissingRange(name.clone()));
        }
    }
    if config.kan.output_size != config.kan.learnable_parameters.len() {
        return Err(ValidationError::OutputSizeMismatch {
            output_size: config.kan.output_size,
            learnable: config.kan.learnable_parameters.len(),
        });
    }

    // Network inputs must be registered attributes.
    for name in &config.kan.input_var_names {
        if !config.params.attributes.contains(name) {
            return Err(ValidationError::UnknownInputVariable(name.clone()));
        }
    }

    // Period ordering.
    let start = parse_period_date("train.start_time", &config.train.start_time)?;
    let end = parse_period_date("train.end_time", &config.train.end_time)?;
    if start >= end {
        return Err(ValidationError::InvalidPeriod {
            start: config.train.start_time.clone(),
            end: config.train.end_time.clone(),
        });
    }

    // Numeric sanity.
    if config.train.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.train.batch_size));
    }
    if config.train.epochs == 0 {
        return Err(ValidationError::InvalidEpochs(config.train.epochs));
    }
    if config.train.rho == 0 {
        return Err(ValidationError::InvalidRho(config.train.rho));
    }
    if config.kan.hidden_size == 0 {
        return Err(ValidationError::InvalidHiddenSize(config.kan.hidden_size));
    }
    if config.kan.grid == 0 {
        return Err(ValidationError::InvalidGrid(config.kan.grid));
    }
    if config.kan.k == 0 {
        return Err(ValidationError::InvalidSplineOrder(config.kan.k));
    }
    if config.train.alpha < 0.0 {
        return Err(ValidationError::InvalidAlpha(config.train.alpha));
    }
    if config.train.factor <= 0.0 {
        return Err(ValidationError::InvalidFactor(config.train.factor));
    }
    if config.train.area_lower_bound > config.train.area_upper_bound {
        return Err(ValidationError::ReversedAreaBounds {
            lower: config.train.area_lower_bound,
            upper: config.train.area_upper_bound,
        });
    }
    if config.train.minimum_zones == 0 {
        return Err(ValidationError::InvalidMinimumZones(config.train.minimum_zones));
    }
    if config.params.zones.is_empty() {
        return Err(ValidationError::EmptyZones);
    }

    // Data source paths: well-formed always, existing outside tests.
    let sources = [
        ("hydrofabric", &config.data_sources.hydrofabric),
        ("statistics", &config.data_sources.statistics),
        ("forcings", &config.data_sources.forcings),
        ("observations", &config.data_sources.observations),
        ("checkpoint_dir", &config.data_sources.checkpoint_dir),
    ];
    for (name, path) in sources {
        let text = path.to_string_lossy();
        if text.is_empty() {
            return Err(ValidationError::MalformedPath {
                name: name.to_string(),
                reason: "empty path".to_string(),
            });
        }
        if text.contains('\0') {
            return Err(ValidationError::MalformedPath {
                name: name.to_string(),
                reason: "path contains a NUL byte".to_string(),
            });
        }
    }

    // checkpoint_dir is created by the trainer, the inputs must exist.
    #[cfg(not(test))]
    for (name, path) in &sources[..4] {
        if !path.exists() {
            return Err(ValidationError::DataPathNotFound {
                name: (*name).to_string(),
                path: path.display().to_string(),
            });
        }
    }

    Ok(())
}

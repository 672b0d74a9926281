//! Error types with actionable diagnostics.
//!
//! Every variant carries enough context for the user to fix the problem
//! without digging through the source.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ddr operations.
pub type Result<T> = std::result::Result<T, DdrError>;

/// Errors that can occur while loading data, routing, or training.
#[derive(Error, Debug)]
pub enum DdrError {
    /// Configuration file not found at expected path.
    #[error("Configuration file not found: {path}\n  → Create a config file or pass a different path on the command line")]
    ConfigNotFound { path: PathBuf },

    /// Configuration file has invalid syntax.
    #[error("Invalid configuration syntax in {path}:\n  {message}\n  → Check YAML syntax at the indicated line")]
    ConfigParsing { path: PathBuf, message: String },

    /// Configuration value is invalid.
    #[error("Invalid configuration value for '{field}': {message}\n  → {suggestion}")]
    ConfigValue { field: String, message: String, suggestion: String },

    /// Configuration failed schema validation.
    #[error("Invalid configuration: {0}")]
    Validation(#[from] crate::config::ValidationError),

    /// An input table file is missing.
    #[error("Input table not found: {path}\n  → Check the hydrofabric directory and the data_sources paths in the config")]
    TableNotFound { path: PathBuf },

    /// A catchment attribute referenced by the network config is missing
    /// from the attribute table or the statistics table.
    #[error("Attribute '{name}' not found in {table}\n  → Check kan.input_var_names against the columns of the attribute and statistics tables")]
    MissingAttribute { name: String, table: String },

    /// A gauge has no observation column.
    #[error("Gauge '{gage_id}' has no column in the observation table\n  → Gauge ids are zero-padded to 8 digits; check the observation header")]
    MissingGauge { gage_id: String },

    /// A named network parameter does not exist.
    #[error("Unknown network parameter: '{name}'\n  → Valid names follow the pattern layer<i>.coefficients / layer<i>.base_weight")]
    ParameterNotFound { name: String },

    /// Invalid tensor shape.
    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}\n  → Check the reach and gauge dimensions of the inputs")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    /// The triangular system could not be solved.
    #[error("Triangular solve failed: {message}\n  → The routing matrix has a zero or non-finite diagonal; check slope and length inputs")]
    Solver { message: String },

    /// Routed discharge contains NaN.
    #[error("Prediction contains NaN, check your gradient chain\n  → A parameter likely left its physical range; inspect parameter_ranges and attribute_minimums")]
    NonFinitePrediction,

    /// Checkpoint file could not be read or does not match the model.
    #[error("Checkpoint error: {message}\n  → Delete the checkpoint or retrain from scratch if the network configuration changed")]
    Checkpoint { message: String },

    /// IO error with context.
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV parse error with context.
    #[error("CSV error in {context}: {message}")]
    Csv { context: String, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl DdrError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Create a CSV error with context.
    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv { context: context.into(), message: source.to_string() }
    }

    /// Check if this error is user-recoverable.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParsing { .. }
                | Self::ConfigValue { .. }
                | Self::Validation(_)
                | Self::TableNotFound { .. }
                | Self::MissingAttribute { .. }
                | Self::MissingGauge { .. }
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound { .. } => "E001",
            Self::ConfigParsing { .. } => "E002",
            Self::ConfigValue { .. } => "E003",
            Self::Validation(_) => "E004",
            Self::TableNotFound { .. } => "E010",
            Self::MissingAttribute { .. } => "E011",
            Self::MissingGauge { .. } => "E012",
            Self::ParameterNotFound { .. } => "E013",
            Self::ShapeMismatch { .. } => "E040",
            Self::Solver { .. } => "E041",
            Self::NonFinitePrediction => "E042",
            Self::Checkpoint { .. } => "E043",
            Self::Io { .. } => "E050",
            Self::Csv { .. } => "E051",
            Self::Serialization { .. } => "E052",
        }
    }
}

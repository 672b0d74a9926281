//! Run configuration: YAML schema, validation and the command line.

mod cli;
mod schema;
mod validate;

pub use cli::{
    parse_args, Cli, Command, EvaluateArgs, InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
pub use schema::{
    AttributeMinimums, Config, DataSources, KanConfig, ParameterRanges, ParameterRegistry,
    TrainConfig,
};
pub use validate::{validate_config, ValidationError};

use crate::error::{DdrError, Result};
use std::fs;
use std::path::Path;

/// Load, resolve and validate a run configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(DdrError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path)
        .map_err(|e| DdrError::io(format!("reading {}", path.display()), e))?;
    let mut config: Config =
        serde_yaml::from_str(&text).map_err(|e| DdrError::ConfigParsing {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    config.resolve_name();
    validate_config(&config)?;
    Ok(config)
}

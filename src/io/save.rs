//! Model saving.

use super::format::{ModelFormat, SaveConfig};
use super::model::Model;
use crate::error::{DdrError, Result};
use std::fs;
use std::path::Path;

/// Save a model state to a file.
pub fn save_model(model: &Model, path: impl AsRef<Path>, config: &SaveConfig) -> Result<()> {
    let path = path.as_ref();
    let state = model.to_state();

    let text = match config.format {
        ModelFormat::Json => {
            if config.pretty {
                serde_json::to_string_pretty(&state)
            } else {
                serde_json::to_string(&state)
            }
            .map_err(|e| DdrError::Serialization { message: format!("JSON write failed: {e}") })?
        }
        ModelFormat::Yaml => serde_yaml::to_string(&state)
            .map_err(|e| DdrError::Serialization { message: format!("YAML write failed: {e}") })?,
    };

    fs::write(path, text).map_err(|e| DdrError::io(format!("writing {}", path.display()), e))
}

//! Model loading.

use super::format::ModelFormat;
use super::model::{Model, ModelState};
use crate::error::{DdrError, Result};
use std::fs;
use std::path::Path;

/// Load a model state from a file. The format comes from the extension.
pub fn load_model(path: impl AsRef<Path>) -> Result<Model> {
    let path = path.as_ref();

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| DdrError::Serialization {
            message: format!("{} has no file extension", path.display()),
        })?;
    let format = ModelFormat::from_extension(ext).ok_or_else(|| DdrError::Serialization {
        message: format!("unsupported model format: .{ext}"),
    })?;

    let content = fs::read_to_string(path)
        .map_err(|e| DdrError::io(format!("reading {}", path.display()), e))?;

    let state: ModelState = match format {
        ModelFormat::Json => serde_json::from_str(&content)
            .map_err(|e| DdrError::Serialization { message: format!("JSON parse failed: {e}") })?,
        ModelFormat::Yaml => serde_yaml::from_str(&content)
            .map_err(|e| DdrError::Serialization { message: format!("YAML parse failed: {e}") })?,
    };

    Model::from_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::Tensor;
    use crate::io::{save_model, ModelMetadata, SaveConfig};
    use tempfile::TempDir;

    #[test]
    fn test_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let params = vec![("w".to_string(), Tensor::from_vec(vec![1.5, -2.5], true))];
        let model = Model::new(ModelMetadata::new("run", "kan"), params);
        save_model(&model, &path, &SaveConfig::default()).unwrap();

        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.metadata.name, "run");
        assert_eq!(loaded.get_parameter("w").unwrap().data().to_vec(), vec![1.5, -2.5]);
    }

    #[test]
    fn test_load_unknown_extension() {
        let err = load_model("model.gguf").unwrap_err();
        assert!(matches!(err, DdrError::Serialization { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_model("/nonexistent/state.json").unwrap_err();
        assert!(matches!(err, DdrError::Io { .. }));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, DdrError::Serialization { .. }));
    }
}

//! Serializable model state.

use crate::autograd::Tensor;
use crate::error::{DdrError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata stored alongside the parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Run name the state belongs to.
    pub name: String,

    /// Architecture identifier, e.g. "kan".
    pub architecture: String,

    /// Crate version that wrote the state.
    pub version: String,

    /// RFC 3339 timestamp of the save.
    pub created_at: String,

    /// Custom metadata fields.
    pub custom: HashMap<String, serde_json::Value>,
}

impl ModelMetadata {
    /// Create metadata stamped with the current time.
    pub fn new(name: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            architecture: architecture.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            custom: HashMap::new(),
        }
    }

    /// Add a custom metadata field.
    pub fn with_custom(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom.insert(key.into(), value);
        self
    }
}

/// Shape and flags of one stored parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterInfo {
    /// Parameter name, e.g. "layer0.coefficients".
    pub name: String,

    /// Parameter shape.
    pub shape: Vec<usize>,

    /// Element type.
    pub dtype: String,

    /// Whether the parameter takes gradients.
    pub requires_grad: bool,
}

/// Serializable model state: metadata, per-parameter layout and the
/// flattened values in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub metadata: ModelMetadata,
    pub parameters: Vec<ParameterInfo>,
    pub data: Vec<f32>,
}

/// In-memory view of a saved model.
#[derive(Debug)]
pub struct Model {
    pub metadata: ModelMetadata,
    pub parameters: Vec<(String, Tensor)>,
}

impl Model {
    pub fn new(metadata: ModelMetadata, parameters: Vec<(String, Tensor)>) -> Self {
        Self { metadata, parameters }
    }

    /// Get a parameter by name.
    pub fn get_parameter(&self, name: &str) -> Option<&Tensor> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Flatten into a serializable state.
    pub fn to_state(&self) -> ModelState {
        let mut data = Vec::new();
        let parameters: Vec<ParameterInfo> = self
            .parameters
            .iter()
            .map(|(name, tensor)| {
                data.extend(tensor.data().iter().copied());
                ParameterInfo {
                    name: name.clone(),
                    shape: vec![tensor.len()],
                    dtype: "f32".to_string(),
                    requires_grad: tensor.requires_grad(),
                }
            })
            .collect();

        ModelState { metadata: self.metadata.clone(), parameters, data }
    }

    /// Rebuild a model from a stored state.
    pub fn from_state(state: ModelState) -> Result<Self> {
        let expected: usize = state.parameters.iter().map(|p| p.shape.iter().product::<usize>()).sum();
        if expected != state.data.len() {
            return Err(DdrError::Checkpoint {
                message: format!(
                    "parameter shapes describe {expected} values but the state holds {}",
                    state.data.len()
                ),
            });
        }

        let mut offset = 0;
        let parameters: Vec<(String, Tensor)> = state
            .parameters
            .into_iter()
            .map(|info| {
                let size: usize = info.shape.iter().product();
                let values = state.data[offset..offset + size].to_vec();
                offset += size;
                (info.name, Tensor::from_vec(values, info.requires_grad))
            })
            .collect();

        Ok(Self { metadata: state.metadata, parameters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_records_crate_version() {
        let meta = ModelMetadata::new("merit_v1_nwm", "kan");
        assert_eq!(meta.name, "merit_v1_nwm");
        assert_eq!(meta.architecture, "kan");
        assert_eq!(meta.version, env!("CARGO_PKG_VERSION"));
        assert!(!meta.created_at.is_empty());
    }

    #[test]
    fn test_metadata_custom_fields() {
        let meta = ModelMetadata::new("run", "kan")
            .with_custom("epoch", serde_json::json!(3))
            .with_custom("seed", serde_json::json!(42));
        assert_eq!(meta.custom.len(), 2);
        assert_eq!(meta.custom["epoch"], serde_json::json!(3));
    }

    #[test]
    fn test_state_round_trip() {
        let params = vec![
            ("layer0.coefficients".to_string(), Tensor::from_vec(vec![1.0, 2.0, 3.0], true)),
            ("layer0.base_weight".to_string(), Tensor::from_vec(vec![0.1], true)),
        ];
        let original = Model::new(ModelMetadata::new("run", "kan"), params);

        let restored = Model::from_state(original.to_state()).unwrap();

        assert_eq!(restored.metadata.name, "run");
        assert_eq!(restored.parameters.len(), 2);
        assert_eq!(
            restored.get_parameter("layer0.coefficients").unwrap().data(),
            original.get_parameter("layer0.coefficients").unwrap().data()
        );
        assert!(restored.get_parameter("layer0.base_weight").unwrap().requires_grad());
    }

    #[test]
    fn test_from_state_rejects_truncated_data() {
        let state = ModelState {
            metadata: ModelMetadata::new("run", "kan"),
            parameters: vec![ParameterInfo {
                name: "w".to_string(),
                shape: vec![5],
                dtype: "f32".to_string(),
                requires_grad: true,
            }],
            data: vec![1.0, 2.0],
        };

        assert!(matches!(Model::from_state(state), Err(DdrError::Checkpoint { .. })));
    }

    #[test]
    fn test_get_parameter_by_name() {
        let params = vec![("w".to_string(), Tensor::from_vec(vec![1.0], true))];
        let model = Model::new(ModelMetadata::new("run", "kan"), params);
        assert!(model.get_parameter("w").is_some());
        assert!(model.get_parameter("missing").is_none());
    }
}

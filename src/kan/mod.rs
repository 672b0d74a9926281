//! Kolmogorov-Arnold network mapping reach attributes to routing parameters.
//!
//! The network consumes z-scored static attributes (one row per reach) and
//! emits one normalized value in [0, 1] per learnable routing parameter.
//! The router denormalizes those into physical ranges, so the network never
//! sees the parameter bounds themselves.

mod layer;
mod spline;

pub use layer::SplineLayer;
pub use spline::{basis, basis_and_derivative, basis_count};

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::autograd::{gather, sigmoid, Tensor};
use crate::config::KanConfig;
use crate::error::{DdrError, Result};

/// Network outputs keyed by learnable parameter name.
pub type KanOutputs = BTreeMap<String, Tensor>;

/// Spline network with a sigmoid head.
#[derive(Debug)]
pub struct Kan {
    layers: Vec<SplineLayer>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl Kan {
    /// Build the network from its config block. Layer sizes run
    /// input -> hidden (x `num_hidden_layers`) -> output.
    pub fn new(config: &KanConfig, seed: u64) -> Result<Self> {
        if config.output_size != config.learnable_parameters.len() {
            return Err(DdrError::ConfigValue {
                field: "kan.output_size".to_string(),
                message: format!(
                    "output_size is {} but {} learnable parameters are listed",
                    config.output_size,
                    config.learnable_parameters.len()
                ),
                suggestion: "Set output_size to the number of learnable_parameters".to_string(),
            });
        }
        if config.input_var_names.is_empty() {
            return Err(DdrError::ConfigValue {
                field: "kan.input_var_names".to_string(),
                message: "no input variables listed".to_string(),
                suggestion: "List at least one attribute to feed the network".to_string(),
            });
        }

        let mut dims = Vec::with_capacity(config.num_hidden_layers + 2);
        dims.push(config.input_var_names.len());
        for _ in 0..config.num_hidden_layers {
            dims.push(config.hidden_size);
        }
        dims.push(config.output_size);

        let mut rng = StdRng::seed_from_u64(seed);
        let layers = dims
            .windows(2)
            .map(|pair| SplineLayer::new(pair[0], pair[1], config.grid, config.k, &mut rng))
            .collect();

        Ok(Kan {
            layers,
            input_names: config.input_var_names.clone(),
            output_names: config.learnable_parameters.clone(),
        })
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Forward over a reach batch. `attributes` holds `samples` rows of
    /// `input_var_names.len()` z-scored values, row-major. Each output
    /// tensor has one value per sample, squashed into [0, 1].
    pub fn forward(&self, attributes: &Tensor, samples: usize) -> Result<KanOutputs> {
        let in_dim = self.input_names.len();
        if attributes.len() != samples * in_dim {
            return Err(DdrError::ShapeMismatch {
                expected: vec![samples, in_dim],
                actual: vec![attributes.len() / in_dim.max(1), in_dim],
            });
        }

        let mut x = attributes.clone();
        for layer in &self.layers {
            x = layer.forward(&x, samples);
        }
        let head = sigmoid(&x);

        let out_dim = self.output_names.len();
        let mut outputs = BTreeMap::new();
        for (column, name) in self.output_names.iter().enumerate() {
            let indices: Vec<usize> = (0..samples).map(|s| s * out_dim + column).collect();
            outputs.insert(name.clone(), gather(&head, &indices));
        }
        Ok(outputs)
    }

    /// Trainable tensors in a stable order, paired with checkpoint names.
    pub fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut named = Vec::with_capacity(self.layers.len() * 2);
        for (idx, layer) in self.layers.iter().enumerate() {
            named.push((format!("layer{idx}.coefficients"), layer.coefficients()));
            named.push((format!("layer{idx}.base_weight"), layer.base_weight()));
        }
        named
    }

    /// Trainable tensors in the same order as [`Kan::named_parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.layers
            .iter_mut()
            .flat_map(|layer| {
                let (coefficients, base_weight) = layer.tensors_mut();
                [coefficients, base_weight]
            })
            .collect()
    }

    /// Overwrite one named parameter, e.g. when restoring from a checkpoint.
    pub fn set_parameter(&mut self, name: &str, values: &[f32]) -> Result<()> {
        let (position, expected) = {
            let named = self.named_parameters();
            match named.iter().enumerate().find(|(_, (n, _))| n == name) {
                Some((position, (_, tensor))) => (position, tensor.len()),
                None => {
                    return Err(DdrError::ParameterNotFound {
                        name: name.to_string(),
                    })
                }
            }
        };
        if values.len() != expected {
            return Err(DdrError::ShapeMismatch {
                expected: vec![expected],
                actual: vec![values.len()],
            });
        }
        let mut parameters = self.parameters_mut();
        let tensor = parameters.swap_remove(position);
        for (slot, &value) in tensor.data_mut().iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }

    /// Drop all accumulated gradients.
    pub fn zero_grad(&self) {
        for (_, tensor) in self.named_parameters() {
            tensor.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};
    use approx::assert_abs_diff_eq;

    fn test_config() -> KanConfig {
        KanConfig {
            hidden_size: 4,
            input_var_names: vec!["slope".to_string(), "elevation".to_string()],
            num_hidden_layers: 1,
            output_size: 3,
            learnable_parameters: vec![
                "n".to_string(),
                "q_spatial".to_string(),
                "p_spatial".to_string(),
            ],
            grid: 5,
            k: 3,
        }
    }

    #[test]
    fn test_outputs_are_normalized_and_named() {
        let kan = Kan::new(&test_config(), 1).unwrap();
        let attrs = Tensor::from_vec(vec![0.3, -0.8, 1.2, 0.0, -0.4, 0.9], false);
        let outputs = kan.forward(&attrs, 3).unwrap();

        assert_eq!(outputs.len(), 3);
        for name in ["n", "q_spatial", "p_spatial"] {
            let column = &outputs[name];
            assert_eq!(column.len(), 3);
            for &v in column.data() {
                assert!(v > 0.0 && v < 1.0);
            }
        }
    }

    #[test]
    fn test_gradients_reach_every_parameter() {
        let kan = Kan::new(&test_config(), 5).unwrap();
        let attrs = Tensor::from_vec(vec![0.3, -0.8, 1.2, 0.0], false);
        let outputs = kan.forward(&attrs, 2).unwrap();

        let mut loss = sum(&outputs["n"]);
        backward(&mut loss, None);

        for (name, tensor) in kan.named_parameters() {
            let grad = tensor.grad();
            assert!(grad.is_some(), "no gradient for {name}");
        }
    }

    #[test]
    fn test_same_seed_reproduces_outputs() {
        let a = Kan::new(&test_config(), 99).unwrap();
        let b = Kan::new(&test_config(), 99).unwrap();
        let attrs = Tensor::from_vec(vec![0.1, 0.2], false);
        let oa = a.forward(&attrs, 1).unwrap();
        let ob = b.forward(&attrs, 1).unwrap();
        assert_abs_diff_eq!(oa["n"].data()[0], ob["n"].data()[0]);
    }

    #[test]
    fn test_output_size_mismatch_rejected() {
        let mut config = test_config();
        config.output_size = 2;
        let err = Kan::new(&config, 1).unwrap_err();
        assert!(matches!(err, DdrError::ConfigValue { .. }));
    }

    #[test]
    fn test_attribute_shape_mismatch_rejected() {
        let kan = Kan::new(&test_config(), 1).unwrap();
        let attrs = Tensor::from_vec(vec![0.1, 0.2, 0.3], false);
        let err = kan.forward(&attrs, 2).unwrap_err();
        assert!(matches!(err, DdrError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_set_parameter_round_trip() {
        let mut kan = Kan::new(&test_config(), 1).unwrap();
        let name = "layer0.coefficients".to_string();
        let len = kan
            .named_parameters()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t.len())
            .unwrap();

        let values: Vec<f32> = (0..len).map(|i| i as f32 * 0.01).collect();
        kan.set_parameter(&name, &values).unwrap();

        let named = kan.named_parameters();
        let (_, tensor) = named.iter().find(|(n, _)| *n == name).unwrap();
        assert_abs_diff_eq!(tensor.data()[3], 0.03);

        assert!(matches!(
            kan.set_parameter("layer9.coefficients", &values),
            Err(DdrError::ParameterNotFound { .. })
        ));
        assert!(matches!(
            kan.set_parameter(&name, &values[..2]),
            Err(DdrError::ShapeMismatch { .. })
        ));
    }
}

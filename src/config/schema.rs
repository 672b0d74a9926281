//! YAML schema for run configurations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::validate::validate_config;
use crate::error::{DdrError, Result};

/// Complete run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Derived run name. Resolved to `{version}_{forcings}` at load time;
    /// a literal value is accepted only if it equals that interpolation.
    #[serde(default)]
    pub name: String,

    /// Experiment version tag.
    pub version: String,

    /// Forcings product the run trains against (e.g. `nwm`).
    pub forcings: String,

    /// Informational only; execution is CPU.
    #[serde(default = "default_device")]
    pub device: String,

    /// Logical dataset name to filesystem path.
    pub data_sources: DataSources,

    /// Physical parameter registry.
    pub params: ParameterRegistry,

    /// Network block.
    pub kan: KanConfig,

    /// Training hyperparameters.
    pub train: TrainConfig,
}

/// Filesystem locations of the input tables and run outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSources {
    pub hydrofabric: PathBuf,
    pub statistics: PathBuf,
    pub forcings: PathBuf,
    pub observations: PathBuf,
    pub checkpoint_dir: PathBuf,
}

/// Named physical attributes, their minimum thresholds, region zones and
/// the bounded ranges of the learnable routing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRegistry {
    pub attributes: Vec<String>,
    pub attribute_minimums: AttributeMinimums,
    pub zones: Vec<String>,
    pub parameter_ranges: ParameterRanges,
}

/// Lower bounds applied as clamps in the router.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttributeMinimums {
    pub velocity: f32,
    pub depth: f32,
    pub discharge: f32,
    pub slope: f32,
}

/// `[lower, upper]` physical range per learnable parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub range: BTreeMap<String, [f32; 2]>,
}

/// Spline network block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanConfig {
    pub hidden_size: usize,
    pub input_var_names: Vec<String>,
    pub num_hidden_layers: usize,
    pub output_size: usize,
    pub learnable_parameters: Vec<String>,
    /// Spline grid resolution (intervals over [-1, 1]).
    pub grid: usize,
    /// Spline order.
    pub k: usize,
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Gauges sampled per mini-batch.
    pub batch_size: usize,

    /// Period bounds, `YYYY/MM/DD`.
    pub start_time: String,
    pub end_time: String,

    /// Regularization weight on the normalized spatial parameters.
    pub alpha: f32,

    /// Basin-area bounds (sq km) selecting which gauges train.
    pub area_lower_bound: f32,
    pub area_upper_bound: f32,

    /// Checkpoint to resume from, if any.
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,

    pub epochs: usize,

    /// Lateral-inflow scaling factor.
    pub factor: f32,

    /// Piecewise learning-rate schedule keyed by epoch.
    pub learning_rate: BTreeMap<usize, f32>,

    /// Minimum number of region zones that must survive gauge filtering.
    pub minimum_zones: usize,

    /// Routing window: timesteps per mini-batch.
    pub rho: usize,

    /// Shuffle routing windows each epoch.
    #[serde(default = "default_true")]
    pub shuffle: bool,

    /// Seed for window shuffling and network init.
    #[serde(default)]
    pub seed: u64,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Parse a YAML document, resolve the run name and validate.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(text).map_err(|e| DdrError::ConfigParsing {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        config.resolve_name();
        validate_config(&config)?;
        Ok(config)
    }

    /// The canonical interpolation of version and forcings.
    pub fn interpolated_name(&self) -> String {
        format!("{}_{}", self.version, self.forcings)
    }

    /// Resolve `${version}`/`${forcings}` placeholders; an absent name
    /// defaults to the full interpolation.
    pub(crate) fn resolve_name(&mut self) {
        if self.name.is_empty() {
            self.name = self.interpolated_name();
        } else {
            self.name = self
                .name
                .replace("${version}", &self.version)
                .replace("${forcings}", &self.forcings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml(name_line: &str) -> String {
        format!(
            r#"{name_line}
version: merit_v1
forcings: nwm
data_sources:
  hydrofabric: data/hydrofabric
  statistics: data/statistics.csv
  forcings: data/forcings.csv
  observations: data/observations.csv
  checkpoint_dir: runs/
params:
  attributes: [slope, elevation]
  attribute_minimums:
    velocity: 0.3
    depth: 0.01
    discharge: 0.0001
    slope: 0.0001
  zones: ['73']
  parameter_ranges:
    range:
      n: [0.01, 0.3]
      q_spatial: [1.5, 3.0]
      p_spatial: [1.0, 5.0]
kan:
  hidden_size: 16
  input_var_names: [slope, elevation]
  num_hidden_layers: 2
  output_size: 3
  learnable_parameters: [n, q_spatial, p_spatial]
  grid: 5
  k: 3
train:
  batch_size: 4
  start_time: 1994/05/24
  end_time: 1995/05/24
  alpha: 0.1
  area_lower_bound: 100.0
  area_upper_bound: 10000.0
  epochs: 10
  factor: 1.0
  learning_rate:
    0: 0.01
    5: 0.001
  minimum_zones: 1
  rho: 30
"#
        )
    }

    #[test]
    fn test_deserialize_full_config() {
        let config = Config::from_yaml(&minimal_yaml("name: merit_v1_nwm")).unwrap();
        assert_eq!(config.version, "merit_v1");
        assert_eq!(config.device, "cpu");
        assert_eq!(config.kan.hidden_size, 16);
        assert_eq!(config.params.parameter_ranges.range["n"], [0.01, 0.3]);
        assert_eq!(config.train.learning_rate[&5], 0.001);
        assert_eq!(config.train.rho, 30);
    }

    #[test]
    fn test_name_interpolates_placeholders() {
        let config = Config::from_yaml(&minimal_yaml("name: ${version}_${forcings}")).unwrap();
        assert_eq!(config.name, "merit_v1_nwm");
    }

    #[test]
    fn test_absent_name_defaults_to_interpolation() {
        let yaml = minimal_yaml("# no explicit name");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.name, "merit_v1_nwm");
    }

    #[test]
    fn test_literal_name_must_match_interpolation() {
        let err = Config::from_yaml(&minimal_yaml("name: something_else")).unwrap_err();
        assert!(err.to_string().contains("merit_v1_nwm"));
    }

    #[test]
    fn test_train_defaults() {
        let config = Config::from_yaml(&minimal_yaml("name: merit_v1_nwm")).unwrap();
        assert!(config.train.shuffle);
        assert!(config.train.checkpoint.is_none());
        assert_eq!(config.train.seed, 0);
    }

    #[test]
    fn test_negative_schedule_key_fails_to_parse() {
        let yaml = minimal_yaml("name: merit_v1_nwm").replace("    0: 0.01", "    -1: 0.01");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, DdrError::ConfigParsing { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let err = Config::from_yaml("train: [not a map").unwrap_err();
        assert!(matches!(err, DdrError::ConfigParsing { .. }));
    }
}

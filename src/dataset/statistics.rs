//! Attribute statistics used to z-score network inputs.

use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DdrError, Result};

/// min/max/mean/std for one attribute column.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std: f32,
}

/// Per-attribute statistics table.
///
/// Loaded from a CSV with a `statistic` key column (`min`, `max`, `mean`,
/// `std` rows) and one column per attribute.
#[derive(Debug, Clone, Default)]
pub struct AttributeStatistics {
    table: BTreeMap<String, AttributeStats>,
}

impl AttributeStatistics {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DdrError::TableNotFound { path: path.to_path_buf() });
        }
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| DdrError::csv("statistics table", e))?;
        let headers = reader
            .headers()
            .map_err(|e| DdrError::csv("statistics table", e))?
            .clone();

        let mut table: BTreeMap<String, AttributeStats> = headers
            .iter()
            .skip(1)
            .map(|name| (name.to_string(), AttributeStats::default()))
            .collect();

        for record in reader.records() {
            let record = record.map_err(|e| DdrError::csv("statistics table", e))?;
            let statistic = record.get(0).unwrap_or("").to_string();
            for (column, name) in headers.iter().skip(1).enumerate() {
                let raw = record.get(column + 1).unwrap_or("");
                let value: f32 = raw.trim().parse().map_err(|_| DdrError::Csv {
                    context: "statistics table".to_string(),
                    message: format!("'{raw}' is not a number ({statistic}, {name})"),
                })?;
                if let Some(stats) = table.get_mut(name) {
                    match statistic.as_str() {
                        "min" => stats.min = value,
                        "max" => stats.max = value,
                        "mean" => stats.mean = value,
                        "std" => stats.std = value,
                        _ => {}
                    }
                }
            }
        }
        Ok(AttributeStatistics { table })
    }

    pub fn get(&self, name: &str) -> Result<&AttributeStats> {
        self.table.get(name).ok_or_else(|| DdrError::MissingAttribute {
            name: name.to_string(),
            table: "statistics".to_string(),
        })
    }

    pub fn mean(&self, name: &str) -> Result<f32> {
        Ok(self.get(name)?.mean)
    }

    pub fn std(&self, name: &str) -> Result<f32> {
        Ok(self.get(name)?.std)
    }

    /// z-score an attributes matrix (rows = reaches, columns follow `names`).
    pub fn normalize(&self, names: &[String], attributes: &Array2<f32>) -> Result<Array2<f32>> {
        if names.len() != attributes.ncols() {
            return Err(DdrError::ShapeMismatch {
                expected: vec![attributes.nrows(), names.len()],
                actual: vec![attributes.nrows(), attributes.ncols()],
            });
        }
        let mut normalized = attributes.clone();
        for (column, name) in names.iter().enumerate() {
            let stats = self.get(name)?;
            if stats.std <= 0.0 {
                return Err(DdrError::Csv {
                    context: "statistics table".to_string(),
                    message: format!("attribute '{name}' has non-positive std {}", stats.std),
                });
            }
            for value in normalized.column_mut(column) {
                *value = (*value - stats.mean) / stats.std;
            }
        }
        Ok(normalized)
    }
}

//! Lateral inflow (q') per reach per timestep.

use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DdrError, Result};

/// Lateral inflow table, one row per day and one column per reach id.
///
/// Unlike observations, forcings must be complete: every routed day and
/// every reach needs a value.
#[derive(Debug, Clone)]
pub struct Forcings {
    reach_ids: Vec<String>,
    date_index: BTreeMap<NaiveDate, usize>,
    matrix: Array2<f32>,
}

impl Forcings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DdrError::TableNotFound { path: path.to_path_buf() });
        }
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| DdrError::csv("forcings table", e))?;
        let headers = reader
            .headers()
            .map_err(|e| DdrError::csv("forcings table", e))?
            .clone();
        let reach_ids: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut date_index = BTreeMap::new();
        let mut values: Vec<f32> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DdrError::csv("forcings table", e))?;
            let raw_date = record.get(0).unwrap_or("");
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(raw_date, "%Y/%m/%d"))
                .map_err(|_| DdrError::Csv {
                    context: "forcings table".to_string(),
                    message: format!("'{raw_date}' is not a date"),
                })?;
            date_index.insert(date, date_index.len());
            for column in 1..headers.len() {
                let cell = record.get(column).unwrap_or("").trim();
                let value: f32 = cell.parse().map_err(|_| DdrError::Csv {
                    context: "forcings table".to_string(),
                    message: format!("'{cell}' is not a number ({raw_date})"),
                })?;
                values.push(value);
            }
        }

        let rows = date_index.len();
        let matrix = Array2::from_shape_vec((rows, reach_ids.len()), values)
            .map_err(|e| DdrError::Csv {
                context: "forcings table".to_string(),
                message: e.to_string(),
            })?;
        Ok(Forcings { reach_ids, date_index, matrix })
    }

    pub fn reach_ids(&self) -> &[String] {
        &self.reach_ids
    }

    /// Lateral inflow (days x reaches) for the requested reach order over
    /// the requested days, scaled by the configured factor.
    pub fn select(
        &self,
        reach_ids: &[String],
        dates: &[NaiveDate],
        factor: f32,
    ) -> Result<Array2<f32>> {
        let columns: Vec<usize> = reach_ids
            .iter()
            .map(|id| {
                self.reach_ids.iter().position(|r| r == id).ok_or_else(|| {
                    DdrError::MissingAttribute {
                        name: id.clone(),
                        table: "forcings".to_string(),
                    }
                })
            })
            .collect::<Result<_>>()?;

        let mut selected = Array2::zeros((dates.len(), reach_ids.len()));
        for (t, date) in dates.iter().enumerate() {
            let row = *self.date_index.get(date).ok_or_else(|| DdrError::Csv {
                context: "forcings table".to_string(),
                message: format!("no forcing row for {date}"),
            })?;
            for (r, &column) in columns.iter().enumerate() {
                selected[[t, r]] = self.matrix[[row, column]] * factor;
            }
        }
        Ok(selected)
    }
}

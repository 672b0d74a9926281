//! Daily USGS gauge observations.

use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DdrError, Result};

/// Left-pad a gauge id to the 8-digit USGS STAID form.
pub fn pad_gage_id(raw: &str) -> String {
    format!("{:0>8}", raw.trim())
}

fn parse_csv_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

/// Observed discharge, one row per day and one column per gauge.
///
/// Gaps in the record (empty or `NA` cells, or days missing entirely) come
/// out as NaN; the loss and the metrics both mask NaN targets.
#[derive(Debug, Clone)]
pub struct Observations {
    gauge_ids: Vec<String>,
    date_index: BTreeMap<NaiveDate, usize>,
    matrix: Array2<f32>,
}

impl Observations {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DdrError::TableNotFound { path: path.to_path_buf() });
        }
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| DdrError::csv("observation table", e))?;
        let headers = reader
            .headers()
            .map_err(|e| DdrError::csv("observation table", e))?
            .clone();
        let gauge_ids: Vec<String> = headers.iter().skip(1).map(pad_gage_id).collect();

        let mut date_index = BTreeMap::new();
        let mut values: Vec<f32> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| DdrError::csv("observation table", e))?;
            let raw_date = record.get(0).unwrap_or("");
            let date = parse_csv_date(raw_date).ok_or_else(|| DdrError::Csv {
                context: "observation table".to_string(),
                message: format!("'{raw_date}' is not a date"),
            })?;
            date_index.insert(date, date_index.len());
            for column in 1..headers.len() {
                let cell = record.get(column).unwrap_or("").trim();
                let value = if cell.is_empty() || cell.eq_ignore_ascii_case("na") {
                    f32::NAN
                } else {
                    cell.parse().map_err(|_| DdrError::Csv {
                        context: "observation table".to_string(),
                        message: format!("'{cell}' is not a number ({raw_date})"),
                    })?
                };
                values.push(value);
            }
        }

        let rows = date_index.len();
        let matrix = Array2::from_shape_vec((rows, gauge_ids.len()), values)
            .map_err(|e| DdrError::Csv {
                context: "observation table".to_string(),
                message: e.to_string(),
            })?;
        Ok(Observations { gauge_ids, date_index, matrix })
    }

    pub fn gauge_ids(&self) -> &[String] {
        &self.gauge_ids
    }

    /// Target matrix (gauges x days) for the requested gauges over the
    /// requested days. Days absent from the record come out as NaN.
    pub fn select(&self, gauge_ids: &[String], dates: &[NaiveDate]) -> Result<Array2<f32>> {
        let columns: Vec<usize> = gauge_ids
            .iter()
            .map(|id| {
                let padded = pad_gage_id(id);
                self.gauge_ids
                    .iter()
                    .position(|g| *g == padded)
                    .ok_or(DdrError::MissingGauge { gage_id: padded.clone() })
            })
            .collect::<Result<_>>()?;

        let mut selected = Array2::from_elem((gauge_ids.len(), dates.len()), f32::NAN);
        for (t, date) in dates.iter().enumerate() {
            if let Some(&row) = self.date_index.get(date) {
                for (g, &column) in columns.iter().enumerate() {
                    selected[[g, t]] = self.matrix[[row, column]];
                }
            }
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    fn write_observations(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("observations.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "date,1563500,09423350").unwrap();
        writeln!(file, "2020-01-01,10.0,1.5").unwrap();
        writeln!(file, "2020-01-02,,2.5").unwrap();
        writeln!(file, "2020-01-04,12.0,NA").unwrap();
        path
    }

    #[test]
    fn test_headers_are_zero_padded() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Observations::load(&write_observations(&dir)).unwrap();
        assert_eq!(obs.gauge_ids(), ["01563500", "09423350"]);
    }

    #[test]
    fn test_select_orders_gauges_and_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Observations::load(&write_observations(&dir)).unwrap();
        let dates: Vec<NaiveDate> = (1..=4)
            .map(|d| NaiveDate::from_ymd_opt(2020, 1, d).unwrap())
            .collect();

        let target = obs
            .select(&["09423350".to_string(), "1563500".to_string()], &dates)
            .unwrap();
        assert_eq!(target.dim(), (2, 4));
        assert_abs_diff_eq!(target[[0, 0]], 1.5);
        assert_abs_diff_eq!(target[[1, 0]], 10.0);
        // Empty cell, missing day and NA cell all come out NaN.
        assert!(target[[1, 1]].is_nan());
        assert!(target[[0, 2]].is_nan());
        assert!(target[[0, 3]].is_nan());
        assert_abs_diff_eq!(target[[1, 3]], 12.0);
    }

    #[test]
    fn test_unknown_gauge_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let obs = Observations::load(&write_observations(&dir)).unwrap();
        let dates = vec![NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()];
        let err = obs.select(&["99999999".to_string()], &dates).unwrap_err();
        assert!(matches!(err, DdrError::MissingGauge { .. }));
    }

    #[test]
    fn test_pad_gage_id() {
        assert_eq!(pad_gage_id("1563500"), "01563500");
        assert_eq!(pad_gage_id("01563500"), "01563500");
    }
}

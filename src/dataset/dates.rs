//! Training period and routing windows.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DdrError, Result};

/// Dates in run configs are written `YYYY/MM/DD`.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

fn parse_date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| DdrError::ConfigValue {
        field: field.to_string(),
        message: format!("'{value}' is not a date: {e}"),
        suggestion: "Use the YYYY/MM/DD format, e.g. 1994/05/24".to_string(),
    })
}

/// The daily time axis of a run plus the rho-length routing windows
/// mini-batches are drawn from.
#[derive(Debug, Clone)]
pub struct Dates {
    start: NaiveDate,
    end: NaiveDate,
    daily: Vec<NaiveDate>,
    rho: usize,
}

impl Dates {
    pub fn new(start_time: &str, end_time: &str, rho: usize) -> Result<Self> {
        let start = parse_date("train.start_time", start_time)?;
        let end = parse_date("train.end_time", end_time)?;
        if start >= end {
            return Err(DdrError::ConfigValue {
                field: "train.start_time".to_string(),
                message: format!("start {start} is not before end {end}"),
                suggestion: "Swap or widen the training period".to_string(),
            });
        }
        let daily: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        if rho == 0 || rho > daily.len() {
            return Err(DdrError::ConfigValue {
                field: "train.rho".to_string(),
                message: format!("rho {rho} does not fit the {}-day period", daily.len()),
                suggestion: "Pick a routing window between 1 and the period length".to_string(),
            });
        }
        Ok(Dates { start, end, daily, rho })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every day in the period, inclusive of both ends.
    pub fn daily(&self) -> &[NaiveDate] {
        &self.daily
    }

    pub fn len(&self) -> usize {
        self.daily.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }

    pub fn rho(&self) -> usize {
        self.rho
    }

    /// Number of non-overlapping rho-length windows. A trailing partial
    /// window is dropped.
    pub fn num_windows(&self) -> usize {
        self.daily.len() / self.rho
    }

    /// Window start offsets for one epoch, optionally shuffled.
    pub fn window_origins(&self, shuffle: bool, seed: u64) -> Vec<usize> {
        let mut origins: Vec<usize> = (0..self.num_windows()).map(|w| w * self.rho).collect();
        if shuffle {
            let mut rng = StdRng::seed_from_u64(seed);
            origins.shuffle(&mut rng);
        }
        origins
    }

    /// The days covered by the window starting at `origin`.
    pub fn window_dates(&self, origin: usize) -> &[NaiveDate] {
        &self.daily[origin..origin + self.rho]
    }
}

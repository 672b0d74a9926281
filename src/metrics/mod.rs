//! Streamflow evaluation metrics.
//!
//! Per-gauge skill scores over daily discharge: error magnitudes, flow
//! duration curve error, correlation, Nash-Sutcliffe and Kling-Gupta
//! efficiencies, and percent bias over low/mid/high flow bands. Gaps in
//! the observations are excluded pairwise; gaps in the predictions are a
//! hard error, since the model has no business producing NaN.

use ndarray::Array2;
use serde::Serialize;

use crate::error::{DdrError, Result};

/// Per-gauge metric table. Every field holds one value per gauge; entries
/// stay NaN where a gauge has too few valid observations to support the
/// statistic (correlation and the efficiencies need at least two points).
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub bias: Vec<f32>,
    pub mae: Vec<f32>,
    pub rmse: Vec<f32>,
    /// RMSE of the anomalies around each series' own mean.
    pub ub_rmse: Vec<f32>,
    /// RMSE between 100-point flow duration curves.
    pub fdc_rmse: Vec<f32>,
    pub corr: Vec<f32>,
    pub corr_spearman: Vec<f32>,
    pub r2: Vec<f32>,
    pub nse: Vec<f32>,
    /// Percent bias over the bottom 30% of flows.
    pub flv: Vec<f32>,
    /// Percent bias over the top 2% of flows.
    pub fhv: Vec<f32>,
    pub pbias: Vec<f32>,
    pub pbias_mid: Vec<f32>,
    pub kge: Vec<f32>,
    pub kge_12: Vec<f32>,
    pub rmse_low: Vec<f32>,
    pub rmse_mid: Vec<f32>,
    pub rmse_high: Vec<f32>,
}

impl Metrics {
    /// Compute the full table for `pred` and `target` of shape
    /// gauges × days.
    pub fn new(pred: &Array2<f32>, target: &Array2<f32>) -> Result<Self> {
        if pred.dim() != target.dim() {
            return Err(DdrError::ShapeMismatch {
                expected: vec![target.nrows(), target.ncols()],
                actual: vec![pred.nrows(), pred.ncols()],
            });
        }
        if pred.iter().any(|v| v.is_nan()) {
            return Err(DdrError::NonFinitePrediction);
        }

        let ngrid = pred.nrows();
        let nt = pred.ncols();

        let mut metrics = Self {
            bias: vec![f32::NAN; ngrid],
            mae: vec![f32::NAN; ngrid],
            rmse: vec![f32::NAN; ngrid],
            ub_rmse: vec![f32::NAN; ngrid],
            fdc_rmse: vec![f32::NAN; ngrid],
            corr: vec![f32::NAN; ngrid],
            corr_spearman: vec![f32::NAN; ngrid],
            r2: vec![f32::NAN; ngrid],
            nse: vec![f32::NAN; ngrid],
            flv: vec![f32::NAN; ngrid],
            fhv: vec![f32::NAN; ngrid],
            pbias: vec![f32::NAN; ngrid],
            pbias_mid: vec![f32::NAN; ngrid],
            kge: vec![f32::NAN; ngrid],
            kge_12: vec![f32::NAN; ngrid],
            rmse_low: vec![f32::NAN; ngrid],
            rmse_mid: vec![f32::NAN; ngrid],
            rmse_high: vec![f32::NAN; ngrid],
        };

        for i in 0..ngrid {
            let p_row: Vec<f32> = pred.row(i).to_vec();
            let t_row: Vec<f32> = target.row(i).to_vec();

            let diffs: Vec<f32> = p_row.iter().zip(&t_row).map(|(p, t)| p - t).collect();
            metrics.bias[i] = nanmean(diffs.iter().copied());
            metrics.mae[i] = nanmean(diffs.iter().map(|d| d.abs()));
            metrics.rmse[i] = nanmean(diffs.iter().map(|d| d * d)).sqrt();

            // Anomaly RMSE: subtract each series' own mean before differencing.
            let p_mean = nanmean(p_row.iter().copied());
            let t_mean = nanmean(t_row.iter().copied());
            metrics.ub_rmse[i] = nanmean(
                p_row
                    .iter()
                    .zip(&t_row)
                    .map(|(p, t)| {
                        let d = (p - p_mean) - (t - t_mean);
                        d * d
                    }),
            )
            .sqrt();

            let p_fdc = flow_duration_curve(&p_row, nt);
            let t_fdc = flow_duration_curve(&t_row, nt);
            metrics.fdc_rmse[i] = nanmean(
                p_fdc.iter().zip(&t_fdc).map(|(p, t)| {
                    let d = p - t;
                    d * d
                }),
            )
            .sqrt();

            // Pairwise filter: keep days where both series have values.
            let (p, t): (Vec<f32>, Vec<f32>) = p_row
                .iter()
                .zip(&t_row)
                .filter(|(p, t)| !p.is_nan() && !t.is_nan())
                .map(|(&p, &t)| (p, t))
                .unzip();
            if p.is_empty() {
                continue;
            }

            let mut p_sort = p.clone();
            let mut t_sort = t.clone();
            sort_ascending(&mut p_sort);
            sort_ascending(&mut t_sort);

            let n = p.len();
            let index_low = (0.3_f64 * n as f64).round() as usize;
            let index_high = (0.98_f64 * n as f64).round() as usize;

            metrics.pbias[i] = percent_bias(&p, &t);
            metrics.flv[i] = percent_bias(&p_sort[..index_low], &t_sort[..index_low]);
            metrics.fhv[i] = percent_bias(&p_sort[index_high..], &t_sort[index_high..]);
            metrics.pbias_mid[i] =
                percent_bias(&p_sort[index_low..index_high], &t_sort[index_low..index_high]);
            metrics.rmse_low[i] = rmse_between(&p_sort[..index_low], &t_sort[..index_low]);
            metrics.rmse_high[i] = rmse_between(&p_sort[index_high..], &t_sort[index_high..]);
            metrics.rmse_mid[i] =
                rmse_between(&p_sort[index_low..index_high], &t_sort[index_low..index_high]);

            if n > 1 {
                metrics.corr[i] = pearson(&p, &t);
                metrics.corr_spearman[i] = spearman(&p, &t);

                let pm = mean(&p);
                let tm = mean(&t);
                let ps = population_std(&p, pm);
                let ts = population_std(&t, tm);
                let r = metrics.corr[i];

                metrics.kge[i] = 1.0
                    - ((r - 1.0).powi(2) + (ps / ts - 1.0).powi(2) + (pm / tm - 1.0).powi(2))
                        .sqrt();
                metrics.kge_12[i] = 1.0
                    - ((r - 1.0).powi(2)
                        + ((ps * tm) / (ts * pm) - 1.0).powi(2)
                        + (pm / tm - 1.0).powi(2))
                    .sqrt();

                let sst: f32 = t.iter().map(|v| (v - tm).powi(2)).sum();
                let ssres: f32 = t.iter().zip(&p).map(|(t, p)| (t - p).powi(2)).sum();
                metrics.nse[i] = 1.0 - ssres / sst;
                metrics.r2[i] = 1.0 - ssres / sst;
            }
        }

        Ok(metrics)
    }
}

/// Mean over non-NaN entries; NaN when none remain.
fn nanmean(values: impl IntoIterator<Item = f32>) -> f32 {
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for v in values {
        if !v.is_nan() {
            sum += f64::from(v);
            count += 1;
        }
    }
    if count == 0 {
        f32::NAN
    } else {
        (sum / count as f64) as f32
    }
}

/// Median over non-NaN entries; NaN when none remain.
fn nanmedian(values: impl IntoIterator<Item = f32>) -> f32 {
    let mut kept: Vec<f32> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return f32::NAN;
    }
    sort_ascending(&mut kept);
    let mid = kept.len() / 2;
    if kept.len() % 2 == 1 {
        kept[mid]
    } else {
        (kept[mid - 1] + kept[mid]) / 2.0
    }
}

fn sort_ascending(values: &mut [f32]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
}

fn mean(values: &[f32]) -> f32 {
    nanmean(values.iter().copied())
}

fn population_std(values: &[f32], mean: f32) -> f32 {
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

fn rmse_between(pred: &[f32], target: &[f32]) -> f32 {
    nanmean(pred.iter().zip(target).map(|(p, t)| {
        let d = p - t;
        d * d
    }))
    .sqrt()
}

/// Σ(pred − target) / Σtarget · 100. Empty slices give NaN through 0/0.
fn percent_bias(pred: &[f32], target: &[f32]) -> f32 {
    let diff: f32 = pred.iter().zip(target).map(|(p, t)| p - t).sum();
    let total: f32 = target.iter().sum();
    diff / total * 100.0
}

fn pearson(pred: &[f32], target: &[f32]) -> f32 {
    let pm = mean(pred);
    let tm = mean(target);
    let mut cov = 0.0_f64;
    let mut var_p = 0.0_f64;
    let mut var_t = 0.0_f64;
    for (p, t) in pred.iter().zip(target) {
        let dp = f64::from(p - pm);
        let dt = f64::from(t - tm);
        cov += dp * dt;
        var_p += dp * dp;
        var_t += dt * dt;
    }
    (cov / (var_p * var_t).sqrt()) as f32
}

/// Spearman rank correlation with average ranks for ties.
fn spearman(pred: &[f32], target: &[f32]) -> f32 {
    let pr = average_ranks(pred);
    let tr = average_ranks(target);
    pearson(&pr, &tr)
}

fn average_ranks(values: &[f32]) -> Vec<f32> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // Ranks are one-based; ties share the average of their positions.
        let rank = (i + j) as f32 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// 100-point flow duration curve: flows sorted descending, sampled at
/// exceedance percentiles 0..100. A series with no valid values yields
/// the curve of an all-zero series.
fn flow_duration_curve(values: &[f32], nt: usize) -> Vec<f32> {
    let mut kept: Vec<f32> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        kept = vec![0.0; nt];
    }
    kept.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let n = kept.len();
    (0..100).map(|i| kept[i * n / 100]).collect()
}

/// Render the evaluation summary in the fixed-width tabular layout.
/// The NSE median leaves out infinite entries (a constant observed series
/// makes the score −inf, which would swamp the median).
pub fn format_eval_table(nse: &[f32], rmse: &[f32], kge: &[f32]) -> Vec<String> {
    let separator = "-".repeat(40);
    let mut lines = vec![
        "Evaluation Results:".to_string(),
        separator.clone(),
        format!("{:<10} | {:>12} | {:>12}", "Metric", "Mean", "Median"),
        separator.clone(),
    ];

    let nse_finite = nse.iter().copied().filter(|v| !v.is_infinite());
    lines.push(format!(
        "{:<10} | {:12.4} | {:12.4}",
        "NSE",
        nanmean(nse.iter().copied()),
        nanmedian(nse_finite)
    ));
    lines.push(format!(
        "{:<10} | {:12.4} | {:12.4}",
        "RMSE",
        nanmean(rmse.iter().copied()),
        nanmedian(rmse.iter().copied())
    ));
    lines.push(format!(
        "{:<10} | {:12.4} | {:12.4}",
        "KGE",
        nanmean(kge.iter().copied()),
        nanmedian(kge.iter().copied())
    ));
    lines.push(separator);
    lines
}

/// Log the evaluation summary table.
pub fn log_eval_metrics(metrics: &Metrics) {
    for line in format_eval_table(&metrics.nse, &metrics.rmse, &metrics.kge) {
        log::info!("{line}");
    }
}

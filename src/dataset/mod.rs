//! Dataset loading: hydrofabric, forcings, observations, statistics.

mod dates;
mod forcings;
mod hydrofabric;
mod observations;
mod statistics;

pub use dates::{Dates, DATE_FORMAT};
pub use forcings::Forcings;
pub use hydrofabric::{Gauge, Hydrofabric};
pub use observations::{pad_gage_id, Observations};
pub use statistics::{AttributeStatistics, AttributeStats};

use ndarray::{s, Array1, Array2};
use std::collections::BTreeSet;

use crate::autograd::Tensor;
use crate::config::Config;
use crate::error::{DdrError, Result};

/// HUC region code of a gauge: the first two digits of the padded STAID.
pub fn gauge_zone(gage_id: &str) -> &str {
    &gage_id[..2.min(gage_id.len())]
}

/// Everything one training run needs, loaded and aligned once.
///
/// Matrices share the reach order of the hydrofabric and the day order of
/// [`Dates`]; the trainer only slices windows out of them.
#[derive(Debug)]
pub struct TrainDataset {
    pub fabric: Hydrofabric,
    pub dates: Dates,
    /// Selected gauges x days. NaN where unobserved.
    pub observations: Array2<f32>,
    /// Days x reaches, already scaled by `train.factor`.
    pub forcings: Array2<f32>,
    /// Reaches x `kan.input_var_names`, z-scored.
    pub normalized_attributes: Array2<f32>,
    pub gauge_ids: Vec<String>,
    pub gauge_reaches: Vec<Vec<usize>>,
}

impl TrainDataset {
    pub fn load(config: &Config) -> Result<Self> {
        let dates = Dates::new(
            &config.train.start_time,
            &config.train.end_time,
            config.train.rho,
        )?;
        let fabric =
            Hydrofabric::load(&config.data_sources.hydrofabric, &config.kan.input_var_names)?;
        let statistics = AttributeStatistics::load(&config.data_sources.statistics)?;
        let normalized_attributes =
            statistics.normalize(&config.kan.input_var_names, &fabric.spatial_attributes)?;

        let (gauge_ids, gauge_reaches) = select_gauges(
            &fabric,
            config.train.area_lower_bound,
            config.train.area_upper_bound,
            config.train.minimum_zones,
        )?;

        let observations =
            Observations::load(&config.data_sources.observations)?.select(&gauge_ids, dates.daily())?;
        let forcings = Forcings::load(&config.data_sources.forcings)?.select(
            &fabric.reach_ids,
            dates.daily(),
            config.train.factor,
        )?;

        log::info!(
            "dataset loaded: {} reaches, {} gauges, {} days",
            fabric.reaches(),
            gauge_ids.len(),
            dates.len()
        );

        Ok(TrainDataset {
            fabric,
            dates,
            observations,
            forcings,
            normalized_attributes,
            gauge_ids,
            gauge_reaches,
        })
    }

    pub fn gauges(&self) -> usize {
        self.gauge_ids.len()
    }

    /// Flat row-major attribute tensor fed to the network.
    pub fn attributes_tensor(&self) -> Tensor {
        let flat = Array1::from_iter(self.normalized_attributes.iter().copied());
        Tensor::new(flat, false)
    }

    /// Lateral inflow for the window starting at `origin` (rho x reaches).
    pub fn forcings_window(&self, origin: usize) -> Array2<f32> {
        let rho = self.dates.rho();
        self.forcings.slice(s![origin..origin + rho, ..]).to_owned()
    }

    /// Observed discharge for the window starting at `origin`
    /// (gauges x rho).
    pub fn observations_window(&self, origin: usize) -> Array2<f32> {
        let rho = self.dates.rho();
        self.observations.slice(s![.., origin..origin + rho]).to_owned()
    }
}

fn select_gauges(
    fabric: &Hydrofabric,
    area_lower_bound: f32,
    area_upper_bound: f32,
    minimum_zones: usize,
) -> Result<(Vec<String>, Vec<Vec<usize>>)> {
    let mut gauge_ids = Vec::new();
    let mut gauge_reaches = Vec::new();
    for gauge in &fabric.gauges {
        if gauge.drainage_area >= area_lower_bound && gauge.drainage_area <= area_upper_bound {
            gauge_ids.push(gauge.gage_id.clone());
            gauge_reaches.push(gauge.reaches.clone());
        } else {
            log::debug!(
                "gauge {} outside area bounds ({} sqkm)",
                gauge.gage_id,
                gauge.drainage_area
            );
        }
    }
    if gauge_ids.is_empty() {
        return Err(DdrError::ConfigValue {
            field: "train.area_lower_bound".to_string(),
            message: "no gauges fall inside the basin-area bounds".to_string(),
            suggestion: "Widen area_lower_bound/area_upper_bound".to_string(),
        });
    }
    let zones: BTreeSet<&str> = gauge_ids.iter().map(|id| gauge_zone(id)).collect();
    if zones.len() < minimum_zones {
        return Err(DdrError::ConfigValue {
            field: "train.minimum_zones".to_string(),
            message: format!(
                "only {} zones remain after the area filter, {} required",
                zones.len(),
                minimum_zones
            ),
            suggestion: "Lower minimum_zones or widen the area bounds".to_string(),
        });
    }
    Ok((gauge_ids, gauge_reaches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use approx::assert_abs_diff_eq;
    use std::io::Write;
    use std::path::Path;

    fn write_file(path: &Path, content: &str) {
        let mut file = std::fs::File::create(path).unwrap();
        write!(file, "{content}").unwrap();
    }

    /// Three-reach chain with one gauge at the outlet, six days of data.
    fn write_fixture(dir: &Path) {
        let fabric_dir = dir.join("hydrofabric");
        std::fs::create_dir_all(&fabric_dir).unwrap();
        write_file(
            &fabric_dir.join("flowpaths.csv"),
            "id,toid,length_m,so,top_wdth,musk_x,tot_drainage_areasqkm\n\
             wb-3,nex-3,1200.0,0.002,8.0,0.3,30.0\n\
             wb-1,nex-1,1000.0,0.001,5.0,0.29,10.0\n\
             wb-2,nex-2,1100.0,0.0015,6.0,0.3,20.0\n",
        );
        write_file(&fabric_dir.join("nexus.csv"), "id,toid\nnex-1,wb-2\nnex-2,wb-3\nnex-3,\n");
        write_file(
            &fabric_dir.join("divide_attributes.csv"),
            "divide_id,slope,elevation\ncat-1,0.1,100.0\ncat-2,0.2,200.0\ncat-3,0.3,300.0\n",
        );
        write_file(&fabric_dir.join("gauges.csv"), "gage_id,reach_id\n1563500,wb-3\n");

        write_file(
            &dir.join("statistics.csv"),
            "statistic,slope,elevation\nmin,0.0,10.0\nmax,0.5,3000.0\n\
             mean,0.2,200.0\nstd,0.1,100.0\n",
        );

        let mut observations = String::from("date,1563500\n");
        let mut forcings = String::from("date,wb-1,wb-2,wb-3\n");
        for day in 1..=6 {
            observations.push_str(&format!("2020-01-0{day},{}.0\n", day + 9));
            forcings.push_str(&format!("2020-01-0{day},1.0,2.0,3.0\n"));
        }
        write_file(&dir.join("observations.csv"), &observations);
        write_file(&dir.join("forcings.csv"), &forcings);
    }

    fn fixture_yaml(dir: &Path) -> String {
        let root = dir.display();
        format!(
            r#"name: test_v1_nwm
version: test_v1
forcings: nwm
device: cpu
data_sources:
  hydrofabric: {root}/hydrofabric
  statistics: {root}/statistics.csv
  forcings: {root}/forcings.csv
  observations: {root}/observations.csv
  checkpoint_dir: {root}/checkpoints
params:
  attributes: [slope, elevation]
  attribute_minimums:
    velocity: 0.3
    depth: 0.01
    discharge: 0.0001
    slope: 0.0001
  zones: ['01']
  parameter_ranges:
    range:
      n: [0.01, 0.3]
      q_spatial: [1.5, 3.0]
      p_spatial: [1.0, 5.0]
kan:
  hidden_size: 4
  input_var_names: [slope, elevation]
  num_hidden_layers: 1
  output_size: 3
  learnable_parameters: [n, q_spatial, p_spatial]
  grid: 5
  k: 3
train:
  batch_size: 1
  start_time: 2020/01/01
  end_time: 2020/01/06
  alpha: 0.1
  area_lower_bound: 5.0
  area_upper_bound: 100.0
  epochs: 2
  factor: 1.0
  learning_rate:
    0: 0.01
  minimum_zones: 1
  rho: 3
  shuffle: false
"#
        )
    }

    #[test]
    fn test_load_aligns_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let config = Config::from_yaml(&fixture_yaml(dir.path())).unwrap();

        let dataset = TrainDataset::load(&config).unwrap();
        assert_eq!(dataset.fabric.reaches(), 3);
        assert_eq!(dataset.gauge_ids, ["01563500"]);
        assert_eq!(dataset.gauge_reaches, vec![vec![2]]);
        assert_eq!(dataset.observations.dim(), (1, 6));
        assert_eq!(dataset.forcings.dim(), (6, 3));
        assert_eq!(dataset.normalized_attributes.dim(), (3, 2));

        // (0.1 - 0.2) / 0.1 for the smallest reach's slope.
        assert_abs_diff_eq!(dataset.normalized_attributes[[0, 0]], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(dataset.observations[[0, 0]], 10.0);
        assert_abs_diff_eq!(dataset.forcings[[0, 2]], 3.0);
    }

    #[test]
    fn test_windows_slice_the_period() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let config = Config::from_yaml(&fixture_yaml(dir.path())).unwrap();
        let dataset = TrainDataset::load(&config).unwrap();

        assert_eq!(dataset.dates.num_windows(), 2);
        let forcings = dataset.forcings_window(3);
        assert_eq!(forcings.dim(), (3, 3));
        let target = dataset.observations_window(3);
        assert_eq!(target.dim(), (1, 3));
        assert_abs_diff_eq!(target[[0, 0]], 13.0);
    }

    #[test]
    fn test_area_bounds_filter_gauges() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let yaml = fixture_yaml(dir.path()).replace("area_upper_bound: 100.0", "area_upper_bound: 20.0");
        let config = Config::from_yaml(&yaml).unwrap();

        let err = TrainDataset::load(&config).unwrap_err();
        assert!(matches!(err, DdrError::ConfigValue { .. }));
        assert!(err.to_string().contains("area"));
    }

    #[test]
    fn test_minimum_zones_enforced() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let yaml = fixture_yaml(dir.path()).replace("minimum_zones: 1", "minimum_zones: 2");
        let config = Config::from_yaml(&yaml).unwrap();

        let err = TrainDataset::load(&config).unwrap_err();
        assert!(err.to_string().contains("minimum_zones"));
    }

    #[test]
    fn test_gauge_zone_is_huc_prefix() {
        assert_eq!(gauge_zone("01563500"), "01");
        assert_eq!(gauge_zone("09423350"), "09");
    }
}

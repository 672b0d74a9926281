//! River network loaded from the hydrofabric CSV layers.
//!
//! Four layers live under the `hydrofabric` data source directory:
//! `flowpaths.csv` (geometry and drainage area per reach), `nexus.csv`
//! (junctions wiring reach outflows to downstream reaches),
//! `divide_attributes.csv` (catchment attributes keyed by divide id) and
//! `gauges.csv` (USGS gauge to reach assignments).
//!
//! Reaches are ordered by total drainage area ascending, so every reach
//! drains strictly downward in index space and the routing matrix is lower
//! triangular with row 0 a headwater.

use ndarray::{Array1, Array2};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{DdrError, Result};
use crate::routing::CsrPattern;

use super::observations::pad_gage_id;

#[derive(Debug, Deserialize)]
struct FlowpathRow {
    id: String,
    toid: String,
    length_m: f32,
    so: f32,
    top_wdth: f32,
    musk_x: f32,
    tot_drainage_areasqkm: f32,
}

#[derive(Debug, Deserialize)]
struct NexusRow {
    id: String,
    toid: String,
}

#[derive(Debug, Deserialize)]
struct GaugeRow {
    gage_id: String,
    reach_id: String,
}

/// A gauge and the sorted reach indices it reads from.
#[derive(Debug, Clone)]
pub struct Gauge {
    pub gage_id: String,
    pub reaches: Vec<usize>,
    pub drainage_area: f32,
}

/// The river network in routing order.
#[derive(Debug, Clone)]
pub struct Hydrofabric {
    pub reach_ids: Vec<String>,
    pub length: Array1<f32>,
    pub slope: Array1<f32>,
    pub width: Array1<f32>,
    pub musk_x: Array1<f32>,
    pub drainage_area: Array1<f32>,
    pub adjacency: CsrPattern,
    /// Reaches x requested attributes, in `attribute_names` order.
    pub spatial_attributes: Array2<f32>,
    pub gauges: Vec<Gauge>,
}

/// Catchment divide id for a reach id (`wb-*` pairs with `cat-*`).
fn divide_of(reach_id: &str) -> String {
    match reach_id.strip_prefix("wb-") {
        Some(suffix) => format!("cat-{suffix}"),
        None => reach_id.to_string(),
    }
}

fn layer_path(dir: &Path, layer: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(layer);
    if !path.exists() {
        return Err(DdrError::TableNotFound { path });
    }
    Ok(path)
}

impl Hydrofabric {
    pub fn load(dir: &Path, attribute_names: &[String]) -> Result<Self> {
        let mut flowpaths: Vec<FlowpathRow> = Vec::new();
        let mut reader = csv::Reader::from_path(layer_path(dir, "flowpaths.csv")?)
            .map_err(|e| DdrError::csv("flowpaths layer", e))?;
        for row in reader.deserialize() {
            flowpaths.push(row.map_err(|e| DdrError::csv("flowpaths layer", e))?);
        }
        flowpaths.sort_by(|a, b| {
            a.tot_drainage_areasqkm
                .partial_cmp(&b.tot_drainage_areasqkm)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let n = flowpaths.len();
        let idx_mapper: BTreeMap<String, usize> = flowpaths
            .iter()
            .enumerate()
            .map(|(idx, row)| (row.id.clone(), idx))
            .collect();

        let mut nexus_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut reader = csv::Reader::from_path(layer_path(dir, "nexus.csv")?)
            .map_err(|e| DdrError::csv("nexus layer", e))?;
        for row in reader.deserialize() {
            let row: NexusRow = row.map_err(|e| DdrError::csv("nexus layer", e))?;
            if !row.toid.trim().is_empty() {
                nexus_map.entry(row.id).or_default().push(row.toid);
            }
        }

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (col, flowpath) in flowpaths.iter().enumerate() {
            if flowpath.toid.trim().is_empty() {
                continue;
            }
            let Some(downstream) = nexus_map.get(&flowpath.toid) else {
                continue;
            };
            for down_id in downstream {
                let Some(&row) = idx_mapper.get(down_id) else {
                    log::debug!("reach {} drains to {} outside the domain", flowpath.id, down_id);
                    continue;
                };
                if row <= col {
                    return Err(DdrError::Csv {
                        context: "hydrofabric".to_string(),
                        message: format!(
                            "downstream reach '{down_id}' does not gain drainage area over \
                             '{}'; check tot_drainage_areasqkm",
                            flowpath.id
                        ),
                    });
                }
                edges.push((row, col));
            }
        }
        let adjacency = CsrPattern::from_edges(n, &edges);

        let spatial_attributes = load_attributes(dir, &flowpaths, attribute_names)?;
        let gauges = load_gauges(dir, &idx_mapper, &flowpaths)?;

        Ok(Hydrofabric {
            reach_ids: flowpaths.iter().map(|f| f.id.clone()).collect(),
            length: Array1::from_iter(flowpaths.iter().map(|f| f.length_m)),
            slope: Array1::from_iter(flowpaths.iter().map(|f| f.so)),
            width: Array1::from_iter(flowpaths.iter().map(|f| f.top_wdth)),
            musk_x: Array1::from_iter(flowpaths.iter().map(|f| f.musk_x)),
            drainage_area: Array1::from_iter(flowpaths.iter().map(|f| f.tot_drainage_areasqkm)),
            adjacency,
            spatial_attributes,
            gauges,
        })
    }

    pub fn reaches(&self) -> usize {
        self.length.len()
    }

    /// Hand-built network for tests and demos: sequential reach ids, unit
    /// drainage-area ordering, no gauges or attributes.
    pub fn synthetic(
        length: Array1<f32>,
        slope: Array1<f32>,
        width: Array1<f32>,
        musk_x: Array1<f32>,
        adjacency: CsrPattern,
    ) -> Self {
        let n = length.len();
        Hydrofabric {
            reach_ids: (0..n).map(|i| format!("wb-{i}")).collect(),
            drainage_area: Array1::from_iter((0..n).map(|i| (i + 1) as f32)),
            spatial_attributes: Array2::zeros((n, 0)),
            gauges: Vec::new(),
            length,
            slope,
            width,
            musk_x,
            adjacency,
        }
    }
}

fn load_attributes(
    dir: &Path,
    flowpaths: &[FlowpathRow],
    attribute_names: &[String],
) -> Result<Array2<f32>> {
    let path = layer_path(dir, "divide_attributes.csv")?;
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| DdrError::csv("divide_attributes layer", e))?;
    let headers = reader
        .headers()
        .map_err(|e| DdrError::csv("divide_attributes layer", e))?
        .clone();

    let columns: Vec<usize> = attribute_names
        .iter()
        .map(|name| {
            headers.iter().position(|h| h == name).ok_or_else(|| DdrError::MissingAttribute {
                name: name.clone(),
                table: "divide_attributes".to_string(),
            })
        })
        .collect::<Result<_>>()?;

    let mut rows: BTreeMap<String, Vec<f32>> = BTreeMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| DdrError::csv("divide_attributes layer", e))?;
        let divide_id = record.get(0).unwrap_or("").to_string();
        let values: Vec<f32> = columns
            .iter()
            .map(|&column| {
                let cell = record.get(column).unwrap_or("").trim();
                cell.parse().map_err(|_| DdrError::Csv {
                    context: "divide_attributes layer".to_string(),
                    message: format!("'{cell}' is not a number ({divide_id})"),
                })
            })
            .collect::<Result<_>>()?;
        rows.insert(divide_id, values);
    }

    let mut attributes = Array2::zeros((flowpaths.len(), attribute_names.len()));
    for (reach, flowpath) in flowpaths.iter().enumerate() {
        let divide = divide_of(&flowpath.id);
        let values = rows.get(&divide).ok_or_else(|| DdrError::Csv {
            context: "divide_attributes layer".to_string(),
            message: format!("no attribute row for divide '{divide}' (reach '{}')", flowpath.id),
        })?;
        for (column, &value) in values.iter().enumerate() {
            attributes[[reach, column]] = value;
        }
    }
    Ok(attributes)
}

fn load_gauges(
    dir: &Path,
    idx_mapper: &BTreeMap<String, usize>,
    flowpaths: &[FlowpathRow],
) -> Result<Vec<Gauge>> {
    let path = layer_path(dir, "gauges.csv")?;
    let mut reader = csv::Reader::from_path(path).map_err(|e| DdrError::csv("gauges layer", e))?;

    let mut gauges: Vec<Gauge> = Vec::new();
    for row in reader.deserialize() {
        let row: GaugeRow = row.map_err(|e| DdrError::csv("gauges layer", e))?;
        let padded = pad_gage_id(&row.gage_id);
        let reach = *idx_mapper.get(&row.reach_id).ok_or_else(|| DdrError::Csv {
            context: "gauges layer".to_string(),
            message: format!("gauge {padded} references unknown reach '{}'", row.reach_id),
        })?;
        match gauges.iter_mut().find(|g| g.gage_id == padded) {
            Some(gauge) => gauge.reaches.push(reach),
            None => gauges.push(Gauge {
                gage_id: padded,
                reaches: vec![reach],
                drainage_area: 0.0,
            }),
        }
    }
    for gauge in &mut gauges {
        gauge.drainage_area = gauge
            .reaches
            .iter()
            .map(|&reach| flowpaths[reach].tot_drainage_areasqkm)
            .fold(0.0, f32::max);
    }
    Ok(gauges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    fn write_layer(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        write!(file, "{content}").unwrap();
    }

    fn write_chain_fixture(dir: &Path) {
        write_layer(
            dir,
            "flowpaths.csv",
            "id,toid,length_m,so,top_wdth,musk_x,tot_drainage_areasqkm\n\
             wb-3,nex-3,1200.0,0.002,8.0,0.3,30.0\n\
             wb-1,nex-1,1000.0,0.001,5.0,0.29,10.0\n\
             wb-2,nex-2,1100.0,0.0015,6.0,0.3,20.0\n",
        );
        write_layer(dir, "nexus.csv", "id,toid\nnex-1,wb-2\nnex-2,wb-3\nnex-3,\n");
        write_layer(
            dir,
            "divide_attributes.csv",
            "divide_id,slope,elevation\ncat-1,0.1,100.0\ncat-2,0.2,200.0\ncat-3,0.3,300.0\n",
        );
        write_layer(dir, "gauges.csv", "gage_id,reach_id\n1563500,wb-3\n");
    }

    fn attrs() -> Vec<String> {
        vec!["slope".to_string(), "elevation".to_string()]
    }

    #[test]
    fn test_reaches_sorted_by_drainage_area() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        let fabric = Hydrofabric::load(dir.path(), &attrs()).unwrap();

        assert_eq!(fabric.reach_ids, ["wb-1", "wb-2", "wb-3"]);
        assert_abs_diff_eq!(fabric.length[0], 1000.0);
        assert_abs_diff_eq!(fabric.length[2], 1200.0);
        assert_abs_diff_eq!(fabric.drainage_area[1], 20.0);
        assert_abs_diff_eq!(fabric.musk_x[0], 0.29);
    }

    #[test]
    fn test_adjacency_marks_downstream_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        let fabric = Hydrofabric::load(dir.path(), &attrs()).unwrap();

        let (rows, cols) = fabric.adjacency.row_col_indices();
        let pairs: Vec<(usize, usize)> = rows.into_iter().zip(cols).collect();
        assert_eq!(pairs, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_attributes_follow_reach_order() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        let fabric = Hydrofabric::load(dir.path(), &attrs()).unwrap();

        assert_eq!(fabric.spatial_attributes.dim(), (3, 2));
        assert_abs_diff_eq!(fabric.spatial_attributes[[0, 0]], 0.1);
        assert_abs_diff_eq!(fabric.spatial_attributes[[2, 1]], 300.0);
    }

    #[test]
    fn test_gauges_read_sorted_indices() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        let fabric = Hydrofabric::load(dir.path(), &attrs()).unwrap();

        assert_eq!(fabric.gauges.len(), 1);
        assert_eq!(fabric.gauges[0].gage_id, "01563500");
        assert_eq!(fabric.gauges[0].reaches, vec![2]);
        assert_abs_diff_eq!(fabric.gauges[0].drainage_area, 30.0);
    }

    #[test]
    fn test_missing_layer_file() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        std::fs::remove_file(dir.path().join("nexus.csv")).unwrap();
        let err = Hydrofabric::load(dir.path(), &attrs()).unwrap_err();
        assert!(matches!(err, DdrError::TableNotFound { .. }));
    }

    #[test]
    fn test_missing_attribute_column() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        let err = Hydrofabric::load(dir.path(), &["aspect".to_string()]).unwrap_err();
        assert!(matches!(err, DdrError::MissingAttribute { .. }));
    }

    #[test]
    fn test_nonmonotone_drainage_area_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_chain_fixture(dir.path());
        // wb-2 claims more drainage area than the reach it feeds.
        write_layer(
            dir.path(),
            "flowpaths.csv",
            "id,toid,length_m,so,top_wdth,musk_x,tot_drainage_areasqkm\n\
             wb-3,nex-3,1200.0,0.002,8.0,0.3,30.0\n\
             wb-1,nex-1,1000.0,0.001,5.0,0.29,10.0\n\
             wb-2,nex-2,1100.0,0.0015,6.0,0.3,50.0\n",
        );
        let err = Hydrofabric::load(dir.path(), &attrs()).unwrap_err();
        assert!(err.to_string().contains("tot_drainage_areasqkm"));
    }

    #[test]
    fn test_synthetic_shapes() {
        let fabric = Hydrofabric::synthetic(
            Array1::from_elem(2, 1000.0),
            Array1::from_elem(2, 0.001),
            Array1::from_elem(2, 10.0),
            Array1::from_elem(2, 0.3),
            CsrPattern::from_edges(2, &[(1, 0)]),
        );
        assert_eq!(fabric.reaches(), 2);
        assert_eq!(fabric.reach_ids, ["wb-0", "wb-1"]);
        assert!(fabric.gauges.is_empty());
    }
}

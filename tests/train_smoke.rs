//! End-to-end training smoke test
//!
//! Builds a three-reach river network from CSV fixtures, trains through the
//! same code path the `train` command takes, resumes from a mid-run
//! checkpoint and scores the result against the observations.

use approx::assert_abs_diff_eq;
use clap::Parser;
use ddr::cli::{run_command, Cli};
use ddr::config::load_config;
use ddr::dataset::TrainDataset;
use ddr::io::{load_model, save_model, SaveConfig};
use ddr::train::{checkpoint_file, Trainer};
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_file(path: &Path, content: &str) {
    let mut file = std::fs::File::create(path).unwrap();
    write!(file, "{content}").unwrap();
}

/// Three-reach chain draining to one gauged outlet, six days of data.
fn write_fixture(dir: &Path) -> PathBuf {
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

    let root = dir.display();
    let yaml = format!(
        r#"name: test_v1_nwm
version: test_v1
forcings: nwm
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
  seed: 3
"#
    );
    let path = dir.join("run.yaml");
    write_file(&path, &yaml);
    path
}

#[test]
fn train_command_writes_checkpoints_and_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());

    let cli = Cli::try_parse_from([
        "ddr",
        "--quiet",
        "train",
        "--config",
        config_path.to_str().unwrap(),
    ])
    .unwrap();
    run_command(cli).unwrap();

    let checkpoints = dir.path().join("checkpoints");
    // Mid-epoch save after the first window, end-of-run save after epoch 2.
    assert!(checkpoints.join(checkpoint_file("test_v1_nwm", 1, 1)).exists());
    assert!(checkpoints.join(checkpoint_file("test_v1_nwm", 3, 0)).exists());
    assert!(checkpoints.join("test_v1_nwm_model.json").exists());
}

#[test]
fn evaluate_command_accepts_model_and_checkpoint_files() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());
    let config_arg = config_path.to_str().unwrap();

    let cli =
        Cli::try_parse_from(["ddr", "--quiet", "train", "--config", config_arg]).unwrap();
    run_command(cli).unwrap();

    let checkpoints = dir.path().join("checkpoints");
    let model_path = checkpoints.join("test_v1_nwm_model.json");
    let mid_run = checkpoints.join(checkpoint_file("test_v1_nwm", 1, 1));

    for artifact in [&model_path, &mid_run] {
        let cli = Cli::try_parse_from([
            "ddr",
            "--quiet",
            "evaluate",
            "--config",
            config_arg,
            "--checkpoint",
            artifact.to_str().unwrap(),
        ])
        .unwrap();
        run_command(cli).unwrap();
    }
}

#[test]
fn training_reports_finite_losses_and_resumes_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());
    let config = load_config(&config_path).unwrap();
    let dataset = TrainDataset::load(&config).unwrap();

    let mut trainer = Trainer::new(&config, &dataset).unwrap();
    let report = trainer.train().unwrap();
    assert_eq!(report.epochs.len(), 2);
    assert!(report.epochs.iter().all(|e| e.mean_loss.is_finite()));
    let last = report.last_checkpoint.unwrap();
    assert!(last.ends_with(checkpoint_file("test_v1_nwm", 3, 0)));

    // Resuming from the final checkpoint finds nothing left to train.
    let mut resumed_config = config.clone();
    resumed_config.train.checkpoint = Some(last);
    let mut resumed = Trainer::new(&resumed_config, &dataset).unwrap();
    let report = resumed.train().unwrap();
    assert!(report.epochs.is_empty());

    // The resumed trainer carries the trained parameters.
    let trained = trainer.model();
    let restored = resumed.model();
    for (name, tensor) in &trained.parameters {
        let other = restored.get_parameter(name).unwrap();
        for (a, b) in tensor.data().iter().zip(other.data().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }
}

#[test]
fn saved_model_scores_identically_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_fixture(dir.path());
    let config = load_config(&config_path).unwrap();
    let dataset = TrainDataset::load(&config).unwrap();

    let mut trainer = Trainer::new(&config, &dataset).unwrap();
    trainer.train().unwrap();
    let trained_metrics = trainer.evaluate().unwrap();

    let model_path = dir.path().join("model.json");
    save_model(&trainer.model(), &model_path, &SaveConfig::default()).unwrap();
    let model = load_model(&model_path).unwrap();

    // A trainer initialized from a different seed converges to the saved
    // parameters once they are loaded.
    let mut other_config = config.clone();
    other_config.train.seed = 99;
    let mut reloaded = Trainer::new(&other_config, &dataset).unwrap();
    reloaded.load_parameters(&model).unwrap();
    let reloaded_metrics = reloaded.evaluate().unwrap();

    assert_eq!(trained_metrics.rmse.len(), 1);
    assert_abs_diff_eq!(trained_metrics.rmse[0], reloaded_metrics.rmse[0], epsilon = 1e-5);
    assert_abs_diff_eq!(trained_metrics.nse[0], reloaded_metrics.nse[0], epsilon = 1e-5);
}

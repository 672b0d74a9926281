//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, Config, ValidateArgs};

/// Format the run identity as a string
pub fn format_run_info(config: &Config) -> String {
    format!(
        "  Run: {}\n  Version: {}\n  Forcings: {}\n  Device: {}",
        config.name, config.version, config.forcings, config.device
    )
}

/// Format the data source paths as a string
pub fn format_data_info(config: &Config) -> String {
    let sources = &config.data_sources;
    [
        format!("  Hydrofabric: {}", sources.hydrofabric.display()),
        format!("  Statistics: {}", sources.statistics.display()),
        format!("  Forcings: {}", sources.forcings.display()),
        format!("  Observations: {}", sources.observations.display()),
        format!("  Checkpoint dir: {}", sources.checkpoint_dir.display()),
    ]
    .join("\n")
}

/// Format the parameter registry as a string
pub fn format_params_info(config: &Config) -> String {
    let mut lines = vec![
        format!("  Attributes: {:?}", config.params.attributes),
        format!("  Zones: {:?}", config.params.zones),
    ];
    for (name, [lower, upper]) in &config.params.parameter_ranges.range {
        lines.push(format!("  Range {name}: [{lower}, {upper}]"));
    }
    lines.join("\n")
}

/// Format the network block as a string
pub fn format_kan_info(config: &Config) -> String {
    let kan = &config.kan;
    format!(
        "  Inputs: {:?}\n  Hidden size: {}\n  Hidden layers: {}\n  Outputs: {} {:?}\n  Grid: {} (order {})",
        kan.input_var_names,
        kan.hidden_size,
        kan.num_hidden_layers,
        kan.output_size,
        kan.learnable_parameters,
        kan.grid,
        kan.k
    )
}

/// Format the training hyperparameters as a string
pub fn format_train_info(config: &Config) -> String {
    let train = &config.train;
    let schedule = train
        .learning_rate
        .iter()
        .map(|(epoch, lr)| format!("{epoch}: {lr}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut lines = vec![
        format!("  Period: {} to {}", train.start_time, train.end_time),
        format!("  Epochs: {}", train.epochs),
        format!("  Batch size: {}", train.batch_size),
        format!("  Window (rho): {}", train.rho),
        format!("  Learning rate: {{{schedule}}}"),
        format!("  Alpha: {}", train.alpha),
    ];
    if let Some(checkpoint) = &train.checkpoint {
        lines.push(format!("  Resume from: {}", checkpoint.display()));
    }
    lines.join("\n")
}

/// Print detailed configuration summary
pub fn print_detailed_summary(config: &Config) {
    println!();
    println!("Configuration Summary:");
    println!("{}", format_run_info(config));
    println!();
    println!("{}", format_data_info(config));
    println!();
    println!("{}", format_params_info(config));
    println!();
    println!("{}", format_kan_info(config));
    println!();
    println!("{}", format_train_info(config));
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Validating config: {}", args.config.display()),
    );

    // load_config parses, resolves the run name and validates in one pass.
    let config = load_config(&args.config).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed {
        print_detailed_summary(&config);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_config() -> Config {
        Config::from_yaml(
            r#"
name: merit_v1_nwm
version: merit_v1
forcings: nwm
data_sources:
  hydrofabric: data/fabric
  statistics: data/stats.csv
  forcings: data/forcings.csv
  observations: data/obs.csv
  checkpoint_dir: runs
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
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_format_run_info() {
        let info = format_run_info(&make_test_config());
        assert!(info.contains("merit_v1_nwm"));
        assert!(info.contains("cpu"));
    }

    #[test]
    fn test_format_data_info() {
        let info = format_data_info(&make_test_config());
        assert!(info.contains("data/fabric"));
        assert!(info.contains("data/obs.csv"));
        assert!(info.contains("runs"));
    }

    #[test]
    fn test_format_params_info() {
        let info = format_params_info(&make_test_config());
        assert!(info.contains("slope"));
        assert!(info.contains("Range n: [0.01, 0.3]"));
        assert!(info.contains("Range q_spatial: [1.5, 3]"));
    }

    #[test]
    fn test_format_kan_info() {
        let info = format_kan_info(&make_test_config());
        assert!(info.contains("Hidden size: 16"));
        assert!(info.contains("Grid: 5 (order 3)"));
    }

    #[test]
    fn test_format_train_info() {
        let info = format_train_info(&make_test_config());
        assert!(info.contains("1994/05/24 to 1995/05/24"));
        assert!(info.contains("{0: 0.01, 5: 0.001}"));
        assert!(!info.contains("Resume"));
    }

    #[test]
    fn test_format_train_info_with_checkpoint() {
        let mut config = make_test_config();
        config.train.checkpoint = Some("runs/_merit_v1_nwm_epoch_3_mb_0.json".into());
        let info = format_train_info(&config);
        assert!(info.contains("Resume from: runs/_merit_v1_nwm_epoch_3_mb_0.json"));
    }

    #[test]
    fn test_run_validate_missing_file_fails() {
        let args = ValidateArgs {
            config: "/nonexistent/run.yaml".into(),
            detailed: false,
        };
        let err = run_validate(args, LogLevel::Quiet).unwrap_err();
        assert!(err.starts_with("Validation failed:"));
    }
}

//! Info command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, InfoArgs, OutputFormat};

pub fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let config = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("Run: {}", config.name);
            println!(
                "Period: {} to {}",
                config.train.start_time, config.train.end_time
            );
            println!("Hydrofabric: {}", config.data_sources.hydrofabric.display());
            println!(
                "Network: {} -> {}x{} -> {}",
                config.kan.input_var_names.len(),
                config.kan.num_hidden_layers,
                config.kan.hidden_size,
                config.kan.output_size
            );
            println!("Learnable: {:?}", config.kan.learnable_parameters);
            println!(
                "Training: {} epochs, batch size {}, rho {}",
                config.train.epochs, config.train.batch_size, config.train.rho
            );
            if let Some(checkpoint) = &config.train.checkpoint {
                println!("Resume from: {}", checkpoint.display());
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&config)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}

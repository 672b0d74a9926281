//! ddr CLI
//!
//! Single-command training entry point for the ddr library.
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! ddr train --config run.yaml
//!
//! # Train with overrides
//! ddr train --config run.yaml --epochs 10 --lr 0.001
//!
//! # Resume from a checkpoint
//! ddr train --config run.yaml --resume runs/_merit_v1_nwm_epoch_3_mb_0.json
//!
//! # Score a saved model against observations
//! ddr evaluate --config run.yaml --checkpoint runs/merit_v1_nwm_model.json
//!
//! # Validate config
//! ddr validate --config run.yaml --detailed
//!
//! # Show config info
//! ddr info --config run.yaml --format yaml
//! ```

use clap::Parser;
use ddr::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use super::schema::Config;

/// Differentiable river routing.
#[derive(Parser, Debug)]
#[command(name = "ddr", version, about = "Train and evaluate differentiable Muskingum-Cunge routing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train the routing model
    Train(TrainArgs),
    /// Evaluate a trained model against observations
    Evaluate(EvaluateArgs),
    /// Validate a run configuration without loading data
    Validate(ValidateArgs),
    /// Print a summary of the configured run
    Info(InfoArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Path to the run configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override train.epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Override train.batch_size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Override the initial learning rate
    #[arg(long)]
    pub lr: Option<f32>,

    /// Override train.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Resume from a saved checkpoint
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Load data and build the model, then exit before the first epoch
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Path to the run configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Checkpoint holding the trained parameters
    #[arg(long)]
    pub checkpoint: PathBuf,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the run configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Print a summary of the validated configuration
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Path to the run configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// How the info command renders the configuration.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Parse process arguments.
pub fn parse_args() -> Cli {
    Cli::parse()
}

impl TrainArgs {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(epochs) = self.epochs {
            config.train.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.train.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            // Replace the schedule: an explicit rate means a flat schedule.
            config.train.learning_rate.clear();
            config.train.learning_rate.insert(0, lr);
        }
        if let Some(seed) = self.seed {
            config.train.seed = seed;
        }
        if let Some(resume) = &self.resume {
            config.train.checkpoint = Some(resume.clone());
        }
    }
}

//! Evaluate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, EvaluateArgs};
use crate::dataset::TrainDataset;
use crate::io::{load_model, Model};
use crate::metrics::format_eval_table;
use crate::train::{load_checkpoint, Trainer};

pub fn run_evaluate(args: EvaluateArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("ddr: evaluating {}", args.checkpoint.display()),
    );

    let config = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    let dataset = TrainDataset::load(&config).map_err(|e| format!("Data error: {e}"))?;
    let mut trainer = Trainer::new(&config, &dataset).map_err(|e| format!("Setup error: {e}"))?;

    // Accept either a final model file or a mid-run training checkpoint.
    let model = match load_model(&args.checkpoint) {
        Ok(model) => model,
        Err(_) => {
            let state =
                load_checkpoint(&args.checkpoint).map_err(|e| format!("Checkpoint error: {e}"))?;
            Model::from_state(state.model).map_err(|e| format!("Checkpoint error: {e}"))?
        }
    };
    trainer
        .load_parameters(&model)
        .map_err(|e| format!("Checkpoint error: {e}"))?;

    let metrics = trainer.evaluate().map_err(|e| format!("Evaluation error: {e}"))?;
    for line in format_eval_table(&metrics.nse, &metrics.rmse, &metrics.kge) {
        log(level, LogLevel::Normal, &line);
    }
    Ok(())
}

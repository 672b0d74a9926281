//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, TrainArgs};
use crate::dataset::TrainDataset;
use crate::io::{save_model, SaveConfig};
use crate::metrics::format_eval_table;
use crate::train::Trainer;

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("ddr: training from {}", args.config.display()),
    );

    let mut config = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    args.apply_overrides(&mut config);

    let dataset = TrainDataset::load(&config).map_err(|e| format!("Data error: {e}"))?;
    let mut trainer = Trainer::new(&config, &dataset).map_err(|e| format!("Setup error: {e}"))?;

    if args.dry_run {
        log(
            level,
            LogLevel::Normal,
            "Dry run - config and data validated successfully",
        );
        log(level, LogLevel::Verbose, &format!("  Run: {}", config.name));
        log(
            level,
            LogLevel::Verbose,
            &format!("  Reaches: {}", dataset.fabric.reaches()),
        );
        log(
            level,
            LogLevel::Verbose,
            &format!("  Gauges: {}", dataset.gauges()),
        );
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  Epochs: {} x {} mini-batches",
                config.train.epochs,
                dataset.dates.num_windows()
            ),
        );
        return Ok(());
    }

    let report = trainer.train().map_err(|e| format!("Training error: {e}"))?;
    for summary in &report.epochs {
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  epoch {}: loss {:.6} (lr {})",
                summary.epoch, summary.mean_loss, summary.lr
            ),
        );
    }

    let metrics = trainer.evaluate().map_err(|e| format!("Evaluation error: {e}"))?;
    for line in format_eval_table(&metrics.nse, &metrics.rmse, &metrics.kge) {
        log(level, LogLevel::Normal, &line);
    }

    let model_path = config
        .data_sources
        .checkpoint_dir
        .join(format!("{}_model.json", config.name));
    save_model(&trainer.model(), &model_path, &SaveConfig::default())
        .map_err(|e| format!("Save error: {e}"))?;
    log(
        level,
        LogLevel::Normal,
        &format!("Model saved to {}", model_path.display()),
    );

    log(level, LogLevel::Normal, "Training complete");
    Ok(())
}

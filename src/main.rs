//! steelseg CLI
//!
//! Command-line interface for training steel surface defect segmentation
//! models.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use steelseg::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use steelseg::dataset::{DiskBatchProvider, SegBatcher, SegDataset};
use steelseg::model::UNetConfig;
use steelseg::training::{Phase, Trainer, TrainerConfig};
use steelseg::utils::logging::{init_logging, LogConfig, LogLevel};
use steelseg::{LossKind, OptimizerKind};

#[derive(Parser)]
#[command(name = "steelseg")]
#[command(about = "Steel surface defect segmentation training", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level: trace, debug, info, warn or error (ignored with --verbose)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a segmentation model
    Train {
        /// Dataset root containing train/ and val/ subdirectories
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Number of training epochs
        #[arg(short, long, default_value_t = steelseg::training::DEFAULT_EPOCHS)]
        epochs: usize,

        /// Per-iteration batch size
        #[arg(short, long, default_value_t = steelseg::training::DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Simulated batch size reached through gradient accumulation
        #[arg(long, default_value_t = 32)]
        effective_batch_size: usize,

        /// Initial learning rate
        #[arg(short, long, default_value_t = steelseg::training::DEFAULT_LEARNING_RATE)]
        learning_rate: f64,

        /// Loss selector: BCE, BCE+DICE or TVERSKY
        #[arg(long, default_value = "BCE+DICE")]
        loss: String,

        /// Optimizer selector: over9000, adam, radam, ralamb, ranger or
        /// lookahead_adam
        #[arg(long, default_value = "over9000")]
        optimizer: String,

        /// Run name used for checkpoint and log files
        #[arg(short, long, default_value = "resnet_unet")]
        run_name: String,

        /// Disable cutmix augmentation
        #[arg(long)]
        no_cutmix: bool,

        /// Random seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Epochs to train with the encoder backbone frozen before the
        /// full-model epochs
        #[arg(long, default_value_t = 0)]
        freeze_epochs: usize,

        /// Warm-start from an existing checkpoint with this run name
        #[arg(long)]
        resume: Option<String>,

        /// Directory for checkpoints
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,

        /// Directory for CSV run logs
        #[arg(long, default_value = "logs")]
        logs_dir: PathBuf,

        /// Crop height (must be divisible by 8)
        #[arg(long, default_value_t = steelseg::DEFAULT_IMAGE_HEIGHT)]
        height: usize,

        /// Crop width (must be divisible by 8)
        #[arg(long, default_value_t = steelseg::DEFAULT_IMAGE_WIDTH)]
        width: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: LogLevel::parse(&cli.log_level),
            ..LogConfig::default()
        }
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Command::Train {
            data_dir,
            epochs,
            batch_size,
            effective_batch_size,
            learning_rate,
            loss,
            optimizer,
            run_name,
            no_cutmix,
            seed,
            freeze_epochs,
            resume,
            models_dir,
            logs_dir,
            height,
            width,
        } => {
            let config = TrainerConfig {
                loss: loss.parse::<LossKind>()?,
                optimizer: optimizer.parse::<OptimizerKind>()?,
                learning_rate,
                batch_size,
                effective_batch_size,
                run_name,
                cutmix: !no_cutmix,
                seed,
                checkpoint_dir: models_dir,
                log_dir: logs_dir,
            };
            train(
                &data_dir,
                config,
                epochs,
                freeze_epochs,
                resume,
                height,
                width,
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn train(
    data_dir: &std::path::Path,
    config: TrainerConfig,
    epochs: usize,
    freeze_epochs: usize,
    resume: Option<String>,
    height: usize,
    width: usize,
) -> anyhow::Result<()> {
    println!();
    println!("{}", "Steel Defect Segmentation Training".bold().cyan());
    println!("{}", "===================================".cyan());
    println!("Backend:    {}", backend_name());
    println!("Run:        {}", config.run_name);
    println!("Loss:       {}", config.loss);
    println!("Optimizer:  {}", config.optimizer);
    println!(
        "Batch:      {} (effective {})",
        config.batch_size, config.effective_batch_size
    );
    println!("Cutmix:     {}", if config.cutmix { "on" } else { "off" });
    println!();

    let device = default_device();
    let num_classes = steelseg::NUM_DEFECT_CLASSES;

    let train_dataset = SegDataset::from_dir(data_dir, Phase::Train, height, width, num_classes)
        .context("loading the train split")?;
    let val_dataset = SegDataset::from_dir(data_dir, Phase::Val, height, width, num_classes)
        .context("loading the val split")?;

    let train_provider = DiskBatchProvider::new(
        train_dataset,
        SegBatcher::<TrainingBackend>::new(device.clone(), height, width, num_classes),
        config.batch_size,
        true,
        config.seed,
    );
    let val_provider = DiskBatchProvider::new(
        val_dataset,
        SegBatcher::<DefaultBackend>::new(device.clone(), height, width, num_classes),
        config.batch_size,
        false,
        config.seed,
    );

    let model = UNetConfig::new()
        .with_num_classes(num_classes)
        .init::<TrainingBackend>(&device);

    let checkpoint_dir = config.checkpoint_dir.clone();
    let mut trainer = Trainer::new(
        model,
        config,
        device,
        Box::new(train_provider),
        Box::new(val_provider),
    )?;

    if let Some(source) = resume {
        trainer.load_checkpoint(&checkpoint_dir, &source)?;
    }

    if freeze_epochs > 0 {
        trainer.freeze();
        trainer.fit(freeze_epochs)?;
        trainer.unfreeze();
    }

    let remaining = epochs.saturating_sub(freeze_epochs);
    trainer.fit(remaining)?;

    let state = trainer.state();
    println!();
    println!("{}", "Training complete".bold().green());
    println!(
        "Best validation dice: {}",
        format!("{:.4}", state.best_dice).bold()
    );

    Ok(())
}

//! Supervised training orchestrator
//!
//! The `Trainer` owns the model, optimizer, loss criterion, scheduler and
//! run state, and drives the epoch/phase lifecycle:
//!
//! 1. Train phase with gradient accumulation (and optional cutmix)
//! 2. Validation phase on the inner backend without autodiff
//! 3. Scheduler step on the validation loss
//! 4. Best-checkpoint save whenever validation Dice improves
//! 5. Full rewrite of the run's CSV log
//!
//! Loss scaling mirrors the accumulation: each batch loss is divided by the
//! accumulation step count before backward, and the epoch average multiplies
//! it back in.

use std::path::Path;
use std::time::Instant;

use burn::module::{AutodiffModule, Module};
use burn::optim::{GradientsAccumulator, GradientsParams};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{BatchProvider, SegBatch};
use crate::error::{Result, SteelSegError};
use crate::model::UNet;
use crate::utils::{format_duration, EpochScores, RunLog, SegmentationMeter};

use super::checkpoint::{self, CheckpointMeta};
use super::config::TrainerConfig;
use super::cutmix::{cutmix, CUTMIX_ALPHA};
use super::loss::Criterion;
use super::scheduler::ReduceOnPlateau;
use super::Phase;

/// Metric history for one phase, indexed by completed epoch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseHistory {
    pub loss: Vec<f64>,
    pub dice: Vec<f64>,
    pub iou: Vec<f64>,
    pub f2: Vec<f64>,
}

impl PhaseHistory {
    pub fn push(&mut self, loss: f64, dice: f64, iou: f64, f2: f64) {
        self.loss.push(loss);
        self.dice.push(dice);
        self.iou.push(iou);
        self.f2.push(f2);
    }
}

/// Mutable run state: epoch counter, best score and per-phase histories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub epochs_completed: usize,
    pub best_dice: f64,
    pub train: PhaseHistory,
    pub val: PhaseHistory,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            epochs_completed: 0,
            best_dice: 0.0,
            train: PhaseHistory::default(),
            val: PhaseHistory::default(),
        }
    }
}

impl RunState {
    /// Record an epoch's validation Dice; returns true when it beats the
    /// best seen so far, meaning a checkpoint should be written.
    pub fn observe_val_dice(&mut self, dice: f64) -> bool {
        if dice > self.best_dice {
            self.best_dice = dice;
            true
        } else {
            false
        }
    }
}

/// Whether iteration `itr` (0-based) completes an accumulation window.
pub fn is_update_step(itr: usize, accumulation_steps: usize) -> bool {
    (itr + 1) % accumulation_steps == 0
}

/// Undo the per-batch accumulation scaling and average over the epoch.
pub fn epoch_average(running_loss: f64, accumulation_steps: usize, total_batches: usize) -> f64 {
    running_loss * accumulation_steps as f64 / total_batches as f64
}

fn compute_loss<Bx: Backend>(
    model: &UNet<Bx>,
    criterion: Criterion,
    batch: &SegBatch<Bx>,
) -> (Tensor<Bx, 1>, Tensor<Bx, 4>) {
    let logits = model.forward(batch.images.clone());
    let (logits_in, targets_in) = criterion.layout_pair(logits.clone(), batch.masks.clone());
    let loss = criterion.forward(logits_in, targets_in);
    (loss, logits)
}

/// Supervised segmentation trainer
pub struct Trainer<B: AutodiffBackend> {
    model: UNet<B>,
    optimizer: super::optim::SegOptimizer<B>,
    criterion: Criterion,
    scheduler: ReduceOnPlateau,
    config: TrainerConfig,
    accumulation_steps: usize,
    state: RunState,
    device: B::Device,
    cutmix_rng: ChaCha8Rng,
    train_provider: Box<dyn BatchProvider<B>>,
    val_provider: Box<dyn BatchProvider<B::InnerBackend>>,
    run_log: RunLog,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Build a trainer from a validated configuration.
    pub fn new(
        model: UNet<B>,
        config: TrainerConfig,
        device: B::Device,
        train_provider: Box<dyn BatchProvider<B>>,
        val_provider: Box<dyn BatchProvider<B::InnerBackend>>,
    ) -> Result<Self> {
        config.validate()?;

        let run_log = RunLog::new(&config.log_dir, &config.run_name)?;
        let optimizer = config.optimizer.init();
        let scheduler = ReduceOnPlateau::for_run(config.learning_rate);
        let accumulation_steps = config.accumulation_steps();

        info!(
            "Trainer ready: run '{}', loss {}, optimizer {}, accumulating over {} steps",
            config.run_name, config.loss, config.optimizer, accumulation_steps
        );

        Ok(Self {
            model: model.to_device(&device),
            optimizer,
            criterion: config.loss.into(),
            scheduler,
            cutmix_rng: ChaCha8Rng::seed_from_u64(config.seed),
            accumulation_steps,
            state: RunState::default(),
            device,
            train_provider,
            val_provider,
            run_log,
            config,
        })
    }

    pub fn model(&self) -> &UNet<B> {
        &self.model
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Freeze the encoder backbone for warm-up epochs.
    pub fn freeze(&mut self) {
        self.model = self.model.clone().freeze_encoder();
        info!("Encoder backbone frozen");
    }

    /// Re-enable gradients on every parameter.
    pub fn unfreeze(&mut self) {
        self.model = self.model.clone().unfreeze();
        info!("All parameters unfrozen");
    }

    /// Warm-start model and optimizer from a checkpoint written by a
    /// previous run. The run state (epoch counter, best Dice, histories)
    /// starts fresh so the new run competes on its own validation scores.
    pub fn load_checkpoint(&mut self, dir: &Path, run_name: &str) -> Result<()> {
        let fresh_optimizer = self.config.optimizer.init();
        let (model, optimizer, meta) = checkpoint::load(
            dir,
            run_name,
            self.model.clone(),
            fresh_optimizer,
            &self.device,
        )?;
        self.model = model;
        self.optimizer = optimizer;
        info!(
            "Warm-started from checkpoint '{}' (epoch {}, dice {:.4})",
            run_name, meta.epoch, meta.best_dice
        );
        Ok(())
    }

    /// Run the model and criterion on one batch, returning the scalar loss
    /// and the raw logits.
    pub fn forward(&self, batch: &SegBatch<B>) -> (Tensor<B, 1>, Tensor<B, 4>) {
        compute_loss(&self.model, self.criterion, batch)
    }

    /// Run one phase of one epoch, returning (average loss, scores).
    pub fn iterate(&mut self, epoch: usize, phase: Phase) -> Result<(f64, EpochScores)> {
        match phase {
            Phase::Train => self.train_epoch(epoch),
            Phase::Val => self.val_epoch(epoch),
        }
    }

    fn train_epoch(&mut self, epoch: usize) -> Result<(f64, EpochScores)> {
        let batches = self.train_provider.batches(epoch)?;
        let total_batches = batches.len();
        debug!("epoch {} {} phase: {} batches", epoch, Phase::Train, total_batches);
        if total_batches == 0 {
            return Err(SteelSegError::Training(
                "train provider yielded no batches".to_string(),
            ));
        }

        let mut accumulator = GradientsAccumulator::new();
        let mut meter = SegmentationMeter::new();
        let mut running_loss = 0.0;

        for (itr, batch) in batches.into_iter().enumerate() {
            let batch = if self.config.cutmix {
                cutmix(&batch, CUTMIX_ALPHA, &mut self.cutmix_rng)?
            } else {
                batch
            };

            let (loss, logits) = compute_loss(&self.model, self.criterion, &batch);
            let loss = loss.div_scalar(self.accumulation_steps as f32);
            running_loss += loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            accumulator.accumulate(&self.model, grads);

            if is_update_step(itr, self.accumulation_steps) {
                let grads = accumulator.grads();
                self.model = self
                    .optimizer
                    .step(self.scheduler.lr(), self.model.clone(), grads);
            }

            meter.update(&batch.masks, &logits.detach());

            if (itr + 1) % 10 == 0 {
                debug!(
                    "epoch {} train batch {}/{} running loss {:.4}",
                    epoch,
                    itr + 1,
                    total_batches,
                    epoch_average(running_loss, self.accumulation_steps, itr + 1)
                );
            }
        }

        let epoch_loss = epoch_average(running_loss, self.accumulation_steps, total_batches);
        Ok((epoch_loss, meter.epoch_summary()))
    }

    fn val_epoch(&mut self, epoch: usize) -> Result<(f64, EpochScores)> {
        let model = self.model.valid();
        let batches = self.val_provider.batches(epoch)?;
        let total_batches = batches.len();
        debug!("epoch {} {} phase: {} batches", epoch, Phase::Val, total_batches);
        if total_batches == 0 {
            return Err(SteelSegError::Training(
                "validation provider yielded no batches".to_string(),
            ));
        }

        let mut meter = SegmentationMeter::new();
        let mut running_loss = 0.0;

        for batch in batches {
            let (loss, logits) = compute_loss(&model, self.criterion, &batch);
            let loss = loss.div_scalar(self.accumulation_steps as f32);
            running_loss += loss.into_scalar().elem::<f64>();
            meter.update(&batch.masks, &logits);
        }

        let epoch_loss = epoch_average(running_loss, self.accumulation_steps, total_batches);
        Ok((epoch_loss, meter.epoch_summary()))
    }

    /// Run the full training loop for `epochs` epochs.
    pub fn fit(&mut self, epochs: usize) -> Result<()> {
        for _ in 0..epochs {
            let epoch = self.state.epochs_completed + 1;
            let started = Instant::now();

            let (train_loss, train_scores) = self.iterate(epoch, Phase::Train)?;
            self.state.train.push(
                train_loss,
                train_scores.dice,
                train_scores.iou,
                train_scores.f2,
            );

            let (val_loss, val_scores) = self.iterate(epoch, Phase::Val)?;
            self.state
                .val
                .push(val_loss, val_scores.dice, val_scores.iou, val_scores.f2);

            self.state.epochs_completed = epoch;
            let lr = self.scheduler.step(val_loss);

            info!(
                "Epoch {} done in {} | train loss {:.4} dice {:.4} | val loss {:.4} dice {:.4} | lr {:.2e}",
                epoch,
                format_duration(started.elapsed().as_secs_f64()),
                train_loss,
                train_scores.dice,
                val_loss,
                val_scores.dice,
                lr
            );

            if self.state.observe_val_dice(val_scores.dice) {
                info!("******** New optimal found, saving state ********");
                let meta = CheckpointMeta::new(epoch, self.state.best_dice);
                checkpoint::save(
                    &self.config.checkpoint_dir,
                    &self.config.run_name,
                    &self.model,
                    &self.optimizer,
                    &meta,
                )?;
            }

            self.run_log.write(&self.state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DefaultBackend, TrainingBackend};
    use crate::dataset::InMemoryProvider;
    use crate::model::UNetConfig;
    use crate::training::{LossKind, OptimizerKind};

    #[test]
    fn test_is_update_step() {
        assert!(is_update_step(0, 1));
        assert!(is_update_step(5, 1));

        assert!(!is_update_step(0, 4));
        assert!(!is_update_step(2, 4));
        assert!(is_update_step(3, 4));
        assert!(is_update_step(7, 4));
    }

    #[test]
    fn test_epoch_average_undoes_scaling() {
        // Four batches of true loss 1.0 accumulated over 2 steps: each
        // contributes 0.5, so running = 2.0 and the average is 1.0.
        let avg = epoch_average(2.0, 2, 4);
        assert!((avg - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_observe_val_dice_saves_on_improvement_only() {
        let mut state = RunState::default();
        let observed: Vec<bool> = [0.5, 0.7, 0.6, 0.9]
            .iter()
            .map(|&d| state.observe_val_dice(d))
            .collect();
        assert_eq!(observed, vec![true, true, false, true]);
        assert!((state.best_dice - 0.9).abs() < 1e-12);
    }

    fn tiny_batch<Bx: Backend>(n: usize, value: f32) -> SegBatch<Bx> {
        let device = Default::default();
        let (h, w) = (8, 8);
        SegBatch {
            images: Tensor::from_floats(
                TensorData::new(vec![value; n * 3 * h * w], [n, 3, h, w]),
                &device,
            ),
            masks: Tensor::from_floats(
                TensorData::new(vec![1.0f32; n * h * w], [n, 1, h, w]),
                &device,
            ),
        }
    }

    #[test]
    fn test_forward_feeds_criteria_in_their_layout() {
        // Distinct batch/channel/height/width so a permutation cannot be
        // mistaken for the identity.
        let device = Default::default();
        let model = UNetConfig::new()
            .with_num_classes(2)
            .with_base_filters(2)
            .init::<TrainingBackend>(&device);

        let batch = SegBatch::<TrainingBackend> {
            images: Tensor::from_floats(
                TensorData::new(vec![0.3f32; 3 * 3 * 8 * 16], [3, 3, 8, 16]),
                &device,
            ),
            masks: Tensor::from_floats(
                TensorData::new(vec![1.0f32; 3 * 2 * 8 * 16], [3, 2, 8, 16]),
                &device,
            ),
        };
        let logits = model.forward(batch.images.clone());
        assert_eq!(logits.dims(), [3, 2, 8, 16]);

        // BCE-family criteria receive both tensors channels-last.
        for criterion in [Criterion::Bce, Criterion::BceDice] {
            let (l, t) = criterion.layout_pair(logits.clone(), batch.masks.clone());
            assert_eq!(l.dims(), [3, 8, 16, 2]);
            assert_eq!(t.dims(), [3, 8, 16, 2]);
        }

        // Tversky receives both tensors channels-first, untouched.
        let (l, t) = Criterion::Tversky.layout_pair(logits.clone(), batch.masks.clone());
        assert_eq!(l.dims(), [3, 2, 8, 16]);
        assert_eq!(t.dims(), [3, 2, 8, 16]);

        // The trainer's own forward path runs each criterion through the
        // same pairing and produces a finite scalar loss.
        let dir = tempfile::tempdir().unwrap();
        for loss_kind in [LossKind::Bce, LossKind::BceDice, LossKind::Tversky] {
            let config = TrainerConfig {
                loss: loss_kind,
                batch_size: 3,
                effective_batch_size: 3,
                checkpoint_dir: dir.path().join("models"),
                log_dir: dir.path().join("logs"),
                ..Default::default()
            };
            let trainer = Trainer::new(
                model.clone(),
                config,
                device,
                Box::new(InMemoryProvider::<TrainingBackend>::new(vec![])),
                Box::new(InMemoryProvider::<DefaultBackend>::new(vec![])),
            )
            .unwrap();

            let (loss, out) = trainer.forward(&batch);
            assert_eq!(out.dims(), [3, 2, 8, 16]);
            let value: f64 = loss.into_scalar().elem();
            assert!(value.is_finite());
        }
    }

    #[test]
    fn test_fit_trains_checkpoints_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let model = UNetConfig::new()
            .with_num_classes(1)
            .with_base_filters(2)
            .init::<TrainingBackend>(&device);

        let config = TrainerConfig {
            loss: LossKind::BceDice,
            optimizer: OptimizerKind::Adam,
            learning_rate: 1e-3,
            batch_size: 2,
            effective_batch_size: 4,
            run_name: "tiny_e2e".to_string(),
            cutmix: true,
            seed: 11,
            checkpoint_dir: dir.path().join("models"),
            log_dir: dir.path().join("logs"),
        };

        let train_batches: Vec<SegBatch<TrainingBackend>> =
            (0..4).map(|i| tiny_batch(2, 0.1 * i as f32)).collect();
        let val_batches: Vec<SegBatch<DefaultBackend>> =
            (0..2).map(|i| tiny_batch(2, 0.1 * i as f32)).collect();

        let mut trainer = Trainer::new(
            model,
            config,
            device,
            Box::new(InMemoryProvider::new(train_batches)),
            Box::new(InMemoryProvider::new(val_batches)),
        )
        .unwrap();

        trainer.fit(2).unwrap();

        let state = trainer.state();
        assert_eq!(state.epochs_completed, 2);
        assert_eq!(state.train.loss.len(), 2);
        assert_eq!(state.val.dice.len(), 2);
        assert!(state.best_dice > 0.0);

        // The all-ones masks make the first epoch an improvement, so a
        // checkpoint exists.
        assert!(dir.path().join("models/tiny_e2e_model.mpk").is_file());
        assert!(dir.path().join("models/tiny_e2e.json").is_file());

        let csv = std::fs::read_to_string(dir.path().join("logs/tiny_e2e.csv")).unwrap();
        assert_eq!(csv.trim().lines().count(), 3);
    }

    #[test]
    fn test_freeze_unfreeze_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = UNetConfig::new()
            .with_num_classes(1)
            .with_base_filters(2)
            .init::<TrainingBackend>(&device);

        let config = TrainerConfig {
            batch_size: 2,
            effective_batch_size: 2,
            checkpoint_dir: dir.path().join("models"),
            log_dir: dir.path().join("logs"),
            ..Default::default()
        };

        let mut trainer = Trainer::new(
            model,
            config,
            device,
            Box::new(InMemoryProvider::<TrainingBackend>::new(vec![tiny_batch(2, 0.2)])),
            Box::new(InMemoryProvider::<DefaultBackend>::new(vec![tiny_batch(2, 0.2)])),
        )
        .unwrap();

        trainer.freeze();
        assert!(!trainer
            .model()
            .encoder
            .block1
            .conv
            .weight
            .val()
            .is_require_grad());

        trainer.unfreeze();
        assert!(trainer
            .model()
            .encoder
            .block1
            .conv
            .weight
            .val()
            .is_require_grad());
    }

    #[test]
    fn test_load_checkpoint_warm_starts_without_state() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model = UNetConfig::new()
            .with_num_classes(1)
            .with_base_filters(2)
            .init::<TrainingBackend>(&device);

        let config = TrainerConfig {
            batch_size: 2,
            effective_batch_size: 2,
            run_name: "warm_src".to_string(),
            cutmix: false,
            checkpoint_dir: dir.path().join("models"),
            log_dir: dir.path().join("logs"),
            ..Default::default()
        };

        let mut trainer = Trainer::new(
            model,
            config,
            device,
            Box::new(InMemoryProvider::<TrainingBackend>::new(vec![tiny_batch(2, 0.2)])),
            Box::new(InMemoryProvider::<DefaultBackend>::new(vec![tiny_batch(2, 0.2)])),
        )
        .unwrap();

        trainer.fit(1).unwrap();
        assert_eq!(trainer.state().epochs_completed, 1);

        trainer
            .load_checkpoint(&dir.path().join("models"), "warm_src")
            .unwrap();
        // Warm start leaves the run state untouched.
        assert_eq!(trainer.state().epochs_completed, 1);
    }
}

// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything needed to resume training or to
// run inference for a given epoch N:
//
//   checkpoints/
//     train_config.json        ← hyperparameters of the run
//     model_config.json        ← architecture (vocab sizes included)
//     model_epoch_N.mpk        ← layout + projection + seq2seq weights
//     optim_epoch_N.mpk        ← AdamW moments
//     state_epoch_N.json       ← epoch, global step, loss, LR schedule
//     processor_epoch_N/       ← processor.json + both tokenizers
//     latest_epoch.json        ← last saved epoch
//
// Weights go through Burn's NamedMpkFileRecorder at full
// precision, so a resumed run continues from bit-identical
// parameters. Loading fails if the architecture does not match.

use anyhow::{Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::data::processor::DocumentProcessor;
use crate::ml::{
    model::{ReorderModel, ReorderModelConfig},
    schedule::WarmupLinearSchedule,
};

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Progress saved next to the weights of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    pub epoch:       usize,
    pub global_step: usize,
    pub avg_loss:    f64,
    pub scheduler:   WarmupLinearSchedule,
}

/// Manages saving and loading of checkpoints.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager. The directory is created on
    /// the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // File stems; the recorder appends `.mpk`.
    fn model_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("model_epoch_{epoch}"))
    }

    fn optim_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("optim_epoch_{epoch}"))
    }

    fn state_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("state_epoch_{epoch}.json"))
    }

    pub fn processor_dir(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("processor_epoch_{epoch}"))
    }

    // ─── Weights ──────────────────────────────────────────────────────────────

    pub fn save_model<B: Backend>(&self, model: &ReorderModel<B>, epoch: usize) -> Result<()> {
        self.ensure_dir()?;
        let path = self.model_path(epoch);
        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        Ok(())
    }

    /// Restore weights into a model built with the matching config.
    pub fn load_model<B: Backend>(
        &self,
        model:  ReorderModel<B>,
        epoch:  usize,
        device: &B::Device,
    ) -> Result<ReorderModel<B>> {
        let path = self.model_path(epoch);
        tracing::info!("Loading model weights from epoch {}", epoch);
        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Was epoch {epoch} saved?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_optimizer<B, O>(&self, optim: &O, epoch: usize) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<ReorderModel<B>, B>,
    {
        self.ensure_dir()?;
        let path = self.optim_path(epoch);
        CheckpointRecorder::new()
            .record(optim.to_record(), path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_optimizer<B, O>(&self, optim: O, epoch: usize, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<ReorderModel<B>, B>,
    {
        let path = self.optim_path(epoch);
        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    // ─── Epoch bundle ─────────────────────────────────────────────────────────

    /// Save model, optimizer, training state and processor for `state.epoch`,
    /// then move the latest-epoch pointer.
    pub fn save_epoch<B, O>(
        &self,
        model:     &ReorderModel<B>,
        optim:     &O,
        state:     &TrainingState,
        processor: &DocumentProcessor,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<ReorderModel<B>, B>,
    {
        let epoch = state.epoch;
        self.save_model(model, epoch)?;
        self.save_optimizer::<B, O>(optim, epoch)?;
        self.write_json(&self.state_path(epoch), state)?;
        processor.save(&self.processor_dir(epoch))?;
        self.write_json(&self.dir.join("latest_epoch.json"), &epoch)?;
        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    pub fn load_state(&self, epoch: usize) -> Result<TrainingState> {
        self.read_json(&self.state_path(epoch))
    }

    pub fn load_processor(&self, epoch: usize) -> Result<DocumentProcessor> {
        let dir = self.processor_dir(epoch);
        DocumentProcessor::load(&dir)
            .with_context(|| format!("Cannot load processor for epoch {epoch}"))
    }

    /// Read latest_epoch.json and return the epoch number.
    pub fn latest_epoch(&self) -> Result<usize> {
        self.read_json(&self.dir.join("latest_epoch.json"))
            .context("No checkpoint saved yet. Have you run 'train' first?")
    }

    // ─── Configs ──────────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(&self.dir.join("train_config.json"), cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(&self.dir.join("train_config.json"))
    }

    pub fn save_model_config(&self, cfg: &ReorderModelConfig) -> Result<()> {
        self.write_json(&self.dir.join("model_config.json"), cfg)
    }

    /// Architecture needed to rebuild the model before loading weights.
    pub fn load_model_config(&self) -> Result<ReorderModelConfig> {
        self.read_json(&self.dir.join("model_config.json"))
    }

    // ─── JSON helpers ─────────────────────────────────────────────────────────

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::tests::tiny_config;
    use burn::backend::NdArray;

    #[test]
    fn configs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());

        let cfg = TrainConfig { num_epochs: 3, ..TrainConfig::default() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), cfg);

        let model_cfg = tiny_config(7, 9);
        ckpt.save_model_config(&model_cfg).unwrap();
        let back = ckpt.load_model_config().unwrap();
        assert_eq!(back.layout.vocab_size, 7);
        assert_eq!(back.seq2seq.vocab_size, 9);
    }

    #[test]
    fn model_weights_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let device = Default::default();

        let cfg = tiny_config(7, 9);
        let model = cfg.init::<NdArray>(&device);
        ckpt.save_model(&model, 2).unwrap();
        assert!(dir.path().join("model_epoch_2.mpk").exists());

        let fresh = cfg.init::<NdArray>(&device);
        let loaded = ckpt.load_model(fresh, 2, &device).unwrap();
        let a: Vec<f32> = model.projection.linear.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.projection.linear.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn directory_is_created_on_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("a");
        let ckpt = CheckpointManager::new(&nested);
        assert!(!nested.exists());
        ckpt.save_config(&TrainConfig::default()).unwrap();
        assert!(nested.join("train_config.json").exists());
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        fs::write(&blocker, "not a directory").unwrap();

        let ckpt = CheckpointManager::new(blocker.join("ckpt"));
        let err = ckpt.save_config(&TrainConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot create checkpoint directory"));

        let device = Default::default();
        let model = tiny_config(7, 9).init::<NdArray>(&device);
        assert!(ckpt.save_model(&model, 1).is_err());
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.load_state(1).is_err());
        let device = Default::default();
        let model = tiny_config(7, 9).init::<NdArray>(&device);
        assert!(ckpt.load_model(model, 1, &device).is_err());
    }
}

// ============================================================
// Layer 2 — InferUseCase
// ============================================================
// Generates reading-order text for every page of a test file:
//
//   Step 1: Rebuild the model of the requested epoch (Layer 6 + 5)
//   Step 2: Open the test NDJSON                     (Layer 4)
//   Step 3: Stream predictions into the output JSON  (Layer 6)
//
// The output file is valid JSON only once the run finishes, but
// every completed batch is already flushed to disk.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use crate::data::ndjson::NdjsonReader;
use crate::infra::{checkpoint::CheckpointManager, prediction_writer::PredictionWriter};
use crate::ml::inferencer::{run_inference, Inferencer};

type InferBackend = burn::backend::Wgpu;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferConfig {
    pub test_json:         String,
    pub test_img_dir:      String,
    pub checkpoint_dir:    String,
    pub epoch:             usize,
    /// Defaults to `<checkpoint_dir>/predictions.json`
    pub output_json:       Option<String>,
    pub batch_size:        usize,
    pub chunk_size:        usize,
    pub max_output_length: usize,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            test_json:         "data/test.json".to_string(),
            test_img_dir:      "data/test_images".to_string(),
            checkpoint_dir:    "checkpoints".to_string(),
            epoch:             30,
            output_json:       None,
            batch_size:        8,
            chunk_size:        1000,
            max_output_length: 512,
        }
    }
}

impl InferConfig {
    pub fn output_path(&self) -> PathBuf {
        match &self.output_json {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.checkpoint_dir).join("predictions.json"),
        }
    }
}

pub struct InferUseCase {
    config: InferConfig,
}

impl InferUseCase {
    pub fn new(config: InferConfig) -> Self {
        Self { config }
    }

    /// Returns the output path and the number of pages written.
    pub fn execute(&self) -> Result<(PathBuf, usize)> {
        let cfg = &self.config;
        ensure!(cfg.batch_size > 0, "batch_size must be positive");
        ensure!(cfg.chunk_size > 0, "chunk_size must be positive");

        // ── Step 1: Model + processor ────────────────────────────────────────
        let device = burn::backend::wgpu::WgpuDevice::default();
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        let train_cfg = ckpt_manager.load_config()?;
        tracing::info!(
            "Checkpoint trained on '{}' for {} epochs; loading epoch {}",
            train_cfg.train_json,
            train_cfg.num_epochs,
            cfg.epoch
        );
        match ckpt_manager.latest_epoch() {
            Ok(latest) if cfg.epoch > latest => {
                tracing::warn!("Epoch {} requested but the latest saved epoch is {}", cfg.epoch, latest)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("{e:#}"),
        }
        let position_limit = train_cfg.max_target_len.max(train_cfg.max_output_length);
        if cfg.max_output_length > position_limit {
            tracing::warn!(
                "max_output_length {} exceeds the decoder's {} positions; generation stops there",
                cfg.max_output_length,
                position_limit
            );
        }
        let inferencer = Inferencer::<InferBackend>::from_checkpoint(&ckpt_manager, cfg.epoch, device)?;

        // ── Step 2: Test data ────────────────────────────────────────────────
        let reader = NdjsonReader::new(&cfg.test_json);

        // ── Step 3: Stream predictions ───────────────────────────────────────
        let out_path = cfg.output_path();
        let mut writer = PredictionWriter::begin(BufWriter::new(create_output(&out_path)?))?;

        let written = run_inference(&inferencer, &reader, cfg, &mut writer)?;
        writer.finish()?;

        tracing::info!("Wrote {} predictions to '{}'", written, out_path.display());
        Ok((out_path, written))
    }
}

/// Create the predictions file, making its parent directory first.
fn create_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Cannot create '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("predictions.json");
        create_output(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn blocked_output_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "file").unwrap();

        let err = create_output(&blocker.join("predictions.json")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot create"));
    }

    #[test]
    fn output_defaults_into_checkpoint_dir() {
        let cfg = InferConfig { checkpoint_dir: "ckpt".into(), ..InferConfig::default() };
        assert_eq!(cfg.output_path(), PathBuf::from("ckpt/predictions.json"));

        let cfg = InferConfig { output_json: Some("out.json".into()), ..cfg };
        assert_eq!(cfg.output_path(), PathBuf::from("out.json"));
    }
}

// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training scalars to a CSV file, one row per value:
//
//   tag,step,value
//   Loss/train_batch,1,9.871234
//   LearningRate,1,0.000000
//   ...
//   Loss/train_chunk,125,6.102300
//   Loss/train_epoch,1,6.544100
//   Loss/train_epoch_avg,1,6.544100
//
// Tags:
//   - Loss/train_batch  per global step
//   - LearningRate      per global step (LR used for that step)
//   - Loss/train_chunk  mean batch loss of one chunk, at its last step
//   - Loss/train_epoch      sample-weighted mean loss, step = epoch
//   - Loss/train_epoch_avg  same value under the name dashboards
//                           built for earlier runs plot
//
// Output file: checkpoints/logs/metrics.csv
// The file is appended to across runs, so resumed training
// continues the same curves.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const TAG_BATCH_LOSS: &str = "Loss/train_batch";
pub const TAG_LEARNING_RATE: &str = "LearningRate";
pub const TAG_CHUNK_LOSS: &str = "Loss/train_chunk";
pub const TAG_EPOCH_LOSS: &str = "Loss/train_epoch";
pub const TAG_EPOCH_LOSS_AVG: &str = "Loss/train_epoch_avg";

/// Summary of one training epoch
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch:       usize,
    /// Sample-weighted mean of the batch losses
    pub avg_loss:    f64,
    pub samples:     usize,
    pub batches:     usize,
    pub global_step: usize,
}

impl EpochMetrics {
    /// Accumulate one batch of `batch_size` samples
    pub fn add_batch(&mut self, loss: f64, batch_size: usize) {
        let total = self.avg_loss * self.samples as f64 + loss * batch_size as f64;
        self.samples += batch_size;
        self.batches += 1;
        self.avg_loss = total / self.samples as f64;
    }

    pub fn new(epoch: usize) -> Self {
        Self { epoch, avg_loss: 0.0, samples: 0, batches: 0, global_step: 0 }
    }
}

/// Appends tagged scalars to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create log dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "tag,step,value")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log_scalar(&self, tag: &str, step: usize, value: f64) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{tag},{step},{value:.8}")?;
        Ok(())
    }

    pub fn log_epoch(&self, m: &EpochMetrics) -> Result<()> {
        self.log_scalar(TAG_EPOCH_LOSS, m.epoch, m.avg_loss)?;
        self.log_scalar(TAG_EPOCH_LOSS_AVG, m.epoch, m.avg_loss)?;
        tracing::debug!(
            "Logged epoch {} metrics: avg_loss={:.4}, samples={}",
            m.epoch,
            m.avg_loss,
            m.samples
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_loss_is_sample_weighted() {
        let mut m = EpochMetrics::new(1);
        m.add_batch(1.0, 3);
        m.add_batch(3.0, 1);
        assert!((m.avg_loss - 1.5).abs() < 1e-12);
        assert_eq!(m.samples, 4);
        assert_eq!(m.batches, 2);
    }

    #[test]
    fn rows_are_appended_after_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log_scalar(TAG_BATCH_LOSS, 1, 2.5).unwrap();

        // A second logger (resumed run) must not rewrite the header
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log_epoch(&EpochMetrics { avg_loss: 0.25, ..EpochMetrics::new(4) }).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            "tag,step,value",
            "Loss/train_batch,1,2.50000000",
            "Loss/train_epoch,4,0.25000000",
            "Loss/train_epoch_avg,4,0.25000000",
        ]);
    }
}

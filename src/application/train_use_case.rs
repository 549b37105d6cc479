// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Open the NDJSON dataset        (Layer 4 - data)
//   Step 3: Build / load tokenizers        (Layer 6 - infra)
//   Step 4: Build the document processor  (Layer 4 - data)
//   Step 5: Save configs                   (Layer 6 - infra)
//   Step 6: Run the training loop          (Layer 5 - ml)
//
// When resuming, the processor and model architecture are taken
// from the checkpoint instead, so the vocabulary cannot drift.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    ndjson::NdjsonReader,
    processor::{DocumentProcessor, ProcessorConfig},
};
use crate::domain::record::OcrRecord;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    tokenizer_store::{
        TokenizerStore, LAYOUT_SPECIAL_TOKENS, LAYOUT_TOKENIZER_FILE, TARGET_SPECIAL_TOKENS,
        TARGET_TOKENIZER_FILE,
    },
};
use crate::ml::{
    layout::LayoutEncoderConfig,
    model::ReorderModelConfig,
    seq2seq::Seq2SeqConfig,
    trainer::{run_training, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved next to the checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_json:        String,
    pub train_img_dir:     String,
    pub checkpoint_dir:    String,

    pub num_epochs:        usize,
    pub max_samples:       usize,
    pub chunk_size:        usize,
    pub batch_size:        usize,
    pub lr:                f64,
    pub weight_decay:      f64,
    pub warmup_pct:        f64,
    pub max_output_length: usize,
    pub grad_clip:         f64,
    pub save_every:        usize,
    pub num_workers:       usize,
    pub seed:              u64,
    pub resume_epoch:      Option<usize>,

    pub image_size:        usize,
    pub max_seq_len:       usize,
    pub max_target_len:    usize,
    pub normalize_boxes:   bool,
    pub layout_vocab_size: usize,
    pub target_vocab_size: usize,

    pub layout_hidden:     usize,
    pub layout_layers:     usize,
    pub layout_heads:      usize,
    pub layout_ff:         usize,
    pub patch_size:        usize,

    pub d_model:           usize,
    pub num_heads:         usize,
    pub num_layers:        usize,
    pub d_ff:              usize,
    pub dropout:           f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_json:        "data/train.json".to_string(),
            train_img_dir:     "data/train_images".to_string(),
            checkpoint_dir:    "checkpoints".to_string(),

            num_epochs:        100,
            max_samples:       6000,
            chunk_size:        1000,
            batch_size:        8,
            lr:                3e-5,
            weight_decay:      0.01,
            warmup_pct:        0.1,
            max_output_length: 512,
            grad_clip:         1.0,
            save_every:        5,
            num_workers:       2,
            seed:              42,
            resume_epoch:      None,

            image_size:        224,
            max_seq_len:       512,
            max_target_len:    512,
            normalize_boxes:   false,
            layout_vocab_size: 50265,
            target_vocab_size: 32128,

            layout_hidden:     768,
            layout_layers:     12,
            layout_heads:      12,
            layout_ff:         3072,
            patch_size:        16,

            d_model:           512,
            num_heads:         8,
            num_layers:        6,
            d_ff:              2048,
            dropout:           0.1,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.chunk_size > 0, "chunk_size must be positive");
        ensure!(self.max_samples > 0, "max_samples must be positive");
        ensure!(self.save_every > 0, "save_every must be positive");
        ensure!(
            self.patch_size > 0 && self.image_size % self.patch_size == 0,
            "image_size ({}) must be a multiple of patch_size ({})",
            self.image_size,
            self.patch_size
        );
        ensure!(
            self.layout_hidden % self.layout_heads == 0,
            "layout_hidden must be divisible by layout_heads"
        );
        ensure!(self.d_model % self.num_heads == 0, "d_model must be divisible by num_heads");
        ensure!((0.0..=1.0).contains(&self.warmup_pct), "warmup_pct must lie in [0, 1]");
        Ok(())
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            image_size:      self.image_size,
            max_seq_len:     self.max_seq_len,
            max_target_len:  self.max_target_len,
            normalize_boxes: self.normalize_boxes,
        }
    }

    /// Architecture sized to the processor's vocabularies and limits.
    /// The decoder's position table covers both the training target
    /// length and the generation limit used at inference time.
    pub fn model_config(&self, processor: &DocumentProcessor) -> ReorderModelConfig {
        let p = processor.config();
        let layout = LayoutEncoderConfig::new(processor.layout_vocab_size())
            .with_hidden_size(self.layout_hidden)
            .with_num_layers(self.layout_layers)
            .with_num_heads(self.layout_heads)
            .with_d_ff(self.layout_ff)
            .with_max_position(p.max_seq_len)
            .with_image_size(p.image_size)
            .with_patch_size(self.patch_size)
            .with_dropout(self.dropout);
        let seq2seq = Seq2SeqConfig::new(processor.target_vocab_size())
            .with_d_model(self.d_model)
            .with_num_heads(self.num_heads)
            .with_num_layers(self.num_layers)
            .with_d_ff(self.d_ff)
            .with_max_target_positions(p.max_target_len.max(self.max_output_length))
            .with_dropout(self.dropout)
            .with_pad_token_id(processor.target_pad_id() as usize)
            .with_eos_token_id(processor.target_eos_id() as usize);
        ReorderModelConfig::new(layout, seq2seq)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ─────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Dataset ──────────────────────────────────────────────────
        let reader = NdjsonReader::new(&cfg.train_json);
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);

        // ── Steps 3-5: Processor and model architecture ──────────────────────
        let (processor, model_cfg) = match cfg.resume_epoch {
            Some(epoch) => {
                tracing::info!("Resuming from epoch {}", epoch);
                let processor = ckpt_manager.load_processor(epoch)?;
                let model_cfg = ckpt_manager.load_model_config()?;
                (processor, model_cfg)
            }
            None => {
                let processor = build_processor(cfg, &reader)?;
                let model_cfg = cfg.model_config(&processor);
                ckpt_manager.save_model_config(&model_cfg)?;
                (processor, model_cfg)
            }
        };
        ckpt_manager.save_config(cfg)?;

        tracing::info!(
            "Vocabularies: layout={}, target={}",
            processor.layout_vocab_size(),
            processor.target_vocab_size()
        );

        let metrics = MetricsLogger::new(ckpt_manager.dir().join("logs"))?;
        tracing::info!("Metrics → '{}'", metrics.csv_path().display());

        // ── Step 6: Run training loop (Layer 5) ──────────────────────────────
        run_training(cfg, &reader, &processor, &model_cfg, &ckpt_manager, &metrics)
    }
}

/// Load tokenizers from the checkpoint directory, or build word-level
/// ones from the first `max_samples` training records.
fn build_processor(cfg: &TrainConfig, reader: &NdjsonReader) -> Result<DocumentProcessor> {
    let layout_store = TokenizerStore::new(&cfg.checkpoint_dir, LAYOUT_TOKENIZER_FILE);
    let target_store = TokenizerStore::new(&cfg.checkpoint_dir, TARGET_TOKENIZER_FILE);

    let (sources, targets) = collect_corpus(reader, cfg.max_samples, cfg.chunk_size)?;
    tracing::info!("Tokenizer corpus: {} records", sources.len());

    let layout = layout_store.load_or_build(&sources, cfg.layout_vocab_size, &LAYOUT_SPECIAL_TOKENS)?;
    let target = target_store.load_or_build(&targets, cfg.target_vocab_size, &TARGET_SPECIAL_TOKENS)?;

    DocumentProcessor::new(cfg.processor_config(), layout, target)
}

/// Source and target texts of at most `limit` records.
fn collect_corpus(
    reader:     &NdjsonReader,
    limit:      usize,
    chunk_size: usize,
) -> Result<(Vec<String>, Vec<String>)> {
    let mut sources = Vec::new();
    let mut targets = Vec::new();
    for chunk in reader.iter_chunks::<OcrRecord>(chunk_size)? {
        for record in chunk? {
            if sources.len() >= limit {
                return Ok((sources, targets));
            }
            sources.push(record.source_text());
            targets.push(record.target_text());
        }
    }
    Ok((sources, targets))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_patch_size_is_rejected() {
        let cfg = TrainConfig { image_size: 100, patch_size: 16, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = TrainConfig { resume_epoch: Some(5), ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn corpus_stops_at_the_sample_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(
                file,
                r#"{{"img_name":"{i}.png","src_word_list":["b","a"],"src_wordbox_list":[[0,0,1,1],[0,0,1,1]],"ordered_src_doc":["a","b"]}}"#
            )
            .unwrap();
        }
        let reader = NdjsonReader::new(file.path());
        let (src, tgt) = collect_corpus(&reader, 3, 2).unwrap();
        assert_eq!(src, vec!["b a"; 3]);
        assert_eq!(tgt, vec!["a b"; 3]);
    }

    #[test]
    fn model_config_follows_processor() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"img_name":"x.png","src_word_list":["hello","world"],"src_wordbox_list":[[0,0,1,1],[0,0,1,1]]}}"#
        )
        .unwrap();

        let cfg = TrainConfig {
            checkpoint_dir: dir.path().to_string_lossy().into_owned(),
            max_target_len: 64,
            max_output_length: 100,
            ..TrainConfig::default()
        };
        let processor = build_processor(&cfg, &NdjsonReader::new(file.path())).unwrap();
        assert!(dir.path().join(LAYOUT_TOKENIZER_FILE).exists());
        assert!(dir.path().join(TARGET_TOKENIZER_FILE).exists());

        let model_cfg = cfg.model_config(&processor);
        assert_eq!(model_cfg.layout.vocab_size, 6); // 4 specials + 2 words
        assert_eq!(model_cfg.seq2seq.vocab_size, 5); // 3 specials + 2 words
        assert_eq!(model_cfg.seq2seq.max_target_positions, 100);
        let shorter = TrainConfig { max_output_length: 32, ..cfg.clone() };
        assert_eq!(shorter.model_config(&processor).seq2seq.max_target_positions, 64);
        assert_eq!(model_cfg.seq2seq.pad_token_id, 0);
        assert_eq!(model_cfg.seq2seq.eos_token_id, 1);
    }
}

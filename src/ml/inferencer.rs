// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the model of a saved epoch and generates reading-order
// text for every page of a test file:
//
//   model_config.json + model_epoch_N.mpk → ReorderModel
//   processor_epoch_N/                    → same encoding as training
//
//   chunk → OcrInferenceDataset → DataLoader (unshuffled)
//         → greedy generate → decode (skip specials) → (img_name, text)
//
// Results are handed back one batch at a time so the caller can
// stream them to disk.

use anyhow::Result;
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};
use std::{io::Write, path::Path};

use crate::application::infer_use_case::InferConfig;
use crate::data::{
    batcher::InferenceBatcher, dataset::OcrInferenceDataset, processor::DocumentProcessor,
};
use crate::domain::{record::OcrRecord, traits::ChunkSource};
use crate::infra::{checkpoint::CheckpointManager, prediction_writer::PredictionWriter};
use crate::ml::model::ReorderModel;

pub struct Inferencer<B: Backend> {
    model:     ReorderModel<B>,
    processor: DocumentProcessor,
    device:    B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: ReorderModel<B>, processor: DocumentProcessor, device: B::Device) -> Self {
        Self { model, processor, device }
    }

    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        epoch:        usize,
        device:       B::Device,
    ) -> Result<Self> {
        let model_cfg = ckpt_manager.load_model_config()?;
        let processor = ckpt_manager.load_processor(epoch)?;
        let model = ckpt_manager.load_model(model_cfg.init::<B>(&device), epoch, &device)?;
        tracing::info!("Model loaded from epoch {}", epoch);
        Ok(Self::new(model, processor, device))
    }

    /// Generate text for `records`, calling `on_batch` with each batch's
    /// `(img_name, text)` pairs in input order.
    pub fn predict_records<F>(
        &self,
        records:    &[OcrRecord],
        image_dir:  &Path,
        batch_size: usize,
        max_len:    usize,
        mut on_batch: F,
    ) -> Result<usize>
    where
        F: FnMut(&[(String, String)]) -> Result<()>,
    {
        let dataset = OcrInferenceDataset::from_records(records, image_dir, &self.processor);
        if dataset.sample_count() == 0 {
            return Ok(0);
        }

        let batcher = InferenceBatcher::<B>::new(
            self.device.clone(),
            self.processor.layout_pad_id(),
            self.processor.config().image_size,
        );
        let loader = DataLoaderBuilder::new(batcher).batch_size(batch_size).build(dataset);

        let mut written = 0;
        for batch in loader.iter() {
            let generated = self.model.generate(&batch.page, max_len)?;
            let mut preds = Vec::with_capacity(generated.len());
            for (img_name, ids) in batch.img_names.into_iter().zip(generated) {
                let text = self.processor.decode_target(&ids)?;
                tracing::debug!("{} → {} tokens", img_name, ids.len());
                preds.push((img_name, text));
            }
            on_batch(&preds)?;
            written += preds.len();
        }
        Ok(written)
    }
}

/// Run inference over every chunk of `source`, streaming each batch
/// into `writer` and flushing after it. Returns the number of pages written.
pub fn run_inference<B, S, W>(
    inferencer: &Inferencer<B>,
    source:     &S,
    cfg:        &InferConfig,
    writer:     &mut PredictionWriter<W>,
) -> Result<usize>
where
    B: Backend,
    S: ChunkSource<OcrRecord>,
    W: Write,
{
    let image_dir = Path::new(&cfg.test_img_dir);
    let mut total = 0;

    for (chunk_idx, chunk) in source.chunks(cfg.chunk_size)?.enumerate() {
        let chunk = chunk?;
        let written = inferencer.predict_records(
            &chunk,
            image_dir,
            cfg.batch_size,
            cfg.max_output_length,
            |preds| {
                for (img_name, text) in preds {
                    writer.write_entry(img_name, text)?;
                }
                writer.flush()
            },
        )?;
        total += written;
        tracing::info!("Chunk {}: {} of {} pages predicted", chunk_idx, written, chunk.len());
    }

    Ok(total)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::domain::traits::VecSource;
    use crate::infra::metrics::MetricsLogger;
    use crate::ml::{
        model::tests::tiny_config,
        trainer::{tests::{fixture, test_setup}, train_loop},
    };
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn predictions_cover_every_valid_page() {
        let img_dir = tempfile::tempdir().unwrap();
        let ckpt_dir = tempfile::tempdir().unwrap();
        let mut records = fixture(img_dir.path());
        records.push(OcrRecord {
            img_name: "missing.png".into(),
            src_word_list: vec!["fox".into()],
            src_wordbox_list: vec![vec![0.0, 0.0, 1.0, 1.0]],
            ordered_src_doc: None,
        });

        // Train one epoch so a full checkpoint bundle exists
        let (train_cfg, processor) = test_setup(img_dir.path(), ckpt_dir.path());
        let train_cfg = TrainConfig { num_epochs: 1, ..train_cfg };
        let model_cfg = tiny_config(processor.layout_vocab_size(), processor.target_vocab_size());
        let ckpt = CheckpointManager::new(ckpt_dir.path());
        ckpt.save_model_config(&model_cfg).unwrap();
        let metrics = MetricsLogger::new(ckpt_dir.path().join("logs")).unwrap();
        train_loop::<Autodiff<NdArray>, _>(
            &train_cfg,
            &VecSource::new(records.clone()),
            &processor,
            &model_cfg,
            &ckpt,
            &metrics,
            Default::default(),
        )
        .unwrap();

        let inferencer = Inferencer::<NdArray>::from_checkpoint(&ckpt, 1, Default::default()).unwrap();
        let cfg = InferConfig {
            test_img_dir:      img_dir.path().to_string_lossy().into_owned(),
            batch_size:        2,
            chunk_size:        3,
            max_output_length: 5,
            ..InferConfig::default()
        };

        let mut writer = PredictionWriter::begin(Vec::new()).unwrap();
        let n = run_inference(&inferencer, &VecSource::new(records), &cfg, &mut writer).unwrap();
        assert_eq!(n, 3);

        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = parsed.keys().collect();
        assert_eq!(keys, vec!["page_0.png", "page_1.png", "page_2.png"]);
        for value in parsed.values() {
            let words = value.as_str().unwrap().split_whitespace().count();
            assert!(words <= 5);
        }
    }
}

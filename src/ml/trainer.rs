// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Chunked training over an NDJSON dataset using Burn's
// DataLoader and AdamW.
//
//   for epoch:
//     for chunk in dataset (≤ max_samples records per epoch):
//       encode chunk → shuffled DataLoader
//       for batch:
//         loss → backward → clip (global norm) → AdamW(lr_t)
//         lr_t from the warmup-linear schedule, then step it
//     every save_every epochs → checkpoint bundle
//
// Only one chunk of decoded images is resident at a time.
//
// Key Burn insight:
//   - Training uses Autodiff<Wgpu> for gradients
//   - Gradients are clipped by their global norm before the step
//   - The loop itself is generic over AutodiffBackend so tests
//     can run it on Autodiff<NdArray>
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::Path;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::TrainBatcher, dataset::OcrReorderDataset, processor::DocumentProcessor,
};
use crate::domain::{record::OcrRecord, traits::ChunkSource};
use crate::infra::{
    checkpoint::{CheckpointManager, TrainingState},
    metrics::{EpochMetrics, MetricsLogger, TAG_BATCH_LOSS, TAG_CHUNK_LOSS, TAG_LEARNING_RATE},
};
use crate::ml::{
    clip::clip_grad_norm,
    model::{ReorderModel, ReorderModelConfig},
    schedule::WarmupLinearSchedule,
};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Where a training run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainSummary {
    pub last_epoch:  usize,
    pub global_step: usize,
    pub last_loss:   f64,
}

pub fn run_training<S: ChunkSource<OcrRecord>>(
    cfg:          &TrainConfig,
    source:       &S,
    processor:    &DocumentProcessor,
    model_cfg:    &ReorderModelConfig,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
) -> Result<TrainSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend, S>(cfg, source, processor, model_cfg, ckpt_manager, metrics, device)
}

pub fn train_loop<B: AutodiffBackend, S: ChunkSource<OcrRecord>>(
    cfg:          &TrainConfig,
    source:       &S,
    processor:    &DocumentProcessor,
    model_cfg:    &ReorderModelConfig,
    ckpt_manager: &CheckpointManager,
    metrics:      &MetricsLogger,
    device:       B::Device,
) -> Result<TrainSummary> {
    let image_dir = Path::new(&cfg.train_img_dir);

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: ReorderModel<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: layout {}x{}, seq2seq {}x{}",
        model_cfg.layout.num_layers,
        model_cfg.layout.hidden_size,
        model_cfg.seq2seq.num_layers,
        model_cfg.seq2seq.d_model,
    );

    // ── AdamW; clipping happens on the gradients in the loop ──────────────────
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init::<B, ReorderModel<B>>();

    let mut schedule = WarmupLinearSchedule::from_training(
        cfg.lr,
        cfg.max_samples,
        cfg.batch_size,
        cfg.num_epochs,
        cfg.warmup_pct,
    );
    let mut global_step = 0usize;
    let mut start_epoch = 1usize;

    // ── Resume ────────────────────────────────────────────────────────────────
    if let Some(epoch) = cfg.resume_epoch {
        model = ckpt_manager.load_model(model, epoch, &device)?;
        optim = ckpt_manager.load_optimizer::<B, _>(optim, epoch, &device)?;
        let state = ckpt_manager.load_state(epoch)?;
        schedule = state.scheduler;
        global_step = state.global_step;
        start_epoch = state.epoch + 1;
        tracing::info!("Resumed at epoch {} (global step {})", state.epoch, global_step);
    }

    tracing::info!(
        "Schedule: {} total steps, {} warmup",
        schedule.total_steps,
        schedule.warmup_steps
    );

    let batcher = TrainBatcher::<B>::new(
        device.clone(),
        processor.layout_pad_id(),
        processor.target_pad_id(),
        processor.config().image_size,
    );

    let mut summary = TrainSummary { last_epoch: start_epoch - 1, global_step, last_loss: f64::NAN };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in start_epoch..=cfg.num_epochs {
        let mut epoch_metrics = EpochMetrics::new(epoch);
        let mut processed = 0usize;

        for (chunk_idx, chunk) in source.chunks(cfg.chunk_size)?.enumerate() {
            if processed >= cfg.max_samples {
                break;
            }
            let mut chunk = chunk?;
            chunk.truncate(cfg.max_samples - processed);
            processed += chunk.len();

            let dataset = OcrReorderDataset::from_records(&chunk, image_dir, processor);
            if dataset.sample_count() == 0 {
                tracing::warn!("Chunk {} of epoch {} has no usable records", chunk_idx, epoch);
                continue;
            }

            let seed = cfg.seed + (epoch * 1000 + chunk_idx) as u64;
            let mut builder = DataLoaderBuilder::new(batcher.clone())
                .batch_size(cfg.batch_size)
                .shuffle(seed);
            if cfg.num_workers > 0 {
                builder = builder.num_workers(cfg.num_workers);
            }
            let loader = builder.build(dataset);

            let mut chunk_loss_sum = 0.0f64;
            let mut chunk_batches = 0usize;

            for batch in loader.iter() {
                let batch_size = batch.labels.dims()[0];
                let loss = model.forward_loss(&batch);
                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

                // Backward pass, global-norm clip, AdamW update at the scheduled LR
                let mut grads = GradientsParams::from_grads(loss.backward(), &model);
                let grad_norm = clip_grad_norm::<B, _>(&model, &mut grads, cfg.grad_clip);
                tracing::trace!("Step {}: grad norm {:.4}", global_step + 1, grad_norm);
                let lr = schedule.current_lr();
                model = optim.step(lr, model, grads);
                schedule.step();
                global_step += 1;

                metrics.log_scalar(TAG_BATCH_LOSS, global_step, loss_val)?;
                metrics.log_scalar(TAG_LEARNING_RATE, global_step, lr)?;

                chunk_loss_sum += loss_val;
                chunk_batches += 1;
                epoch_metrics.add_batch(loss_val, batch_size);
            }

            if chunk_batches > 0 {
                let chunk_loss = chunk_loss_sum / chunk_batches as f64;
                metrics.log_scalar(TAG_CHUNK_LOSS, global_step, chunk_loss)?;
                tracing::debug!(
                    "Epoch {} chunk {}: {} batches, loss={:.4}",
                    epoch, chunk_idx, chunk_batches, chunk_loss
                );
            }
        }

        epoch_metrics.global_step = global_step;
        if epoch_metrics.samples == 0 {
            epoch_metrics.avg_loss = f64::NAN;
        }
        metrics.log_epoch(&epoch_metrics)?;

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | samples={} | step={} | lr={:.3e}",
            epoch,
            cfg.num_epochs,
            epoch_metrics.avg_loss,
            epoch_metrics.samples,
            global_step,
            schedule.current_lr(),
        );

        if epoch % cfg.save_every == 0 {
            let state = TrainingState {
                epoch,
                global_step,
                avg_loss: epoch_metrics.avg_loss,
                scheduler: schedule.clone(),
            };
            ckpt_manager.save_epoch(&model, &optim, &state, processor)?;
            tracing::info!("Checkpoint saved for epoch {}", epoch);
        }

        summary = TrainSummary { last_epoch: epoch, global_step, last_loss: epoch_metrics.avg_loss };
    }

    tracing::info!("Training complete!");
    Ok(summary)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::processor::{tests::test_processor, ProcessorConfig};
    use crate::domain::traits::VecSource;
    use crate::ml::model::tests::tiny_config;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    type TestBackend = Autodiff<NdArray>;

    pub(crate) const WORDS: [&str; 4] = ["the", "quick", "brown", "fox"];

    /// Three 16x16 pages whose words come in shuffled order.
    pub(crate) fn fixture(img_dir: &Path) -> Vec<OcrRecord> {
        (0..3)
            .map(|i| {
                let name = format!("page_{i}.png");
                RgbImage::from_pixel(16, 16, Rgb([i as u8 * 60, 100, 200]))
                    .save(img_dir.join(&name))
                    .unwrap();
                let mut words: Vec<String> = WORDS.iter().map(|w| w.to_string()).collect();
                words.rotate_left(i + 1);
                OcrRecord {
                    img_name: name,
                    src_wordbox_list: (0..words.len())
                        .map(|j| vec![j as f64 * 100.0, 10.0, j as f64 * 100.0 + 80.0, 30.0])
                        .collect(),
                    src_word_list: words,
                    ordered_src_doc: Some(WORDS.iter().map(|w| w.to_string()).collect()),
                }
            })
            .collect()
    }

    pub(crate) fn test_setup(img_dir: &Path, ckpt_dir: &Path) -> (TrainConfig, DocumentProcessor) {
        let processor = test_processor(
            &WORDS,
            ProcessorConfig { image_size: 16, max_seq_len: 16, max_target_len: 16, normalize_boxes: false },
        );
        let cfg = TrainConfig {
            train_img_dir:  img_dir.to_string_lossy().into_owned(),
            checkpoint_dir: ckpt_dir.to_string_lossy().into_owned(),
            num_epochs:     2,
            max_samples:    2,
            chunk_size:     1,
            batch_size:     2,
            lr:             1e-3,
            save_every:     1,
            num_workers:    0,
            image_size:     16,
            patch_size:     8,
            ..TrainConfig::default()
        };
        (cfg, processor)
    }

    #[test]
    fn trains_saves_and_resumes() {
        let img_dir = tempfile::tempdir().unwrap();
        let ckpt_dir = tempfile::tempdir().unwrap();
        let records = fixture(img_dir.path());
        let (cfg, processor) = test_setup(img_dir.path(), ckpt_dir.path());

        let model_cfg = tiny_config(processor.layout_vocab_size(), processor.target_vocab_size());
        let ckpt = CheckpointManager::new(ckpt_dir.path());
        let metrics = MetricsLogger::new(ckpt_dir.path().join("logs")).unwrap();
        let source = VecSource::new(records);

        let summary = train_loop::<TestBackend, _>(
            &cfg, &source, &processor, &model_cfg, &ckpt, &metrics, Default::default(),
        )
        .unwrap();

        // max_samples = 2 with chunk_size = 1 → two one-sample batches per epoch
        assert_eq!(summary.last_epoch, 2);
        assert_eq!(summary.global_step, 4);
        assert!(summary.last_loss.is_finite());
        assert_eq!(ckpt.latest_epoch().unwrap(), 2);

        let state = ckpt.load_state(2).unwrap();
        assert_eq!(state.global_step, 4);
        assert_eq!(state.scheduler.step, 4);
        assert!(ckpt.processor_dir(2).join("processor.json").exists());

        let csv = std::fs::read_to_string(metrics.csv_path()).unwrap();
        assert_eq!(csv.lines().filter(|l| l.starts_with("Loss/train_batch,")).count(), 4);
        assert_eq!(csv.lines().filter(|l| l.starts_with("Loss/train_chunk,")).count(), 4);
        assert_eq!(csv.lines().filter(|l| l.starts_with("Loss/train_epoch,")).count(), 2);
        assert_eq!(csv.lines().filter(|l| l.starts_with("Loss/train_epoch_avg,")).count(), 2);

        // Resume from epoch 1 and run one more epoch to reach 2 again
        let resumed_cfg = TrainConfig { resume_epoch: Some(1), ..cfg };
        let resumed = train_loop::<TestBackend, _>(
            &resumed_cfg, &source, &processor, &model_cfg, &ckpt, &metrics, Default::default(),
        )
        .unwrap();
        assert_eq!(resumed.last_epoch, 2);
        assert_eq!(resumed.global_step, 4);
    }
}

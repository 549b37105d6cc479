// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn module code lives here.
//
//   blocks.rs     — post-norm encoder / decoder transformer blocks
//   layout.rs     — layout-aware page encoder: word + 2D position
//                   embeddings, image patch embeddings, shared stack
//   projection.rs — linear → LayerNorm → GELU bridge between the
//                   layout hidden size and the seq2seq d_model
//   seq2seq.rs    — encoder-decoder that takes input embeddings,
//                   teacher-forced loss and greedy generation
//   model.rs      — the three parts above as one module
//
//   schedule.rs   — warmup + linear decay learning rate
//   clip.rs       — global gradient-norm clipping
//   trainer.rs    — chunked training loop with resume
//   inferencer.rs — checkpoint loading and batched generation
//
// References: Vaswani et al. (2017) Attention Is All You Need
//             Huang et al. (2022) LayoutLMv3
//             Raffel et al. (2020) T5

pub mod blocks;
pub mod layout;
pub mod projection;
pub mod seq2seq;
pub mod model;

/// Learning-rate schedule, stored in training checkpoints
pub mod schedule;

pub mod clip;

pub mod trainer;

pub mod inferencer;

// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the raw NDJSON file all the
// way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   dataset.ndjson + image dir
//       │
//       ▼
//   NdjsonReader        → streams OcrRecords in bounded chunks
//       │
//       ▼
//   DocumentProcessor   → image pixels, token ids, layout boxes, labels
//       │
//       ▼
//   OcrReorderDataset   → implements Burn's Dataset trait
//       │
//       ▼
//   TrainBatcher        → pads each batch to its longest sequence
//       │
//       ▼
//   DataLoader          → feeds batches to the training loop
//
// Inference follows the same path with OcrInferenceDataset and
// InferenceBatcher, which keep the image name instead of labels.

/// Streams newline-delimited JSON in fixed-size chunks
pub mod ndjson;

/// Image + text + layout encoding, saved alongside checkpoints
pub mod processor;

/// Implements Burn's Dataset trait for OCR pages
pub mod dataset;

/// Implements Burn's Batcher trait with dynamic padding
pub mod batcher;

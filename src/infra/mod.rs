// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the cross-cutting concerns that don't belong in any
// specific business layer:
//
//   checkpoint.rs        — Saving and loading per-epoch bundles
//                          (weights, optimizer, training state,
//                          processor) plus the run's configs.
//
//   tokenizer_store.rs   — Tokenizer persistence
//                          Loads tokenizer files dropped into the
//                          checkpoint dir, or builds word-level
//                          vocabularies from the training corpus.
//
//   metrics.rs           — Scalar logging to a CSV file
//                          (batch / chunk / epoch loss, LR).
//
//   prediction_writer.rs — Streams inference output as a JSON
//                          object, flushed batch by batch.

/// Checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;

/// Incremental `{img_name: text}` JSON writer
pub mod prediction_writer;

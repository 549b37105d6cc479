// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Each use case wires the lower layers together for one command:
//
//   train_use_case    — tokenizers, processor, model, training loop
//   infer_use_case    — checkpoint → predictions JSON
//   evaluate_use_case — predictions JSON + gold → BLEU report
//
// No model math and no printing here; the CLI layer prints the
// values these return.

/// The training workflow
pub mod train_use_case;

/// Batch prediction over a test file
pub mod infer_use_case;

/// BLEU scoring of a predictions file
pub mod evaluate_use_case;

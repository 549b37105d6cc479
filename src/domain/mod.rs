// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the pipeline works on:
// dataset records, word boxes, and the abstractions the
// data and application layers program against.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums and traits

// One OCR page record from the NDJSON dataset
pub mod record;

// Core abstractions (traits) that other layers implement
pub mod traits;

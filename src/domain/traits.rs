// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training and inference loops only need "something that
// hands out records in bounded chunks". The NDJSON reader is the
// production implementation; tests can feed in-memory chunks.

use anyhow::Result;

// ─── ChunkSource ──────────────────────────────────────────────────────────────
/// Any component that can stream records in chunks of a fixed size.
///
/// Implementations:
///   - NdjsonReader → streams a newline-delimited JSON file
///   - VecSource    → in-memory records (tests)
pub trait ChunkSource<T> {
    type Chunks: Iterator<Item = Result<Vec<T>>>;

    /// Start a fresh pass over the source. Every chunk holds exactly
    /// `chunk_size` records except possibly the last one.
    fn chunks(&self, chunk_size: usize) -> Result<Self::Chunks>;
}

/// In-memory source, mostly useful for tests and small tools.
pub struct VecSource<T> {
    records: Vec<T>,
}

impl<T: Clone> VecSource<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self { records }
    }
}

impl<T: Clone> ChunkSource<T> for VecSource<T> {
    type Chunks = std::vec::IntoIter<Result<Vec<T>>>;

    fn chunks(&self, chunk_size: usize) -> Result<Self::Chunks> {
        anyhow::ensure!(chunk_size > 0, "chunk_size must be at least 1");
        let chunks: Vec<Result<Vec<T>>> = self
            .records
            .chunks(chunk_size)
            .map(|c| Ok(c.to_vec()))
            .collect();
        Ok(chunks.into_iter())
    }
}

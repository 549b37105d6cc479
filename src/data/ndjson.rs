// ============================================================
// Layer 4 — NDJSON Chunk Reader
// ============================================================
// Streams a newline-delimited JSON file in fixed-size chunks so a
// multi-gigabyte dataset never has to be resident at once.
//
//   line 1  {"img_name": ...}   ─┐
//   line 2  {"img_name": ...}    ├─ chunk 1 (chunk_size records)
//   ...                         ─┘
//   line k  not json            ← skipped, counted
//   line k+1 {"img_name": ...}  ─┐
//   ...                          ├─ chunk 2
//                               ─┘ last chunk may be shorter
//
// Contract: "parse or skip". Blank lines are ignored, malformed
// lines (bad JSON, wrong shape, invalid UTF-8) are dropped and
// counted. Only genuine I/O failures surface as errors.

use anyhow::{ensure, Context, Result};
use serde::de::DeserializeOwned;
use std::{
    fs::{self, File},
    io::{BufRead, BufReader, ErrorKind, Lines},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use crate::domain::traits::ChunkSource;

/// A newline-delimited JSON file that can be read many times
/// (one pass per training epoch).
#[derive(Debug, Clone)]
pub struct NdjsonReader {
    path: PathBuf,
}

impl NdjsonReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the file and return an iterator of record chunks.
    pub fn iter_chunks<T: DeserializeOwned>(
        &self,
        chunk_size: usize,
    ) -> Result<NdjsonChunks<BufReader<File>, T>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open NDJSON file '{}'", self.path.display()))?;
        NdjsonChunks::new(BufReader::new(file), chunk_size)
    }

    /// Load every parseable record of the file.
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut chunks = self.iter_chunks(1024)?;
        for chunk in chunks.by_ref() {
            all.extend(chunk?);
        }
        if chunks.skipped() > 0 {
            tracing::warn!(
                "Skipped {} malformed lines in '{}'",
                chunks.skipped(),
                self.path.display()
            );
        }
        Ok(all)
    }
}

impl<T: DeserializeOwned> ChunkSource<T> for NdjsonReader {
    type Chunks = NdjsonChunks<BufReader<File>, T>;

    fn chunks(&self, chunk_size: usize) -> Result<Self::Chunks> {
        self.iter_chunks(chunk_size)
    }
}

// ─── NdjsonChunks ─────────────────────────────────────────────────────────────
/// Iterator over `Vec<T>` chunks of a buffered reader.
pub struct NdjsonChunks<R, T> {
    lines:      Lines<R>,
    chunk_size: usize,
    skipped:    usize,
    done:       bool,
    _record:    PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> NdjsonChunks<R, T> {
    pub fn new(reader: R, chunk_size: usize) -> Result<Self> {
        ensure!(chunk_size > 0, "chunk_size must be at least 1");
        Ok(Self {
            lines: reader.lines(),
            chunk_size,
            skipped: 0,
            done: false,
            _record: PhantomData,
        })
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for NdjsonChunks<R, T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut chunk = Vec::with_capacity(self.chunk_size.min(1024));

        loop {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    break;
                }
                Some(Ok(line)) => line,
                // Invalid UTF-8 on one line is a malformed record, not a broken file
                Some(Err(e)) if e.kind() == ErrorKind::InvalidData => {
                    self.skipped += 1;
                    tracing::debug!("Skipping non-UTF-8 NDJSON line: {e}");
                    continue;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(anyhow::Error::new(e).context("Failed reading NDJSON line")));
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(trimmed) {
                Ok(record) => {
                    chunk.push(record);
                    if chunk.len() == self.chunk_size {
                        return Some(Ok(chunk));
                    }
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!("Skipping malformed NDJSON line: {e}");
                }
            }
        }

        if self.skipped > 0 {
            tracing::debug!("{} malformed lines skipped in total", self.skipped);
        }

        if chunk.is_empty() { None } else { Some(Ok(chunk)) }
    }
}

/// Load a file that is either one JSON array of objects or NDJSON.
///
/// Array elements that do not match `T` are skipped, the same way
/// malformed NDJSON lines are.
pub fn read_json_or_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;

    if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(&text) {
        let total = items.len();
        let parsed: Vec<T> = items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        tracing::debug!(
            "Read '{}' as a JSON array: {} of {} entries usable",
            path.display(),
            parsed.len(),
            total
        );
        return Ok(parsed);
    }

    let mut records = Vec::new();
    let mut chunks = NdjsonChunks::<_, T>::new(text.as_bytes(), 1024)?;
    for chunk in chunks.by_ref() {
        records.extend(chunk?);
    }
    if chunks.skipped() > 0 {
        tracing::warn!("Skipped {} malformed lines in '{}'", chunks.skipped(), path.display());
    }
    Ok(records)
}

// ============================================================
// Layer 6 — Streaming Prediction Writer
// ============================================================
// Writes `{ img_name: text, ... }` one entry at a time so that
// partial results survive a crash half-way through a test set:
//
//   {
//   "a.png": "first page text",
//   "b.png": "second page text"
//   }
//
// Keys and values are JSON-escaped; non-ASCII text is written
// as-is (UTF-8), not as \u escapes.

use anyhow::{Context, Result};
use std::io::Write;

pub struct PredictionWriter<W: Write> {
    out:     W,
    entries: usize,
}

impl<W: Write> PredictionWriter<W> {
    /// Write the opening brace.
    pub fn begin(mut out: W) -> Result<Self> {
        out.write_all(b"{\n").context("Cannot start predictions file")?;
        Ok(Self { out, entries: 0 })
    }

    pub fn write_entry(&mut self, img_name: &str, text: &str) -> Result<()> {
        if self.entries > 0 {
            self.out.write_all(b",\n")?;
        }
        write!(
            self.out,
            "{}: {}",
            serde_json::to_string(img_name)?,
            serde_json::to_string(text)?
        )?;
        self.entries += 1;
        Ok(())
    }

    /// Push buffered entries to the underlying file.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().context("Cannot flush predictions")
    }

    /// Close the object and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        self.out.write_all(b"\n}")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_valid_json_with_unicode_kept() {
        let mut w = PredictionWriter::begin(Vec::new()).unwrap();
        w.write_entry("a.png", "Hello \"world\"").unwrap();
        w.write_entry("b.png", "你好 世界").unwrap();
        let bytes = w.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("你好"));
        assert!(text.starts_with("{\n"));
        assert!(text.ends_with("\n}"));

        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["a.png"], "Hello \"world\"");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn empty_object_is_still_valid() {
        let w = PredictionWriter::begin(Vec::new()).unwrap();
        let text = String::from_utf8(w.finish().unwrap()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed.as_object().unwrap().is_empty());
    }
}

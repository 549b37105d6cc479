// ============================================================
// Layer 7 — Evaluation
// ============================================================
// Scores a predictions file (`{img_name: text}`) against gold data:
//
//   bleu.rs        — NLTK-compatible sentence / corpus BLEU
//   tokenize.rs    — English word tokenizer for reorder scoring
//   reorder.rs     — per-page sentence BLEU of reordered text
//   translation.rs — corpus BLEU of translated text (jieba words)

pub mod bleu;
pub mod reorder;
pub mod tokenize;
pub mod translation;

use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Read a `{img_name: text}` predictions file, keeping file order.
/// Entries whose value is not a string are skipped.
pub fn read_predictions(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read predictions '{}'", path.display()))?;
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)
        .with_context(|| format!("'{}' is not a JSON object", path.display()))?;

    Ok(map
        .into_iter()
        .filter_map(|(img_name, value)| match value {
            serde_json::Value::String(text) => Some((img_name, text)),
            other => {
                tracing::warn!("Skipping non-string prediction for '{}': {}", img_name, other);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn predictions_keep_file_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"z.png": "last", "a.png": "first", "n.png": 3}}"#).unwrap();
        let preds = read_predictions(file.path()).unwrap();
        assert_eq!(
            preds,
            vec![
                ("z.png".to_string(), "last".to_string()),
                ("a.png".to_string(), "first".to_string()),
            ]
        );
    }

    #[test]
    fn non_object_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2]").unwrap();
        assert!(read_predictions(file.path()).is_err());
    }
}

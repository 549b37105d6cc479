// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// The pipeline needs two tokenizers:
//   - layout tokenizer  → turns OCR words into encoder token ids
//   - target tokenizer  → turns the reading-order text into
//                         decoder labels and back into text
//
// If a `tokenizer.json` in HuggingFace format already sits in the
// checkpoint directory (for example one exported from a pretrained
// model), it is used as-is. Otherwise a word-level vocabulary is
// built from the training corpus and written in the same format,
// so `Tokenizer::from_file` can reload it for inference.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf, str::FromStr};
use tokenizers::Tokenizer;

pub const LAYOUT_TOKENIZER_FILE: &str = "layout_tokenizer.json";
pub const TARGET_TOKENIZER_FILE: &str = "target_tokenizer.json";

/// Special tokens of the layout tokenizer, in id order.
pub const LAYOUT_SPECIAL_TOKENS: [&str; 4] = ["<s>", "<pad>", "</s>", "<unk>"];

/// Special tokens of the target tokenizer, in id order.
pub const TARGET_SPECIAL_TOKENS: [&str; 3] = ["<pad>", "</s>", "<unk>"];

pub const UNK_TOKEN: &str = "<unk>";

pub struct TokenizerStore {
    path: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        Self { path: dir.into().join(file_name) }
    }

    /// Load an existing tokenizer or build a new one from texts
    pub fn load_or_build(
        &self,
        texts:      &[String],
        vocab_size: usize,
        specials:   &[&str],
    ) -> Result<Tokenizer> {
        if self.path.exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path.display());
            self.load()
        } else {
            tracing::info!(
                "Building new tokenizer '{}' (vocab_size={})",
                self.path.display(),
                vocab_size
            );
            self.build_and_save(texts, vocab_size, specials)
        }
    }

    /// Load a previously saved tokenizer from its JSON file
    pub fn load(&self) -> Result<Tokenizer> {
        Tokenizer::from_file(&self.path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", self.path.display(), e)
        })
    }

    fn build_and_save(
        &self,
        texts:      &[String],
        vocab_size: usize,
        specials:   &[&str],
    ) -> Result<Tokenizer> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }

        let tokenizer = word_level_tokenizer(texts, vocab_size, specials)?;
        tokenizer.save(&self.path, true).map_err(|e| {
            anyhow::anyhow!("Cannot write tokenizer '{}': {}", self.path.display(), e)
        })?;

        tracing::info!("Tokenizer saved to '{}'", self.path.display());
        Ok(tokenizer)
    }
}

/// Build an in-memory word-level tokenizer over `texts`.
pub fn word_level_tokenizer(
    texts:      &[String],
    vocab_size: usize,
    specials:   &[&str],
) -> Result<Tokenizer> {
    let json = word_level_json(texts, vocab_size, specials);
    Tokenizer::from_str(&json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build word-level tokenizer: {e}"))
}

/// Word-level vocabulary in HuggingFace `tokenizer.json` format.
///
/// Specials take ids `0..specials.len()`; the remaining slots go to
/// the most frequent whitespace-separated words (ties broken
/// alphabetically so rebuilding is deterministic). Words keep their
/// case and punctuation so decoding reproduces the original text.
fn word_level_json(texts: &[String], vocab_size: usize, specials: &[&str]) -> serde_json::Value {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for text in texts {
        for word in text.split_whitespace() {
            *freq.entry(word).or_insert(0) += 1;
        }
    }

    let mut words: Vec<(&str, usize)> = freq
        .into_iter()
        .filter(|(w, _)| !specials.contains(w))
        .collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    words.truncate(vocab_size.saturating_sub(specials.len()));

    let mut vocab = serde_json::Map::new();
    for (id, tok) in specials.iter().enumerate() {
        vocab.insert(tok.to_string(), serde_json::json!(id));
    }
    for (offset, (word, _)) in words.iter().enumerate() {
        vocab.insert(word.to_string(), serde_json::json!(specials.len() + offset));
    }

    let added_tokens: Vec<serde_json::Value> = specials
        .iter()
        .enumerate()
        .map(|(id, tok)| {
            serde_json::json!({
                "id": id, "content": tok, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": { "type": "WhitespaceSplit" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec!["Hello world".to_string(), "hello World world".to_string()]
    }

    #[test]
    fn specials_get_the_first_ids() {
        let tok = word_level_tokenizer(&corpus(), 100, &TARGET_SPECIAL_TOKENS).unwrap();
        assert_eq!(tok.token_to_id("<pad>"), Some(0));
        assert_eq!(tok.token_to_id("</s>"), Some(1));
        assert_eq!(tok.token_to_id("<unk>"), Some(2));
        // "world" is the most frequent word
        assert_eq!(tok.token_to_id("world"), Some(3));
    }

    #[test]
    fn vocab_is_capped_and_unknowns_map_to_unk() {
        let tok = word_level_tokenizer(&corpus(), 4, &TARGET_SPECIAL_TOKENS).unwrap();
        assert_eq!(tok.get_vocab_size(true), 4);
        let enc = tok.encode("Hello", false).unwrap();
        assert_eq!(enc.get_ids(), &[2]);
    }

    #[test]
    fn decode_round_trips_case_and_skips_specials() {
        let tok = word_level_tokenizer(&corpus(), 100, &TARGET_SPECIAL_TOKENS).unwrap();
        let mut ids = tok.encode("Hello World", false).unwrap().get_ids().to_vec();
        ids.push(1);
        ids.push(0);
        assert_eq!(tok.decode(&ids, true).unwrap(), "Hello World");
    }

    #[test]
    fn store_builds_once_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path(), TARGET_TOKENIZER_FILE);
        let built = store.load_or_build(&corpus(), 100, &TARGET_SPECIAL_TOKENS).unwrap();
        assert!(dir.path().join(TARGET_TOKENIZER_FILE).exists());

        // A second call must not rebuild from the (different) corpus
        let reloaded = store
            .load_or_build(&["zzz".to_string()], 100, &TARGET_SPECIAL_TOKENS)
            .unwrap();
        assert_eq!(built.get_vocab_size(true), reloaded.get_vocab_size(true));
        assert_eq!(reloaded.token_to_id("zzz"), None);
    }
}

use jieba_rs::Jieba;
use serde::Deserialize;
use std::collections::HashMap;

use crate::eval::bleu::{corpus_bleu, Smoothing, BLEU4_WEIGHTS};

/// Gold entry of a translation validation set.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationGold {
    pub img_name:        String,
    /// Reference translation as a list of tokens / characters
    pub doc_translation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationReport {
    /// Predictions that had a gold entry
    pub matched: usize,
    /// Corpus BLEU-4 in [0, 1]
    pub bleu:    f64,
}

impl TranslationReport {
    pub fn percent(&self) -> f64 {
        self.bleu * 100.0
    }
}

/// Corpus BLEU-4 without smoothing. References are the gold tokens
/// concatenated and re-segmented into words with jieba (precise mode,
/// HMM on); hypotheses are split on whitespace, so a prediction is
/// expected to be word-spaced the same way.
pub fn score_translation(
    predictions: &[(String, String)],
    gold:        &[TranslationGold],
) -> anyhow::Result<TranslationReport> {
    let jieba = Jieba::new();
    // Later duplicates win
    let references: HashMap<&str, Vec<String>> = gold
        .iter()
        .map(|g| {
            let joined = g.doc_translation.concat();
            let words = jieba
                .cut(&joined, true)
                .into_iter()
                .filter(|w| !w.trim().is_empty())
                .map(str::to_string)
                .collect();
            (g.img_name.as_str(), words)
        })
        .collect();

    let mut list_of_references = Vec::new();
    let mut hypotheses = Vec::new();
    for (img_name, text) in predictions {
        let Some(reference) = references.get(img_name.as_str()) else { continue };
        list_of_references.push(vec![reference.clone()]);
        hypotheses.push(text.split_whitespace().map(str::to_string).collect::<Vec<_>>());
    }

    let bleu = corpus_bleu(&list_of_references, &hypotheses, &BLEU4_WEIGHTS, Smoothing::None)?;
    Ok(TranslationReport { matched: hypotheses.len(), bleu })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold(name: &str, tokens: &[&str]) -> TranslationGold {
        TranslationGold {
            img_name: name.into(),
            doc_translation: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn word_spaced_prediction_matches_perfectly() {
        let gold = vec![gold("a.png", &["我来到", "北京", "清华大学"])];
        let preds = vec![("a.png".to_string(), "我 来到 北京 清华大学".to_string())];
        let report = score_translation(&preds, &gold).unwrap();
        assert_eq!(report.matched, 1);
        assert!((report.percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn character_spaced_prediction_does_not_match_words() {
        let gold = vec![gold("a.png", &["我来到", "北京", "清华大学"])];
        let preds = vec![("a.png".to_string(), "我 来 到 北 京 清 华 大 学".to_string())];
        let report = score_translation(&preds, &gold).unwrap();
        assert!(report.percent() < 100.0);
    }

    #[test]
    fn unmatched_predictions_are_ignored() {
        let gold = vec![gold("a.png", &["你好"])];
        let preds = vec![("b.png".to_string(), "你好".to_string())];
        let report = score_translation(&preds, &gold).unwrap();
        assert_eq!(report.matched, 0);
        assert_eq!(report.bleu, 0.0);
    }

    #[test]
    fn partial_overlap_is_between_zero_and_one() {
        let gold = vec![
            gold("a", &["我", "来到", "北京", "清华大学"]),
            gold("b", &["他", "来到", "了", "网易", "杭研", "大厦"]),
        ];
        let preds = vec![
            ("a".to_string(), "我 来到 北京 清华大学".to_string()),
            ("b".to_string(), "他 来到 了 上海".to_string()),
        ];
        let report = score_translation(&preds, &gold).unwrap();
        assert_eq!(report.matched, 2);
        assert!(report.bleu > 0.0 && report.bleu < 1.0);
    }
}

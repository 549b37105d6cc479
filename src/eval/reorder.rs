use serde::Deserialize;
use std::collections::HashMap;

use crate::eval::{
    bleu::{sentence_bleu, Smoothing, BLEU4_WEIGHTS},
    tokenize::word_tokenize,
};

/// Gold line of a reorder validation set.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderGold {
    pub img_name:        String,
    pub ordered_src_doc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReorderReport {
    /// Per-image scores in prediction order
    pub scores: Vec<(String, f64)>,
}

impl ReorderReport {
    /// `None` when no prediction matched a gold document.
    pub fn mean(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().map(|(_, s)| s).sum::<f64>() / self.scores.len() as f64)
    }
}

/// Sentence BLEU-4 (Method4 smoothing) of every prediction that has a
/// gold document, on lowercased word tokens.
pub fn score_reorder(predictions: &[(String, String)], gold: &[ReorderGold]) -> ReorderReport {
    let references: HashMap<&str, String> = gold
        .iter()
        .map(|g| (g.img_name.as_str(), g.ordered_src_doc.join(" ")))
        .collect();

    let scores = predictions
        .iter()
        .filter_map(|(img_name, text)| {
            let reference = references.get(img_name.as_str())?;
            let ref_tokens = word_tokenize(&reference.to_lowercase());
            let hyp_tokens = word_tokenize(&text.to_lowercase());
            let score = sentence_bleu(&[ref_tokens], &hyp_tokens, &BLEU4_WEIGHTS, Smoothing::Method4);
            Some((img_name.clone(), score))
        })
        .collect();

    ReorderReport { scores }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gold(name: &str, words: &[&str]) -> ReorderGold {
        ReorderGold {
            img_name: name.into(),
            ordered_src_doc: words.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn only_matching_images_are_scored() {
        let gold = vec![
            gold("a.png", &["The", "cat", "sat", "on", "the", "mat."]),
            gold("b.png", &["Hello", "world"]),
        ];
        let preds = vec![
            ("a.png".to_string(), "the cat sat on the mat .".to_string()),
            ("z.png".to_string(), "unmatched".to_string()),
        ];
        let report = score_reorder(&preds, &gold);
        assert_eq!(report.scores.len(), 1);
        assert_eq!(report.scores[0].0, "a.png");
        // Case and the detached period do not matter
        assert!((report.scores[0].1 - 1.0).abs() < 1e-12);
        assert_eq!(report.mean(), Some(report.scores[0].1));
    }

    #[test]
    fn no_matches_means_no_mean() {
        let report = score_reorder(&[("x".into(), "y".into())], &[]);
        assert!(report.scores.is_empty());
        assert_eq!(report.mean(), None);
    }

    #[test]
    fn scrambled_order_scores_lower() {
        let gold = vec![gold("p", &["one", "two", "three", "four", "five", "six"])];
        let good = score_reorder(&[("p".into(), "one two three four five six".into())], &gold);
        let bad = score_reorder(&[("p".into(), "six four two one five three".into())], &gold);
        assert!(bad.scores[0].1 < good.scores[0].1);
        assert!(bad.scores[0].1 >= 0.0);
    }
}

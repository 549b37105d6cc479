// ============================================================
// Layer 7 — BLEU
// ============================================================
// Papineni et al. (2002), computed the same way as NLTK's
// `corpus_bleu` / `sentence_bleu`:
//
//   p_n = Σ clipped n-gram matches / Σ max(1, hypothesis n-grams)
//   BP  = 1                   if c > r
//         0                   if c = 0
//         exp(1 - r / c)      otherwise
//   BLEU = BP · exp(Σ w_n · ln p_n)
//
// r is the closest reference length per sentence (ties go to the
// shorter reference), summed over the corpus; c is the summed
// hypothesis length. No unigram match at all gives 0.
//
// Zero precisions: without smoothing they become the smallest
// positive f64 (the score collapses towards 0 but stays defined);
// with Method4 (Chen & Cherry, 2014) the j-th zero order (j = 1, 2, …)
// becomes ln(c) / (2^j · 5) / denominator, so every further missing
// order is penalised twice as hard. Precisions that are still 0
// (c ≤ 1) are left out of the sum.

use std::{collections::HashMap, hash::Hash};

use anyhow::{ensure, Result};

/// Standard BLEU-4 weights.
pub const BLEU4_WEIGHTS: [f64; 4] = [0.25; 4];

const METHOD4_K: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    None,
    Method4,
}

fn ngram_counts<T: Eq + Hash>(tokens: &[T], n: usize) -> HashMap<&[T], usize> {
    let mut counts = HashMap::new();
    if n > 0 && tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Clipped n-gram matches and the (at least 1) number of hypothesis n-grams.
fn modified_precision<T: Eq + Hash>(references: &[Vec<T>], hypothesis: &[T], n: usize) -> (usize, usize) {
    let counts = ngram_counts(hypothesis, n);

    let mut max_ref: HashMap<&[T], usize> = HashMap::new();
    for reference in references {
        for (gram, c) in ngram_counts(reference, n) {
            let slot = max_ref.entry(gram).or_insert(0);
            *slot = (*slot).max(c);
        }
    }

    let clipped = counts
        .iter()
        .map(|(gram, &c)| c.min(max_ref.get(gram).copied().unwrap_or(0)))
        .sum();
    let total: usize = counts.values().sum();
    (clipped, total.max(1))
}

fn closest_ref_length<T>(references: &[Vec<T>], hyp_len: usize) -> usize {
    references
        .iter()
        .map(|r| r.len())
        .min_by_key(|&len| (len.abs_diff(hyp_len), len))
        .unwrap_or(0)
}

fn brevity_penalty(ref_len: usize, hyp_len: usize) -> f64 {
    if hyp_len > ref_len {
        1.0
    } else if hyp_len == 0 {
        0.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    }
}

fn bleu_from_pairs<'a, T, I>(pairs: I, weights: &[f64], smoothing: Smoothing) -> f64
where
    T: Eq + Hash + 'a,
    I: IntoIterator<Item = (&'a [Vec<T>], &'a [T])>,
{
    let max_n = weights.len();
    let mut numerators = vec![0usize; max_n];
    let mut denominators = vec![0usize; max_n];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (references, hypothesis) in pairs {
        for n in 1..=max_n {
            let (num, den) = modified_precision(references, hypothesis, n);
            numerators[n - 1] += num;
            denominators[n - 1] += den;
        }
        hyp_len += hypothesis.len();
        ref_len += closest_ref_length(references, hypothesis.len());
    }

    if max_n == 0 || numerators[0] == 0 {
        return 0.0;
    }

    let bp = brevity_penalty(ref_len, hyp_len);

    let mut missing_orders = 0i32;
    let precisions: Vec<f64> = numerators
        .iter()
        .zip(&denominators)
        .map(|(&num, &den)| match smoothing {
            _ if num > 0 => num as f64 / den as f64,
            Smoothing::None => f64::MIN_POSITIVE,
            Smoothing::Method4 if hyp_len > 1 => {
                missing_orders += 1;
                let smoothed = (hyp_len as f64).ln() / (2f64.powi(missing_orders) * METHOD4_K);
                smoothed / den as f64
            }
            Smoothing::Method4 => 0.0,
        })
        .collect();

    let log_sum: f64 = weights
        .iter()
        .zip(&precisions)
        .filter(|(_, p)| **p > 0.0)
        .map(|(&w, &p)| w * p.ln())
        .sum();

    (bp * log_sum.exp()).clamp(0.0, 1.0)
}

/// Corpus-level BLEU: statistics are summed over all sentences first.
pub fn corpus_bleu<T: Eq + Hash>(
    list_of_references: &[Vec<Vec<T>>],
    hypotheses:         &[Vec<T>],
    weights:            &[f64],
    smoothing:          Smoothing,
) -> Result<f64> {
    ensure!(
        list_of_references.len() == hypotheses.len(),
        "{} reference sets but {} hypotheses",
        list_of_references.len(),
        hypotheses.len()
    );
    let pairs = list_of_references
        .iter()
        .zip(hypotheses)
        .map(|(r, h)| (r.as_slice(), h.as_slice()));
    Ok(bleu_from_pairs(pairs, weights, smoothing))
}

/// BLEU of one hypothesis against its references.
pub fn sentence_bleu<T: Eq + Hash>(
    references: &[Vec<T>],
    hypothesis: &[T],
    weights:    &[f64],
    smoothing:  Smoothing,
) -> f64 {
    bleu_from_pairs(std::iter::once((references, hypothesis)), weights, smoothing)
}

// ============================================================
// Layer 7 — Scoring Tokenizer
// ============================================================
// English-style word tokenizer used by the reorder BLEU scorer:
// punctuation is split off words, contractions become their own
// tokens.
//
//   "Don't stop, (please)." → do | n't | stop | , | ( | please | ) | .

/// Characters split off both ends of a word.
const EDGE_PUNCT: &[char] = &[
    ',', ';', ':', '!', '?', '"', '(', ')', '[', ']', '{', '}', '<', '>', '`',
];

/// Clitics split off the end of a word (input is expected lowercased).
const CONTRACTIONS: &[&str] = &["n't", "'s", "'re", "'ve", "'ll", "'d", "'m"];

pub fn word_tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split_whitespace() {
        split_word(raw, &mut tokens);
    }
    tokens
}

fn split_word(raw: &str, out: &mut Vec<String>) {
    let mut word = raw;

    // Leading punctuation, including an opening single quote
    while let Some(c) = word.chars().next() {
        if EDGE_PUNCT.contains(&c) || (c == '\'' && word.len() > 1) {
            out.push(c.to_string());
            word = &word[c.len_utf8()..];
        } else {
            break;
        }
    }

    // Trailing punctuation, collected in reverse
    let mut trailing = Vec::new();
    loop {
        let Some(c) = word.chars().next_back() else { break };
        if EDGE_PUNCT.contains(&c) {
            trailing.push(c.to_string());
            word = &word[..word.len() - c.len_utf8()];
        } else if word.ends_with("...") {
            trailing.push("...".to_string());
            word = &word[..word.len() - 3];
        } else if c == '.' && word.len() > 1 && !word[..word.len() - 1].contains('.') {
            // "end." splits, "u.s." keeps its periods
            trailing.push(".".to_string());
            word = &word[..word.len() - 1];
        } else {
            break;
        }
    }

    if !word.is_empty() {
        match CONTRACTIONS
            .iter()
            .find(|suffix| word.len() > suffix.len() && word.ends_with(*suffix))
        {
            Some(suffix) => {
                let (stem, clitic) = word.split_at(word.len() - suffix.len());
                out.push(stem.to_string());
                out.push(clitic.to_string());
            }
            None => out.push(word.to_string()),
        }
    }

    out.extend(trailing.into_iter().rev());
}

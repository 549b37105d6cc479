// ============================================================
// Layer 3 — OCR Record Domain Type
// ============================================================
// One line of the NDJSON dataset:
//
//   {"img_name": "page_001.png",
//    "src_word_list":    ["World", "Hello"],
//    "src_wordbox_list": [[500, 10, 600, 30], [10, 10, 120, 30]],
//    "ordered_src_doc":  ["Hello", "World"]}
//
// The words come in OCR detection order; `ordered_src_doc` is the
// same document in reading order and is the training target.
// Test files carry no `ordered_src_doc`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Upper bound of the layout coordinate space (boxes live in 0..=1000).
pub const LAYOUT_COORD_MAX: f64 = 1000.0;

/// A single page of OCR output with optional reading-order target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRecord {
    /// Image file name, resolved against the image directory
    pub img_name: String,

    /// OCR words in detection order
    pub src_word_list: Vec<String>,

    /// One box per word: `[x0, y0, x1, y1]` or an 8-value quad
    pub src_wordbox_list: Vec<Vec<f64>>,

    /// Words in reading order (training target)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered_src_doc: Option<Vec<String>>,
}

impl OcrRecord {
    /// Target sequence for the seq2seq decoder.
    /// Falls back to the detection-order words when no target is present.
    pub fn target_text(&self) -> String {
        self.ordered_src_doc
            .as_ref()
            .unwrap_or(&self.src_word_list)
            .join(" ")
    }

    /// Source words joined by spaces (used to build vocabularies)
    pub fn source_text(&self) -> String {
        self.src_word_list.join(" ")
    }

    /// Validate the record and convert its raw boxes.
    ///
    /// Fails when the word and box lists disagree in length or a box
    /// does not have 4 or 8 coordinates.
    pub fn word_boxes(&self) -> Result<Vec<WordBox>> {
        if self.src_word_list.len() != self.src_wordbox_list.len() {
            bail!(
                "'{}': {} words but {} boxes",
                self.img_name,
                self.src_word_list.len(),
                self.src_wordbox_list.len()
            );
        }
        self.src_wordbox_list
            .iter()
            .enumerate()
            .map(|(i, coords)| match WordBox::from_coords(coords) {
                Some(b) => Ok(b),
                None => bail!(
                    "'{}': box {} has {} coordinates (expected 4 or 8)",
                    self.img_name,
                    i,
                    coords.len()
                ),
            })
            .collect()
    }
}

/// An axis-aligned word box. Coordinates are kept as given
/// (pixels or already-normalised 0..=1000) until `to_layout`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl WordBox {
    /// Build from `[x0, y0, x1, y1]` or a quad `[x, y] * 4`.
    /// Corners are reordered so that `x0 <= x1` and `y0 <= y1`.
    pub fn from_coords(coords: &[f64]) -> Option<Self> {
        let (xs, ys): (Vec<f64>, Vec<f64>) = match coords.len() {
            4 => (vec![coords[0], coords[2]], vec![coords[1], coords[3]]),
            8 => (
                coords.iter().step_by(2).copied().collect(),
                coords.iter().skip(1).step_by(2).copied().collect(),
            ),
            _ => return None,
        };
        let min = |v: &[f64]| v.iter().copied().fold(f64::INFINITY, f64::min);
        let max = |v: &[f64]| v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            x0: min(&xs),
            y0: min(&ys),
            x1: max(&xs),
            y1: max(&ys),
        })
    }

    /// Convert to integer layout coordinates in `0..=1000`.
    ///
    /// With `page_size = Some((w, h))` the box is treated as pixels
    /// and scaled to the page; otherwise it is only clamped.
    pub fn to_layout(&self, page_size: Option<(u32, u32)>) -> [i64; 4] {
        let (sx, sy) = match page_size {
            Some((w, h)) if w > 0 && h > 0 => {
                (LAYOUT_COORD_MAX / w as f64, LAYOUT_COORD_MAX / h as f64)
            }
            _ => (1.0, 1.0),
        };
        let q = |v: f64, s: f64| (v * s).round().clamp(0.0, LAYOUT_COORD_MAX) as i64;
        [q(self.x0, sx), q(self.y0, sy), q(self.x1, sx), q(self.y1, sy)]
    }
}

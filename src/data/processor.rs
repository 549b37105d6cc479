// ============================================================
// Layer 4 — Document Processor
// ============================================================
// Turns one OCR record + its page image into model inputs:
//
//   image  → RGB → resize(image_size²) → [0,1] → (x - 0.5) / 0.5
//            laid out channel-first: [3, H, W]
//
//   words  → <s> tok(w1)… tok(wN) </s>      (input_ids)
//   boxes  → [0,0,0,0] box(w1)… box(wN) [0,0,0,0]  (one per token)
//
//   target → tok(ordered text) </s>        (labels)
//
// A word that splits into several sub-tokens repeats its box for
// every sub-token. Sequences longer than the limit are truncated
// but always keep their closing </s>.

use anyhow::{ensure, Context, Result};
use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::domain::record::{OcrRecord, WordBox};
use crate::infra::tokenizer_store::{LAYOUT_TOKENIZER_FILE, TARGET_TOKENIZER_FILE};

pub const PROCESSOR_CONFIG_FILE: &str = "processor.json";

const IMAGE_MEAN: f32 = 0.5;
const IMAGE_STD: f32 = 0.5;

/// Everything needed to reproduce the training-time encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Square side the page image is resized to
    pub image_size: usize,
    /// Maximum encoder tokens, including <s> and </s>
    pub max_seq_len: usize,
    /// Maximum decoder labels, including </s>
    pub max_target_len: usize,
    /// Treat word boxes as pixels and scale them to 0..=1000
    pub normalize_boxes: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            image_size:      224,
            max_seq_len:     512,
            max_target_len:  512,
            normalize_boxes: false,
        }
    }
}

/// Encoder-side features of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPage {
    /// Normalised pixels, `[3, image_size, image_size]` flattened
    pub pixel_values: Vec<f32>,
    pub input_ids:    Vec<u32>,
    /// One layout box per input id
    pub bbox:         Vec<[i64; 4]>,
}

#[derive(Debug, Clone, Copy)]
struct LayoutSpecials {
    bos: u32,
    eos: u32,
    pad: u32,
}

#[derive(Debug, Clone, Copy)]
struct TargetSpecials {
    eos: u32,
    pad: u32,
}

pub struct DocumentProcessor {
    config:           ProcessorConfig,
    layout_tokenizer: Tokenizer,
    target_tokenizer: Tokenizer,
    layout_ids:       LayoutSpecials,
    target_ids:       TargetSpecials,
}

fn special_id(tokenizer: &Tokenizer, token: &str, which: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .with_context(|| format!("{which} tokenizer has no '{token}' token"))
}

impl DocumentProcessor {
    pub fn new(
        config:           ProcessorConfig,
        layout_tokenizer: Tokenizer,
        target_tokenizer: Tokenizer,
    ) -> Result<Self> {
        ensure!(config.image_size > 0, "image_size must be positive");
        ensure!(config.max_seq_len >= 2, "max_seq_len must leave room for <s> and </s>");
        ensure!(config.max_target_len >= 1, "max_target_len must be at least 1");

        let layout_ids = LayoutSpecials {
            bos: special_id(&layout_tokenizer, "<s>", "layout")?,
            eos: special_id(&layout_tokenizer, "</s>", "layout")?,
            pad: special_id(&layout_tokenizer, "<pad>", "layout")?,
        };
        let target_ids = TargetSpecials {
            eos: special_id(&target_tokenizer, "</s>", "target")?,
            pad: special_id(&target_tokenizer, "<pad>", "target")?,
        };

        Ok(Self { config, layout_tokenizer, target_tokenizer, layout_ids, target_ids })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn layout_pad_id(&self) -> u32 {
        self.layout_ids.pad
    }

    pub fn target_pad_id(&self) -> u32 {
        self.target_ids.pad
    }

    pub fn target_eos_id(&self) -> u32 {
        self.target_ids.eos
    }

    pub fn layout_vocab_size(&self) -> usize {
        self.layout_tokenizer.get_vocab_size(true)
    }

    pub fn target_vocab_size(&self) -> usize {
        self.target_tokenizer.get_vocab_size(true)
    }

    // ─── Image ────────────────────────────────────────────────────────────────

    /// Resize and normalise an image into channel-first `f32` pixels.
    pub fn encode_image(&self, image: &DynamicImage) -> Vec<f32> {
        let side = self.config.image_size as u32;
        let rgb = image.resize_exact(side, side, FilterType::Triangle).to_rgb8();

        let plane = (side * side) as usize;
        let mut pixels = vec![0f32; 3 * plane];
        for (i, p) in rgb.pixels().enumerate() {
            for c in 0..3 {
                pixels[c * plane + i] = (p[c] as f32 / 255.0 - IMAGE_MEAN) / IMAGE_STD;
            }
        }
        pixels
    }

    // ─── Text ─────────────────────────────────────────────────────────────────

    /// Tokenise words and attach one layout box per token.
    pub fn encode_words(
        &self,
        words:     &[String],
        boxes:     &[WordBox],
        page_size: Option<(u32, u32)>,
    ) -> Result<(Vec<u32>, Vec<[i64; 4]>)> {
        ensure!(words.len() == boxes.len(), "{} words but {} boxes", words.len(), boxes.len());

        let budget = self.config.max_seq_len - 2;
        let scale = if self.config.normalize_boxes { page_size } else { None };

        let mut ids = vec![self.layout_ids.bos];
        let mut layout = vec![[0i64; 4]];

        'words: for (word, b) in words.iter().zip(boxes) {
            let enc = self
                .layout_tokenizer
                .encode(word.as_str(), false)
                .map_err(|e| anyhow::anyhow!("Tokenisation error for '{word}': {e}"))?;
            let coords = b.to_layout(scale);
            for &id in enc.get_ids() {
                if ids.len() - 1 >= budget {
                    break 'words;
                }
                ids.push(id);
                layout.push(coords);
            }
        }

        ids.push(self.layout_ids.eos);
        layout.push([0; 4]);
        Ok((ids, layout))
    }

    /// Tokenise a target text into decoder labels ending with </s>.
    pub fn encode_target(&self, text: &str) -> Result<Vec<u32>> {
        let enc = self
            .target_tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Target tokenisation error: {e}"))?;
        let mut ids: Vec<u32> = enc.get_ids().to_vec();
        ids.truncate(self.config.max_target_len - 1);
        ids.push(self.target_ids.eos);
        Ok(ids)
    }

    /// Decode generated ids, dropping special tokens.
    pub fn decode_target(&self, ids: &[u32]) -> Result<String> {
        self.target_tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow::anyhow!("Decode error: {e}"))
    }

    // ─── Records ──────────────────────────────────────────────────────────────

    /// Validate a record, load its image and encode the encoder inputs.
    pub fn encode_page(&self, record: &OcrRecord, image_dir: &Path) -> Result<EncodedPage> {
        let boxes = record.word_boxes()?;

        let path = image_dir.join(&record.img_name);
        let image = image::open(&path)
            .with_context(|| format!("Cannot open image '{}'", path.display()))?;
        let page_size = (image.width(), image.height());

        let pixel_values = self.encode_image(&image);
        let (input_ids, bbox) = self.encode_words(&record.src_word_list, &boxes, Some(page_size))?;

        Ok(EncodedPage { pixel_values, input_ids, bbox })
    }

    // ─── Persistence ──────────────────────────────────────────────────────────

    /// Save config and both tokenizers into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        fs::write(dir.join(PROCESSOR_CONFIG_FILE), serde_json::to_string_pretty(&self.config)?)
            .with_context(|| format!("Cannot write processor config in '{}'", dir.display()))?;

        for (tok, file) in [
            (&self.layout_tokenizer, LAYOUT_TOKENIZER_FILE),
            (&self.target_tokenizer, TARGET_TOKENIZER_FILE),
        ] {
            let path: PathBuf = dir.join(file);
            tok.save(&path, true)
                .map_err(|e| anyhow::anyhow!("Cannot save '{}': {e}", path.display()))?;
        }
        Ok(())
    }

    /// Load a processor previously written by `save`.
    pub fn load(dir: &Path) -> Result<Self> {
        let cfg_path = dir.join(PROCESSOR_CONFIG_FILE);
        let json = fs::read_to_string(&cfg_path)
            .with_context(|| format!("Cannot read '{}'", cfg_path.display()))?;
        let config: ProcessorConfig = serde_json::from_str(&json)?;

        let load = |file: &str| {
            let path = dir.join(file);
            Tokenizer::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Cannot load tokenizer '{}': {e}", path.display()))
        };

        Self::new(config, load(LAYOUT_TOKENIZER_FILE)?, load(TARGET_TOKENIZER_FILE)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infra::tokenizer_store::{
        word_level_tokenizer, LAYOUT_SPECIAL_TOKENS, TARGET_SPECIAL_TOKENS,
    };
    use image::{Rgb, RgbImage};

    /// Small processor whose vocabularies cover `words`.
    pub(crate) fn test_processor(words: &[&str], config: ProcessorConfig) -> DocumentProcessor {
        let corpus = vec![words.join(" ")];
        let layout = word_level_tokenizer(&corpus, 1000, &LAYOUT_SPECIAL_TOKENS).unwrap();
        let target = word_level_tokenizer(&corpus, 1000, &TARGET_SPECIAL_TOKENS).unwrap();
        DocumentProcessor::new(config, layout, target).unwrap()
    }

    fn boxes(n: usize) -> Vec<WordBox> {
        (0..n)
            .map(|i| WordBox { x0: i as f64, y0: 1.0, x1: i as f64 + 10.0, y1: 11.0 })
            .collect()
    }

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn words_are_wrapped_in_bos_eos_with_zero_boxes() {
        let p = test_processor(&["alpha", "beta"], ProcessorConfig::default());
        let (ids, bbox) = p.encode_words(&words(&["alpha", "beta"]), &boxes(2), None).unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(ids[0], 0); // <s>
        assert_eq!(*ids.last().unwrap(), 2); // </s>
        assert_eq!(bbox[0], [0, 0, 0, 0]);
        assert_eq!(bbox[1], [0, 1, 10, 11]);
        assert_eq!(bbox[3], [0, 0, 0, 0]);
    }

    #[test]
    fn long_word_lists_truncate_but_keep_eos() {
        let cfg = ProcessorConfig { max_seq_len: 4, ..ProcessorConfig::default() };
        let p = test_processor(&["a", "b", "c", "d"], cfg);
        let (ids, bbox) = p
            .encode_words(&words(&["a", "b", "c", "d"]), &boxes(4), None)
            .unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(bbox.len(), 4);
        assert_eq!(*ids.last().unwrap(), 2);
    }

    #[test]
    fn target_ends_with_eos_and_respects_limit() {
        let cfg = ProcessorConfig { max_target_len: 3, ..ProcessorConfig::default() };
        let p = test_processor(&["x", "y", "z"], cfg);
        let ids = p.encode_target("x y z").unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(*ids.last().unwrap(), p.target_eos_id());
        assert_eq!(p.decode_target(&ids).unwrap(), "x y");
    }

    #[test]
    fn image_is_resized_and_normalised_channel_first() {
        let cfg = ProcessorConfig { image_size: 4, ..ProcessorConfig::default() };
        let p = test_processor(&["a"], cfg);
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(9, 5, Rgb([255, 0, 255])));
        let px = p.encode_image(&img);
        assert_eq!(px.len(), 3 * 4 * 4);
        assert!(px[..16].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(px[16..32].iter().all(|&v| (v + 1.0).abs() < 1e-6));
    }

    #[test]
    fn page_with_missing_image_fails() {
        let p = test_processor(&["a"], ProcessorConfig::default());
        let record = OcrRecord {
            img_name: "missing.png".into(),
            src_word_list: vec!["a".into()],
            src_wordbox_list: vec![vec![0.0, 0.0, 1.0, 1.0]],
            ordered_src_doc: None,
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(p.encode_page(&record, dir.path()).is_err());
    }

    #[test]
    fn save_and_load_preserve_encoding() {
        let cfg = ProcessorConfig { image_size: 32, max_seq_len: 16, ..ProcessorConfig::default() };
        let p = test_processor(&["left", "right"], cfg.clone());
        let dir = tempfile::tempdir().unwrap();
        p.save(dir.path()).unwrap();

        let loaded = DocumentProcessor::load(dir.path()).unwrap();
        assert_eq!(loaded.config(), &cfg);
        assert_eq!(
            loaded.encode_target("right left").unwrap(),
            p.encode_target("right left").unwrap()
        );
    }
}

// ============================================================
// Layer 4 — Page Batchers
// ============================================================
// Implements Burn's Batcher trait to turn a Vec of encoded pages
// into device tensors.
//
// Unlike fixed-length text samples, OCR pages carry a different
// number of tokens each, so padding happens here, per batch, to
// the longest sequence in that batch:
//
//   sample 1: <s> t t t </s>            → ids  <s> t t t </s>
//   sample 2: <s> t </s>                → ids  <s> t </s> P P
//                                         mask  1  1  1  0 0
//                                         bbox  b  b  b  0 0
//
// Labels are padded the same way with the target pad id, which
// the loss ignores.
//
// Output shapes:
//   pixel_values   [B, 3, H, W]
//   input_ids      [B, S]
//   attention_mask [B, S]
//   bbox           [B, S, 4]
//   labels         [B, T]

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::{InferenceSample, TrainSample};
use crate::data::processor::EncodedPage;

// ─── Batches ──────────────────────────────────────────────────────────────────
/// Encoder-side tensors shared by training and inference batches.
#[derive(Debug, Clone)]
pub struct PageBatch<B: Backend> {
    pub pixel_values:   Tensor<B, 4>,
    pub input_ids:      Tensor<B, 2, Int>,
    /// 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,
    pub bbox:           Tensor<B, 3, Int>,
}

#[derive(Debug, Clone)]
pub struct TrainBatch<B: Backend> {
    pub page:   PageBatch<B>,
    pub labels: Tensor<B, 2, Int>,
}

#[derive(Debug, Clone)]
pub struct InferenceBatch<B: Backend> {
    pub page:      PageBatch<B>,
    pub img_names: Vec<String>,
}

// ─── Padding helpers ──────────────────────────────────────────────────────────

/// Right-pad every row to the longest one and flatten.
fn pad_rows(rows: &[&[u32]], pad: u32) -> (Vec<i32>, usize) {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let mut flat = Vec::with_capacity(rows.len() * width);
    for row in rows {
        flat.extend(row.iter().map(|&x| x as i32));
        flat.extend(std::iter::repeat(pad as i32).take(width - row.len()));
    }
    (flat, width)
}

fn page_batch<B: Backend>(
    pages:      &[&EncodedPage],
    pad_id:     u32,
    image_size: usize,
    device:     &B::Device,
) -> PageBatch<B> {
    let batch_size = pages.len();

    let id_rows: Vec<&[u32]> = pages.iter().map(|p| p.input_ids.as_slice()).collect();
    let (ids_flat, seq_len) = pad_rows(&id_rows, pad_id);

    let mut mask_flat = Vec::with_capacity(batch_size * seq_len);
    let mut bbox_flat = Vec::with_capacity(batch_size * seq_len * 4);
    for page in pages {
        let real = page.input_ids.len();
        mask_flat.extend(std::iter::repeat(1i32).take(real));
        mask_flat.extend(std::iter::repeat(0i32).take(seq_len - real));
        for b in &page.bbox {
            bbox_flat.extend(b.iter().map(|&c| c as i32));
        }
        bbox_flat.extend(std::iter::repeat(0i32).take((seq_len - page.bbox.len()) * 4));
    }

    let pixels_flat: Vec<f32> = pages
        .iter()
        .flat_map(|p| p.pixel_values.iter().copied())
        .collect();

    let input_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device)
        .reshape([batch_size, seq_len]);
    let attention_mask = Tensor::<B, 1, Int>::from_ints(mask_flat.as_slice(), device)
        .reshape([batch_size, seq_len]);
    let bbox = Tensor::<B, 1, Int>::from_ints(bbox_flat.as_slice(), device)
        .reshape([batch_size, seq_len, 4]);
    let pixel_values = Tensor::<B, 1>::from_floats(pixels_flat.as_slice(), device)
        .reshape([batch_size, 3, image_size, image_size]);

    PageBatch { pixel_values, input_ids, attention_mask, bbox }
}

// ─── TrainBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TrainBatcher<B: Backend> {
    pub device:        B::Device,
    pub layout_pad_id: u32,
    pub target_pad_id: u32,
    pub image_size:    usize,
}

impl<B: Backend> TrainBatcher<B> {
    pub fn new(device: B::Device, layout_pad_id: u32, target_pad_id: u32, image_size: usize) -> Self {
        Self { device, layout_pad_id, target_pad_id, image_size }
    }
}

impl<B: Backend> Batcher<TrainSample, TrainBatch<B>> for TrainBatcher<B> {
    fn batch(&self, items: Vec<TrainSample>) -> TrainBatch<B> {
        let pages: Vec<&EncodedPage> = items.iter().map(|s| &s.page).collect();
        let page = page_batch(&pages, self.layout_pad_id, self.image_size, &self.device);

        let label_rows: Vec<&[u32]> = items.iter().map(|s| s.labels.as_slice()).collect();
        let (labels_flat, target_len) = pad_rows(&label_rows, self.target_pad_id);
        let labels = Tensor::<B, 1, Int>::from_ints(labels_flat.as_slice(), &self.device)
            .reshape([items.len(), target_len]);

        TrainBatch { page, labels }
    }
}

// ─── InferenceBatcher ─────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct InferenceBatcher<B: Backend> {
    pub device:        B::Device,
    pub layout_pad_id: u32,
    pub image_size:    usize,
}

impl<B: Backend> InferenceBatcher<B> {
    pub fn new(device: B::Device, layout_pad_id: u32, image_size: usize) -> Self {
        Self { device, layout_pad_id, image_size }
    }
}

impl<B: Backend> Batcher<InferenceSample, InferenceBatch<B>> for InferenceBatcher<B> {
    fn batch(&self, items: Vec<InferenceSample>) -> InferenceBatch<B> {
        let pages: Vec<&EncodedPage> = items.iter().map(|s| &s.page).collect();
        let page = page_batch(&pages, self.layout_pad_id, self.image_size, &self.device);
        let img_names = items.into_iter().map(|s| s.img_name).collect();
        InferenceBatch { page, img_names }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn page(ids: &[u32], size: usize) -> EncodedPage {
        EncodedPage {
            pixel_values: vec![0.5; 3 * size * size],
            input_ids:    ids.to_vec(),
            bbox:         ids.iter().map(|&i| [i as i64, 1, 2, 3]).collect(),
        }
    }

    fn ints<const D: usize>(t: Tensor<TestBackend, D, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn train_batch_pads_to_longest_sequence() {
        let batcher = TrainBatcher::<TestBackend>::new(Default::default(), 1, 0, 2);
        let items = vec![
            TrainSample { page: page(&[0, 5, 6, 2], 2), labels: vec![7, 1] },
            TrainSample { page: page(&[0, 2], 2), labels: vec![8, 9, 9, 1] },
        ];
        let batch = batcher.batch(items);

        assert_eq!(batch.page.input_ids.dims(), [2, 4]);
        assert_eq!(batch.page.bbox.dims(), [2, 4, 4]);
        assert_eq!(batch.page.pixel_values.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.labels.dims(), [2, 4]);

        assert_eq!(ints(batch.page.input_ids), vec![0, 5, 6, 2, 0, 2, 1, 1]);
        assert_eq!(ints(batch.page.attention_mask), vec![1, 1, 1, 1, 1, 1, 0, 0]);
        assert_eq!(ints(batch.labels), vec![7, 1, 0, 0, 8, 9, 9, 1]);

        let bbox = ints(batch.page.bbox);
        // second sample, third token is padding
        assert_eq!(&bbox[24..28], &[0, 0, 0, 0]);
        assert_eq!(&bbox[16..20], &[0, 1, 2, 3]);
    }

    #[test]
    fn inference_batch_keeps_image_names_in_order() {
        let batcher = InferenceBatcher::<TestBackend>::new(Default::default(), 1, 2);
        let items = vec![
            InferenceSample { page: page(&[0, 2], 2), img_name: "b.png".into() },
            InferenceSample { page: page(&[0, 4, 2], 2), img_name: "a.png".into() },
        ];
        let batch = batcher.batch(items);
        assert_eq!(batch.img_names, vec!["b.png", "a.png"]);
        assert_eq!(batch.page.attention_mask.dims(), [2, 3]);
    }
}

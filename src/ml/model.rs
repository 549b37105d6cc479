use anyhow::Result;
use burn::prelude::*;

use crate::data::batcher::{PageBatch, TrainBatch};
use crate::ml::{
    layout::{LayoutEncoder, LayoutEncoderConfig},
    projection::{Projection, ProjectionConfig},
    seq2seq::{Seq2SeqConfig, Seq2SeqModel},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ReorderModelConfig {
    pub layout:  LayoutEncoderConfig,
    pub seq2seq: Seq2SeqConfig,
}

impl ReorderModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReorderModel<B> {
        ReorderModel {
            layout:     self.layout.init(device),
            projection: ProjectionConfig::new(self.layout.hidden_size, self.seq2seq.d_model)
                .init(device),
            seq2seq:    self.seq2seq.init(device),
        }
    }
}

/// Layout encoder → projection bridge → seq2seq model.
#[derive(Module, Debug)]
pub struct ReorderModel<B: Backend> {
    pub layout:     LayoutEncoder<B>,
    pub projection: Projection<B>,
    pub seq2seq:    Seq2SeqModel<B>,
}

impl<B: Backend> ReorderModel<B> {
    /// Text-token features projected into the seq2seq space: [B, S, d_model].
    pub fn encode_page(&self, page: &PageBatch<B>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = page.input_ids.dims();
        let hidden = self.layout.forward(
            page.pixel_values.clone(),
            page.input_ids.clone(),
            page.bbox.clone(),
            page.attention_mask.clone(),
        );
        let [_, _, width] = hidden.dims();

        // Visual tokens follow the text tokens; only the text part is bridged.
        let text = hidden.slice([0..batch_size, 0..seq_len, 0..width]);
        self.projection.forward(text)
    }

    pub fn forward_loss(&self, batch: &TrainBatch<B>) -> Tensor<B, 1> {
        let embeds = self.encode_page(&batch.page);
        self.seq2seq
            .forward_loss(embeds, batch.page.attention_mask.clone(), batch.labels.clone())
    }

    pub fn generate(&self, page: &PageBatch<B>, max_len: usize) -> Result<Vec<Vec<u32>>> {
        let embeds = self.encode_page(page);
        self.seq2seq.generate(embeds, page.attention_mask.clone(), max_len)
    }
}

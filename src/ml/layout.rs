// ============================================================
// Layer 5 — Layout Encoder
// ============================================================
// A LayoutLMv3-style multimodal encoder. Each text token's
// embedding sums its word, 1D position and 2D box embeddings:
//
//   word(id) + pos(i)
//     + x(x0) + y(y0) + x(x1) + y(y1) + w(x1 - x0) + h(y1 - y0)
//     → LayerNorm → Dropout
//
// The page image is cut into patch_size² patches by a strided
// convolution, each patch becoming one visual token:
//
//   [B, 3, H, W] → Conv2d → [B, hidden, H/p, W/p] → [B, n, hidden]
//     + patch_pos(j) → LayerNorm
//
// Text and visual tokens are concatenated and run through the
// transformer stack together, so text tokens attend to the page.
// Only text keys carry padding; visual tokens are always real.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
    },
    prelude::*,
};

use crate::ml::blocks::{BlockConfig, EncoderBlock};

#[derive(Config, Debug)]
pub struct LayoutEncoderConfig {
    pub vocab_size:      usize,
    #[config(default = 768)]
    pub hidden_size:     usize,
    #[config(default = 12)]
    pub num_layers:      usize,
    #[config(default = 12)]
    pub num_heads:       usize,
    #[config(default = 3072)]
    pub d_ff:            usize,
    /// Longest text sequence, including <s> and </s>
    #[config(default = 514)]
    pub max_position:    usize,
    /// Size of the 2D coordinate tables; boxes live in 0..=1000
    #[config(default = 1024)]
    pub max_2d_position: usize,
    #[config(default = 224)]
    pub image_size:      usize,
    #[config(default = 16)]
    pub patch_size:      usize,
    #[config(default = 0.1)]
    pub dropout:         f64,
}

impl LayoutEncoderConfig {
    pub fn num_patches(&self) -> usize {
        let side = self.image_size / self.patch_size;
        side * side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> LayoutEncoder<B> {
        let h = self.hidden_size;
        let table = |n: usize| EmbeddingConfig::new(n, h).init(device);

        let block = BlockConfig::new(h, self.num_heads, self.d_ff).with_dropout(self.dropout);
        let layers = (0..self.num_layers).map(|_| block.init_encoder(device)).collect();

        LayoutEncoder {
            word_embedding:     table(self.vocab_size),
            position_embedding: table(self.max_position),
            x_embedding:        table(self.max_2d_position),
            y_embedding:        table(self.max_2d_position),
            w_embedding:        table(self.max_2d_position),
            h_embedding:        table(self.max_2d_position),
            text_norm:          LayerNormConfig::new(h).init(device),
            patch_embed:        Conv2dConfig::new([3, h], [self.patch_size, self.patch_size])
                .with_stride([self.patch_size, self.patch_size])
                .init(device),
            patch_position:     table(self.num_patches()),
            visual_norm:        LayerNormConfig::new(h).init(device),
            layers,
            dropout:            DropoutConfig::new(self.dropout).init(),
            max_2d_position:    self.max_2d_position,
        }
    }
}

#[derive(Module, Debug)]
pub struct LayoutEncoder<B: Backend> {
    pub word_embedding:     Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub x_embedding:        Embedding<B>,
    pub y_embedding:        Embedding<B>,
    pub w_embedding:        Embedding<B>,
    pub h_embedding:        Embedding<B>,
    pub text_norm:          LayerNorm<B>,
    pub patch_embed:        Conv2d<B>,
    pub patch_position:     Embedding<B>,
    pub visual_norm:        LayerNorm<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub dropout:            Dropout,
    pub max_2d_position:    usize,
}

impl<B: Backend> LayoutEncoder<B> {
    /// input_ids, attention_mask: [B, S]   bbox: [B, S, 4]
    fn text_embeddings(
        &self,
        input_ids: Tensor<B, 2, Int>,
        bbox:      Tensor<B, 3, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();
        let max = (self.max_2d_position - 1) as i64;

        let coord = |i: usize| {
            bbox.clone()
                .slice([0..batch_size, 0..seq_len, i..i + 1])
                .reshape([batch_size, seq_len])
                .clamp(0, max)
        };
        let (x0, y0, x1, y1) = (coord(0), coord(1), coord(2), coord(3));
        let width = (x1.clone() - x0.clone()).clamp(0, max);
        let height = (y1.clone() - y0.clone()).clamp(0, max);

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let emb = self.word_embedding.forward(input_ids)
            + self.position_embedding.forward(positions)
            + self.x_embedding.forward(x0)
            + self.y_embedding.forward(y0)
            + self.x_embedding.forward(x1)
            + self.y_embedding.forward(y1)
            + self.w_embedding.forward(width)
            + self.h_embedding.forward(height);

        self.dropout.forward(self.text_norm.forward(emb))
    }

    /// pixel_values: [B, 3, H, W] → [B, num_patches, hidden]
    fn visual_embeddings(&self, pixel_values: Tensor<B, 4>) -> Tensor<B, 3> {
        let patches = self.patch_embed.forward(pixel_values);
        let [batch_size, hidden, gh, gw] = patches.dims();
        let num_patches = gh * gw;

        let patches = patches
            .reshape([batch_size, hidden, num_patches])
            .swap_dims(1, 2);

        let positions = Tensor::<B, 1, Int>::arange(0..num_patches as i64, &patches.device())
            .unsqueeze::<2>()
            .expand([batch_size, num_patches]);

        self.visual_norm.forward(patches + self.patch_position.forward(positions))
    }

    /// Returns the last hidden state over `[text ; visual]` tokens:
    /// `[B, S + num_patches, hidden]`.
    pub fn forward(
        &self,
        pixel_values:   Tensor<B, 4>,
        input_ids:      Tensor<B, 2, Int>,
        bbox:           Tensor<B, 3, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let text = self.text_embeddings(input_ids, bbox);
        let visual = self.visual_embeddings(pixel_values);
        let [batch_size, num_patches, _] = visual.dims();

        let visual_mask = Tensor::<B, 2, Int>::ones([batch_size, num_patches], &text.device());
        let mask_pad = Tensor::cat(vec![attention_mask, visual_mask], 1).equal_elem(0);

        let mut x = Tensor::cat(vec![text, visual], 1);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }
        x
    }
}

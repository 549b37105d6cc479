use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct BlockConfig {
    pub d_model:   usize,
    pub num_heads: usize,
    pub d_ff:      usize,
    #[config(default = 0.1)]
    pub dropout:   f64,
}

impl BlockConfig {
    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn feed_forward<B: Backend>(&self, device: &B::Device) -> FeedForward<B> {
        FeedForward {
            linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
        }
    }

    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn: self.attention(device),
            ffn:       self.feed_forward(device),
            norm1:     LayerNormConfig::new(self.d_model).init(device),
            norm2:     LayerNormConfig::new(self.d_model).init(device),
            dropout:   DropoutConfig::new(self.dropout).init(),
        }
    }

    pub fn init_decoder<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            self_attn:  self.attention(device),
            cross_attn: self.attention(device),
            ffn:        self.feed_forward(device),
            norm1:      LayerNormConfig::new(self.d_model).init(device),
            norm2:      LayerNormConfig::new(self.d_model).init(device),
            norm3:      LayerNormConfig::new(self.d_model).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    pub linear1: Linear<B>,
    pub linear2: Linear<B>,
}

impl<B: Backend> FeedForward<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.linear2.forward(gelu(self.linear1.forward(x)))
    }
}

// ─── Encoder block ────────────────────────────────────────────────────────────
/// Post-norm self-attention block. `mask_pad` is `true` on padded keys.
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn: MultiHeadAttention<B>,
    pub ffn:       FeedForward<B>,
    pub norm1:     LayerNorm<B>,
    pub norm2:     LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(mask_pad))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));
        let ffn_out = self.ffn.forward(x.clone());
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

// ─── Decoder block ────────────────────────────────────────────────────────────
/// Causal self-attention, then cross-attention over the encoder memory.
#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    pub self_attn:  MultiHeadAttention<B>,
    pub cross_attn: MultiHeadAttention<B>,
    pub ffn:        FeedForward<B>,
    pub norm1:      LayerNorm<B>,
    pub norm2:      LayerNorm<B>,
    pub norm3:      LayerNorm<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> DecoderBlock<B> {
    /// x: [batch, tgt_len, d]   memory: [batch, src_len, d]
    /// causal_mask: [batch, tgt_len, tgt_len]   memory_pad: [batch, src_len]
    pub fn forward(
        &self,
        x:           Tensor<B, 3>,
        memory:      Tensor<B, 3>,
        causal_mask: Tensor<B, 3, Bool>,
        memory_pad:  Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_attn(causal_mask))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));

        let cross = self
            .cross_attn
            .forward(MhaInput::new(x.clone(), memory.clone(), memory).mask_pad(memory_pad))
            .context;
        let x = self.norm2.forward(x + self.dropout.forward(cross));

        let ffn_out = self.ffn.forward(x.clone());
        self.norm3.forward(x + self.dropout.forward(ffn_out))
    }
}

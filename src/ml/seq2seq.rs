// ============================================================
// Layer 5 — Seq2Seq Model
// ============================================================
// An encoder/decoder transformer that reads projected layout
// features and writes the document in reading order.
//
// Encoder input is not token ids but `inputs_embeds` coming out
// of the projection bridge, masked with the page attention mask.
//
// Teacher forcing (training):
//
//   labels          :  w1  w2  w3  </s>
//   decoder input   : <pad> w1  w2  w3     ← shifted right,
//                                            start token = pad
//
// Greedy generation (inference) starts from the same start token
// and appends the argmax token until every row has produced </s>
// or the length limit is reached.

use anyhow::Result;
use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::ml::blocks::{BlockConfig, DecoderBlock, EncoderBlock};

#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub vocab_size:           usize,
    #[config(default = 512)]
    pub d_model:              usize,
    #[config(default = 8)]
    pub num_heads:            usize,
    #[config(default = 6)]
    pub num_layers:           usize,
    #[config(default = 2048)]
    pub d_ff:                 usize,
    #[config(default = 512)]
    pub max_target_positions: usize,
    #[config(default = 0.1)]
    pub dropout:              f64,
    #[config(default = 0)]
    pub pad_token_id:         usize,
    #[config(default = 1)]
    pub eos_token_id:         usize,
}

impl Seq2SeqConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        let block = BlockConfig::new(self.d_model, self.num_heads, self.d_ff)
            .with_dropout(self.dropout);

        Seq2SeqModel {
            encoder_layers:     (0..self.num_layers).map(|_| block.init_encoder(device)).collect(),
            encoder_norm:       LayerNormConfig::new(self.d_model).init(device),
            token_embedding:    EmbeddingConfig::new(self.vocab_size, self.d_model).init(device),
            position_embedding: EmbeddingConfig::new(self.max_target_positions, self.d_model)
                .init(device),
            decoder_layers:     (0..self.num_layers).map(|_| block.init_decoder(device)).collect(),
            decoder_norm:       LayerNormConfig::new(self.d_model).init(device),
            lm_head:            LinearConfig::new(self.d_model, self.vocab_size).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
            vocab_size:         self.vocab_size,
            max_target_positions: self.max_target_positions,
            pad_token_id:       self.pad_token_id,
            eos_token_id:       self.eos_token_id,
        }
    }
}

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub encoder_layers:       Vec<EncoderBlock<B>>,
    pub encoder_norm:         LayerNorm<B>,
    pub token_embedding:      Embedding<B>,
    pub position_embedding:   Embedding<B>,
    pub decoder_layers:       Vec<DecoderBlock<B>>,
    pub decoder_norm:         LayerNorm<B>,
    pub lm_head:              Linear<B>,
    pub dropout:              Dropout,
    pub vocab_size:           usize,
    pub max_target_positions: usize,
    pub pad_token_id:         usize,
    pub eos_token_id:         usize,
}

impl<B: Backend> Seq2SeqModel<B> {
    /// inputs_embeds: [B, S, d]   attention_mask: [B, S] (1 = real)
    pub fn encode(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let mask_pad = attention_mask.equal_elem(0);
        let mut x = self.dropout.forward(inputs_embeds);
        for layer in &self.encoder_layers {
            x = layer.forward(x, mask_pad.clone());
        }
        self.encoder_norm.forward(x)
    }

    /// decoder_input_ids: [B, T] → logits [B, T, vocab]
    pub fn decode(
        &self,
        decoder_input_ids: Tensor<B, 2, Int>,
        memory:            Tensor<B, 3>,
        memory_pad:        Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = decoder_input_ids.dims();
        let device = decoder_input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..tgt_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, tgt_len]);
        let causal = generate_autoregressive_mask::<B>(batch_size, tgt_len, &device);

        let mut x = self.dropout.forward(
            self.token_embedding.forward(decoder_input_ids)
                + self.position_embedding.forward(positions),
        );
        for layer in &self.decoder_layers {
            x = layer.forward(x, memory.clone(), causal.clone(), memory_pad.clone());
        }
        self.lm_head.forward(self.decoder_norm.forward(x))
    }

    /// Prepend the start token and drop the last label.
    pub fn shift_right(&self, labels: Tensor<B, 2, Int>) -> Tensor<B, 2, Int> {
        let [batch_size, tgt_len] = labels.dims();
        let start = Tensor::<B, 2, Int>::full(
            [batch_size, 1],
            self.pad_token_id as i64,
            &labels.device(),
        );
        if tgt_len <= 1 {
            return start;
        }
        let body = labels.slice([0..batch_size, 0..tgt_len - 1]);
        Tensor::cat(vec![start, body], 1)
    }

    /// Teacher-forced cross-entropy averaged over the non-pad label
    /// positions only, so trailing padding never dilutes the loss.
    pub fn forward_loss(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        let [batch_size, tgt_len] = labels.dims();
        let memory_pad = attention_mask.clone().equal_elem(0);
        let memory = self.encode(inputs_embeds, attention_mask);

        let decoder_input = self.shift_right(labels.clone());
        let logits = self.decode(decoder_input, memory, memory_pad);

        let n = batch_size * tgt_len;
        let log_probs = log_softmax(logits.reshape([n, self.vocab_size]), 1);
        let targets = labels.reshape([n]);
        let keep = targets.clone().not_equal_elem(self.pad_token_id as i64).float();

        let picked = log_probs.gather(1, targets.unsqueeze_dim(1)).reshape([n]);
        let real = keep.clone().sum().clamp_min(1.0);
        (picked * keep).sum().neg() / real
    }

    /// Greedy decoding. Each returned row holds at most `max_len`
    /// tokens and excludes the start token and everything from </s> on.
    pub fn generate(
        &self,
        inputs_embeds:  Tensor<B, 3>,
        attention_mask: Tensor<B, 2, Int>,
        max_len:        usize,
    ) -> Result<Vec<Vec<u32>>> {
        let [batch_size, _, _] = inputs_embeds.dims();
        let device = inputs_embeds.device();
        let steps = max_len.min(self.max_target_positions);

        let memory_pad = attention_mask.clone().equal_elem(0);
        let memory = self.encode(inputs_embeds, attention_mask);

        let mut tokens = Tensor::<B, 2, Int>::full([batch_size, 1], self.pad_token_id as i64, &device);
        let mut finished = vec![false; batch_size];
        let mut output: Vec<Vec<u32>> = vec![Vec::new(); batch_size];

        for _ in 0..steps {
            let cur_len = tokens.dims()[1];
            let logits = self.decode(tokens.clone(), memory.clone(), memory_pad.clone());
            let last = logits
                .slice([0..batch_size, cur_len - 1..cur_len, 0..self.vocab_size])
                .reshape([batch_size, self.vocab_size]);
            let next = last.argmax(1); // [B, 1]

            let ids = next
                .clone()
                .into_data()
                .convert::<i64>()
                .to_vec::<i64>()
                .map_err(|e| anyhow::anyhow!("Cannot read generated ids: {e:?}"))?;

            for (row, &id) in ids.iter().enumerate() {
                if finished[row] {
                    continue;
                }
                if id as usize == self.eos_token_id {
                    finished[row] = true;
                } else {
                    output[row].push(id as u32);
                }
            }

            if finished.iter().all(|&f| f) {
                break;
            }
            tokens = Tensor::cat(vec![tokens, next], 1);
        }

        Ok(output)
    }
}

// ============================================================
// Layer 5 — Projection Bridge
// ============================================================
// Maps layout-encoder hidden states into the seq2seq model's
// embedding space:
//
//   [batch, seq, layout_hidden]
//        │ Linear
//        ▼
//   [batch, seq, d_model] → LayerNorm → GELU
//
// The seq2seq encoder consumes the result as `inputs_embeds`.

use burn::{
    nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::gelu,
};

#[derive(Config, Debug)]
pub struct ProjectionConfig {
    pub input_dim:  usize,
    pub output_dim: usize,
}

impl ProjectionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Projection<B> {
        Projection {
            linear: LinearConfig::new(self.input_dim, self.output_dim).init(device),
            norm:   LayerNormConfig::new(self.output_dim).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    pub linear: Linear<B>,
    pub norm:   LayerNorm<B>,
}

impl<B: Backend> Projection<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        gelu(self.norm.forward(self.linear.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn output_matches_target_hidden_size() {
        let device = Default::default();
        let proj = ProjectionConfig::new(12, 20).init::<NdArray>(&device);
        let x = Tensor::<NdArray, 3>::random(
            [3, 7, 12],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        assert_eq!(proj.forward(x).dims(), [3, 7, 20]);
    }

    #[test]
    fn gelu_floor_holds() {
        // GELU never goes below about -0.17
        let device = Default::default();
        let proj = ProjectionConfig::new(4, 6).init::<NdArray>(&device);
        let x = Tensor::<NdArray, 3>::random(
            [2, 5, 4],
            burn::tensor::Distribution::Normal(0.0, 3.0),
            &device,
        );
        let min: f32 = proj.forward(x).min().into_scalar().elem();
        assert!(min > -0.2);
    }
}

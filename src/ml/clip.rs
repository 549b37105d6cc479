// ============================================================
// Layer 5 — Global Gradient-Norm Clipping
// ============================================================
// Burn's `GradientClippingConfig::Norm` clips every parameter on
// its own. Training here clips the whole model as one vector:
//
//   total = sqrt( Σ_p ‖g_p‖² )
//   coef  = max_norm / (total + 1e-6)
//   if coef < 1:  g_p ← g_p · coef   for every p
//
// Two visitors walk the model's parameters: the first sums the
// squared gradient norms, the second rescales in place.

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

const EPS: f64 = 1e-6;

/// Clip `grads` so the global L2 norm of all parameter gradients of
/// `model` is at most `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut norm = GradNorm { grads: &*grads, sum_sq: 0.0 };
    model.visit(&mut norm);
    let total = norm.sum_sq.sqrt();

    let coef = max_norm / (total + EPS);
    if coef < 1.0 {
        model.visit(&mut GradScale { grads, coef });
    }
    total
}

struct GradNorm<'a> {
    grads:  &'a GradientsParams,
    sum_sq: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradNorm<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct GradScale<'a> {
    grads: &'a mut GradientsParams,
    coef:  f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradScale<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.coef));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        nn::{Linear, LinearConfig},
    };

    type B = Autodiff<NdArray>;
    type Inner = NdArray;

    /// A 2→1 linear layer whose weight gradient is [3, 0] and bias gradient [4].
    fn layer_with_grads() -> (Linear<B>, GradientsParams) {
        let device = Default::default();
        let layer = LinearConfig::new(2, 1).init::<B>(&device);
        let bias_id = layer.bias.as_ref().map(|b| b.id).unwrap();

        let mut grads = GradientsParams::new();
        grads.register::<Inner, 2>(
            layer.weight.id,
            Tensor::<Inner, 1>::from_floats([3.0, 0.0], &device).reshape([2, 1]),
        );
        grads.register::<Inner, 1>(bias_id, Tensor::<Inner, 1>::from_floats([4.0], &device));
        (layer, grads)
    }

    fn values<const D: usize>(t: Tensor<Inner, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn scales_all_parameters_by_the_same_factor() {
        let (layer, mut grads) = layer_with_grads();
        let bias_id = layer.bias.as_ref().map(|b| b.id).unwrap();

        let total = clip_grad_norm::<B, _>(&layer, &mut grads, 1.0);
        assert!((total - 5.0).abs() < 1e-5);

        // Per-parameter clipping would give [1, 0] and [1]
        let weight = values(grads.get::<Inner, 2>(layer.weight.id).unwrap());
        let bias = values(grads.get::<Inner, 1>(bias_id).unwrap());
        assert!((weight[0] - 0.6).abs() < 1e-4 && weight[1].abs() < 1e-6);
        assert!((bias[0] - 0.8).abs() < 1e-4);
    }

    #[test]
    fn small_gradients_are_left_alone() {
        let (layer, mut grads) = layer_with_grads();
        let bias_id = layer.bias.as_ref().map(|b| b.id).unwrap();

        let total = clip_grad_norm::<B, _>(&layer, &mut grads, 10.0);
        assert!((total - 5.0).abs() < 1e-5);
        assert_eq!(values(grads.get::<Inner, 2>(layer.weight.id).unwrap()), vec![3.0, 0.0]);
        assert_eq!(values(grads.get::<Inner, 1>(bias_id).unwrap()), vec![4.0]);
    }
}

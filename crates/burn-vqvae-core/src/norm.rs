//! Batch normalization defaults
//!
//! Running statistics decay slowly (0.99 retained per step) and the variance
//! floor is `1e-3`. burn's `BatchNorm` picks batch statistics on autodiff
//! backends and running statistics otherwise, so train/eval behaviour follows
//! the backend the module lives on.

use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;

/// Weight of the current batch in the running mean/variance update
pub const BATCH_NORM_MOMENTUM: f64 = 0.01;
/// Added to the variance before the square root
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Creates a batch normalization layer over `channels` feature maps
pub fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(channels)
        .with_momentum(BATCH_NORM_MOMENTUM)
        .with_epsilon(BATCH_NORM_EPSILON)
        .init(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_inference_uses_running_stats() {
        let device = Default::default();
        let norm = batch_norm::<TestBackend>(4, &device);

        // Fresh running stats are mean 0 / var 1, so inference is ~identity
        let x = Tensor::<TestBackend, 4>::ones([2, 4, 3, 3], &device) * 2.0;
        let y = norm.forward(x.clone());

        assert_eq!(y.dims(), [2, 4, 3, 3]);
        let max_diff: f32 = (y - x / (1.0 + BATCH_NORM_EPSILON).sqrt())
            .abs()
            .max()
            .into_scalar()
            .elem();
        assert!(max_diff < 1e-5, "max diff {}", max_diff);
    }
}

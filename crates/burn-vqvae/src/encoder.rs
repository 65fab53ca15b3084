//! VQ-VAE Encoder: image -> latent grid
//!
//! Two strided 4×4 convolutions (4× spatial downsample) followed by residual
//! refinement.

use burn::module::Ignored;
use burn::nn::BatchNorm;
use burn::prelude::*;

use burn_vqvae_core::activation::leaky_relu;
use burn_vqvae_core::norm::batch_norm;
use burn_vqvae_core::{
    ResidualBlock, ResidualBlockConfig, SameConv2d, SameConv2dConfig, VqVaeError,
};

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Input image channels (3 for RGB)
    pub in_channels: usize,
    /// Channels of the output latent grid (the codebook embedding size)
    pub latent_dim: usize,
    /// Number of residual blocks after downsampling
    pub num_resblocks: usize,
    /// Batch normalization inside and after each residual block
    pub batchnorm: bool,
    pub name: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            latent_dim: 64,
            num_resblocks: 2,
            batchnorm: true,
            name: "encoder".into(),
        }
    }
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>, VqVaeError> {
        let down = |in_channels: usize| {
            SameConv2dConfig::new([in_channels, self.latent_dim], 4)
                .with_stride(2)
                .with_bias(false)
                .init::<B>(device)
        };

        let conv1 = down(self.in_channels)?;
        let norm1 = batch_norm(self.latent_dim, device);
        let conv2 = down(self.latent_dim)?;
        let norm2 = batch_norm(self.latent_dim, device);

        let res_blocks = (0..self.num_resblocks)
            .map(|_| EncoderBlock::new(self.latent_dim, self.batchnorm, device))
            .collect();

        Ok(Encoder {
            conv1,
            norm1,
            conv2,
            norm2,
            res_blocks,
            latent_dim: self.latent_dim,
            name: Ignored(self.name.clone()),
        })
    }
}

/// VQ-VAE Encoder
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub conv1: SameConv2d<B>,
    pub norm1: BatchNorm<B>,
    pub conv2: SameConv2d<B>,
    pub norm2: BatchNorm<B>,
    pub res_blocks: Vec<EncoderBlock<B>>,
    pub latent_dim: usize,
    pub name: Ignored<String>,
}

impl<B: Backend> Encoder<B> {
    pub fn name(&self) -> &str {
        &self.name.0
    }

    /// Latent grid shape `[latent_dim, h, w]` for an `[height, width]` image
    ///
    /// Resolved from the convolution arithmetic, so it is available before
    /// any tensor has gone through the encoder.
    pub fn output_shape(&self, image_shape: [usize; 2]) -> [usize; 3] {
        let [h, w] = self.conv2.output_size(self.conv1.output_size(image_shape));
        [self.latent_dim, h, w]
    }

    /// Input: `[batch, in_channels, H, W]`
    /// Output: `[batch, latent_dim, ceil(H/4), ceil(W/4)]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm1.forward(leaky_relu(self.conv1.forward(x)));
        let mut x = self.norm2.forward(leaky_relu(self.conv2.forward(x)));

        for block in &self.res_blocks {
            x = block.forward(x);
        }
        x
    }
}

/// Residual block followed by an optional batch normalization
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub res_block: ResidualBlock<B>,
    pub norm: Option<BatchNorm<B>>,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn new(channels: usize, batchnorm: bool, device: &B::Device) -> Self {
        Self {
            res_block: ResidualBlockConfig::new(channels)
                .with_batchnorm(batchnorm)
                .init::<B>(device),
            norm: batchnorm.then(|| batch_norm(channels, device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.res_block.forward(x);
        match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_encoder_config() {
        let config = EncoderConfig::default();
        assert_eq!(config.in_channels, 3);
        assert_eq!(config.latent_dim, 64);
        assert!(config.batchnorm);
    }

    #[test]
    fn test_output_shape_matches_forward() {
        let device = Default::default();
        let encoder = EncoderConfig {
            latent_dim: 16,
            ..Default::default()
        }
        .init::<TestBackend>(&device)
        .unwrap();

        assert_eq!(encoder.output_shape([32, 24]), [16, 8, 6]);

        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 24], &device);
        assert_eq!(encoder.forward(x).dims(), [2, 16, 8, 6]);
    }

    #[test]
    fn test_output_shape_rounds_up_odd_sizes() {
        let device = Default::default();
        let encoder = EncoderConfig {
            latent_dim: 8,
            num_resblocks: 1,
            ..Default::default()
        }
        .init::<TestBackend>(&device)
        .unwrap();

        for (size, expected) in [([30, 30], [8, 8, 8]), ([17, 22], [8, 5, 6])] {
            assert_eq!(encoder.output_shape(size), expected);

            let x = Tensor::<TestBackend, 4>::zeros([1, 3, size[0], size[1]], &device);
            let [_, c, h, w] = encoder.forward(x).dims();
            assert_eq!([c, h, w], expected);
        }
    }

    #[test]
    fn test_batchnorm_toggle() {
        let device = Default::default();
        let with = EncoderConfig {
            latent_dim: 8,
            num_resblocks: 3,
            ..Default::default()
        }
        .init::<TestBackend>(&device)
        .unwrap();
        assert_eq!(with.res_blocks.len(), 3);
        assert!(
            with.res_blocks
                .iter()
                .all(|b| b.norm.is_some() && b.res_block.norm.is_some())
        );

        let without = EncoderConfig {
            latent_dim: 8,
            batchnorm: false,
            ..Default::default()
        }
        .init::<TestBackend>(&device)
        .unwrap();
        assert!(
            without
                .res_blocks
                .iter()
                .all(|b| b.norm.is_none() && b.res_block.norm.is_none())
        );
    }
}

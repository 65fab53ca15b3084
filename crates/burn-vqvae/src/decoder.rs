//! VQ-VAE Decoder: quantized latent grid -> image
//!
//! Mirrors the encoder: residual refinement, then two strided 4×4 transposed
//! convolutions (4× spatial upsample) and a final projection to image
//! channels squashed by `tanh`.
//!
//! The residual blocks here never normalize, even when the encoder's do.

use burn::module::Ignored;
use burn::nn::BatchNorm;
use burn::prelude::*;
use burn::tensor::activation::tanh;

use burn_vqvae_core::activation::leaky_relu;
use burn_vqvae_core::norm::batch_norm;
use burn_vqvae_core::{
    ResidualBlock, ResidualBlockConfig, SameConv2d, SameConv2dConfig, SameConvTranspose2d,
    SameConvTranspose2dConfig, VqVaeError, check_shape,
};

/// Decoder configuration
///
/// Built from the latent grid shape the encoder produces, see
/// [`crate::Encoder::output_shape`].
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// `[latent_dim, height, width]` of the latent grid
    pub input_shape: [usize; 3],
    /// Output image channels (3 for RGB)
    pub out_channels: usize,
    pub num_resblocks: usize,
    pub name: String,
}

impl DecoderConfig {
    pub fn new(input_shape: [usize; 3]) -> Self {
        Self {
            input_shape,
            out_channels: 3,
            num_resblocks: 2,
            name: "decoder".into(),
        }
    }

    pub fn with_out_channels(mut self, out_channels: usize) -> Self {
        self.out_channels = out_channels;
        self
    }

    pub fn with_num_resblocks(mut self, num_resblocks: usize) -> Self {
        self.num_resblocks = num_resblocks;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Decoder<B>, VqVaeError> {
        let [latent_dim, height, width] = self.input_shape;
        if latent_dim == 0 || height == 0 || width == 0 {
            return Err(VqVaeError::invalid_config(format!(
                "decoder input shape must be non-empty, got {:?}",
                self.input_shape
            )));
        }

        let conv_in = SameConv2dConfig::new([latent_dim, latent_dim], 4)
            .with_bias(false)
            .init::<B>(device)?;

        let res_blocks = (0..self.num_resblocks)
            .map(|_| ResidualBlockConfig::new(latent_dim).init::<B>(device))
            .collect();

        let up = |out_channels: usize, stride: usize| {
            SameConvTranspose2dConfig::new([latent_dim, out_channels], 4)
                .with_stride(stride)
                .with_bias(false)
                .init::<B>(device)
        };

        Ok(Decoder {
            conv_in,
            res_blocks,
            up1: up(latent_dim, 2)?,
            norm1: batch_norm(latent_dim, device),
            up2: up(latent_dim, 2)?,
            norm2: batch_norm(latent_dim, device),
            conv_out: up(self.out_channels, 1)?,
            latent_dim,
            latent_height: height,
            latent_width: width,
            name: Ignored(self.name.clone()),
        })
    }
}

/// VQ-VAE Decoder
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub conv_in: SameConv2d<B>,
    pub res_blocks: Vec<ResidualBlock<B>>,
    pub up1: SameConvTranspose2d<B>,
    pub norm1: BatchNorm<B>,
    pub up2: SameConvTranspose2d<B>,
    pub norm2: BatchNorm<B>,
    pub conv_out: SameConvTranspose2d<B>,
    pub latent_dim: usize,
    pub latent_height: usize,
    pub latent_width: usize,
    pub name: Ignored<String>,
}

impl<B: Backend> Decoder<B> {
    pub fn name(&self) -> &str {
        &self.name.0
    }

    /// `[latent_dim, height, width]` this decoder was built for
    pub fn input_shape(&self) -> [usize; 3] {
        [self.latent_dim, self.latent_height, self.latent_width]
    }

    /// `[out_channels, 4 * height, 4 * width]`
    pub fn output_shape(&self) -> [usize; 3] {
        let size = [self.latent_height, self.latent_width];
        let [h, w] = self
            .conv_out
            .output_size(self.up2.output_size(self.up1.output_size(size)));
        let [_, out_channels, _, _] = self.conv_out.conv.weight.dims();
        [out_channels, h, w]
    }

    /// Input: `[batch, latent_dim, h, w]`
    /// Output: `[batch, out_channels, 4h, 4w]` (values in [-1, 1])
    pub fn forward(&self, z: Tensor<B, 4>) -> Result<Tensor<B, 4>, VqVaeError> {
        let [latent_dim, height, width] = self.input_shape();
        check_shape(
            "decoder input",
            &[0, latent_dim, height, width],
            &z.dims(),
        )?;

        let mut x = self.conv_in.forward(z);
        for block in &self.res_blocks {
            x = block.forward(x);
        }

        let x = self.norm1.forward(leaky_relu(self.up1.forward(x)));
        let x = self.norm2.forward(leaky_relu(self.up2.forward(x)));

        Ok(tanh(self.conv_out.forward(x)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_decoder_config() {
        let config = DecoderConfig::new([64, 16, 16]);
        assert_eq!(config.out_channels, 3);
        assert_eq!(config.num_resblocks, 2);
        assert_eq!(config.name, "decoder");
    }

    #[test]
    fn test_upsamples_4x() {
        let device = Default::default();
        let decoder = DecoderConfig::new([8, 5, 7])
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(decoder.output_shape(), [3, 20, 28]);

        let z = Tensor::<TestBackend, 4>::random([2, 8, 5, 7], Distribution::Normal(0.0, 1.0), &device);
        let out = decoder.forward(z).unwrap();
        assert_eq!(out.dims(), [2, 3, 20, 28]);

        let max: f32 = out.abs().max().into_scalar().elem();
        assert!(max <= 1.0);
    }

    #[test]
    fn test_residual_blocks_unnormalized() {
        let device = Default::default();
        let decoder = DecoderConfig::new([8, 4, 4])
            .with_num_resblocks(3)
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(decoder.res_blocks.len(), 3);
        assert!(decoder.res_blocks.iter().all(|b| b.norm.is_none()));
    }

    #[test]
    fn test_rejects_other_shapes() {
        let device = Default::default();
        let decoder = DecoderConfig::new([8, 4, 4])
            .init::<TestBackend>(&device)
            .unwrap();

        let z = Tensor::<TestBackend, 4>::zeros([1, 8, 5, 4], &device);
        assert!(matches!(
            decoder.forward(z),
            Err(VqVaeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_shape_rejected() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let result = DecoderConfig::new([0, 4, 4]).init::<TestBackend>(&device);
        assert!(matches!(result, Err(VqVaeError::InvalidConfig(_))));
    }
}

//! VQ-VAE model assembly
//!
//! ```text
//! image [B, C, H, W]
//!     │
//!     ▼ Encoder (2× strided conv + residual blocks)
//! latent grid [B, D, H/4, W/4]
//!     │
//!     ▼ VectorQuantizer (nearest code, straight-through)
//! quantized grid [B, D, H/4, W/4]  + codebook / commitment losses
//!     │
//!     ▼ Decoder (residual blocks + 2× strided transposed conv + tanh)
//! reconstruction [B, C, H, W]
//! ```
//!
//! Construction is two-phase: the encoder is built and its output shape
//! resolved first, then the decoder is built for exactly that shape.

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_vqvae_core::{VqVaeError, check_shape};
use burn_vqvae_quantizer::{CodebookUpdate, VectorQuantizer, VectorQuantizerConfig};

use crate::decoder::{Decoder, DecoderConfig};
use crate::encoder::{Encoder, EncoderConfig};

/// Spatial downsampling factor between image and latent grid
pub const DOWNSAMPLE_FACTOR: usize = 4;

/// VQ-VAE configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VqVaeConfig {
    /// Codebook embedding size and latent grid channels
    pub latent_dim: usize,
    /// Number of codebook entries
    pub num_embeddings: usize,
    /// `[height, width]` of input images, both multiples of 4
    pub image_shape: [usize; 2],
    /// Image channels (3 for RGB)
    pub num_channels: usize,
    /// Residual blocks in both encoder and decoder
    pub num_resblocks: usize,
    /// Batch normalization around the encoder's residual blocks
    pub batchnorm: bool,
    /// EMA codebook updates instead of gradient-trained codebook
    pub ema: bool,
    /// Weight of the commitment loss
    pub commitment_cost: f64,
    /// EMA decay (ignored without `ema`)
    pub decay: f64,
    /// EMA Laplace smoothing constant (ignored without `ema`)
    pub epsilon: f64,
    pub name: String,
}

impl Default for VqVaeConfig {
    fn default() -> Self {
        Self {
            latent_dim: 64,
            num_embeddings: 512,
            image_shape: [64, 64],
            num_channels: 3,
            num_resblocks: 2,
            batchnorm: true,
            ema: true,
            commitment_cost: 0.25,
            decay: 0.99,
            epsilon: 1e-5,
            name: "vq_vae".into(),
        }
    }
}

impl VqVaeConfig {
    pub fn new(latent_dim: usize, num_embeddings: usize, image_shape: [usize; 2]) -> Self {
        Self {
            latent_dim,
            num_embeddings,
            image_shape,
            ..Default::default()
        }
    }

    pub fn with_num_channels(mut self, num_channels: usize) -> Self {
        self.num_channels = num_channels;
        self
    }

    pub fn with_num_resblocks(mut self, num_resblocks: usize) -> Self {
        self.num_resblocks = num_resblocks;
        self
    }

    pub fn with_batchnorm(mut self, batchnorm: bool) -> Self {
        self.batchnorm = batchnorm;
        self
    }

    pub fn with_ema(mut self, ema: bool) -> Self {
        self.ema = ema;
        self
    }

    pub fn with_commitment_cost(mut self, commitment_cost: f64) -> Self {
        self.commitment_cost = commitment_cost;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Latent grid shape `[latent_dim, H/4, W/4]`
    pub fn latent_shape(&self) -> [usize; 3] {
        let [height, width] = self.image_shape;
        [
            self.latent_dim,
            height / DOWNSAMPLE_FACTOR,
            width / DOWNSAMPLE_FACTOR,
        ]
    }

    pub fn validate(&self) -> Result<(), VqVaeError> {
        if self.latent_dim == 0 {
            return Err(VqVaeError::invalid_config("latent_dim must be positive"));
        }
        if self.num_channels == 0 {
            return Err(VqVaeError::invalid_config("num_channels must be positive"));
        }
        let [height, width] = self.image_shape;
        if height == 0
            || width == 0
            || height % DOWNSAMPLE_FACTOR != 0
            || width % DOWNSAMPLE_FACTOR != 0
        {
            return Err(VqVaeError::invalid_config(format!(
                "image_shape must be positive multiples of {}, got {:?}",
                DOWNSAMPLE_FACTOR, self.image_shape
            )));
        }
        self.quantizer_config().validate()
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            in_channels: self.num_channels,
            latent_dim: self.latent_dim,
            num_resblocks: self.num_resblocks,
            batchnorm: self.batchnorm,
            name: "encoder".into(),
        }
    }

    pub fn quantizer_config(&self) -> VectorQuantizerConfig {
        let update = if self.ema {
            CodebookUpdate::Ema {
                decay: self.decay,
                epsilon: self.epsilon,
            }
        } else {
            CodebookUpdate::Gradient
        };

        VectorQuantizerConfig::new(self.latent_dim, self.num_embeddings)
            .with_commitment_cost(self.commitment_cost)
            .with_update(update)
            .with_name("vector_quantizer")
    }

    /// Decoder for a resolved latent grid shape
    pub fn decoder_config(&self, input_shape: [usize; 3]) -> DecoderConfig {
        DecoderConfig::new(input_shape)
            .with_out_channels(self.num_channels)
            .with_num_resblocks(self.num_resblocks)
            .with_name("decoder")
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<VqVae<B>, VqVaeError> {
        self.validate()?;

        let encoder = self.encoder_config().init::<B>(device)?;
        let latent_shape = encoder.output_shape(self.image_shape);
        let decoder = self.decoder_config(latent_shape).init::<B>(device)?;
        let quantizer = self.quantizer_config().init::<B>(device)?;

        let [c, h, w] = decoder.output_shape();
        check_shape(
            "decoder output",
            &[self.num_channels, self.image_shape[0], self.image_shape[1]],
            &[c, h, w],
        )?;

        tracing::debug!(
            model = %self.name,
            image_shape = ?self.image_shape,
            latent_shape = ?latent_shape,
            num_embeddings = self.num_embeddings,
            ema = self.ema,
            stored_values = encoder.num_params() + decoder.num_params() + quantizer.num_params(),
            "built vq-vae"
        );

        Ok(VqVae {
            encoder,
            quantizer,
            decoder,
            num_channels: self.num_channels,
            image_height: self.image_shape[0],
            image_width: self.image_shape[1],
            name: Ignored(self.name.clone()),
        })
    }
}

/// Result of a VQ-VAE forward pass
#[derive(Debug, Clone)]
pub struct VqVaeOutput<B: Backend> {
    /// Same shape as the input images, values in [-1, 1]
    pub reconstruction: Tensor<B, 4>,
    pub codebook_loss: Tensor<B, 1>,
    pub commitment_loss: Tensor<B, 1>,
    pub perplexity: Tensor<B, 1>,
    /// Code index per latent position, `[batch, H/4, W/4]`
    pub indices: Tensor<B, 3, Int>,
}

impl<B: Backend> VqVaeOutput<B> {
    /// Codebook plus commitment loss, to be added to the reconstruction loss
    pub fn quantizer_loss(&self) -> Tensor<B, 1> {
        self.codebook_loss.clone() + self.commitment_loss.clone()
    }
}

/// Image VQ-VAE
#[derive(Module, Debug)]
pub struct VqVae<B: Backend> {
    pub encoder: Encoder<B>,
    pub quantizer: VectorQuantizer<B>,
    pub decoder: Decoder<B>,
    pub num_channels: usize,
    pub image_height: usize,
    pub image_width: usize,
    pub name: Ignored<String>,
}

impl<B: Backend> VqVae<B> {
    pub fn name(&self) -> &str {
        &self.name.0
    }

    /// `[num_channels, height, width]` accepted by [`Self::forward`]
    pub fn image_shape(&self) -> [usize; 3] {
        [self.num_channels, self.image_height, self.image_width]
    }

    fn check_images(&self, images: &Tensor<B, 4>) -> Result<(), VqVaeError> {
        let [c, h, w] = self.image_shape();
        check_shape("vq-vae input images", &[0, c, h, w], &images.dims())
    }

    /// Continuous latent grid `[batch, D, H/4, W/4]` before quantization
    pub fn encode(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>, VqVaeError> {
        self.check_images(&images)?;
        Ok(self.encoder.forward(images))
    }

    /// Reconstructs `[batch, C, H, W]` images
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<VqVaeOutput<B>, VqVaeError> {
        let latents = self.encode(images)?;
        tracing::trace!(model = self.name(), latent = ?latents.dims(), "vq-vae forward");

        let quantized = self.quantizer.forward(latents)?;
        let reconstruction = self.decoder.forward(quantized.quantized)?;

        Ok(VqVaeOutput {
            reconstruction,
            codebook_loss: quantized.codebook_loss,
            commitment_loss: quantized.commitment_loss,
            perplexity: quantized.perplexity,
            indices: quantized.indices,
        })
    }

    /// Same as [`Self::forward`] for channels-last `[batch, H, W, C]` images;
    /// the reconstruction is channels-last too
    pub fn forward_channels_last(
        &self,
        images: Tensor<B, 4>,
    ) -> Result<VqVaeOutput<B>, VqVaeError> {
        let [c, h, w] = self.image_shape();
        check_shape("vq-vae input images", &[0, h, w, c], &images.dims())?;

        let mut output = self.forward(images.permute([0, 3, 1, 2]))?;
        output.reconstruction = output.reconstruction.permute([0, 2, 3, 1]);
        Ok(output)
    }

    /// Code indices `[batch, H/4, W/4]` for each image
    pub fn encode_indices(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 3, Int>, VqVaeError> {
        let latents = self.encode(images)?;
        self.quantizer.encode(latents)
    }

    /// Decodes a grid of code indices `[batch, H/4, W/4]` to images
    pub fn decode_indices(&self, indices: Tensor<B, 3, Int>) -> Result<Tensor<B, 4>, VqVaeError> {
        let latents = self.quantizer.lookup(indices)?;
        self.decoder.forward(latents)
    }
}

//! Image VQ-VAE
//!
//! Vector-Quantized Variational Autoencoder for images: a residual
//! convolutional encoder, a discrete codebook bottleneck and a transposed
//! convolutional decoder.
//!
//! # Components
//!
//! - [`Encoder`] - Downsamples images 4× to a latent grid
//! - [`VectorQuantizer`] - Snaps each latent vector to its nearest code
//! - [`Decoder`] - Upsamples a quantized grid back to an image in [-1, 1]
//! - [`VqVae`] - The three wired together, see [`VqVaeConfig::init`]
//!
//! # Example
//!
//! ```ignore
//! use burn_vqvae::VqVaeConfig;
//!
//! let model = VqVaeConfig::new(64, 512, [64, 64]).init::<Backend>(&device)?;
//!
//! // images: [batch, 3, 64, 64] in [-1, 1]
//! let out = model.forward(images)?;
//! let loss = mse(out.reconstruction, images) + out.quantizer_loss();
//! ```

pub mod decoder;
pub mod encoder;
pub mod model;

pub use burn_vqvae_core::VqVaeError;
pub use burn_vqvae_quantizer::{CodebookUpdate, VectorQuantizer, VectorQuantizerConfig};
pub use decoder::{Decoder, DecoderConfig};
pub use encoder::{Encoder, EncoderBlock, EncoderConfig};
pub use model::{VqVae, VqVaeConfig, VqVaeOutput};

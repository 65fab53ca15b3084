//! Vector Quantization for burn-vqvae
//!
//! Discrete bottleneck of the VQ-VAE: a codebook of `K` vectors of size `D`,
//! nearest-neighbour assignment, straight-through gradients and the
//! codebook/commitment losses.
//!
//! # Codebook updates
//!
//! - [`CodebookUpdate::Gradient`] - embeddings are a trainable parameter
//! - [`CodebookUpdate::Ema`] - embeddings follow exponential moving averages
//!   of their assignments; no gradient reaches them
//!
//! EMA statistics only move on autodiff backends, so a model converted with
//! `.valid()` has a frozen codebook.
//!
//! # Example
//!
//! ```ignore
//! use burn_vqvae_quantizer::{CodebookUpdate, VectorQuantizerConfig};
//!
//! let vq = VectorQuantizerConfig::new(64, 512)
//!     .with_update(CodebookUpdate::Gradient)
//!     .init::<Backend>(&device)?;
//!
//! let out = vq.forward(latents)?;
//! let loss = reconstruction_loss + out.loss();
//! ```

pub mod codebook;
pub mod quantizer;

pub use codebook::{Codebook, EmaCodebook, LearnedCodebook};
pub use quantizer::{
    CodebookUpdate, QuantizedVectors, QuantizerOutput, VectorQuantizer, VectorQuantizerConfig,
};

//! Core Building Blocks for burn-vqvae
//!
//! Layers shared by the VQ-VAE encoder, decoder and quantizer crates.
//!
//! # Modules
//!
//! - [`error`] - [`VqVaeError`] and shape checking
//! - [`residual`] - Convolutional residual block (`x + f(x)`)
//! - [`same`] - "Same"-padded convolutions for even kernels
//! - [`norm`] - Batch normalization defaults
//! - [`activation`] - LeakyReLU with the model's slope

pub mod activation;
pub mod error;
pub mod norm;
pub mod residual;
pub mod same;

pub use error::{VqVaeError, check_shape};
pub use residual::{ResidualBlock, ResidualBlockConfig};
pub use same::{SameConv2d, SameConv2dConfig, SameConvTranspose2d, SameConvTranspose2dConfig};

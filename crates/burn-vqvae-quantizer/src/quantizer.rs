//! Vector quantization layer
//!
//! Snaps every latent vector to its nearest codebook entry (squared Euclidean
//! distance, ties going to the lowest index) and passes gradients straight
//! through the lookup:
//!
//! ```text
//! output = input + detach(quantized - input)
//! ```
//!
//! Losses reported with every call:
//!
//! - codebook loss: `mse(quantized, detach(input))`
//! - commitment loss: `commitment_cost * mse(detach(quantized), input)`

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_vqvae_core::{VqVaeError, check_shape};

use crate::codebook::{Codebook, EmaCodebook, LearnedCodebook};

/// How the codebook is kept up to date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodebookUpdate {
    /// Embeddings are trained by the optimizer
    Gradient,
    /// Embeddings follow exponential moving averages of their assignments
    Ema { decay: f64, epsilon: f64 },
}

impl Default for CodebookUpdate {
    fn default() -> Self {
        Self::Ema {
            decay: 0.99,
            epsilon: 1e-5,
        }
    }
}

/// Vector quantizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorQuantizerConfig {
    /// Size of each codebook vector (D)
    pub embedding_dim: usize,
    /// Number of codebook vectors (K)
    pub num_embeddings: usize,
    /// Weight of the commitment loss
    pub commitment_cost: f64,
    pub update: CodebookUpdate,
    pub name: String,
}

impl VectorQuantizerConfig {
    pub fn new(embedding_dim: usize, num_embeddings: usize) -> Self {
        Self {
            embedding_dim,
            num_embeddings,
            commitment_cost: 0.25,
            update: CodebookUpdate::default(),
            name: "vector_quantizer".into(),
        }
    }

    pub fn with_commitment_cost(mut self, commitment_cost: f64) -> Self {
        self.commitment_cost = commitment_cost;
        self
    }

    pub fn with_update(mut self, update: CodebookUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn validate(&self) -> Result<(), VqVaeError> {
        if self.embedding_dim == 0 {
            return Err(VqVaeError::invalid_config("embedding_dim must be positive"));
        }
        if self.num_embeddings == 0 {
            return Err(VqVaeError::invalid_config("num_embeddings must be positive"));
        }
        if !(self.commitment_cost >= 0.0) {
            return Err(VqVaeError::invalid_config(format!(
                "commitment_cost must be non-negative, got {}",
                self.commitment_cost
            )));
        }
        if let CodebookUpdate::Ema { decay, epsilon } = self.update {
            if !(0.0..1.0).contains(&decay) {
                return Err(VqVaeError::invalid_config(format!(
                    "decay must be in [0, 1), got {}",
                    decay
                )));
            }
            if !(epsilon > 0.0) {
                return Err(VqVaeError::invalid_config(format!(
                    "epsilon must be strictly positive, got {}",
                    epsilon
                )));
            }
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<VectorQuantizer<B>, VqVaeError> {
        self.validate()?;

        let codebook = match self.update {
            CodebookUpdate::Gradient => Codebook::Learned(LearnedCodebook::new(
                self.num_embeddings,
                self.embedding_dim,
                device,
            )),
            CodebookUpdate::Ema { decay, epsilon } => Codebook::Ema(EmaCodebook::new(
                self.num_embeddings,
                self.embedding_dim,
                decay,
                epsilon,
                device,
            )),
        };

        tracing::debug!(
            layer = %self.name,
            embedding_dim = self.embedding_dim,
            num_embeddings = self.num_embeddings,
            update = ?self.update,
            "built vector quantizer"
        );

        Ok(VectorQuantizer {
            codebook,
            embedding_dim: self.embedding_dim,
            num_embeddings: self.num_embeddings,
            commitment_cost: self.commitment_cost,
            name: Ignored(self.name.clone()),
        })
    }
}

/// Quantized flat vectors, see [`VectorQuantizer::quantize_vectors`]
#[derive(Debug, Clone)]
pub struct QuantizedVectors<B: Backend> {
    /// `[N, D]`, forward value equals the selected codes
    pub quantized: Tensor<B, 2>,
    /// `[N]` code index per vector
    pub indices: Tensor<B, 1, Int>,
    pub codebook_loss: Tensor<B, 1>,
    pub commitment_loss: Tensor<B, 1>,
    /// `exp(entropy)` of the code usage in this batch
    pub perplexity: Tensor<B, 1>,
}

/// Quantized latent grid, see [`VectorQuantizer::forward`]
#[derive(Debug, Clone)]
pub struct QuantizerOutput<B: Backend> {
    /// `[batch, D, h, w]`
    pub quantized: Tensor<B, 4>,
    /// `[batch, h, w]`
    pub indices: Tensor<B, 3, Int>,
    pub codebook_loss: Tensor<B, 1>,
    pub commitment_loss: Tensor<B, 1>,
    pub perplexity: Tensor<B, 1>,
}

impl<B: Backend> QuantizerOutput<B> {
    /// Codebook loss plus commitment loss
    pub fn loss(&self) -> Tensor<B, 1> {
        self.codebook_loss.clone() + self.commitment_loss.clone()
    }
}

/// Vector quantization layer
#[derive(Module, Debug)]
pub struct VectorQuantizer<B: Backend> {
    pub codebook: Codebook<B>,
    pub embedding_dim: usize,
    pub num_embeddings: usize,
    pub commitment_cost: f64,
    pub name: Ignored<String>,
}

impl<B: Backend> VectorQuantizer<B> {
    pub fn name(&self) -> &str {
        &self.name.0
    }

    /// Nearest code per row of `inputs` (`[N, D]`)
    ///
    /// Returns the indices `[N]` and their squared distances `[N]`.
    pub fn nearest(
        &self,
        inputs: Tensor<B, 2>,
    ) -> Result<(Tensor<B, 1, Int>, Tensor<B, 1>), VqVaeError> {
        check_shape(
            "vector quantizer input",
            &[0, self.embedding_dim],
            &inputs.dims(),
        )?;
        let [n, _] = inputs.dims();

        let distances = squared_distances(inputs.detach(), self.codebook.embeddings().detach());
        let indices = distances.clone().argmin(1);
        let nearest = distances.gather(1, indices.clone()).reshape([n]);

        Ok((indices.reshape([n]), nearest))
    }

    /// Quantizes `[N, D]` vectors
    ///
    /// Runs the codebook's update step (EMA statistics during training).
    pub fn quantize_vectors(
        &self,
        inputs: Tensor<B, 2>,
    ) -> Result<QuantizedVectors<B>, VqVaeError> {
        let (indices, _) = self.nearest(inputs.clone())?;

        let embeddings = self.codebook.embeddings();
        let quantized = embeddings.select(0, indices.clone());

        let codebook_loss = mse(quantized.clone(), inputs.clone().detach());
        let commitment_loss =
            mse(quantized.clone().detach(), inputs.clone()) * self.commitment_cost;

        let encodings = one_hot(indices.clone(), self.num_embeddings);
        let perplexity = perplexity(encodings.clone());

        self.codebook.update(inputs.clone(), encodings);

        let quantized = inputs.clone() + (quantized - inputs).detach();

        Ok(QuantizedVectors {
            quantized,
            indices,
            codebook_loss,
            commitment_loss,
            perplexity,
        })
    }

    /// Quantizes a latent grid `[batch, D, h, w]`
    pub fn forward(&self, latents: Tensor<B, 4>) -> Result<QuantizerOutput<B>, VqVaeError> {
        check_shape(
            "vector quantizer latent grid",
            &[0, self.embedding_dim, 0, 0],
            &latents.dims(),
        )?;
        let [batch, channels, height, width] = latents.dims();

        tracing::trace!(
            layer = self.name(),
            batch,
            height,
            width,
            "quantizing latent grid"
        );

        let flat = latents
            .permute([0, 2, 3, 1])
            .reshape([batch * height * width, channels]);
        let out = self.quantize_vectors(flat)?;

        Ok(QuantizerOutput {
            quantized: out
                .quantized
                .reshape([batch, height, width, channels])
                .permute([0, 3, 1, 2]),
            indices: out.indices.reshape([batch, height, width]),
            codebook_loss: out.codebook_loss,
            commitment_loss: out.commitment_loss,
            perplexity: out.perplexity,
        })
    }

    /// Code indices `[batch, h, w]` for a latent grid, without losses or
    /// codebook updates
    pub fn encode(&self, latents: Tensor<B, 4>) -> Result<Tensor<B, 3, Int>, VqVaeError> {
        check_shape(
            "vector quantizer latent grid",
            &[0, self.embedding_dim, 0, 0],
            &latents.dims(),
        )?;
        let [batch, channels, height, width] = latents.dims();

        let flat = latents
            .permute([0, 2, 3, 1])
            .reshape([batch * height * width, channels]);
        let (indices, _) = self.nearest(flat)?;

        Ok(indices.reshape([batch, height, width]))
    }

    /// Maps a grid of code indices `[batch, h, w]` to codebook vectors
    /// `[batch, D, h, w]`
    pub fn lookup(&self, indices: Tensor<B, 3, Int>) -> Result<Tensor<B, 4>, VqVaeError> {
        let [batch, height, width] = indices.dims();
        let flat = indices.reshape([batch * height * width]);

        if batch * height * width > 0 {
            let min: i64 = flat.clone().min().into_scalar().elem();
            let max: i64 = flat.clone().max().into_scalar().elem();
            for index in [min, max] {
                if index < 0 || index >= self.num_embeddings as i64 {
                    return Err(VqVaeError::IndexOutOfRange {
                        index,
                        num_embeddings: self.num_embeddings,
                    });
                }
            }
        }

        Ok(self
            .codebook
            .embeddings()
            .select(0, flat)
            .reshape([batch, height, width, self.embedding_dim])
            .permute([0, 3, 1, 2]))
    }
}

/// `||x - e||^2` for every row pair, `[N, K]`
fn squared_distances<B: Backend>(inputs: Tensor<B, 2>, embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
    let [num_embeddings, _] = embeddings.dims();

    let x2 = inputs.clone().powi_scalar(2).sum_dim(1);
    let e2 = embeddings
        .clone()
        .powi_scalar(2)
        .sum_dim(1)
        .reshape([1, num_embeddings]);
    let xe = inputs.matmul(embeddings.transpose());

    x2 + e2 - xe * 2.0
}

fn mse<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 1> {
    (a - b).powi_scalar(2).mean()
}

/// `[N]` indices to `[N, num_classes]` one-hot floats
fn one_hot<B: Backend>(indices: Tensor<B, 1, Int>, num_classes: usize) -> Tensor<B, 2> {
    let [n] = indices.dims();
    let classes = Tensor::<B, 1, Int>::arange(0..num_classes as i64, &indices.device())
        .reshape([1, num_classes])
        .expand([n, num_classes]);

    indices
        .reshape([n, 1])
        .expand([n, num_classes])
        .equal(classes)
        .float()
}

fn perplexity<B: Backend>(encodings: Tensor<B, 2>) -> Tensor<B, 1> {
    let probs = encodings.mean_dim(0);
    let entropy = (probs.clone() * (probs + 1e-10).log()).sum();
    entropy.neg().exp()
}

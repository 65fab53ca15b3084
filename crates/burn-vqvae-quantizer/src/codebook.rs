//! Codebook storage and update strategies
//!
//! Both variants share nearest-neighbour lookup; they differ only in how the
//! embeddings change during training:
//!
//! - [`LearnedCodebook`] - embeddings are a trainable parameter, moved by the
//!   optimizer through the codebook loss
//! - [`EmaCodebook`] - embeddings are running state, recomputed after every
//!   training forward pass from exponential moving averages of code usage
//!
//! # EMA update
//!
//! For one-hot assignments `E` (`[N, K]`) and inputs `X` (`[N, D]`):
//!
//! ```text
//! cluster_size = decay * cluster_size + (1 - decay) * sum_n E
//! embed_sum    = decay * embed_sum    + (1 - decay) * E^T X
//! n            = sum_k cluster_size
//! smoothed     = (cluster_size + eps) / (n + K * eps) * n
//! embeddings   = embed_sum / smoothed
//! ```

use burn::module::{Param, RunningState};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Codebook of `num_embeddings` vectors of size `embedding_dim`
#[derive(Module, Debug)]
pub enum Codebook<B: Backend> {
    Learned(LearnedCodebook<B>),
    Ema(EmaCodebook<B>),
}

impl<B: Backend> Codebook<B> {
    /// Current embeddings, `[num_embeddings, embedding_dim]`
    ///
    /// Tracked by autodiff for the learned variant only.
    pub fn embeddings(&self) -> Tensor<B, 2> {
        match self {
            Self::Learned(codebook) => codebook.embeddings.val(),
            Self::Ema(codebook) => codebook.embeddings.value_sync(),
        }
    }

    /// `[num_embeddings, embedding_dim]`
    pub fn dims(&self) -> [usize; 2] {
        match self {
            Self::Learned(codebook) => codebook.embeddings.dims(),
            Self::Ema(codebook) => codebook.embeddings.value().dims(),
        }
    }

    /// Whether the optimizer updates the embeddings
    pub fn is_trainable(&self) -> bool {
        matches!(self, Self::Learned(_))
    }

    /// Post-forward update step
    ///
    /// Only the EMA variant changes state here, and only on autodiff backends
    /// (training). `inputs` is `[N, D]`, `encodings` the one-hot assignments
    /// `[N, K]`.
    pub fn update(&self, inputs: Tensor<B, 2>, encodings: Tensor<B, 2>) {
        match self {
            Self::Learned(_) => {}
            Self::Ema(codebook) => {
                if B::ad_enabled() {
                    codebook.update(inputs.detach(), encodings.detach());
                }
            }
        }
    }
}

/// Scale of the uniform initializer: `sqrt(3 / embedding_dim)`
fn init_limit(embedding_dim: usize) -> f64 {
    (3.0 / embedding_dim as f64).sqrt()
}

fn init_embeddings<B: Backend>(
    num_embeddings: usize,
    embedding_dim: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let limit = init_limit(embedding_dim);
    Tensor::random(
        [num_embeddings, embedding_dim],
        Distribution::Uniform(-limit, limit),
        device,
    )
}

/// Codebook trained by gradient descent
#[derive(Module, Debug)]
pub struct LearnedCodebook<B: Backend> {
    pub embeddings: Param<Tensor<B, 2>>,
}

impl<B: Backend> LearnedCodebook<B> {
    pub fn new(num_embeddings: usize, embedding_dim: usize, device: &B::Device) -> Self {
        Self::from_embeddings(init_embeddings(num_embeddings, embedding_dim, device))
    }

    pub fn from_embeddings(embeddings: Tensor<B, 2>) -> Self {
        Self {
            embeddings: Param::from_tensor(embeddings),
        }
    }
}

/// Codebook maintained by exponential moving averages of code usage
#[derive(Module, Debug)]
pub struct EmaCodebook<B: Backend> {
    /// Current embeddings `[K, D]`, derived from the statistics below
    pub embeddings: RunningState<Tensor<B, 2>>,
    /// Decayed per-code assignment counts `[K]`
    pub cluster_size: RunningState<Tensor<B, 1>>,
    /// Decayed per-code sum of assigned vectors `[K, D]`
    pub embed_sum: RunningState<Tensor<B, 2>>,
    /// Fraction of the running statistics kept each step
    pub decay: f64,
    /// Laplace smoothing constant, strictly positive
    pub epsilon: f64,
}

impl<B: Backend> EmaCodebook<B> {
    pub fn new(
        num_embeddings: usize,
        embedding_dim: usize,
        decay: f64,
        epsilon: f64,
        device: &B::Device,
    ) -> Self {
        Self::from_embeddings(
            init_embeddings(num_embeddings, embedding_dim, device),
            decay,
            epsilon,
        )
    }

    /// Starts every code with a unit count and its own vector as the sum.
    ///
    /// The common formulation starts counts at zero with sums equal to the
    /// initial vectors; here the counts start at one, so `embed_sum /
    /// cluster_size` reproduces the initial codebook and unused codes stay
    /// put instead of collapsing after the first step.
    pub fn from_embeddings(embeddings: Tensor<B, 2>, decay: f64, epsilon: f64) -> Self {
        let [num_embeddings, _] = embeddings.dims();
        let device = embeddings.device();

        Self {
            cluster_size: RunningState::new(Tensor::ones([num_embeddings], &device)),
            embed_sum: RunningState::new(embeddings.clone()),
            embeddings: RunningState::new(embeddings),
            decay,
            epsilon,
        }
    }

    fn update(&self, inputs: Tensor<B, 2>, encodings: Tensor<B, 2>) {
        let [num_embeddings, embedding_dim] = self.embed_sum.value().dims();
        let keep = self.decay;
        let fresh = 1.0 - self.decay;

        let counts = encodings.clone().sum_dim(0).reshape([num_embeddings]);
        let dw = encodings.transpose().matmul(inputs);

        let cluster_size = self.cluster_size.value_sync() * keep + counts.clone() * fresh;
        let embed_sum = self.embed_sum.value_sync() * keep + dw * fresh;

        let total = cluster_size.clone().sum();
        let smoothed = (cluster_size.clone() + self.epsilon)
            / (total.clone() + num_embeddings as f64 * self.epsilon)
            * total;
        let embeddings = embed_sum.clone() / smoothed.reshape([num_embeddings, 1]);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let used: i64 = counts.greater_elem(0.0).int().sum().into_scalar().elem();
            tracing::debug!(
                used_codes = used,
                num_embeddings,
                embedding_dim,
                "ema codebook update"
            );
        }

        self.cluster_size.update(cluster_size.detach());
        self.embed_sum.update(embed_sum.detach());
        self.embeddings.update(embeddings.detach());
    }
}

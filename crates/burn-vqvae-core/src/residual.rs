//! Convolutional residual block
//!
//! ```text
//! x ──┬── relu ─ conv3x3 ─ [batchnorm] ─ relu ─ conv1x1 ──┐
//!     └──────────────────────────────────────────────────(+)── out
//! ```

use burn::nn::{
    BatchNorm, PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
};
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::norm::batch_norm;

/// Residual block configuration
#[derive(Debug, Clone)]
pub struct ResidualBlockConfig {
    /// Input and output channels
    pub channels: usize,
    /// Hidden channels between the two convolutions (defaults to `channels`)
    pub mid_channels: Option<usize>,
    /// Insert batch normalization between the convolutions
    pub batchnorm: bool,
}

impl ResidualBlockConfig {
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            mid_channels: None,
            batchnorm: false,
        }
    }

    pub fn with_mid_channels(mut self, mid_channels: usize) -> Self {
        self.mid_channels = Some(mid_channels);
        self
    }

    pub fn with_batchnorm(mut self, batchnorm: bool) -> Self {
        self.batchnorm = batchnorm;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let mid = self.mid_channels.unwrap_or(self.channels);

        let conv1 = Conv2dConfig::new([self.channels, mid], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = self.batchnorm.then(|| batch_norm(mid, device));
        let conv2 = Conv2dConfig::new([mid, self.channels], [1, 1]).init(device);

        ResidualBlock { conv1, norm, conv2 }
    }
}

/// Residual block computing `x + f(x)`
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub norm: Option<BatchNorm<B>>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> ResidualBlock<B> {
    /// Input and output: `[batch, channels, h, w]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let h = self.conv1.forward(relu(x.clone()));
        let h = match &self.norm {
            Some(norm) => norm.forward(h),
            None => h,
        };
        let h = self.conv2.forward(relu(h));

        x + h
    }
}

//! "Same"-padded convolutions
//!
//! burn only offers symmetric padding, and `PaddingConfig2d::Same` rejects
//! even kernels. These wrappers reproduce the usual "same" convention
//! (output = ceil(input / stride), the odd pixel of padding going to the
//! bottom/right) for the 4×4 kernels the encoder and decoder use:
//!
//! - stride 1, even kernel: pad symmetrically by `k / 2`, then drop the extra
//!   leading row/column
//! - stride `s > 1`: symmetric padding of `(k - s) / 2`, plus `s - input % s`
//!   zero rows/cols on the bottom/right when the input is not a multiple of `s`
//! - transposed: crop `(k - s) / 2` from both sides and the odd remainder from
//!   the trailing edge

use burn::nn::{
    PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
};
use burn::prelude::*;

use crate::error::VqVaeError;

/// Configuration for [`SameConv2d`]
#[derive(Debug, Clone)]
pub struct SameConv2dConfig {
    /// `[in_channels, out_channels]`
    pub channels: [usize; 2],
    pub kernel_size: usize,
    pub stride: usize,
    pub bias: bool,
}

impl SameConv2dConfig {
    pub fn new(channels: [usize; 2], kernel_size: usize) -> Self {
        Self {
            channels,
            kernel_size,
            stride: 1,
            bias: true,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Padding applied on each side and rows/cols trimmed from the front
    fn padding(&self) -> Result<(usize, usize), VqVaeError> {
        let (k, s) = (self.kernel_size, self.stride);
        if k == 0 || s == 0 {
            return Err(VqVaeError::invalid_config(
                "kernel size and stride must be positive",
            ));
        }
        if s == 1 {
            let pad = k / 2;
            return Ok((pad, pad - (k - 1) / 2));
        }
        if k < s || (k - s) % 2 != 0 {
            return Err(VqVaeError::invalid_config(format!(
                "same padding for kernel {} with stride {} is asymmetric",
                k, s
            )));
        }
        Ok(((k - s) / 2, 0))
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SameConv2d<B>, VqVaeError> {
        let (pad, trim) = self.padding()?;
        let conv = Conv2dConfig::new(self.channels, [self.kernel_size, self.kernel_size])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_bias(self.bias)
            .init(device);

        Ok(SameConv2d {
            conv,
            stride: self.stride,
            trim,
        })
    }
}

/// Conv2d whose output is `ceil(input / stride)` in both spatial dims
#[derive(Module, Debug)]
pub struct SameConv2d<B: Backend> {
    pub conv: Conv2d<B>,
    pub stride: usize,
    pub trim: usize,
}

impl<B: Backend> SameConv2d<B> {
    /// Output spatial size for an `[height, width]` input
    pub fn output_size(&self, [height, width]: [usize; 2]) -> [usize; 2] {
        [height.div_ceil(self.stride), width.div_ceil(self.stride)]
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let x = self.pad_trailing(x);
        let x = self.conv.forward(x);
        if self.trim == 0 {
            return x;
        }

        let [batch, channels, _, _] = x.dims();
        let [out_h, out_w] = self.output_size([height, width]);
        x.slice([
            0..batch,
            0..channels,
            self.trim..self.trim + out_h,
            self.trim..self.trim + out_w,
        ])
    }

    /// Zero-extends the bottom/right edges up to the next multiple of stride
    fn pad_trailing(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let extra_h = height.next_multiple_of(self.stride) - height;
        let extra_w = width.next_multiple_of(self.stride) - width;
        let device = x.device();

        let x = if extra_h > 0 {
            let zeros = Tensor::zeros([batch, channels, extra_h, width], &device);
            Tensor::cat(vec![x, zeros], 2)
        } else {
            x
        };
        if extra_w > 0 {
            let zeros = Tensor::zeros([batch, channels, height + extra_h, extra_w], &device);
            Tensor::cat(vec![x, zeros], 3)
        } else {
            x
        }
    }
}

/// Configuration for [`SameConvTranspose2d`]
#[derive(Debug, Clone)]
pub struct SameConvTranspose2dConfig {
    /// `[in_channels, out_channels]`
    pub channels: [usize; 2],
    pub kernel_size: usize,
    pub stride: usize,
    pub bias: bool,
}

impl SameConvTranspose2dConfig {
    pub fn new(channels: [usize; 2], kernel_size: usize) -> Self {
        Self {
            channels,
            kernel_size,
            stride: 1,
            bias: true,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<SameConvTranspose2d<B>, VqVaeError> {
        let (k, s) = (self.kernel_size, self.stride);
        if k == 0 || s == 0 || k < s {
            return Err(VqVaeError::invalid_config(format!(
                "transposed conv needs kernel >= stride > 0, got kernel {} stride {}",
                k, s
            )));
        }
        let pad = (k - s) / 2;

        let conv = ConvTranspose2dConfig::new(self.channels, [k, k])
            .with_stride([s, s])
            .with_padding([pad, pad])
            .with_bias(self.bias)
            .init(device);

        Ok(SameConvTranspose2d {
            conv,
            stride: s,
            crop_end: (k - s) % 2,
        })
    }
}

/// ConvTranspose2d whose output is exactly `input * stride`
#[derive(Module, Debug)]
pub struct SameConvTranspose2d<B: Backend> {
    pub conv: ConvTranspose2d<B>,
    pub stride: usize,
    pub crop_end: usize,
}

impl<B: Backend> SameConvTranspose2d<B> {
    pub fn output_size(&self, [height, width]: [usize; 2]) -> [usize; 2] {
        [height * self.stride, width * self.stride]
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();
        let x = self.conv.forward(x);
        if self.crop_end == 0 {
            return x;
        }

        let [batch, channels, _, _] = x.dims();
        let [out_h, out_w] = self.output_size([height, width]);
        x.slice([0..batch, 0..channels, 0..out_h, 0..out_w])
    }
}

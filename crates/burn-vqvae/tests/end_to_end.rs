//! End-to-end VQ-VAE tests on the ndarray backend.
//!
//! Inference runs on `NdArray`; training steps run on `Autodiff<NdArray>`,
//! where batch norm uses batch statistics and the EMA codebook updates.

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;

use burn_vqvae::{VqVaeConfig, VqVaeOutput};
use burn_vqvae_quantizer::Codebook;

type TestBackend = NdArray<f32>;
type TrainBackend = Autodiff<NdArray<f32>>;

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f32 {
    t.into_scalar().elem()
}

fn assert_losses_valid<B: Backend>(out: &VqVaeOutput<B>) {
    for (name, loss) in [
        ("codebook", out.codebook_loss.clone()),
        ("commitment", out.commitment_loss.clone()),
    ] {
        let value = scalar(loss);
        assert!(value.is_finite() && value >= 0.0, "{} loss = {}", name, value);
    }
}

#[test]
fn test_default_model_reconstructs_image_batch() {
    let device = Default::default();
    let config = VqVaeConfig::new(64, 512, [64, 64]).with_ema(true);
    let model = config.init::<TestBackend>(&device).unwrap();

    let images =
        Tensor::<TestBackend, 4>::random([4, 3, 64, 64], Distribution::Uniform(-1.0, 1.0), &device);
    let out = model.forward(images).unwrap();

    assert_eq!(out.reconstruction.dims(), [4, 3, 64, 64]);
    assert_eq!(out.indices.dims(), [4, 16, 16]);

    let max: f32 = out.reconstruction.clone().abs().max().into_scalar().elem();
    assert!(max <= 1.0, "reconstruction out of range: {}", max);
    assert_losses_valid(&out);

    let perplexity = scalar(out.perplexity);
    assert!((1.0..=512.0 + 1e-3).contains(&perplexity));
}

#[test]
fn test_channels_last_batch() {
    let device = Default::default();
    let model = VqVaeConfig::new(16, 64, [32, 32])
        .init::<TestBackend>(&device)
        .unwrap();

    let images =
        Tensor::<TestBackend, 4>::random([4, 32, 32, 3], Distribution::Uniform(-1.0, 1.0), &device);
    let out = model.forward_channels_last(images).unwrap();

    assert_eq!(out.reconstruction.dims(), [4, 32, 32, 3]);
    assert_losses_valid(&out);
}

fn training_step(ema: bool) {
    let device = Default::default();
    let config = VqVaeConfig::new(8, 16, [16, 16])
        .with_num_resblocks(1)
        .with_ema(ema);
    let model = config.init::<TrainBackend>(&device).unwrap();
    let codebook_before = model.quantizer.codebook.embeddings().inner();

    let images =
        Tensor::<TrainBackend, 4>::random([2, 3, 16, 16], Distribution::Uniform(-1.0, 1.0), &device);
    let out = model.forward(images.clone()).unwrap();
    assert_losses_valid(&out);

    let reconstruction_loss = (out.reconstruction.clone() - images).powi_scalar(2).mean();
    let loss = reconstruction_loss + out.quantizer_loss();
    let grads = loss.backward();

    // Straight-through: the encoder is trained through the quantizer
    let encoder_grad = model.encoder.conv1.conv.weight.grad(&grads);
    assert!(encoder_grad.is_some(), "encoder received no gradient");

    match &model.quantizer.codebook {
        Codebook::Learned(codebook) => {
            assert!(codebook.embeddings.grad(&grads).is_some());
        }
        Codebook::Ema(codebook) => {
            // 2 images × 4 × 4 latent positions
            let total = scalar(codebook.cluster_size.value_sync().sum().inner());
            let expected = 0.99 * 16.0 + 0.01 * 32.0;
            assert!((total - expected).abs() < 1e-3, "{} vs {}", total, expected);

            let moved: f32 = (model.quantizer.codebook.embeddings().inner() - codebook_before)
                .abs()
                .max()
                .into_scalar()
                .elem();
            assert!(moved > 0.0, "ema codebook did not move");
        }
    }
}

#[test]
fn test_training_step_ema() {
    training_step(true);
}

#[test]
fn test_training_step_learned_codebook() {
    training_step(false);
}

#[test]
fn test_valid_model_freezes_ema_codebook() {
    let device = Default::default();
    let model = VqVaeConfig::new(8, 16, [16, 16])
        .init::<TrainBackend>(&device)
        .unwrap()
        .valid();
    let before = model.quantizer.codebook.embeddings();

    let images =
        Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Uniform(-1.0, 1.0), &device);
    model.forward(images).unwrap();

    let moved: f32 = (model.quantizer.codebook.embeddings() - before)
        .abs()
        .max()
        .into_scalar()
        .elem();
    assert_eq!(moved, 0.0);
}

use burn::prelude::*;
use burn::tensor::activation;

/// Negative slope used by every LeakyReLU in the encoder and decoder
pub const LEAKY_RELU_SLOPE: f64 = 0.3;

/// LeakyReLU with the default slope: `max(x, 0.3 * x)`
pub fn leaky_relu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::leaky_relu(x, LEAKY_RELU_SLOPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_leaky_relu_slope() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-2.0, 0.0, 3.0], &device);
        let y: Vec<f32> = leaky_relu(x).into_data().to_vec().unwrap();

        assert!((y[0] + 0.6).abs() < 1e-6);
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 3.0);
    }
}

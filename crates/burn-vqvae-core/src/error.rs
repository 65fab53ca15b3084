//! Error type shared by every burn-vqvae crate

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VqVaeError {
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Code index {index} out of range for codebook of {num_embeddings} entries")]
    IndexOutOfRange { index: i64, num_embeddings: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VqVaeError {
    /// Shape mismatch for `context`
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: impl Into<Vec<usize>>,
        actual: impl Into<Vec<usize>>,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Fails with [`VqVaeError::ShapeMismatch`] unless `actual == expected`.
///
/// A `0` in `expected` matches any size (used for the batch dimension).
pub fn check_shape(context: &str, expected: &[usize], actual: &[usize]) -> Result<(), VqVaeError> {
    let matches = expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(&e, &a)| e == 0 || e == a);

    if matches {
        Ok(())
    } else {
        Err(VqVaeError::shape_mismatch(context, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_shape_wildcard_batch() {
        assert!(check_shape("latent", &[0, 64, 16, 16], &[8, 64, 16, 16]).is_ok());
        assert!(check_shape("latent", &[0, 64, 16, 16], &[1, 64, 16, 16]).is_ok());
    }

    #[test]
    fn test_check_shape_rejects_mismatch() {
        let err = check_shape("latent", &[0, 64, 16, 16], &[2, 32, 16, 16]).unwrap_err();
        assert_eq!(
            err,
            VqVaeError::ShapeMismatch {
                context: "latent".into(),
                expected: vec![0, 64, 16, 16],
                actual: vec![2, 32, 16, 16],
            }
        );
        assert!(err.to_string().contains("latent"));
    }

    #[test]
    fn test_check_shape_rejects_rank_mismatch() {
        assert!(check_shape("x", &[0, 4], &[2, 4, 1]).is_err());
    }
}

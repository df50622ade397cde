use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::provider::VectorProvider;
use crate::core::errors::ApiError;

/// Tier 3: deterministic pseudo-embedding derived from a SHA-256 digest.
///
/// Not semantically meaningful, but same text always yields the same
/// vector, which keeps offline operation and tests reproducible when no
/// model runtime is available.
pub struct DigestVectorProvider;

pub fn pseudo_embedding(text: &str, target_dim: usize) -> Vec<f32> {
    let digest = Sha256::digest(text.as_bytes());
    (0..target_dim)
        .map(|i| f32::from(digest[i % digest.len()]) / 255.0 - 0.5)
        .collect()
}

#[async_trait]
impl VectorProvider for DigestVectorProvider {
    fn name(&self) -> &str {
        "digest"
    }

    async fn embed(
        &self,
        text: &str,
        target_dim: usize,
        _model: &str,
    ) -> Result<Vec<f32>, ApiError> {
        Ok(pseudo_embedding(text, target_dim))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_gives_identical_vectors() {
        let a = pseudo_embedding("Halo Vyre", 512);
        let b = pseudo_embedding("Halo Vyre", 512);
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_gives_different_vectors() {
        assert_ne!(pseudo_embedding("alpha", 64), pseudo_embedding("beta", 64));
    }

    #[test]
    fn digest_bytes_cycle_past_thirty_two() {
        let vector = pseudo_embedding("cycle", 100);
        assert_eq!(vector.len(), 100);
        assert_eq!(vector[0], vector[32]);
        assert_eq!(vector[5], vector[69]);
    }

    #[test]
    fn components_stay_in_bounded_range() {
        for component in pseudo_embedding("range check", 256) {
            assert!((-0.5..=0.5).contains(&component));
        }
    }
}

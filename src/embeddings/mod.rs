//! Embedding adapter with a three-tier fallback chain.
//!
//! HTTP endpoint first, then the local executable, then a deterministic
//! digest-based pseudo-embedding. The chain as a whole never fails; every
//! result is normalized to the requested dimension.

mod command;
mod digest;
mod http;
pub mod provider;

pub use digest::pseudo_embedding;

use command::CommandVectorProvider;
use digest::DigestVectorProvider;
use http::HttpVectorProvider;
use provider::VectorProvider;

pub const DEFAULT_EMBED_DIM: usize = 512;

pub struct EmbeddingService {
    providers: Vec<Box<dyn VectorProvider>>,
}

impl EmbeddingService {
    pub fn new(embed_url: String, command: String) -> Self {
        Self {
            providers: vec![
                Box::new(HttpVectorProvider::new(embed_url)),
                Box::new(CommandVectorProvider::new(command)),
                Box::new(DigestVectorProvider),
            ],
        }
    }

    /// Always returns a vector of exactly `target_dim` components.
    pub async fn embed(&self, text: &str, target_dim: usize, model: &str) -> Vec<f32> {
        for provider in &self.providers {
            match provider.embed(text, target_dim, model).await {
                Ok(vector) if !vector.is_empty() => {
                    tracing::debug!(tier = provider.name(), dim = vector.len(), "embedded text");
                    return normalize_dim(vector, target_dim);
                }
                Ok(_) => {
                    tracing::debug!(tier = provider.name(), "tier returned empty vector");
                }
                Err(err) => {
                    tracing::debug!(tier = provider.name(), error = %err, "embedding tier failed");
                }
            }
        }

        // The digest tier cannot fail, so this is only reachable if the
        // provider list was built empty.
        normalize_dim(pseudo_embedding(text, target_dim), target_dim)
    }
}

/// Zero-pads short vectors and truncates long ones.
fn normalize_dim(mut vector: Vec<f32>, target_dim: usize) -> Vec<f32> {
    vector.resize(target_dim, 0.0);
    vector
}

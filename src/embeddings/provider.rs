use async_trait::async_trait;

use crate::core::errors::ApiError;

/// One tier of the embedding fallback chain.
///
/// Tiers are attempted in order; the first non-empty vector wins. A tier
/// may ignore `target_dim` and return its native length, the service
/// normalizes afterwards.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(
        &self,
        text: &str,
        target_dim: usize,
        model: &str,
    ) -> Result<Vec<f32>, ApiError>;
}

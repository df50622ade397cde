use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::VectorProvider;
use crate::core::errors::ApiError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Tier 1: the local embedding endpoint (Ollama-compatible).
pub struct HttpVectorProvider {
    endpoint: String,
    client: Client,
}

impl HttpVectorProvider {
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }
}

#[async_trait]
impl VectorProvider for HttpVectorProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn embed(
        &self,
        text: &str,
        _target_dim: usize,
        model: &str,
    ) -> Result<Vec<f32>, ApiError> {
        let body = json!({ "model": model, "prompt": text });
        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "embedding endpoint returned {}",
                res.status()
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        parse_vector(&payload)
            .ok_or_else(|| ApiError::Internal("no embedding in response".to_string()))
    }
}

/// Accepts a bare array, `{"embedding": [...]}` or `{"data": [{"embedding": [...]}]}`.
pub(super) fn parse_vector(payload: &Value) -> Option<Vec<f32>> {
    let array = if payload.is_array() {
        payload.as_array()
    } else if let Some(embedding) = payload.get("embedding") {
        embedding.as_array()
    } else {
        payload
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| data.first())
            .and_then(|item| item.get("embedding"))
            .and_then(Value::as_array)
    }?;

    if array.is_empty() {
        return None;
    }

    let vector: Vec<f32> = array
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();
    (vector.len() == array.len()).then_some(vector)
}

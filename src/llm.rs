//! Narrow call contract against the local language-model runtime.
//!
//! HTTP endpoint first, executable fallback second. Output is parsed for
//! the common response shapes; anything unrecognized is returned as raw
//! text rather than failing the call.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::core::config::RuntimeEndpoints;
use crate::core::errors::ApiError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ModelCaller {
    model_url: String,
    command: String,
    client: Client,
}

impl ModelCaller {
    pub fn new(endpoints: &RuntimeEndpoints) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            model_url: endpoints.model_url.clone(),
            command: endpoints.model_cmd.clone(),
            client,
        }
    }

    /// Generates text for `prompt`. Only the final tier's failure
    /// surfaces, as `ModelCallFailed`.
    pub async fn call(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        match self.call_http(prompt, model).await {
            Ok(text) => return Ok(text),
            Err(err) => {
                tracing::debug!(error = %err, "model HTTP endpoint failed, trying executable");
            }
        }

        self.call_command(prompt, model)
            .await
            .map_err(|err| ApiError::ModelCallFailed(err.to_string()))
    }

    async fn call_http(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        let body = json!({ "model": model, "prompt": prompt });
        let res = self
            .client
            .post(&self.model_url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "model endpoint returned {}",
                res.status()
            )));
        }

        let raw = res.text().await.map_err(ApiError::internal)?;
        Ok(parse_reply(&raw))
    }

    async fn call_command(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        let binary = which::which(&self.command)
            .map_err(|_| ApiError::Internal(format!("{} not found on PATH", self.command)))?;

        // Prompt is passed positionally; some runtime versions reject
        // prompt flags.
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new(binary).args(["run", model, prompt]).output(),
        )
        .await
        .map_err(|_| ApiError::Internal("model command timed out".to_string()))?
        .map_err(ApiError::internal)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApiError::Internal(format!(
                "model command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_reply(&stdout))
    }

    /// Lists model names known to the local executable (`<cmd> list`).
    pub async fn list_models(&self) -> Result<Vec<String>, ApiError> {
        let binary = which::which(&self.command)
            .map_err(|_| ApiError::Internal(format!("{} not found on PATH", self.command)))?;

        let output = Command::new(binary)
            .arg("list")
            .output()
            .await
            .map_err(ApiError::internal)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| line.split_whitespace().next())
            .filter(|name| *name != "NAME")
            .map(str::to_string)
            .collect())
    }
}

/// Extracts generated text from a raw model reply.
///
/// Known shapes: bare string, `{output}`, `{text}`, `{response}`,
/// `{choices: [{text}]}`. Falls back to the raw input.
fn parse_reply(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
        return raw.trim().to_string();
    };
    extract_text(&value).unwrap_or_else(|| raw.trim().to_string())
}

fn extract_text(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }
    for key in ["output", "text", "response"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

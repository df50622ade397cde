use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::http::parse_vector;
use super::provider::VectorProvider;
use crate::core::errors::ApiError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Tier 2: invoke the local model executable and parse JSON from stdout.
pub struct CommandVectorProvider {
    command: String,
}

impl CommandVectorProvider {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl VectorProvider for CommandVectorProvider {
    fn name(&self) -> &str {
        "command"
    }

    async fn embed(
        &self,
        text: &str,
        _target_dim: usize,
        model: &str,
    ) -> Result<Vec<f32>, ApiError> {
        let binary = which::which(&self.command)
            .map_err(|_| ApiError::Internal(format!("{} not found on PATH", self.command)))?;

        let mut child = Command::new(binary)
            .args(["embed", model])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ApiError::internal)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(ApiError::internal)?;
        }

        let output = tokio::time::timeout(COMMAND_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ApiError::Internal("embed command timed out".to_string()))?
            .map_err(ApiError::internal)?;

        if !output.status.success() {
            return Err(ApiError::Internal(format!(
                "embed command exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let payload: Value = serde_json::from_str(stdout.trim())
            .map_err(|_| ApiError::Internal("embed command output is not JSON".to_string()))?;

        parse_vector(&payload)
            .ok_or_else(|| ApiError::Internal("no embedding in command output".to_string()))
    }
}

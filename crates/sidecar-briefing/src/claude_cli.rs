//! Generation through the `claude` CLI in print mode.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use sidecar_core::error::GenerationError;

use crate::provider::GenerationProvider;

/// Spawns `claude -p --output-format json --model <model>` and feeds the
/// instruction on stdin.
///
/// The child is killed when the invocation future is dropped, which is what
/// happens when the generator's timeout fires.
pub struct ClaudeCliProvider {
    binary: String,
    model: String,
}

/// The JSON envelope printed by `claude -p --output-format json`.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

impl ClaudeCliProvider {
    /// Model names: "haiku", "sonnet", "opus"
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            binary: "claude".to_string(),
            model: model.into(),
        }
    }

    /// Use a specific executable instead of `claude` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationProvider for ClaudeCliProvider {
    async fn invoke(&self, instruction: &str, schema: &Value) -> Result<String, GenerationError> {
        let prompt = embed_schema(instruction, schema);
        let t0 = std::time::Instant::now();

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-p", "--output-format", "json", "--model", &self.model])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // CLAUDECODE and friends make the child think it runs nested in a session.
        for (key, _) in std::env::vars() {
            if key.starts_with("CLAUDE") {
                cmd.env_remove(&key);
            }
        }

        tracing::info!(model = %self.model, prompt_len = prompt.len(), "claude CLI: spawning");
        let mut child = cmd.spawn().map_err(|e| {
            GenerationError::Transport(format!("failed to spawn {}: {e}", self.binary))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| GenerationError::Transport(format!("failed to write prompt: {e}")))?;
            // Dropping stdin closes the pipe so the CLI sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GenerationError::Transport(format!("failed to wait for CLI: {e}")))?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            tracing::error!(elapsed_ms, exit_code = ?output.status.code(), "claude CLI: non-zero exit");
            return Err(GenerationError::Transport(format!(
                "claude exited with {}: {}",
                output.status,
                head(stderr, 500)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::info!(elapsed_ms, stdout_len = stdout.len(), "claude CLI: response received");
        parse_envelope(&stdout)
    }

    fn name(&self) -> &str {
        "claude-cli"
    }
}

fn embed_schema(instruction: &str, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("{instruction}\n\nThe response must be one JSON object matching this JSON Schema:\n{schema_text}\n")
}

/// Pull the model text out of the CLI's JSON envelope.
fn parse_envelope(stdout: &str) -> Result<String, GenerationError> {
    let envelope: CliEnvelope = serde_json::from_str(stdout.trim()).map_err(|e| {
        GenerationError::Transport(format!(
            "claude returned non-JSON output ({e}): {}",
            head(stdout, 200)
        ))
    })?;
    if envelope.is_error {
        return Err(GenerationError::Transport(format!(
            "claude reported an error: {}",
            envelope
                .result
                .or(envelope.subtype)
                .unwrap_or_else(|| "unknown".to_string())
        )));
    }
    envelope
        .result
        .ok_or_else(|| GenerationError::Transport("claude response has no result field".to_string()))
}

fn head(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

//! The boundary to the external model that writes briefings.

use async_trait::async_trait;
use serde_json::Value;

use sidecar_core::error::GenerationError;

/// One round trip to a generation model.
///
/// Implementations return the model's raw text. Parsing, validation and the
/// repair attempt belong to [`BriefingGenerator`](crate::BriefingGenerator);
/// so does the timeout. Any failure to get text back is
/// [`GenerationError::Transport`].
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Send `instruction` and ask for a response shaped like `schema`.
    async fn invoke(&self, instruction: &str, schema: &Value) -> Result<String, GenerationError>;

    /// Provider name for logging/display (e.g. "claude-cli").
    fn name(&self) -> &str;
}

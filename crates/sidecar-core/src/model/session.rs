use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::SessionId;

/// One recorded interaction transcript, read from disk and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub project_path: Option<String>,
    pub transcript_path: PathBuf,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub events: Vec<RawEvent>,
}

impl Session {
    /// Build a session, deriving start/end from the first and last timestamped event.
    pub fn new(
        id: SessionId,
        project_path: Option<String>,
        transcript_path: PathBuf,
        events: Vec<RawEvent>,
    ) -> Self {
        let started_at = events.iter().find_map(|e| e.timestamp);
        let ended_at = events.iter().rev().find_map(|e| e.timestamp);
        Self {
            id,
            project_path,
            transcript_path,
            started_at,
            ended_at,
            events,
        }
    }

    /// Number of user and assistant messages (tool traffic excluded).
    pub fn message_count(&self) -> usize {
        self.events.iter().filter(|e| e.kind.is_message()).count()
    }

    /// Text of the first user message, if any.
    pub fn first_prompt(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match &e.kind {
            EventKind::UserMessage { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A single typed unit of the transcript. Order within a session is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub role: Role,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn new(timestamp: Option<DateTime<Utc>>, kind: EventKind) -> Self {
        let role = kind.default_role();
        Self {
            timestamp,
            role,
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    UserMessage {
        text: String,
    },
    AssistantMessage {
        text: String,
    },
    ToolCall {
        tool_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_id: String,
        output: String,
        is_error: bool,
    },
    SystemNote {
        text: String,
    },
}

impl EventKind {
    fn default_role(&self) -> Role {
        match self {
            EventKind::UserMessage { .. } => Role::User,
            EventKind::AssistantMessage { .. } | EventKind::ToolCall { .. } => Role::Assistant,
            EventKind::ToolResult { .. } => Role::Tool,
            EventKind::SystemNote { .. } => Role::System,
        }
    }

    /// User and assistant messages mark conversational boundaries.
    pub fn is_message(&self) -> bool {
        matches!(
            self,
            EventKind::UserMessage { .. } | EventKind::AssistantMessage { .. }
        )
    }

    /// File path a tool call operates on, if its input names one.
    pub fn tool_file_path(&self) -> Option<&str> {
        match self {
            EventKind::ToolCall { input, .. } => ["file_path", "notebook_path", "path"]
                .iter()
                .find_map(|key| input.get(*key).and_then(|v| v.as_str())),
            _ => None,
        }
    }
}

/// Coarse classification of assistant tools by their effect on the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ToolKind {
    FileWrite,
    Shell,
    FileRead,
    Other,
}

impl ToolKind {
    pub fn classify(tool_name: &str) -> Self {
        match tool_name {
            "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => ToolKind::FileWrite,
            "Bash" | "BashOutput" => ToolKind::Shell,
            "Read" | "Grep" | "Glob" | "LS" | "WebFetch" | "WebSearch" | "NotebookRead" => {
                ToolKind::FileRead
            }
            _ => ToolKind::Other,
        }
    }
}

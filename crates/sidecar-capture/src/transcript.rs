//! Claude Code session JSONL parsing.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use sidecar_core::error::SidecarError;
use sidecar_core::model::{EventKind, RawEvent};

/// How to treat lines that are not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Any broken line other than an unterminated last line is `Malformed`.
    Strict,
    /// Broken lines are skipped. Used when scanning many files for listings.
    Lenient,
}

/// Events plus the metadata a transcript carries about itself.
#[derive(Debug, Clone, Default)]
pub struct ParsedTranscript {
    pub events: Vec<RawEvent>,
    /// First `cwd` recorded in the transcript.
    pub cwd: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeEntry {
    #[serde(default, rename = "type")]
    entry_type: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<ClaudeMessage>,
    #[serde(default, rename = "isSidechain")]
    is_sidechain: Option<bool>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Value,
}

/// Read and parse a transcript file.
pub fn parse_file(path: &Path, mode: ParseMode) -> Result<ParsedTranscript, SidecarError> {
    let content = decode(std::fs::read(path)?, path, mode)?;
    parse_str(&content, path, mode)
}

/// Invalid UTF-8 is `Malformed` in strict mode unless it sits in an
/// unterminated last line, which is left for [`parse_str`] to skip.
fn decode(bytes: Vec<u8>, path: &Path, mode: ParseMode) -> Result<String, SidecarError> {
    let err = match String::from_utf8(bytes) {
        Ok(text) => return Ok(text),
        Err(e) => e,
    };
    let bytes = err.as_bytes();
    let at = err.utf8_error().valid_up_to();
    let line_no = bytes[..at].iter().filter(|&&b| b == b'\n').count() + 1;
    let in_partial_tail = !bytes[at..].contains(&b'\n');

    if mode == ParseMode::Strict && !in_partial_tail {
        return Err(SidecarError::malformed(
            path,
            Some(line_no),
            format!("invalid UTF-8 at byte {at}"),
        ));
    }
    tracing::debug!("Invalid UTF-8 on line {line_no} of {}", path.display());
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Parse transcript text. `path` is only used for error locations.
pub fn parse_str(
    content: &str,
    path: &Path,
    mode: ParseMode,
) -> Result<ParsedTranscript, SidecarError> {
    let mut parsed = ParsedTranscript::default();
    let unterminated = !content.is_empty() && !content.ends_with('\n');
    let line_count = content.lines().count();

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ClaudeEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) if mode == ParseMode::Lenient => {
                tracing::debug!("Skipping unparseable line {line_no} in {}: {e}", path.display());
                continue;
            }
            Err(_) if unterminated && line_no == line_count => {
                tracing::warn!(
                    "Ignoring partial last line {line_no} in {} (session still being written?)",
                    path.display()
                );
                continue;
            }
            Err(e) => return Err(SidecarError::malformed(path, Some(line_no), e.to_string())),
        };

        if parsed.cwd.is_none() {
            parsed.cwd = entry.cwd.clone();
        }
        push_events(&mut parsed.events, entry);
    }

    Ok(parsed)
}

fn push_events(events: &mut Vec<RawEvent>, entry: ClaudeEntry) {
    if entry.is_sidechain == Some(true) {
        return;
    }
    let ts = entry
        .timestamp
        .as_deref()
        .and_then(|t| t.parse::<DateTime<Utc>>().ok());

    match entry.entry_type.as_deref() {
        Some("user") | Some("assistant") => {
            let Some(msg) = entry.message else {
                return;
            };
            let is_user = match msg.role.as_deref().or(entry.entry_type.as_deref()) {
                Some("user") => true,
                Some("assistant") => false,
                _ => return,
            };
            push_message(events, ts, is_user, msg.content);
        }
        Some("summary") => {
            if let Some(text) = entry.summary.filter(|s| !s.trim().is_empty()) {
                events.push(RawEvent::new(ts, EventKind::SystemNote { text }));
            }
        }
        Some("system") => {
            if let Some(text) = entry
                .content
                .as_ref()
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
            {
                events.push(RawEvent::new(
                    ts,
                    EventKind::SystemNote {
                        text: text.to_string(),
                    },
                ));
            }
        }
        // progress, file-history-snapshot, queue-operation, ...
        _ => {}
    }
}

fn push_message(
    events: &mut Vec<RawEvent>,
    ts: Option<DateTime<Utc>>,
    is_user: bool,
    content: Value,
) {
    let text_event = |text: String| {
        if is_user {
            EventKind::UserMessage { text }
        } else {
            EventKind::AssistantMessage { text }
        }
    };

    match content {
        Value::String(text) => {
            if !text.trim().is_empty() {
                events.push(RawEvent::new(ts, text_event(text)));
            }
        }
        Value::Array(blocks) => {
            for block in blocks {
                match block.get("type").and_then(Value::as_str).unwrap_or("") {
                    "text" => {
                        let text = block
                            .get("text")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        if !text.trim().is_empty() {
                            events.push(RawEvent::new(ts, text_event(text)));
                        }
                    }
                    "tool_use" => {
                        events.push(RawEvent::new(
                            ts,
                            EventKind::ToolCall {
                                tool_id: str_field(&block, "id"),
                                tool_name: block
                                    .get("name")
                                    .and_then(Value::as_str)
                                    .unwrap_or("unknown")
                                    .to_string(),
                                input: block.get("input").cloned().unwrap_or(Value::Null),
                            },
                        ));
                    }
                    "tool_result" => {
                        events.push(RawEvent::new(
                            ts,
                            EventKind::ToolResult {
                                tool_id: str_field(&block, "tool_use_id"),
                                output: tool_output(block.get("content")),
                                is_error: block
                                    .get("is_error")
                                    .and_then(Value::as_bool)
                                    .unwrap_or(false),
                            },
                        ));
                    }
                    // thinking, image, ...
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn str_field(block: &Value, key: &str) -> String {
    block
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Tool output is either a plain string or a list of text blocks.
fn tool_output(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

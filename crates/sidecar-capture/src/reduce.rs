//! Budget-bounded condensation of a session transcript.
//!
//! Selection works in three steps:
//!
//! 1. Every event with content becomes a candidate line
//!    `[index] LABEL: text`. Non-user text is capped at
//!    [`SaliencePolicy::excerpt_cap_bytes`]; the cap does not depend on the
//!    budget.
//! 2. The first and last message of the session are always kept, each
//!    truncated to at most half the budget. Their share is reserved even
//!    when a share is too small to hold the truncated line.
//! 3. The remaining candidates are ranked by score (descending), then by
//!    position (ascending). Each is admitted in its short form, cut to
//!    [`SaliencePolicy::min_excerpt_bytes`], for the longest prefix of the
//!    ranking that fits. The first candidate that does not fit is truncated
//!    into whatever space is left, and admission stops.
//! 4. Leftover space grows the admitted excerpts back toward their full
//!    text, in ranking order.
//!
//! Short forms do not depend on the budget and the space left after step 2
//! never shrinks as the budget grows, so a larger budget always admits a
//! superset of the events admitted under a smaller one. Step 4 only changes
//! how much of each admitted event is shown.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use sidecar_core::model::{EventKind, RawEvent, Session, SessionId, ToolKind};

use crate::extractor::{extract_insights, has_decision_language, DeadEnd, Decision};

/// Lines shorter than this many characters from the assistant count as acknowledgements.
const ACK_MAX_CHARS: usize = 50;
/// Most decisions or dead ends listed in the rendered aggregates.
const MAX_LISTED_INSIGHTS: usize = 10;

/// Tunable salience weights. Higher scores are kept first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaliencePolicy {
    pub user: u32,
    pub file_write: u32,
    pub decision: u32,
    pub tool_error: u32,
    pub shell: u32,
    pub system_note: u32,
    pub assistant: u32,
    pub other_tool: u32,
    pub read_only: u32,
    pub tool_ok: u32,
    pub acknowledgement: u32,
    pub excerpt_cap_bytes: usize,
    /// Line size each ranked excerpt is admitted at before leftover space is shared out.
    pub min_excerpt_bytes: usize,
}

impl Default for SaliencePolicy {
    fn default() -> Self {
        Self {
            user: 100,
            file_write: 80,
            decision: 70,
            tool_error: 60,
            shell: 50,
            system_note: 40,
            assistant: 30,
            other_tool: 20,
            read_only: 15,
            tool_ok: 10,
            acknowledgement: 5,
            excerpt_cap_bytes: 2_000,
            min_excerpt_bytes: 160,
        }
    }
}

impl SaliencePolicy {
    pub fn with_excerpt_cap(mut self, cap: usize) -> Self {
        self.excerpt_cap_bytes = cap;
        self
    }

    pub fn score(&self, event: &RawEvent) -> u32 {
        match &event.kind {
            EventKind::UserMessage { .. } => self.user,
            EventKind::AssistantMessage { text } => {
                if has_decision_language(text) {
                    self.decision
                } else if text.trim().chars().count() < ACK_MAX_CHARS {
                    self.acknowledgement
                } else {
                    self.assistant
                }
            }
            EventKind::ToolCall { tool_name, .. } => match ToolKind::classify(tool_name) {
                ToolKind::FileWrite => self.file_write,
                ToolKind::Shell => self.shell,
                ToolKind::FileRead => self.read_only,
                ToolKind::Other => self.other_tool,
            },
            EventKind::ToolResult { is_error: true, .. } => self.tool_error,
            EventKind::ToolResult { .. } => self.tool_ok,
            EventKind::SystemNote { .. } => self.system_note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcerptKind {
    User,
    Assistant,
    FileWrite,
    Shell,
    ToolCall,
    ToolResult,
    ToolError,
    Note,
}

impl ExcerptKind {
    pub fn label(self) -> &'static str {
        match self {
            ExcerptKind::User => "USER",
            ExcerptKind::Assistant => "ASSISTANT",
            ExcerptKind::FileWrite => "WRITE",
            ExcerptKind::Shell => "SHELL",
            ExcerptKind::ToolCall => "TOOL",
            ExcerptKind::ToolResult => "RESULT",
            ExcerptKind::ToolError => "ERROR",
            ExcerptKind::Note => "NOTE",
        }
    }
}

/// One retained event, rendered as a single transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Excerpt {
    /// Position of the source event in the session.
    pub index: usize,
    pub kind: ExcerptKind,
    pub score: u32,
    pub text: String,
    /// Bytes cut from the event's text, zero when kept whole.
    pub truncated_bytes: usize,
}

impl Excerpt {
    pub fn line(&self) -> String {
        format!("[{}] {}: {}\n", self.index, self.kind.label(), self.text)
    }

    fn prefix_len(&self) -> usize {
        format!("[{}] {}: ", self.index, self.kind.label()).len() + 1
    }

    /// Fit this excerpt into `max_line_bytes`, truncating the text if needed.
    fn fitted(&self, max_line_bytes: usize) -> Option<Excerpt> {
        let avail = max_line_bytes.checked_sub(self.prefix_len())?;
        let (text, cut) = truncate_text(&self.text, avail)?;
        Some(Excerpt {
            text,
            truncated_bytes: self.truncated_bytes + cut,
            ..self.clone()
        })
    }
}

/// Condensed, budget-bounded view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReducedTranscript {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub transcript_path: PathBuf,
    pub budget_bytes: usize,
    pub event_count: usize,
    /// Retained excerpts in original session order.
    pub excerpts: Vec<Excerpt>,
    /// Every file path a tool call touched, over the whole session.
    pub files_touched: BTreeSet<String>,
    /// Tool invocation counts by name, over the whole session.
    pub tools_invoked: BTreeMap<String, usize>,
    pub decisions: Vec<Decision>,
    pub dead_ends: Vec<DeadEnd>,
}

impl ReducedTranscript {
    pub fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }

    /// Serialized size of the excerpts; never exceeds `budget_bytes`.
    pub fn excerpt_bytes(&self) -> usize {
        self.excerpts.iter().map(|e| e.line().len()).sum()
    }

    pub fn excerpt_indices(&self) -> Vec<usize> {
        self.excerpts.iter().map(|e| e.index).collect()
    }

    /// Plain-text rendering handed to the model.
    pub fn render(&self) -> String {
        let mut out = format!("# Session {}\n", self.session_id);
        if let Some(p) = &self.project_path {
            out.push_str(&format!("Project: {p}\n"));
        }
        out.push_str(&format!(
            "Events: {} (excerpts kept: {})\n",
            self.event_count,
            self.excerpts.len()
        ));

        if !self.files_touched.is_empty() {
            out.push_str("\n## Files touched\n");
            for f in &self.files_touched {
                out.push_str(&format!("- {f}\n"));
            }
        }
        if !self.tools_invoked.is_empty() {
            out.push_str("\n## Tools invoked\n");
            for (name, count) in &self.tools_invoked {
                out.push_str(&format!("- {name} x{count}\n"));
            }
        }
        if !self.decisions.is_empty() {
            out.push_str("\n## Decisions stated\n");
            for d in &self.decisions {
                out.push_str(&format!("- {} (because {})\n", d.description, d.rationale));
            }
        }
        if !self.dead_ends.is_empty() {
            out.push_str("\n## Approaches abandoned\n");
            for d in &self.dead_ends {
                out.push_str(&format!("- {}: {}\n", d.approach, d.reason));
            }
        }

        out.push_str("\n## Excerpts\n");
        for e in &self.excerpts {
            out.push_str(&e.line());
        }
        out
    }

    /// SHA-256 of [`render`](Self::render), hex encoded.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.render().as_bytes()))
    }
}

/// Reduce a session to at most `budget` bytes of excerpts.
pub fn reduce(session: &Session, budget: usize, policy: &SaliencePolicy) -> ReducedTranscript {
    let candidates: Vec<Excerpt> = session
        .events
        .iter()
        .enumerate()
        .filter_map(|(index, event)| candidate(index, event, policy))
        .collect();

    let first_msg = session.events.iter().position(|e| e.kind.is_message());
    let last_msg = session.events.iter().rposition(|e| e.kind.is_message());
    let mandatory: BTreeSet<usize> = first_msg.into_iter().chain(last_msg).collect();

    let mut kept: BTreeMap<usize, Excerpt> = BTreeMap::new();

    // Boundary messages reserve their share whether or not they fit, so the
    // space left for ranking never shrinks as the budget grows.
    let shares = if mandatory.len() > 1 {
        vec![budget / 2, budget - budget / 2]
    } else {
        vec![budget]
    };
    let mut reserved = 0usize;
    for (c, share) in candidates
        .iter()
        .filter(|c| mandatory.contains(&c.index))
        .zip(shares)
    {
        reserved += c.line().len().min(share);
        if let Some(fitted) = c.fitted(share) {
            kept.insert(c.index, fitted);
        }
    }
    let mut remaining = budget - reserved;

    let mut ranked: Vec<&Excerpt> = candidates
        .iter()
        .filter(|c| !mandatory.contains(&c.index))
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.index.cmp(&b.index)));

    let mut admitted: Vec<&Excerpt> = Vec::new();
    for c in ranked {
        let short = c
            .fitted(policy.min_excerpt_bytes)
            .unwrap_or_else(|| c.clone());
        let len = short.line().len();
        if len <= remaining {
            remaining -= len;
            kept.insert(c.index, short);
            admitted.push(c);
            continue;
        }
        if let Some(partial) = c.fitted(remaining) {
            remaining -= partial.line().len();
            kept.insert(c.index, partial);
            admitted.push(c);
        }
        break;
    }

    for c in admitted {
        if remaining == 0 {
            break;
        }
        let current = kept.get(&c.index).map_or(0, |e| e.line().len());
        let target = (current + remaining).min(c.line().len());
        if target <= current {
            continue;
        }
        if let Some(grown) = c.fitted(target) {
            let grown_len = grown.line().len();
            if grown_len > current {
                remaining -= grown_len - current;
                kept.insert(c.index, grown);
            }
        }
    }

    let (files_touched, tools_invoked) = aggregates(&session.events);
    let insights = extract_insights(session.events.iter().filter_map(|e| match &e.kind {
        EventKind::AssistantMessage { text } => Some(text.as_str()),
        _ => None,
    }));

    tracing::debug!(
        session = %session.id,
        events = session.events.len(),
        kept = kept.len(),
        budget,
        "Reduced transcript"
    );

    ReducedTranscript {
        session_id: session.id.clone(),
        project_path: session.project_path.clone(),
        transcript_path: session.transcript_path.clone(),
        budget_bytes: budget,
        event_count: session.events.len(),
        excerpts: kept.into_values().collect(),
        files_touched,
        tools_invoked,
        decisions: insights.decisions.into_iter().take(MAX_LISTED_INSIGHTS).collect(),
        dead_ends: insights.dead_ends.into_iter().take(MAX_LISTED_INSIGHTS).collect(),
    }
}

fn candidate(index: usize, event: &RawEvent, policy: &SaliencePolicy) -> Option<Excerpt> {
    let (kind, text) = match &event.kind {
        EventKind::UserMessage { text } => (ExcerptKind::User, one_line(text)),
        EventKind::AssistantMessage { text } => (ExcerptKind::Assistant, one_line(text)),
        EventKind::ToolCall {
            tool_name, input, ..
        } => describe_tool_call(tool_name, input, event.kind.tool_file_path()),
        EventKind::ToolResult {
            output, is_error, ..
        } => {
            let kind = if *is_error {
                ExcerptKind::ToolError
            } else {
                ExcerptKind::ToolResult
            };
            (kind, one_line(output))
        }
        EventKind::SystemNote { text } => (ExcerptKind::Note, one_line(text)),
    };
    if text.trim().is_empty() {
        return None;
    }

    let mut excerpt = Excerpt {
        index,
        kind,
        score: policy.score(event),
        text,
        truncated_bytes: 0,
    };
    if kind != ExcerptKind::User {
        let (text, cut) = truncate_text(&excerpt.text, policy.excerpt_cap_bytes)
            .unwrap_or_else(|| (String::new(), excerpt.text.len()));
        excerpt.text = text;
        excerpt.truncated_bytes = cut;
    }
    Some(excerpt)
}

fn describe_tool_call(name: &str, input: &Value, path: Option<&str>) -> (ExcerptKind, String) {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    match ToolKind::classify(name) {
        ToolKind::FileWrite => {
            let body = [field("content"), field("new_string"), field("new_source")]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("");
            let mut text = format!("{name} {}", path.unwrap_or("?"));
            if !body.is_empty() {
                text.push_str(" :: ");
                text.push_str(&one_line(body));
            }
            (ExcerptKind::FileWrite, text)
        }
        ToolKind::Shell => {
            let mut text = format!("$ {}", one_line(field("command")));
            let description = field("description");
            if !description.is_empty() {
                text.push_str(&format!(" # {description}"));
            }
            (ExcerptKind::Shell, text)
        }
        ToolKind::FileRead => {
            let target = path
                .or_else(|| input.get("pattern").and_then(Value::as_str))
                .or_else(|| input.get("url").and_then(Value::as_str))
                .or_else(|| input.get("query").and_then(Value::as_str))
                .unwrap_or("");
            (ExcerptKind::ToolCall, format!("{name} {target}").trim_end().to_string())
        }
        ToolKind::Other => (ExcerptKind::ToolCall, format!("{name} {input}")),
    }
}

fn aggregates(events: &[RawEvent]) -> (BTreeSet<String>, BTreeMap<String, usize>) {
    let mut files = BTreeSet::new();
    let mut tools = BTreeMap::new();
    for e in events {
        if let EventKind::ToolCall { tool_name, .. } = &e.kind {
            *tools.entry(tool_name.clone()).or_insert(0) += 1;
            if let Some(p) = e.kind.tool_file_path() {
                files.insert(p.to_string());
            }
        }
    }
    (files, tools)
}

/// Escape newlines so each excerpt stays on one line.
fn one_line(s: &str) -> String {
    s.trim().replace('\r', "").replace('\n', "\\n")
}

/// Cut `text` to at most `max_bytes`, appending `...[truncated N bytes]`.
///
/// Cuts on a UTF-8 character boundary. `None` when not even the marker fits.
pub fn truncate_text(text: &str, max_bytes: usize) -> Option<(String, usize)> {
    if text.len() <= max_bytes {
        return Some((text.to_string(), 0));
    }
    // Worst case marker length: the whole text is cut.
    let marker_len = marker(text.len()).len();
    let mut keep = max_bytes.checked_sub(marker_len)?;
    while !text.is_char_boundary(keep) {
        keep -= 1;
    }
    let cut = text.len() - keep;
    Some((format!("{}{}", &text[..keep], marker(cut)), cut))
}

fn marker(cut: usize) -> String {
    format!("...[truncated {cut} bytes]")
}

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use sidecar_briefing::{BriefingPipeline, GenerationProvider};
use sidecar_capture::{SessionQuery, SessionSelector};
use sidecar_core::config::SidecarConfig;
use sidecar_core::error::GenerationError;
use sidecar_core::model::{DiffSource, Severity};

/// Replays canned model responses and records what it was asked.
struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn invoke(&self, instruction: &str, schema: &Value) -> Result<String, GenerationError> {
        assert!(schema.get("properties").is_some());
        self.calls.lock().unwrap().push(instruction.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GenerationError::Transport("no more responses".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

const MALFORMED: &str = r#"{"summary_of_changes": "Added a token bucket", "architecture_notes": "#;

const REPAIRED: &str = r#"{
  "summary_of_changes": "Added a token bucket rate limiter in src/limit.rs and wired it into the router.",
  "architecture_notes": "src/router.rs wraps the app in a layer that calls Bucket::take per request.",
  "patterns": [
    {"name": "token bucket", "locations": [{"file": "src/limit.rs", "lines": null}], "explanation": "Refills tokens over time to allow short bursts."}
  ],
  "risks": [
    {"description": "Bucket state lives in one process; replicas each allow the full rate.", "severity": "high"}
  ],
  "concepts": [
    {"concept": "rate limiting", "evidence": "Asked to wire the limiter into the router.", "understood": "yes"}
  ]
}"#;

fn entry(kind: &str, ts: &str, content: Value) -> String {
    json!({
        "type": kind,
        "cwd": "/nonexistent/limiter",
        "timestamp": ts,
        "message": {"role": kind, "content": content},
    })
    .to_string()
}

/// Three user messages, two file writes of realistic size, one failing shell command.
fn write_session(projects_dir: &Path) {
    let noisy_error = "error[E0425]: cannot find value `limit` in this scope\n".repeat(60);
    let bucket = format!(
        "pub struct Bucket {{ tokens: u32 }}\n{}",
        "// refill one token per tick of the limiter clock\n".repeat(12)
    );
    let layer = format!(
        "let app = Router::new().layer(limit);\n{}",
        "// every route passes through the limiter layer\n".repeat(12)
    );
    let lines = [
        entry("user", "2026-03-01T09:00:00Z", json!("Add rate limiting to the API")),
        entry(
            "assistant",
            "2026-03-01T09:00:05Z",
            json!([
                {"type": "text", "text": "I will put a token bucket in src/limit.rs and check it on every request."},
                {"type": "tool_use", "id": "t1", "name": "Write",
                 "input": {"file_path": "src/limit.rs", "content": bucket}}
            ]),
        ),
        entry(
            "user",
            "2026-03-01T09:00:06Z",
            json!([{"type": "tool_result", "tool_use_id": "t1", "content": "File created successfully"}]),
        ),
        entry("user", "2026-03-01T09:01:00Z", json!("Now wire it into the router")),
        entry(
            "assistant",
            "2026-03-01T09:01:10Z",
            json!([{"type": "tool_use", "id": "t2", "name": "Bash", "input": {"command": "cargo test"}}]),
        ),
        entry(
            "user",
            "2026-03-01T09:01:40Z",
            json!([{"type": "tool_result", "tool_use_id": "t2", "is_error": true, "content": noisy_error}]),
        ),
        entry(
            "assistant",
            "2026-03-01T09:02:00Z",
            json!([{"type": "tool_use", "id": "t3", "name": "Edit",
                    "input": {"file_path": "src/router.rs",
                              "old_string": "let app = Router::new();",
                              "new_string": layer}}]),
        ),
        entry(
            "user",
            "2026-03-01T09:02:01Z",
            json!([{"type": "tool_result", "tool_use_id": "t3", "content": "File updated"}]),
        ),
        entry("user", "2026-03-01T09:03:00Z", json!("Run the tests again please")),
        entry("assistant", "2026-03-01T09:04:00Z", json!("All tests pass now.")),
    ];

    let dir = projects_dir.join("-nonexistent-limiter");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("sess-e2e.jsonl"), lines.join("\n") + "\n").unwrap();
}

fn config(tmp: &TempDir) -> SidecarConfig {
    SidecarConfig {
        data_dir: tmp.path().join("data"),
        projects_dir: tmp.path().join("projects"),
        budget_bytes: 500,
        ..Default::default()
    }
}

#[test]
fn reduction_keeps_writes_and_boundary_messages() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    write_session(&cfg.projects_dir);
    let pipeline = BriefingPipeline::new(cfg, ScriptedProvider::new(&[])).unwrap();

    let (session, reduced) = pipeline.reduce(&SessionQuery::latest()).unwrap();
    assert_eq!(session.events.len(), 11);
    assert!(reduced.excerpt_bytes() <= 500);

    let kept = reduced.excerpt_indices();
    // first message, both writes, last message
    for index in [0, 2, 7, 10] {
        assert!(kept.contains(&index), "event {index} dropped: kept {kept:?}");
    }
    let mut sorted = kept.clone();
    sorted.sort_unstable();
    assert_eq!(kept, sorted);

    for index in [2, 7] {
        let write = reduced.excerpts.iter().find(|e| e.index == index).unwrap();
        assert!(write.truncated_bytes > 0, "event {index} should be shortened to fit");
    }

    let rendered = reduced.render();
    assert!(rendered.contains("WRITE: Write src/limit.rs"));
    assert!(rendered.contains("WRITE: Edit src/router.rs"));
    assert!(rendered.contains("[10] ASSISTANT: All tests pass now."));
}

#[tokio::test]
async fn malformed_output_is_repaired_once_and_stored() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    write_session(&cfg.projects_dir);
    let provider = ScriptedProvider::new(&[MALFORMED, REPAIRED]);
    let pipeline = BriefingPipeline::new(cfg, provider.clone()).unwrap();

    let briefing = pipeline.analyze(&SessionQuery::latest()).await.unwrap();

    let calls = provider.calls();
    assert_eq!(calls.len(), 2);
    let diff_at = calls[0].find("## CODEBASE DIFF").unwrap();
    let conv_at = calls[0].find("## CONVERSATION").unwrap();
    assert!(diff_at < conv_at);
    assert!(calls[0].contains("+pub struct Bucket { tokens: u32 }"));
    assert!(calls[1].contains(MALFORMED));

    let s = &briefing.sections;
    assert!(!s.summary_of_changes.is_empty());
    assert!(!s.architecture_notes.is_empty());
    assert_eq!(s.patterns.len(), 1);
    assert_eq!(s.risks[0].severity, Severity::High);
    assert_eq!(s.concepts.len(), 1);
    for text in [&s.summary_of_changes, &s.architecture_notes] {
        assert!(!text.contains("```"));
        assert!(!text.contains("Previous response"));
    }

    assert_eq!(briefing.session_id.as_str(), "sess-e2e");
    assert_eq!(briefing.project_path.as_deref(), Some("/nonexistent/limiter"));
    assert_eq!(briefing.source.budget_bytes, 500);
    assert_eq!(briefing.source.reduced_sha256.len(), 64);

    let stored = pipeline.store().get(&briefing.session_id).unwrap();
    assert_eq!(stored, briefing);
    let insights = pipeline.store().insights().unwrap();
    assert_eq!(insights.briefing_count, 1);
    assert_eq!(insights.patterns[0].name, "token bucket");

    let status = pipeline.status().unwrap();
    assert_eq!(status.session_count, 1);
    assert_eq!(status.briefing_count, 1);
    assert_eq!(status.projects, vec!["/nonexistent/limiter".to_string()]);
}

#[tokio::test]
async fn schema_violation_after_repair_stores_nothing() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    write_session(&cfg.projects_dir);
    let provider = ScriptedProvider::new(&[MALFORMED, "still not json", REPAIRED]);
    let pipeline = BriefingPipeline::new(cfg, provider.clone()).unwrap();

    let err = pipeline.analyze(&SessionQuery::latest()).await.unwrap_err();
    assert!(matches!(
        err,
        sidecar_core::SidecarError::Generation(GenerationError::SchemaViolation(_))
    ));
    assert_eq!(provider.calls().len(), 2);
    assert_eq!(pipeline.store().count().unwrap(), 0);
}

#[tokio::test]
async fn latest_briefed_finds_the_analyzed_session() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    write_session(&cfg.projects_dir);
    let pipeline = BriefingPipeline::new(cfg, ScriptedProvider::new(&[REPAIRED])).unwrap();
    pipeline.analyze(&SessionQuery::latest()).await.unwrap();

    let query = SessionQuery {
        selector: SessionSelector::LatestBriefed,
        project_path: Some("/nonexistent/limiter".into()),
    };
    let (session, _) = pipeline.reduce(&query).unwrap();
    assert_eq!(session.id.as_str(), "sess-e2e");
}

#[test]
fn diff_falls_back_to_tool_calls_outside_git() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(&tmp);
    write_session(&cfg.projects_dir);
    let pipeline = BriefingPipeline::new(cfg.clone(), ScriptedProvider::new(&[])).unwrap();
    let (session, _) = pipeline.reduce(&SessionQuery::latest()).unwrap();

    let diff = sidecar_capture::capture_diff(
        session.project_path.as_deref().map(Path::new),
        &session,
        cfg.diff_cap_bytes,
    );
    assert_eq!(diff.source, DiffSource::ToolCalls);
    let paths: Vec<&str> = diff.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["src/limit.rs", "src/router.rs"]);
}

//! Turns a reduced transcript into a validated [`Briefing`].
//!
//! A generation runs as a small state machine:
//!
//! ```text
//! Pending ──valid──────────────► Succeeded
//!    │
//!    └─invalid─► Repairing ──valid──► Succeeded
//!                    └──invalid─────► Failed(SchemaViolation)
//! ```
//!
//! `Repairing` only moves to a terminal state, so the model is called at most
//! twice per briefing. Transport failures and timeouts end the run from any
//! state and are never repaired.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use sidecar_capture::ReducedTranscript;
use sidecar_core::error::GenerationError;
use sidecar_core::model::{Briefing, BriefingSections, CodeDiff, SessionRef};

use crate::provider::GenerationProvider;

const INSTRUCTION: &str = "\
You are reviewing a developer's coding session with an AI assistant and writing
a post-session briefing for the developer.

You have two sources:
1. CODEBASE DIFF: what actually changed in the code. This is the ground truth.
2. CONVERSATION: excerpts of the session. It explains why things changed.

When the two disagree, trust the diff. Be specific: name real files, functions
and types from the diff and the conversation. Never be generic.

Produce exactly five fields:
- summary_of_changes: 2-3 sentences on what was built or changed.
- architecture_notes: 2-3 sentences on how the changed pieces connect.
- patterns: design or coding patterns used, with file locations.
- risks: what is most likely to cause problems later, with a severity.
- concepts: technical concepts touched and whether the developer understood them.

Use an empty string or an empty list for anything the sources do not support.
Do not guess. Respond with ONLY the JSON object, no markdown fencing.";

const REPAIR_INSTRUCTION: &str = "\
Your previous response could not be used because it does not match the required
JSON schema. Fix it so it matches the schema exactly. Keep the content, change
only the structure. Respond with ONLY the corrected JSON object, no markdown
fencing and no commentary.";

/// Generation progress. Each call to the model moves the run one step.
#[derive(Debug)]
enum GenerationState {
    Pending,
    Repairing { output: String, problem: String },
    Succeeded(BriefingSections),
    Failed(GenerationError),
}

/// JSON Schema of the five briefing sections, derived from the section types.
pub fn schema() -> Value {
    schemars::schema_for!(BriefingSections).to_value()
}

/// Parse model text into validated sections. `Err` carries the problem in a
/// form that can be shown back to the model.
pub fn parse_sections(text: &str) -> Result<BriefingSections, String> {
    let json = strip_fences(text);
    let sections: BriefingSections =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON for the schema: {e}"))?;
    sections.validate()?;
    Ok(sections)
}

/// Drop a surrounding ```json fence and any prose around the outermost object.
fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        s = s.trim_end().strip_suffix("```").unwrap_or(s).trim();
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

pub struct BriefingGenerator {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
    schema: Value,
}

impl BriefingGenerator {
    pub fn new(provider: Arc<dyn GenerationProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            schema: schema(),
        }
    }

    /// The extraction request for a reduced transcript and optional diff.
    pub fn instruction(&self, reduced: &ReducedTranscript, diff: Option<&CodeDiff>) -> String {
        let diff_text = match diff {
            Some(d) if !d.is_empty() => d.render(),
            _ => "(no code changes captured)\n".to_string(),
        };
        format!(
            "{INSTRUCTION}\n\n## CODEBASE DIFF\n\n{diff_text}\n## CONVERSATION\n\n{}",
            reduced.render()
        )
    }

    /// Generate and stamp a briefing. Never returns partially-populated sections.
    pub async fn generate(
        &self,
        reduced: &ReducedTranscript,
        diff: Option<&CodeDiff>,
    ) -> Result<Briefing, GenerationError> {
        let instruction = self.instruction(reduced, diff);
        let mut state = GenerationState::Pending;

        let sections = loop {
            state = match state {
                GenerationState::Pending => {
                    let output = self.call(&instruction).await?;
                    match parse_sections(&output) {
                        Ok(sections) => GenerationState::Succeeded(sections),
                        Err(problem) => {
                            tracing::warn!(
                                session = %reduced.session_id,
                                %problem,
                                "Model output rejected, attempting repair"
                            );
                            GenerationState::Repairing { output, problem }
                        }
                    }
                }
                GenerationState::Repairing { output, problem } => {
                    let repaired = self.call(&repair_instruction(&output, &problem)).await?;
                    match parse_sections(&repaired) {
                        Ok(sections) => GenerationState::Succeeded(sections),
                        Err(problem) => {
                            GenerationState::Failed(GenerationError::SchemaViolation(problem))
                        }
                    }
                }
                GenerationState::Succeeded(sections) => break sections,
                GenerationState::Failed(err) => {
                    tracing::error!(session = %reduced.session_id, "Briefing generation failed: {err}");
                    return Err(err);
                }
            };
        };

        tracing::info!(
            session = %reduced.session_id,
            provider = self.provider.name(),
            patterns = sections.patterns.len(),
            risks = sections.risks.len(),
            "Briefing generated"
        );

        Ok(Briefing {
            session_id: reduced.session_id.clone(),
            project_path: reduced.project_path.clone(),
            sections,
            generated_at: Utc::now(),
            source: SessionRef {
                session_id: reduced.session_id.clone(),
                transcript_path: reduced.transcript_path.clone(),
                reduced_sha256: reduced.fingerprint(),
                budget_bytes: reduced.budget_bytes,
                excerpt_count: reduced.excerpts.len(),
            },
        })
    }

    async fn call(&self, instruction: &str) -> Result<String, GenerationError> {
        tokio::time::timeout(self.timeout, self.provider.invoke(instruction, &self.schema))
            .await
            .map_err(|_| GenerationError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })?
    }
}

fn repair_instruction(output: &str, problem: &str) -> String {
    format!("{REPAIR_INSTRUCTION}\n\nProblem: {problem}\n\nPrevious response:\n{output}\n")
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sidecar_core::model::{
        DiffSource, EventKind, FileChangeType, FileDiff, RawEvent, Session, SessionId, Severity,
    };

    use super::*;

    /// Replays canned responses and records every instruction it receives.
    struct Scripted {
        responses: Mutex<VecDeque<Result<String, GenerationError>>>,
        calls: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        async fn invoke(&self, instruction: &str, _schema: &Value) -> Result<String, GenerationError> {
            self.calls.lock().unwrap().push(instruction.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Transport("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    const VALID: &str = r#"{
        "summary_of_changes": "Added a token bucket in src/limit.rs.",
        "architecture_notes": "The router calls Bucket::take before each handler.",
        "patterns": [{"name": "token bucket", "locations": [{"file": "src/limit.rs", "lines": {"start": 1, "end": 20}}], "explanation": "Smooths bursts."}],
        "risks": [{"description": "Bucket is per-process, not shared across replicas", "severity": "high"}],
        "concepts": [{"concept": "rate limiting", "evidence": "Asked for per-route limits", "understood": "yes"}]
    }"#;

    fn reduced() -> ReducedTranscript {
        let session = Session::new(
            SessionId::parse("sess-gen").unwrap(),
            Some("/work/api".into()),
            PathBuf::from("/p/sess-gen.jsonl"),
            vec![RawEvent::new(
                None,
                EventKind::UserMessage {
                    text: "Add rate limiting".into(),
                },
            )],
        );
        sidecar_capture::reduce(&session, 1_000, &Default::default())
    }

    fn generator(provider: Arc<Scripted>) -> BriefingGenerator {
        BriefingGenerator::new(provider, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_valid_output_needs_one_call() {
        let provider = Scripted::new(vec![Ok(VALID.into())]);
        let briefing = generator(provider.clone()).generate(&reduced(), None).await.unwrap();
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(briefing.sections.risks[0].severity, Severity::High);
        assert_eq!(briefing.session_id.as_str(), "sess-gen");
        assert_eq!(briefing.project_path.as_deref(), Some("/work/api"));
        assert_eq!(briefing.source.reduced_sha256, reduced().fingerprint());
        assert_eq!(briefing.source.excerpt_count, 1);
    }

    #[tokio::test]
    async fn test_fenced_output_is_accepted() {
        let fenced = format!("```json\n{VALID}\n```");
        let provider = Scripted::new(vec![Ok(fenced)]);
        let briefing = generator(provider.clone()).generate(&reduced(), None).await.unwrap();
        assert_eq!(provider.calls().len(), 1);
        assert!(!briefing.sections.summary_of_changes.contains("```"));
    }

    #[tokio::test]
    async fn test_malformed_then_repaired() {
        let broken = r#"{"summary_of_changes": "Added a token bucket","#;
        let provider = Scripted::new(vec![Ok(broken.into()), Ok(VALID.into())]);
        let briefing = generator(provider.clone()).generate(&reduced(), None).await.unwrap();

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains(broken));
        assert!(calls[1].starts_with(REPAIR_INSTRUCTION));
        assert_eq!(briefing.sections, parse_sections(VALID).unwrap());
    }

    #[tokio::test]
    async fn test_second_failure_is_schema_violation() {
        let provider = Scripted::new(vec![
            Ok("not json".into()),
            Ok(r#"{"summary_of_changes": 3}"#.into()),
            Ok(VALID.into()),
        ]);
        let err = generator(provider.clone())
            .generate(&reduced(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::SchemaViolation(_)));
        assert!(!err.is_retryable());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_triggers_repair() {
        let empty_name = VALID.replace("\"token bucket\"", "\"  \"");
        let provider = Scripted::new(vec![Ok(empty_name), Ok(VALID.into())]);
        generator(provider.clone()).generate(&reduced(), None).await.unwrap();
        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("patterns[0].name is empty"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_repaired() {
        let provider = Scripted::new(vec![Err(GenerationError::Transport("503".into()))]);
        let err = generator(provider.clone())
            .generate(&reduced(), None)
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Transport("503".into()));
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_without_retry() {
        let provider = Arc::new(Scripted {
            responses: Mutex::new(vec![Ok(VALID.to_string())].into()),
            calls: Mutex::new(Vec::new()),
            delay: Some(Duration::from_secs(30)),
        });
        let generator = BriefingGenerator::new(provider.clone(), Duration::from_millis(20));
        let err = generator.generate(&reduced(), None).await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout { after_ms: 20 });
        assert_eq!(provider.calls().len(), 1);
    }

    #[test]
    fn test_instruction_puts_diff_before_conversation() {
        let generator = generator(Scripted::new(vec![]));
        let mut diff = CodeDiff {
            source: DiffSource::Git,
            files: vec![FileDiff {
                path: "src/limit.rs".into(),
                change_type: FileChangeType::Created,
                additions: 1,
                deletions: 0,
                patch: "+pub struct Bucket;\n".into(),
            }],
            ..Default::default()
        };
        diff.recount();
        let text = generator.instruction(&reduced(), Some(&diff));
        let diff_at = text.find("## CODEBASE DIFF").unwrap();
        let conv_at = text.find("## CONVERSATION").unwrap();
        assert!(diff_at < conv_at);
        assert!(text.contains("+pub struct Bucket;"));
        assert!(text.contains("[0] USER: Add rate limiting"));

        let without = generator.instruction(&reduced(), None);
        assert!(without.contains("(no code changes captured)"));
    }

    #[test]
    fn test_schema_names_all_five_sections() {
        let schema = schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        for field in [
            "summary_of_changes",
            "architecture_notes",
            "patterns",
            "risks",
            "concepts",
        ] {
            assert!(required.contains(&field), "{field} missing from schema");
        }
    }

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_fences("Here you go: {\"a\":1} hope that helps"), "{\"a\":1}");
        assert_eq!(strip_fences("nothing"), "nothing");
    }
}

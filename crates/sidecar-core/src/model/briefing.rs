use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ids::SessionId;

/// The five sections a generation model is asked to produce.
///
/// This type doubles as the extraction schema handed to the model, so the
/// field docs below are what the model reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct BriefingSections {
    /// 2-3 sentences on what was built or changed. Name actual files and functions.
    pub summary_of_changes: String,
    /// 2-3 sentences on how the changed pieces connect: what calls what, which module owns which data.
    pub architecture_notes: String,
    /// Design or coding patterns used in the changed code. Empty list if none.
    pub patterns: Vec<Pattern>,
    /// Things most likely to cause problems later. Empty list if none.
    pub risks: Vec<Risk>,
    /// Technical concepts the session touched and whether the developer showed understanding.
    pub concepts: Vec<ConceptUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Pattern {
    /// Short name of the pattern, e.g. "builder", "newtype for validated IDs".
    pub name: String,
    /// Where the pattern appears.
    pub locations: Vec<CodeLocation>,
    /// What it does and why it was used, in 1-2 sentences.
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CodeLocation {
    /// Path of the file, as it appears in the transcript or diff.
    pub file: String,
    /// Inclusive line range, or null when the lines are not known.
    #[serde(default)]
    pub lines: Option<LineRange>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Risk {
    /// The issue, where it lives, and what to check when it breaks.
    pub description: String,
    pub severity: Severity,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ConceptUsage {
    /// Name of the concept, e.g. "SQLite WAL mode".
    pub concept: String,
    /// Where the concept shows up and what in the conversation shows (or fails to show) understanding.
    pub evidence: String,
    pub understood: Understanding,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Understanding {
    Yes,
    No,
    Unclear,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl Understanding {
    fn marker(self) -> &'static str {
        match self {
            Understanding::Yes => "Y",
            Understanding::No => "N",
            Understanding::Unclear => "?",
        }
    }
}

impl BriefingSections {
    /// Structural checks serde cannot express. Returns the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        for (i, p) in self.patterns.iter().enumerate() {
            if p.name.trim().is_empty() {
                return Err(format!("patterns[{i}].name is empty"));
            }
            for (j, loc) in p.locations.iter().enumerate() {
                if loc.file.trim().is_empty() {
                    return Err(format!("patterns[{i}].locations[{j}].file is empty"));
                }
                if let Some(lines) = loc.lines {
                    if lines.start == 0 || lines.start > lines.end {
                        return Err(format!(
                            "patterns[{i}].locations[{j}].lines {}-{} is not a valid range",
                            lines.start, lines.end
                        ));
                    }
                }
            }
        }
        for (i, r) in self.risks.iter().enumerate() {
            if r.description.trim().is_empty() {
                return Err(format!("risks[{i}].description is empty"));
            }
        }
        for (i, c) in self.concepts.iter().enumerate() {
            if c.concept.trim().is_empty() {
                return Err(format!("concepts[{i}].concept is empty"));
            }
        }
        Ok(())
    }
}

/// Which session and which reduction a briefing was generated from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRef {
    pub session_id: SessionId,
    pub transcript_path: PathBuf,
    /// SHA-256 of the rendered reduced transcript sent to the model.
    pub reduced_sha256: String,
    pub budget_bytes: usize,
    pub excerpt_count: usize,
}

/// Structured summary derived from one session. At most one per session ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Briefing {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(flatten)]
    pub sections: BriefingSections,
    pub generated_at: DateTime<Utc>,
    pub source: SessionRef,
}

/// Listing row for a stored briefing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BriefingSummary {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    pub pattern_count: usize,
    pub risk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_severity: Option<Severity>,
}

impl Briefing {
    pub fn summary(&self) -> BriefingSummary {
        BriefingSummary {
            session_id: self.session_id.clone(),
            project_path: self.project_path.clone(),
            summary: self.sections.summary_of_changes.clone(),
            generated_at: self.generated_at,
            pattern_count: self.sections.patterns.len(),
            risk_count: self.sections.risks.len(),
            max_severity: self.sections.risks.iter().map(|r| r.severity).max(),
        }
    }

    /// Condensed human-readable rendering.
    ///
    /// Risks are listed most severe first; every pattern and risk entry is kept.
    pub fn to_markdown(&self) -> String {
        let s = &self.sections;
        let mut md = String::new();

        md.push_str(&format!("# Session Briefing: {}\n\n", self.session_id));
        if let Some(project) = &self.project_path {
            md.push_str(&format!("**Project:** {project}\n"));
        }
        md.push_str(&format!(
            "**Generated:** {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        md.push_str("\n## Summary\n\n");
        md.push_str(or_none(&s.summary_of_changes));
        md.push('\n');

        md.push_str("\n## How Pieces Connect\n\n");
        md.push_str(or_none(&s.architecture_notes));
        md.push('\n');

        md.push_str("\n## Patterns\n\n");
        if s.patterns.is_empty() {
            md.push_str("(none)\n");
        }
        for p in &s.patterns {
            let wheres: Vec<String> = p.locations.iter().map(format_location).collect();
            if wheres.is_empty() {
                md.push_str(&format!("- **{}**: {}\n", p.name, p.explanation));
            } else {
                md.push_str(&format!(
                    "- **{}** ({}): {}\n",
                    p.name,
                    wheres.join(", "),
                    p.explanation
                ));
            }
        }

        md.push_str("\n## Will Bite You\n\n");
        if s.risks.is_empty() {
            md.push_str("(none)\n");
        }
        let mut risks: Vec<&Risk> = s.risks.iter().collect();
        risks.sort_by(|a, b| b.severity.cmp(&a.severity));
        for r in risks {
            md.push_str(&format!("- [{}] {}\n", r.severity.label(), r.description));
        }

        md.push_str("\n## Concepts Touched\n\n");
        if s.concepts.is_empty() {
            md.push_str("(none)\n");
        }
        for c in &s.concepts {
            md.push_str(&format!(
                "- **{}** [{}]: {}\n",
                c.concept,
                c.understood.marker(),
                c.evidence
            ));
        }

        md
    }
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

fn format_location(loc: &CodeLocation) -> String {
    match loc.lines {
        Some(LineRange { start, end }) if start == end => format!("{}:{start}", loc.file),
        Some(LineRange { start, end }) => format!("{}:{start}-{end}", loc.file),
        None => loc.file.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_briefing() -> Briefing {
        Briefing {
            session_id: SessionId::parse("sess-1").unwrap(),
            project_path: Some("/work/api".into()),
            sections: BriefingSections {
                summary_of_changes: "Added token refresh to src/auth.rs.".into(),
                architecture_notes: "The handler calls TokenStore::refresh.".into(),
                patterns: vec![Pattern {
                    name: "newtype".into(),
                    locations: vec![CodeLocation {
                        file: "src/auth.rs".into(),
                        lines: Some(LineRange { start: 10, end: 24 }),
                    }],
                    explanation: "Wraps raw tokens.".into(),
                }],
                risks: vec![
                    Risk {
                        description: "Clock skew breaks expiry checks".into(),
                        severity: Severity::Medium,
                    },
                    Risk {
                        description: "Refresh token stored in plain text".into(),
                        severity: Severity::Critical,
                    },
                ],
                concepts: vec![ConceptUsage {
                    concept: "JWT expiry".into(),
                    evidence: "Asked why exp is in seconds".into(),
                    understood: Understanding::Unclear,
                }],
            },
            generated_at: "2026-02-01T12:00:00Z".parse().unwrap(),
            source: SessionRef {
                session_id: SessionId::parse("sess-1").unwrap(),
                transcript_path: PathBuf::from("/p/sess-1.jsonl"),
                reduced_sha256: "00".repeat(32),
                budget_bytes: 24_000,
                excerpt_count: 12,
            },
        }
    }

    #[test]
    fn test_briefing_serde_roundtrip_flattens_sections() {
        let briefing = sample_briefing();
        let json = serde_json::to_value(&briefing).unwrap();
        assert!(json.get("summary_of_changes").is_some());
        assert!(json.get("sections").is_none());
        let parsed: Briefing = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, briefing);
    }

    #[test]
    fn test_markdown_keeps_every_pattern_and_risk() {
        let briefing = sample_briefing();
        let md = briefing.to_markdown();
        for p in &briefing.sections.patterns {
            assert!(md.contains(&p.name));
        }
        for r in &briefing.sections.risks {
            assert!(md.contains(&r.description));
        }
        assert!(md.contains("src/auth.rs:10-24"));
        assert!(md.contains("[?]"));
    }

    #[test]
    fn test_markdown_orders_risks_by_severity() {
        let md = sample_briefing().to_markdown();
        let critical = md.find("[CRITICAL]").unwrap();
        let medium = md.find("[MEDIUM]").unwrap();
        assert!(critical < medium);
    }

    #[test]
    fn test_markdown_marks_empty_sections_explicitly() {
        let mut briefing = sample_briefing();
        briefing.sections = BriefingSections::default();
        let md = briefing.to_markdown();
        for heading in [
            "Summary",
            "How Pieces Connect",
            "Patterns",
            "Will Bite You",
            "Concepts Touched",
        ] {
            assert!(
                md.contains(&format!("## {heading}\n\n(none)\n")),
                "{heading} not marked empty:\n{md}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_line_range() {
        let mut sections = sample_briefing().sections;
        assert!(sections.validate().is_ok());
        sections.patterns[0].locations[0].lines = Some(LineRange { start: 30, end: 2 });
        let err = sections.validate().unwrap_err();
        assert!(err.contains("patterns[0].locations[0]"));
    }

    #[test]
    fn test_summary_reports_max_severity() {
        let summary = sample_briefing().summary();
        assert_eq!(summary.max_severity, Some(Severity::Critical));
        assert_eq!(summary.risk_count, 2);
        assert_eq!(summary.pattern_count, 1);
    }
}

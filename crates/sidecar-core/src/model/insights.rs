use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::briefing::{Briefing, Severity, Understanding};
use super::ids::SessionId;

/// Cross-session aggregate over every stored briefing.
///
/// Always derivable from the briefings alone; the persisted copy is a cache
/// tagged with the `(session, generated_at)` stamps it was built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InsightsIndex {
    pub briefing_count: usize,
    pub projects: Vec<String>,
    pub patterns: Vec<PatternTally>,
    pub risks: Vec<RiskTally>,
    pub concepts: Vec<ConceptTally>,
    pub architecture_notes: Vec<ArchitectureNote>,
    pub sources: Vec<BriefingStamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternTally {
    pub name: String,
    pub sessions: Vec<SessionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskTally {
    pub description: String,
    pub max_severity: Severity,
    pub sessions: Vec<SessionId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConceptTally {
    pub concept: String,
    pub understood: usize,
    pub not_understood: usize,
    pub unclear: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchitectureNote {
    pub session_id: SessionId,
    pub generated_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct BriefingStamp {
    pub session_id: SessionId,
    pub generated_at: DateTime<Utc>,
}

impl BriefingStamp {
    pub fn of(briefing: &Briefing) -> Self {
        Self {
            session_id: briefing.session_id.clone(),
            generated_at: briefing.generated_at,
        }
    }
}

impl PatternTally {
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl InsightsIndex {
    /// Aggregate a set of briefings. Input order does not matter.
    pub fn from_briefings(briefings: &[Briefing]) -> Self {
        let mut ordered: Vec<&Briefing> = briefings.iter().collect();
        ordered.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        let mut projects = BTreeSet::new();
        let mut patterns: BTreeMap<String, PatternTally> = BTreeMap::new();
        let mut risks: BTreeMap<String, RiskTally> = BTreeMap::new();
        let mut concepts: BTreeMap<String, ConceptTally> = BTreeMap::new();
        let mut architecture_notes = Vec::new();

        for b in &ordered {
            if let Some(p) = &b.project_path {
                projects.insert(p.clone());
            }

            for p in &b.sections.patterns {
                let tally = patterns.entry(normalize(&p.name)).or_insert_with(|| PatternTally {
                    name: p.name.trim().to_string(),
                    sessions: Vec::new(),
                });
                if !tally.sessions.contains(&b.session_id) {
                    tally.sessions.push(b.session_id.clone());
                }
            }

            for r in &b.sections.risks {
                let tally = risks
                    .entry(normalize(&r.description))
                    .or_insert_with(|| RiskTally {
                        description: r.description.trim().to_string(),
                        max_severity: r.severity,
                        sessions: Vec::new(),
                    });
                tally.max_severity = tally.max_severity.max(r.severity);
                if !tally.sessions.contains(&b.session_id) {
                    tally.sessions.push(b.session_id.clone());
                }
            }

            for c in &b.sections.concepts {
                let tally = concepts
                    .entry(normalize(&c.concept))
                    .or_insert_with(|| ConceptTally {
                        concept: c.concept.trim().to_string(),
                        ..Default::default()
                    });
                match c.understood {
                    Understanding::Yes => tally.understood += 1,
                    Understanding::No => tally.not_understood += 1,
                    Understanding::Unclear => tally.unclear += 1,
                }
            }

            if !b.sections.architecture_notes.trim().is_empty() {
                architecture_notes.push(ArchitectureNote {
                    session_id: b.session_id.clone(),
                    generated_at: b.generated_at,
                    note: b.sections.architecture_notes.clone(),
                });
            }
        }

        let mut patterns: Vec<PatternTally> = patterns.into_values().collect();
        patterns.sort_by(|a, b| b.count().cmp(&a.count()).then_with(|| a.name.cmp(&b.name)));

        let mut risks: Vec<RiskTally> = risks.into_values().collect();
        risks.sort_by(|a, b| {
            b.max_severity
                .cmp(&a.max_severity)
                .then_with(|| b.sessions.len().cmp(&a.sessions.len()))
                .then_with(|| a.description.cmp(&b.description))
        });

        architecture_notes.sort_by(|a, b| {
            a.generated_at
                .cmp(&b.generated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        let mut sources: Vec<BriefingStamp> = ordered.iter().map(|b| BriefingStamp::of(b)).collect();
        sources.sort();

        Self {
            briefing_count: ordered.len(),
            projects: projects.into_iter().collect(),
            patterns,
            risks,
            concepts: concepts.into_values().collect(),
            architecture_notes,
            sources,
        }
    }

    /// Patterns seen in more than one session.
    pub fn recurring_patterns(&self) -> impl Iterator<Item = &PatternTally> {
        self.patterns.iter().filter(|p| p.count() > 1)
    }

    /// Whether this index was built from exactly the given briefings.
    pub fn is_current_for(&self, stamps: &[BriefingStamp]) -> bool {
        let mut stamps = stamps.to_vec();
        stamps.sort();
        self.sources == stamps
    }
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::briefing::{BriefingSections, ConceptUsage, Pattern, Risk, SessionRef};

    fn briefing(id: &str, at: &str, patterns: &[&str], risks: &[(&str, Severity)]) -> Briefing {
        let session_id = SessionId::parse(id).unwrap();
        Briefing {
            session_id: session_id.clone(),
            project_path: Some("/work/api".into()),
            sections: BriefingSections {
                summary_of_changes: format!("changes in {id}"),
                architecture_notes: format!("notes for {id}"),
                patterns: patterns
                    .iter()
                    .map(|name| Pattern {
                        name: name.to_string(),
                        locations: Vec::new(),
                        explanation: String::new(),
                    })
                    .collect(),
                risks: risks
                    .iter()
                    .map(|(d, s)| Risk {
                        description: d.to_string(),
                        severity: *s,
                    })
                    .collect(),
                concepts: vec![ConceptUsage {
                    concept: "Borrow checker".into(),
                    evidence: String::new(),
                    understood: if id == "a" {
                        Understanding::Yes
                    } else {
                        Understanding::No
                    },
                }],
            },
            generated_at: at.parse().unwrap(),
            source: SessionRef {
                session_id,
                transcript_path: PathBuf::from("/t"),
                reduced_sha256: String::new(),
                budget_bytes: 0,
                excerpt_count: 0,
            },
        }
    }

    #[test]
    fn test_patterns_counted_once_per_session_case_insensitive() {
        let briefings = vec![
            briefing("a", "2026-01-01T00:00:00Z", &["Builder", "builder"], &[]),
            briefing("b", "2026-01-02T00:00:00Z", &["builder ", "RAII guard"], &[]),
        ];
        let index = InsightsIndex::from_briefings(&briefings);
        assert_eq!(index.patterns[0].name, "Builder");
        assert_eq!(index.patterns[0].count(), 2);
        let recurring: Vec<_> = index.recurring_patterns().map(|p| p.name.as_str()).collect();
        assert_eq!(recurring, vec!["Builder"]);
    }

    #[test]
    fn test_risks_keep_highest_severity() {
        let briefings = vec![
            briefing("a", "2026-01-01T00:00:00Z", &[], &[("No retry on 429", Severity::Low)]),
            briefing("b", "2026-01-02T00:00:00Z", &[], &[("no retry on 429", Severity::High)]),
        ];
        let index = InsightsIndex::from_briefings(&briefings);
        assert_eq!(index.risks.len(), 1);
        assert_eq!(index.risks[0].max_severity, Severity::High);
        assert_eq!(index.risks[0].sessions.len(), 2);
    }

    #[test]
    fn test_rebuild_is_order_independent() {
        let a = briefing("a", "2026-01-01T00:00:00Z", &["x"], &[]);
        let b = briefing("b", "2026-01-02T00:00:00Z", &["y"], &[]);
        let forward = InsightsIndex::from_briefings(&[a.clone(), b.clone()]);
        let backward = InsightsIndex::from_briefings(&[b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_concept_tallies_and_currency() {
        let briefings = vec![
            briefing("a", "2026-01-01T00:00:00Z", &[], &[]),
            briefing("b", "2026-01-02T00:00:00Z", &[], &[]),
        ];
        let index = InsightsIndex::from_briefings(&briefings);
        assert_eq!(index.concepts[0].understood, 1);
        assert_eq!(index.concepts[0].not_understood, 1);

        let stamps: Vec<_> = briefings.iter().rev().map(BriefingStamp::of).collect();
        assert!(index.is_current_for(&stamps));
        assert!(!index.is_current_for(&stamps[..1]));
    }

    #[test]
    fn test_empty_index() {
        let index = InsightsIndex::from_briefings(&[]);
        assert_eq!(index.briefing_count, 0);
        assert!(index.is_current_for(&[]));
    }
}

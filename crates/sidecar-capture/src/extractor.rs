use serde::Serialize;

/// Phrases that mark an assistant message as explaining a choice.
const DECISION_PHRASES: &[&str] = &[
    "decided to",
    "i'll use",
    "i will use",
    "chose ",
    "instead of",
    "rather than",
    "tried ",
    "didn't work",
    "because",
    "trade-off",
    "tradeoff",
    "the issue is",
    "the problem is",
    "root cause",
    "the fix is",
    "going with",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Decision {
    pub description: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeadEnd {
    pub approach: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ExtractedInsights {
    pub decisions: Vec<Decision>,
    pub dead_ends: Vec<DeadEnd>,
}

/// Whether text reads like reasoning about a choice rather than routine narration.
pub fn has_decision_language(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    DECISION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Best-effort extraction of decisions and rejected approaches from assistant text.
///
/// Heuristic: looks line by line for "decided to X because Y", "chose X over Y",
/// "tried X but Y", "rejected X because Y", "X didn't work" and "A instead of B".
pub fn extract_insights<'a>(texts: impl IntoIterator<Item = &'a str>) -> ExtractedInsights {
    let mut insights = ExtractedInsights::default();

    for text in texts {
        for line in text.lines() {
            let trimmed = line.trim().trim_start_matches(['-', '*', ' ']);
            if trimmed.len() < 10 {
                continue;
            }
            // ASCII lowering keeps byte offsets aligned with `trimmed`.
            let lower = trimmed.to_ascii_lowercase();

            if let Some(d) = try_extract_decision(&lower, trimmed) {
                if !insights.decisions.contains(&d) {
                    insights.decisions.push(d);
                }
            }
            if let Some(de) = try_extract_dead_end(&lower, trimmed) {
                if !insights.dead_ends.contains(&de) {
                    insights.dead_ends.push(de);
                }
            }
        }
    }

    insights
}

fn try_extract_dead_end(lower: &str, original: &str) -> Option<DeadEnd> {
    // "tried X but Y"
    if let Some(start) = lower.find("tried ") {
        let rest = start + "tried ".len();
        if let Some(but) = lower[rest..].find(" but ") {
            let split = rest + but;
            return Some(DeadEnd {
                approach: clean(&original[rest..split]),
                reason: clean(&original[split + " but ".len()..]),
            });
        }
    }

    // "rejected X because Y" / "rejected X: Y"
    if let Some(start) = lower.find("rejected ") {
        let rest = start + "rejected ".len();
        let tail = &lower[rest..];
        if let Some((pos, sep)) = tail
            .find(" because ")
            .map(|p| (p, " because ".len()))
            .or_else(|| tail.find(": ").map(|p| (p, 2)))
        {
            return Some(DeadEnd {
                approach: clean(&original[rest..rest + pos]),
                reason: clean(&original[rest + pos + sep..]),
            });
        }
    }

    // "X didn't work because Y"
    if let Some(pos) = lower.find(" didn't work") {
        let approach = &original[..pos];
        let after = pos + " didn't work".len();
        let reason = ["because ", ": "]
            .iter()
            .find_map(|sep| {
                lower[after..]
                    .trim_start()
                    .strip_prefix(sep)
                    .map(|r| original[original.len() - r.len()..].to_string())
            })
            .unwrap_or_else(|| "did not work as expected".to_string());
        if !approach.trim().is_empty() && approach.len() < 80 {
            return Some(DeadEnd {
                approach: clean(approach),
                reason: clean(&reason),
            });
        }
    }

    // "A instead of B": only on short summary-like lines
    if original.len() < 120 {
        if let Some(pos) = lower.find("instead of ") {
            let approach = &original[pos + "instead of ".len()..];
            let chosen = &original[..pos];
            if !approach.trim().is_empty() && approach.len() < 80 && !chosen.trim().is_empty() {
                return Some(DeadEnd {
                    approach: clean(approach),
                    reason: format!("chose {} instead", clean(chosen)),
                });
            }
        }
    }

    None
}

fn try_extract_decision(lower: &str, original: &str) -> Option<Decision> {
    // "decided to X because Y"
    if let Some(start) = lower.find("decided to ") {
        let rest = start + "decided to ".len();
        if let Some(pos) = lower[rest..].find(" because ") {
            return Some(Decision {
                description: clean(&original[rest..rest + pos]),
                rationale: clean(&original[rest + pos + " because ".len()..]),
            });
        }
    }

    // "chose X over Y": short lines only
    if original.len() < 120 {
        if let Some(start) = lower.find("chose ") {
            let rest = start + "chose ".len();
            if let Some(pos) = lower[rest..].find(" over ") {
                return Some(Decision {
                    description: clean(&original[rest..rest + pos]),
                    rationale: clean(original),
                });
            }
        }
    }

    None
}

fn clean(s: &str) -> String {
    s.trim().trim_end_matches(['.', ',', ';']).trim().to_string()
}

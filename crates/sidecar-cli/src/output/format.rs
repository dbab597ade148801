use sidecar_briefing::PipelineStatus;
use sidecar_capture::{ReducedTranscript, SessionInfo};
use sidecar_core::model::{Briefing, BriefingSummary, InsightsIndex, PromptTemplate};

use super::OutputFormat;

const SUMMARY_WIDTH: usize = 72;

pub fn format_briefing(briefing: &Briefing, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(briefing).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => briefing.to_markdown(),
    }
}

pub fn format_briefing_list(summaries: &[BriefingSummary], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(summaries).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            if summaries.is_empty() {
                return "No briefings found.\n".to_string();
            }
            let mut out = String::new();
            for b in summaries {
                let severity = b
                    .max_severity
                    .map(|s| format!(" [{}]", s.label()))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "\u{25c6} {} {}{severity}  {}\n",
                    b.session_id.short(),
                    clip(&b.summary, SUMMARY_WIDTH),
                    b.generated_at.format("%Y-%m-%d %H:%M")
                ));
            }
            out
        }
    }
}

pub fn format_sessions(sessions: &[SessionInfo], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(sessions).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            if sessions.is_empty() {
                return "No sessions found.\n".to_string();
            }
            let mut out = String::new();
            for s in sessions {
                let when = s
                    .ended_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let prompt = s.first_prompt.as_deref().unwrap_or("(no prompt)");
                out.push_str(&format!(
                    "\u{25c6} {} {} ({} msgs)  {when}\n",
                    s.id,
                    clip(prompt, SUMMARY_WIDTH),
                    s.message_count
                ));
                if let Some(project) = &s.project_path {
                    out.push_str(&format!("    {project}\n"));
                }
            }
            out
        }
    }
}

pub fn format_reduced(reduced: &ReducedTranscript, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(reduced).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            let mut out = reduced.render();
            out.push_str(&format!(
                "\n({} of {} budget bytes used)\n",
                reduced.excerpt_bytes(),
                reduced.budget_bytes
            ));
            out
        }
    }
}

pub fn format_insights(insights: &InsightsIndex, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(insights).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => format_insights_text(insights),
    }
}

fn format_insights_text(insights: &InsightsIndex) -> String {
    if insights.briefing_count == 0 {
        return "No briefings yet. Run `sidecar analyze` first.\n".to_string();
    }

    let mut out = format!(
        "# Insights across {} briefings ({} projects)\n",
        insights.briefing_count,
        insights.projects.len()
    );

    if !insights.patterns.is_empty() {
        out.push_str("\n## Patterns\n\n");
        for p in &insights.patterns {
            out.push_str(&format!("- {} (x{})\n", p.name, p.count()));
        }
    }
    if !insights.risks.is_empty() {
        out.push_str("\n## Risks\n\n");
        for r in &insights.risks {
            out.push_str(&format!(
                "- [{}] {} (x{})\n",
                r.max_severity.label(),
                r.description,
                r.sessions.len()
            ));
        }
    }
    if !insights.concepts.is_empty() {
        out.push_str("\n## Concepts\n\n");
        for c in &insights.concepts {
            out.push_str(&format!(
                "- {}: understood {}, not understood {}, unclear {}\n",
                c.concept, c.understood, c.not_understood, c.unclear
            ));
        }
    }
    out
}

pub fn format_prompt(prompt: &PromptTemplate, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(prompt).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            let mut out = format!("Prompt:    {}\n", prompt.name);
            if let Some(category) = &prompt.category {
                out.push_str(&format!("Category:  {category}\n"));
            }
            if !prompt.variables.is_empty() {
                out.push_str(&format!("Variables: {}\n", prompt.variables.join(", ")));
            }
            out.push_str(&format!("Used:      {} times\n", prompt.use_count));
            out.push_str(&format!("\n{}\n", prompt.body));
            out
        }
    }
}

pub fn format_prompt_list(prompts: &[PromptTemplate], fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(prompts).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            if prompts.is_empty() {
                return "No prompts found.\n".to_string();
            }
            let mut out = String::new();
            for p in prompts {
                let category = p
                    .category
                    .as_deref()
                    .map(|c| format!(" [{c}]"))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "\u{25c6} {}{category} {}  used {}x\n",
                    p.name,
                    clip(&p.body, SUMMARY_WIDTH),
                    p.use_count
                ));
            }
            out
        }
    }
}

pub fn format_status(status: &PipelineStatus, fmt: OutputFormat) -> String {
    match fmt {
        OutputFormat::Json => serde_json::to_string_pretty(status).unwrap_or_default(),
        OutputFormat::Text | OutputFormat::Markdown => {
            let mut out = String::from("Sidecar Status\n==============\n");
            out.push_str(&format!("Data dir:        {}\n", status.data_dir.display()));
            out.push_str(&format!("Transcripts dir: {}\n", status.projects_dir.display()));
            out.push_str(&format!("Sessions:        {}\n", status.session_count));
            out.push_str(&format!("Briefings:       {}\n", status.briefing_count));
            out.push_str(&format!("Projects:        {}\n", status.projects.len()));
            out.push_str(&format!("Recurring patterns: {}\n", status.recurring_patterns));
            out.push_str(&format!("Tracked risks:   {}\n", status.tracked_risks));
            if let Some(at) = status.last_briefing_at {
                out.push_str(&format!(
                    "Last briefing:   {}\n",
                    at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
            out
        }
    }
}

/// First line of `text`, cut to `width` characters.
fn clip(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.chars().count() <= width {
        return line.to_string();
    }
    let cut: String = line.chars().take(width.saturating_sub(3)).collect();
    format!("{cut}...")
}

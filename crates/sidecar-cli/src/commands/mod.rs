pub mod analyze;
pub mod briefing;
pub mod insights;
pub mod prompt;
pub mod reduce;
pub mod sessions;
pub mod status;

use clap::{Args, Subcommand};
use sidecar_capture::{SessionQuery, SessionSelector};
use sidecar_core::model::SessionId;

#[derive(Subcommand)]
pub enum Commands {
    /// Generate and store a briefing for a session
    Analyze(analyze::AnalyzeArgs),
    /// Show the reduced transcript that would be sent for a session
    Reduce(reduce::ReduceArgs),
    /// List session transcripts (most recent first)
    Sessions(sessions::SessionsArgs),
    /// Show, list or delete stored briefings
    #[command(subcommand)]
    Briefing(briefing::BriefingCommand),
    /// Show patterns, risks and concepts across all briefings
    Insights(insights::InsightsArgs),
    /// Manage reusable prompt templates
    #[command(subcommand)]
    Prompt(prompt::PromptCommand),
    /// Show counts for sessions, briefings and projects
    Status,
}

/// Which session a command works on.
#[derive(Args, Debug, Clone)]
pub struct SelectorArgs {
    /// Session ID (defaults to the most recent session)
    #[arg(short, long, conflicts_with = "latest_briefed")]
    pub session: Option<String>,

    /// Use the session of the most recently generated briefing
    #[arg(long)]
    pub latest_briefed: bool,

    /// Only consider sessions of this project path
    #[arg(short, long)]
    pub project: Option<String>,
}

impl SelectorArgs {
    pub fn query(&self) -> anyhow::Result<SessionQuery> {
        let selector = match (&self.session, self.latest_briefed) {
            (Some(id), _) => SessionSelector::Id(SessionId::parse(id.as_str())?),
            (None, true) => SessionSelector::LatestBriefed,
            (None, false) => SessionSelector::Latest,
        };
        Ok(SessionQuery {
            selector,
            project_path: self.project.clone(),
        })
    }
}

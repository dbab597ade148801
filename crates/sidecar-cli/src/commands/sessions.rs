use anyhow::{Context, Result};
use clap::Args;
use sidecar_capture::TranscriptLocator;
use sidecar_core::config::SidecarConfig;

use crate::output::format::format_sessions;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct SessionsArgs {
    /// Only sessions of this project path
    #[arg(short, long)]
    pub project: Option<String>,

    /// Maximum number of entries
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

pub fn run(args: &SessionsArgs, config: &SidecarConfig, format: OutputFormat) -> Result<()> {
    let locator = TranscriptLocator::new(config);
    let mut sessions = locator
        .list_sessions(args.project.as_deref())
        .with_context(|| format!("Failed to scan {}", config.projects_dir.display()))?;
    sessions.truncate(args.limit);
    print!("{}", format_sessions(&sessions, format));
    Ok(())
}

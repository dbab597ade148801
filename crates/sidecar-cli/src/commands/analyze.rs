use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use sidecar_briefing::{BriefingPipeline, ClaudeCliProvider};
use sidecar_core::config::SidecarConfig;

use crate::commands::SelectorArgs;
use crate::output::format::format_briefing;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub selector: SelectorArgs,

    /// Model passed to the claude CLI (overrides config)
    #[arg(long)]
    pub model: Option<String>,

    /// Excerpt budget in bytes (overrides config)
    #[arg(long)]
    pub budget: Option<usize>,

    /// Generation timeout in seconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to the claude executable
    #[arg(long, env = "SIDECAR_CLAUDE_BIN", default_value = "claude")]
    pub claude_bin: String,
}

pub fn run(args: &AnalyzeArgs, mut config: SidecarConfig, format: OutputFormat) -> Result<()> {
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(budget) = args.budget {
        config.budget_bytes = budget;
    }
    if let Some(timeout) = args.timeout {
        config.generation_timeout_secs = timeout;
    }

    let provider = ClaudeCliProvider::new(config.model.clone()).with_binary(args.claude_bin.clone());
    let pipeline = BriefingPipeline::new(config, Arc::new(provider))
        .context("Failed to set up the briefing pipeline")?;
    let query = args.selector.query()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let briefing = runtime
        .block_on(pipeline.analyze(&query))
        .context("Failed to generate briefing")?;

    print!("{}", format_briefing(&briefing, format));
    eprintln!(
        "Briefing stored for session {} ({})",
        briefing.session_id,
        pipeline.config().briefings_dir().display()
    );
    Ok(())
}

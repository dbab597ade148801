use std::sync::Arc;

use anyhow::{Context, Result};
use sidecar_briefing::{BriefingPipeline, ClaudeCliProvider};
use sidecar_core::config::SidecarConfig;

use crate::output::format::format_status;
use crate::output::OutputFormat;

pub fn run(config: SidecarConfig, format: OutputFormat) -> Result<()> {
    let provider = ClaudeCliProvider::new(config.model.clone());
    let pipeline = BriefingPipeline::new(config, Arc::new(provider))
        .context("Failed to open sidecar data")?;
    let status = pipeline.status().context("Failed to collect status")?;
    print!("{}", format_status(&status, format));
    Ok(())
}

use anyhow::{Context, Result};
use clap::Args;
use sidecar_core::config::SidecarConfig;
use sidecar_core::storage::BriefingStore;

use crate::output::format::format_insights;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct InsightsArgs {
    /// Rebuild the index from the briefing documents even if it looks current
    #[arg(long)]
    pub rebuild: bool,
}

pub fn run(args: &InsightsArgs, config: &SidecarConfig, format: OutputFormat) -> Result<()> {
    let store = BriefingStore::open(config).context("Failed to open briefing store")?;
    let insights = if args.rebuild {
        store.rebuild_insights()
    } else {
        store.insights()
    }
    .context("Failed to load insights")?;
    print!("{}", format_insights(&insights, format));
    Ok(())
}

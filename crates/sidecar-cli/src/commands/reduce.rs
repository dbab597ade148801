use anyhow::{Context, Result};
use clap::Args;
use sidecar_capture::{reduce, SaliencePolicy, TranscriptLocator};
use sidecar_core::config::SidecarConfig;
use sidecar_core::storage::BriefingStore;

use crate::commands::SelectorArgs;
use crate::output::format::format_reduced;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct ReduceArgs {
    #[command(flatten)]
    pub selector: SelectorArgs,

    /// Excerpt budget in bytes (overrides config)
    #[arg(long)]
    pub budget: Option<usize>,
}

pub fn run(args: &ReduceArgs, mut config: SidecarConfig, format: OutputFormat) -> Result<()> {
    if let Some(budget) = args.budget {
        config.budget_bytes = budget;
    }
    config.validate()?;

    let locator = TranscriptLocator::new(&config);
    let store = BriefingStore::open(&config).context("Failed to open briefing store")?;
    let session = locator
        .locate(&args.selector.query()?, &store)
        .context("Failed to load session")?;

    let policy = SaliencePolicy::default().with_excerpt_cap(config.excerpt_cap_bytes);
    let reduced = reduce(&session, config.budget_bytes, &policy);
    print!("{}", format_reduced(&reduced, format));
    Ok(())
}

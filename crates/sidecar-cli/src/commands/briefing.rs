use anyhow::{Context, Result};
use clap::Subcommand;
use sidecar_core::config::SidecarConfig;
use sidecar_core::model::SessionId;
use sidecar_core::storage::{BriefingFilter, BriefingStore};

use crate::output::format::{format_briefing, format_briefing_list};
use crate::output::OutputFormat;

#[derive(Subcommand)]
pub enum BriefingCommand {
    /// Show the stored briefing of a session
    Show {
        /// Session ID
        session_id: String,
    },
    /// List stored briefings (most recent first)
    List {
        /// Only briefings of this project path
        #[arg(short, long)]
        project: Option<String>,

        /// Maximum number of entries
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Delete the stored briefing of a session
    Delete {
        /// Session ID
        session_id: String,
    },
}

pub fn run(cmd: &BriefingCommand, config: &SidecarConfig, format: OutputFormat) -> Result<()> {
    let store = BriefingStore::open(config).context("Failed to open briefing store")?;

    match cmd {
        BriefingCommand::Show { session_id } => {
            let id = SessionId::parse(session_id.as_str())?;
            let briefing = store
                .get(&id)
                .with_context(|| format!("Failed to read briefing '{id}'"))?;
            print!("{}", format_briefing(&briefing, format));
        }
        BriefingCommand::List { project, limit } => {
            let filter = BriefingFilter {
                project_path: project.clone(),
                limit: Some(*limit),
            };
            let summaries = store.list(&filter).context("Failed to list briefings")?;
            print!("{}", format_briefing_list(&summaries, format));
        }
        BriefingCommand::Delete { session_id } => {
            let id = SessionId::parse(session_id.as_str())?;
            if store.delete(&id)? {
                store.rebuild_insights().context("Failed to rebuild insights")?;
                println!("Deleted briefing {id}");
            } else {
                println!("No briefing for {id}");
            }
        }
    }
    Ok(())
}

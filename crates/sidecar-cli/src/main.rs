use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use sidecar_core::config::{default_data_dir, SidecarConfig};

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "sidecar",
    version,
    about = "Turn coding-assistant sessions into briefings, and keep reusable prompts"
)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: output::OutputFormat,

    /// Data directory for briefings, insights and prompts
    #[arg(long, global = true, env = "SIDECAR_HOME")]
    home: Option<PathBuf>,

    /// Directory holding per-project session transcripts
    #[arg(long, global = true, env = "SIDECAR_PROJECTS_DIR")]
    projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<SidecarConfig> {
    let home = cli.home.clone().unwrap_or_else(default_data_dir);
    let mut config = SidecarConfig::load(&home)
        .with_context(|| format!("Failed to load config from {}", home.display()))?;
    if let Some(dir) = &cli.projects_dir {
        config.projects_dir = dir.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match &cli.command {
        commands::Commands::Analyze(args) => commands::analyze::run(args, config, cli.format),
        commands::Commands::Reduce(args) => commands::reduce::run(args, config, cli.format),
        commands::Commands::Sessions(args) => commands::sessions::run(args, &config, cli.format),
        commands::Commands::Briefing(cmd) => commands::briefing::run(cmd, &config, cli.format),
        commands::Commands::Insights(args) => commands::insights::run(args, &config, cli.format),
        commands::Commands::Prompt(cmd) => commands::prompt::run(cmd, &config, cli.format),
        commands::Commands::Status => commands::status::run(config, cli.format),
    }
}

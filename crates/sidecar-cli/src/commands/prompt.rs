use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result};
use clap::Subcommand;
use sidecar_core::config::SidecarConfig;
use sidecar_core::storage::PromptStore;

use crate::output::format::{format_prompt, format_prompt_list};
use crate::output::OutputFormat;

#[derive(Subcommand)]
pub enum PromptCommand {
    /// Save a new prompt template (body from the argument or stdin)
    Save {
        /// Template name: lowercase letters, digits, '-' and '_'
        name: String,

        /// Template body with {{placeholders}}; read from stdin when omitted
        body: Option<String>,

        /// Category used for filtering and search
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Show a prompt template
    Get { name: String },
    /// Render a prompt template with variable bindings
    Use {
        name: String,

        /// Variable binding as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_binding)]
        vars: Vec<(String, String)>,
    },
    /// List prompt templates by name
    List {
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Most recently used prompt templates
    Recent {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Search names, categories and bodies
    Search { query: String },
    /// Delete a prompt template
    Delete { name: String },
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

pub fn run(cmd: &PromptCommand, config: &SidecarConfig, format: OutputFormat) -> Result<()> {
    let store = PromptStore::open(config);

    match cmd {
        PromptCommand::Save {
            name,
            body,
            category,
        } => {
            let body = match body {
                Some(body) => body.clone(),
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read prompt body from stdin")?;
                    buf
                }
            };
            let saved = store.save(name, &body, category.as_deref())?;
            match format {
                OutputFormat::Json => print!("{}", format_prompt(&saved, format)),
                OutputFormat::Text | OutputFormat::Markdown => {
                    println!("Saved prompt {}", saved.name);
                }
            }
        }
        PromptCommand::Get { name } => {
            let prompt = store.get(name)?;
            print!("{}", format_prompt(&prompt, format));
        }
        PromptCommand::Use { name, vars } => {
            let bindings: BTreeMap<String, String> = vars.iter().cloned().collect();
            let text = store.use_prompt(name, &bindings)?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "name": name,
                        "text": text,
                    }))?
                ),
                OutputFormat::Text | OutputFormat::Markdown => println!("{text}"),
            }
        }
        PromptCommand::List { category } => {
            let prompts = store.list(category.as_deref())?;
            print!("{}", format_prompt_list(&prompts, format));
        }
        PromptCommand::Recent { limit } => {
            let prompts = store.recent(*limit)?;
            print!("{}", format_prompt_list(&prompts, format));
        }
        PromptCommand::Search { query } => {
            let prompts = store.search(query)?;
            print!("{}", format_prompt_list(&prompts, format));
        }
        PromptCommand::Delete { name } => {
            if store.delete(name)? {
                println!("Deleted prompt {name}");
            } else {
                println!("No prompt named {name}");
            }
        }
    }
    Ok(())
}

//! Briefing generation: the model boundary, the generate-and-repair state
//! machine, and the pipeline that ties capture to storage.

pub mod claude_cli;
pub mod generator;
pub mod pipeline;
pub mod provider;

pub use claude_cli::ClaudeCliProvider;
pub use generator::{parse_sections, schema, BriefingGenerator};
pub use pipeline::{BriefingPipeline, PipelineStatus};
pub use provider::GenerationProvider;

pub mod briefings;
pub mod fs;
pub mod prompts;

pub use briefings::{BriefingFilter, BriefingStore};
pub use prompts::PromptStore;

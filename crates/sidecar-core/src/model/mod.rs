pub mod briefing;
pub mod diff;
pub mod ids;
pub mod insights;
pub mod prompt;
pub mod session;

pub use briefing::{
    Briefing, BriefingSections, BriefingSummary, CodeLocation, ConceptUsage, LineRange, Pattern,
    Risk, SessionRef, Severity, Understanding,
};
pub use diff::{CodeDiff, DiffSource, FileChangeType, FileDiff};
pub use ids::SessionId;
pub use insights::{
    ArchitectureNote, BriefingStamp, ConceptTally, InsightsIndex, PatternTally, RiskTally,
};
pub use prompt::{validate_name, PromptTemplate};
pub use session::{EventKind, RawEvent, Role, Session, ToolKind};

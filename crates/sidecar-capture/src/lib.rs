pub mod diff;
pub mod extractor;
pub mod locator;
pub mod reduce;
pub mod transcript;

pub use diff::capture_diff;
pub use locator::{SessionInfo, SessionQuery, SessionSelector, TranscriptLocator};
pub use reduce::{reduce, Excerpt, ExcerptKind, ReducedTranscript, SaliencePolicy};

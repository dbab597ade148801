use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Session,
    Briefing,
    Prompt,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Session => write!(f, "Session"),
            Entity::Briefing => write!(f, "Briefing"),
            Entity::Prompt => write!(f, "Prompt"),
        }
    }
}

/// Where in an input file a structural problem was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: PathBuf,
    pub line: Option<usize>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Failures of the external generation call.
///
/// `Transport` and `Timeout` may be retried by the caller; `SchemaViolation`
/// means the model could not produce a valid briefing even after repair and
/// will fail again on the same input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Generation transport failed: {0}")]
    Transport(String),

    #[error("Generation timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Model output violates the briefing schema after repair: {0}")]
    SchemaViolation(String),
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::SchemaViolation(_))
    }
}

#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("Malformed input at {}: {detail}", describe_location(.location))]
    Malformed {
        location: Option<Location>,
        detail: String,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Missing variables: {}", join_names(.names))]
    MissingVariable { names: BTreeSet<String> },

    #[error("Prompt already exists: {0}")]
    DuplicateName(String),

    #[error("Invalid name: {0:?}. Must match ^[a-z0-9][a-z0-9_-]*$")]
    InvalidName(String),

    #[error("Invalid session ID: {0}")]
    InvalidId(String),

    #[error("Schema version mismatch: expected {expected}, got {found}")]
    SchemaVersion { expected: u32, found: u32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SidecarError {
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        SidecarError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn malformed(path: impl Into<PathBuf>, line: Option<usize>, detail: impl Into<String>) -> Self {
        SidecarError::Malformed {
            location: Some(Location {
                path: path.into(),
                line,
            }),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SidecarError::NotFound { .. })
    }
}

fn describe_location(location: &Option<Location>) -> String {
    location
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown location".to_string())
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, SidecarError>;

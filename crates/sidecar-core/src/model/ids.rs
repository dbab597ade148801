use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// Identifier of one recorded session.
///
/// Opaque to sidecar, but it doubles as a file stem in the briefing store, so
/// parsing rejects anything that could escape a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse and validate an ID string.
    pub fn parse(s: impl Into<String>) -> Result<Self, SidecarError> {
        let s = s.into();
        if s.is_empty() {
            return Err(SidecarError::InvalidId("ID must not be empty".into()));
        }
        if s == "." || s == ".." {
            return Err(SidecarError::InvalidId(format!("{s:?} is reserved")));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(SidecarError::InvalidId(format!(
                "{s:?} contains disallowed character {c:?}"
            )));
        }
        Ok(Self(s))
    }

    /// First 8 characters, for compact listings.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SidecarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

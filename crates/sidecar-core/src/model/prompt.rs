use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SidecarError;
use crate::template;

/// A named, reusable prompt body with `{{placeholder}}` variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptTemplate {
    pub id: Uuid,
    pub name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Distinct placeholder names in order of first appearance.
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub use_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PromptTemplate {
    /// Create a never-used template. Fails on an invalid name.
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
        category: Option<String>,
    ) -> Result<Self, SidecarError> {
        let name = name.into();
        validate_name(&name)?;
        let body = body.into();
        Ok(Self {
            id: Uuid::new_v4(),
            variables: template::placeholders(&body),
            name,
            body,
            category,
            use_count: 0,
            created_at: Utc::now(),
            last_used_at: None,
        })
    }

    /// Recency key: last use, or creation time for templates never used.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_used_at.unwrap_or(self.created_at)
    }

    /// Where a case-insensitive search hits: 0 name, 1 category, 2 body.
    ///
    /// Lower ranks are better; `None` when nothing matches.
    pub fn search_rank(&self, query: &str) -> Option<u8> {
        let needle = query.to_lowercase();
        if self.name.to_lowercase().contains(&needle) {
            Some(0)
        } else if self
            .category
            .as_deref()
            .is_some_and(|c| c.to_lowercase().contains(&needle))
        {
            Some(1)
        } else if self.body.to_lowercase().contains(&needle) {
            Some(2)
        } else {
            None
        }
    }
}

fn name_regex() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("name pattern is a valid regex"))
}

/// Names are lowercase slugs: `^[a-z0-9][a-z0-9_-]*$`.
pub fn validate_name(name: &str) -> Result<(), SidecarError> {
    if name_regex().is_match(name) {
        Ok(())
    } else {
        Err(SidecarError::InvalidName(name.to_string()))
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::SidecarConfig;
use crate::error::{Entity, SidecarError};
use crate::model::PromptTemplate;
use crate::template;

use super::fs::{read_optional, write_atomic, StoreLock};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PromptFile {
    schema_version: u32,
    #[serde(default)]
    prompts: BTreeMap<String, PromptTemplate>,
}

impl Default for PromptFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            prompts: BTreeMap::new(),
        }
    }
}

/// Saved prompt templates keyed by name, in a single `prompts.json`.
pub struct PromptStore {
    path: PathBuf,
}

impl PromptStore {
    pub fn open(config: &SidecarConfig) -> Self {
        Self::at(config.prompts_path())
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Save a new template. An existing name is never replaced.
    pub fn save(
        &self,
        name: &str,
        body: &str,
        category: Option<&str>,
    ) -> Result<PromptTemplate, SidecarError> {
        let prompt = PromptTemplate::new(name, body, category.map(str::to_string))?;
        let _lock = StoreLock::exclusive(self.dir())?;
        let mut file = self.load()?;
        if file.prompts.contains_key(name) {
            return Err(SidecarError::DuplicateName(name.to_string()));
        }
        file.prompts.insert(prompt.name.clone(), prompt.clone());
        self.store(&file)?;
        tracing::debug!(name, variables = ?prompt.variables, "Saved prompt");
        Ok(prompt)
    }

    pub fn get(&self, name: &str) -> Result<PromptTemplate, SidecarError> {
        let _lock = StoreLock::shared(self.dir())?;
        self.load()?
            .prompts
            .remove(name)
            .ok_or_else(|| SidecarError::not_found(Entity::Prompt, name))
    }

    /// Render a template and record the use. Failed renders leave it untouched.
    pub fn use_prompt(
        &self,
        name: &str,
        bindings: &BTreeMap<String, String>,
    ) -> Result<String, SidecarError> {
        let _lock = StoreLock::exclusive(self.dir())?;
        let mut file = self.load()?;
        let prompt = file
            .prompts
            .get_mut(name)
            .ok_or_else(|| SidecarError::not_found(Entity::Prompt, name))?;
        let text = template::render(&prompt.body, bindings)?;
        prompt.use_count += 1;
        prompt.last_used_at = Some(Utc::now());
        self.store(&file)?;
        Ok(text)
    }

    /// Templates ordered by name, optionally restricted to one category.
    pub fn list(&self, category: Option<&str>) -> Result<Vec<PromptTemplate>, SidecarError> {
        let _lock = StoreLock::shared(self.dir())?;
        Ok(self
            .load()?
            .prompts
            .into_values()
            .filter(|p| category.is_none() || p.category.as_deref() == category)
            .collect())
    }

    /// Most recently used first; never-used templates rank by creation time.
    pub fn recent(&self, limit: usize) -> Result<Vec<PromptTemplate>, SidecarError> {
        let mut prompts = self.list(None)?;
        prompts.sort_by(|a, b| {
            b.recency()
                .cmp(&a.recency())
                .then_with(|| a.name.cmp(&b.name))
        });
        prompts.truncate(limit);
        Ok(prompts)
    }

    /// Case-insensitive substring search, name hits before category before body.
    pub fn search(&self, query: &str) -> Result<Vec<PromptTemplate>, SidecarError> {
        let mut hits: Vec<(u8, PromptTemplate)> = self
            .list(None)?
            .into_iter()
            .filter_map(|p| p.search_rank(query).map(|rank| (rank, p)))
            .collect();
        hits.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.name.cmp(&b.name)));
        Ok(hits.into_iter().map(|(_, p)| p).collect())
    }

    /// Remove a template. Returns false when the name was not present.
    pub fn delete(&self, name: &str) -> Result<bool, SidecarError> {
        let _lock = StoreLock::exclusive(self.dir())?;
        let mut file = self.load()?;
        if file.prompts.remove(name).is_none() {
            return Ok(false);
        }
        self.store(&file)?;
        Ok(true)
    }

    pub fn count(&self) -> Result<usize, SidecarError> {
        Ok(self.list(None)?.len())
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn load(&self) -> Result<PromptFile, SidecarError> {
        let Some(raw) = read_optional(&self.path)? else {
            return Ok(PromptFile::default());
        };
        let file: PromptFile = serde_json::from_str(&raw)
            .map_err(|e| SidecarError::malformed(&self.path, Some(e.line()), e.to_string()))?;
        if file.schema_version != SCHEMA_VERSION {
            return Err(SidecarError::SchemaVersion {
                expected: SCHEMA_VERSION,
                found: file.schema_version,
            });
        }
        Ok(file)
    }

    fn store(&self, file: &PromptFile) -> Result<(), SidecarError> {
        let json = serde_json::to_string_pretty(file)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

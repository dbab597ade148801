use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use sidecar_core::config::SidecarConfig;
use sidecar_core::error::{Entity, SidecarError};
use sidecar_core::model::{Session, SessionId};
use sidecar_core::storage::{BriefingFilter, BriefingStore};

use crate::transcript::{self, ParseMode};

const INDEX_FILE: &str = "sessions-index.json";

/// Which session to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelector {
    Id(SessionId),
    /// Transcript with the latest end timestamp.
    Latest,
    /// Session of the most recently generated briefing.
    LatestBriefed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub selector: SessionSelector,
    pub project_path: Option<String>,
}

impl SessionQuery {
    pub fn latest() -> Self {
        Self {
            selector: SessionSelector::Latest,
            project_path: None,
        }
    }

    pub fn id(id: SessionId) -> Self {
        Self {
            selector: SessionSelector::Id(id),
            project_path: None,
        }
    }

    pub fn in_project(mut self, project_path: Option<String>) -> Self {
        self.project_path = project_path;
        self
    }
}

/// Listing row for a transcript on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub transcript_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionsIndex {
    #[serde(default, rename = "originalPath")]
    original_path: Option<String>,
}

/// Finds and reads session transcripts under `<projects_dir>/<project-key>/<id>.jsonl`.
pub struct TranscriptLocator {
    projects_dir: PathBuf,
}

impl TranscriptLocator {
    pub fn new(config: &SidecarConfig) -> Self {
        Self::at(config.projects_dir.clone())
    }

    pub fn at(projects_dir: PathBuf) -> Self {
        Self { projects_dir }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// All sessions, latest end first, ties by ID; optionally one project only.
    ///
    /// Scanning is lenient: broken lines only affect the counts shown here.
    /// Strict parsing happens in [`read`](Self::read).
    pub fn list_sessions(
        &self,
        project_path: Option<&str>,
    ) -> Result<Vec<SessionInfo>, SidecarError> {
        if !self.projects_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut index_paths: HashMap<PathBuf, Option<String>> = HashMap::new();
        let mut sessions = Vec::new();

        for entry in WalkDir::new(&self.projects_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !path.extension().is_some_and(|e| e == "jsonl") {
                continue;
            }
            let Some(id) = session_id_from_path(path) else {
                continue;
            };

            let dir = path.parent().unwrap_or(&self.projects_dir).to_path_buf();
            let indexed = index_paths
                .entry(dir.clone())
                .or_insert_with(|| read_original_path(&dir))
                .clone();

            let parsed = match transcript::parse_file(path, ParseMode::Lenient) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Skipping unreadable transcript {}: {e}", path.display());
                    continue;
                }
            };
            let project = indexed.or(parsed.cwd);
            if let Some(filter) = project_path {
                if project.as_deref() != Some(filter) {
                    continue;
                }
            }

            let session = Session::new(id, project, path.to_path_buf(), parsed.events);
            sessions.push(SessionInfo {
                message_count: session.message_count(),
                first_prompt: session.first_prompt().map(str::to_string),
                id: session.id,
                transcript_path: session.transcript_path,
                project_path: session.project_path,
                started_at: session.started_at,
                ended_at: session.ended_at,
            });
        }

        sessions.sort_by(latest_first);
        Ok(sessions)
    }

    /// Strictly parse the transcript behind a listing row.
    pub fn read(&self, info: &SessionInfo) -> Result<Session, SidecarError> {
        let parsed = transcript::parse_file(&info.transcript_path, ParseMode::Strict)?;
        Ok(Session::new(
            info.id.clone(),
            info.project_path.clone().or(parsed.cwd),
            info.transcript_path.clone(),
            parsed.events,
        ))
    }

    /// Resolve a query to exactly one session.
    pub fn locate(
        &self,
        query: &SessionQuery,
        briefings: &BriefingStore,
    ) -> Result<Session, SidecarError> {
        let project = query.project_path.as_deref();
        match &query.selector {
            SessionSelector::Id(id) => self.open(id, project),
            SessionSelector::Latest => {
                let info = self
                    .list_sessions(project)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        SidecarError::not_found(Entity::Session, describe("latest", project))
                    })?;
                tracing::debug!(
                    session = %info.id,
                    path = %info.transcript_path.display(),
                    "Located latest session"
                );
                self.read(&info)
            }
            SessionSelector::LatestBriefed => {
                let latest = briefings
                    .list(&BriefingFilter {
                        project_path: query.project_path.clone(),
                        limit: Some(1),
                    })?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        SidecarError::not_found(Entity::Session, describe("latest-briefed", project))
                    })?;
                self.open(&latest.session_id, None)
            }
        }
    }

    /// Strictly read `<project-key>/<id>.jsonl` without scanning other transcripts.
    fn open(&self, id: &SessionId, project_path: Option<&str>) -> Result<Session, SidecarError> {
        let not_found = || SidecarError::not_found(Entity::Session, describe(id.as_str(), project_path));
        if id.as_str().starts_with("agent-") || !self.projects_dir.is_dir() {
            return Err(not_found());
        }
        let file_name = format!("{id}.jsonl");

        for entry in WalkDir::new(&self.projects_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let Ok(entry) = entry else {
                continue;
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path().join(&file_name);
            if !path.is_file() {
                continue;
            }

            let indexed = read_original_path(entry.path());
            if let (Some(filter), Some(p)) = (project_path, indexed.as_deref()) {
                if p != filter {
                    continue;
                }
            }
            let parsed = transcript::parse_file(&path, ParseMode::Strict)?;
            let project = indexed.or(parsed.cwd);
            if project_path.is_some() && project.as_deref() != project_path {
                continue;
            }

            tracing::debug!(session = %id, path = %path.display(), "Located session");
            return Ok(Session::new(id.clone(), project, path, parsed.events));
        }
        Err(not_found())
    }
}

fn session_id_from_path(path: &Path) -> Option<SessionId> {
    let stem = path.file_stem()?.to_str()?;
    // Subagent transcripts are sidechains of a parent session.
    if stem.starts_with("agent-") {
        return None;
    }
    match SessionId::parse(stem) {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::debug!("Skipping {}: {e}", path.display());
            None
        }
    }
}

fn read_original_path(dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(dir.join(INDEX_FILE)).ok()?;
    match serde_json::from_str::<SessionsIndex>(&raw) {
        Ok(index) => index.original_path.filter(|p| !p.is_empty()),
        Err(e) => {
            tracing::debug!("Ignoring unreadable {INDEX_FILE} in {}: {e}", dir.display());
            None
        }
    }
}

/// End timestamp descending, sessions without one last, then ID ascending.
fn latest_first(a: &SessionInfo, b: &SessionInfo) -> Ordering {
    match (a.ended_at, b.ended_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn describe(selector: &str, project: Option<&str>) -> String {
    match project {
        Some(p) => format!("{selector} in {p}"),
        None => selector.to_string(),
    }
}

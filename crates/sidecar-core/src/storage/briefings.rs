use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SidecarConfig;
use crate::error::{Entity, SidecarError};
use crate::model::{Briefing, BriefingStamp, BriefingSummary, InsightsIndex, SessionId};

use super::fs::{read_optional, write_atomic, StoreLock};

/// Options for listing briefings.
#[derive(Debug, Clone, Default)]
pub struct BriefingFilter {
    pub project_path: Option<String>,
    pub limit: Option<usize>,
}

/// File-backed briefing documents plus the derived insights cache.
///
/// Layout: `<briefings_dir>/<session>.json` is authoritative, `<session>.md`
/// is its condensed rendering, and `insights.json` is rebuilt whenever it no
/// longer matches the documents.
pub struct BriefingStore {
    dir: PathBuf,
    insights_path: PathBuf,
}

impl BriefingStore {
    pub fn open(config: &SidecarConfig) -> Result<Self, SidecarError> {
        Self::at(config.briefings_dir(), config.insights_path())
    }

    pub fn at(dir: PathBuf, insights_path: PathBuf) -> Result<Self, SidecarError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, insights_path })
    }

    /// Write (or overwrite) the briefing for its session.
    pub fn upsert(&self, briefing: &Briefing) -> Result<(), SidecarError> {
        let _lock = StoreLock::exclusive(&self.dir)?;
        let json = serde_json::to_string_pretty(briefing)?;
        write_atomic(&self.json_path(&briefing.session_id), json.as_bytes())?;
        write_atomic(
            &self.markdown_path(&briefing.session_id),
            briefing.to_markdown().as_bytes(),
        )?;
        tracing::debug!(session = %briefing.session_id, "Stored briefing");
        Ok(())
    }

    pub fn get(&self, session_id: &SessionId) -> Result<Briefing, SidecarError> {
        let _lock = StoreLock::shared(&self.dir)?;
        self.read_document(&self.json_path(session_id))?
            .ok_or_else(|| SidecarError::not_found(Entity::Briefing, session_id.as_str()))
    }

    /// Summaries, most recently generated first.
    pub fn list(&self, filter: &BriefingFilter) -> Result<Vec<BriefingSummary>, SidecarError> {
        let mut summaries: Vec<BriefingSummary> = self
            .load_all()?
            .iter()
            .filter(|b| match &filter.project_path {
                Some(p) => b.project_path.as_deref() == Some(p.as_str()),
                None => true,
            })
            .map(Briefing::summary)
            .collect();

        summaries.sort_by(|a, b| {
            b.generated_at
                .cmp(&a.generated_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        if let Some(limit) = filter.limit {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    /// Remove a briefing. Returns false when none was stored.
    pub fn delete(&self, session_id: &SessionId) -> Result<bool, SidecarError> {
        let _lock = StoreLock::exclusive(&self.dir)?;
        let existed = match fs::remove_file(self.json_path(session_id)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let _ = fs::remove_file(self.markdown_path(session_id));
        Ok(existed)
    }

    /// Recompute the insights index from every document and persist it.
    pub fn rebuild_insights(&self) -> Result<InsightsIndex, SidecarError> {
        let briefings = self.load_all()?;
        let index = InsightsIndex::from_briefings(&briefings);
        let _lock = StoreLock::exclusive(&self.dir)?;
        write_atomic(
            &self.insights_path,
            serde_json::to_string_pretty(&index)?.as_bytes(),
        )?;
        tracing::info!(briefings = index.briefing_count, "Rebuilt insights index");
        Ok(index)
    }

    /// The cached index when it matches the documents, otherwise a fresh rebuild.
    pub fn insights(&self) -> Result<InsightsIndex, SidecarError> {
        let stamps: Vec<BriefingStamp> = self.load_all()?.iter().map(BriefingStamp::of).collect();

        let cached = match read_optional(&self.insights_path)? {
            Some(raw) => match serde_json::from_str::<InsightsIndex>(&raw) {
                Ok(index) => Some(index),
                Err(e) => {
                    tracing::warn!("Discarding unreadable insights cache: {e}");
                    None
                }
            },
            None => None,
        };

        match cached {
            Some(index) if index.is_current_for(&stamps) => Ok(index),
            _ => {
                tracing::debug!("Insights cache stale, rebuilding");
                self.rebuild_insights()
            }
        }
    }

    pub fn count(&self) -> Result<usize, SidecarError> {
        Ok(self.document_paths()?.len())
    }

    /// Every readable briefing. Unreadable documents are skipped with a warning.
    fn load_all(&self) -> Result<Vec<Briefing>, SidecarError> {
        let _lock = StoreLock::shared(&self.dir)?;
        let mut briefings = Vec::new();
        for path in self.document_paths()? {
            match self.read_document(&path) {
                Ok(Some(b)) => briefings.push(b),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping unreadable briefing: {e}"),
            }
        }
        Ok(briefings)
    }

    fn document_paths(&self) -> Result<Vec<PathBuf>, SidecarError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn read_document(&self, path: &Path) -> Result<Option<Briefing>, SidecarError> {
        let Some(raw) = read_optional(path)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SidecarError::malformed(path, Some(e.line()), e.to_string()))
    }

    fn json_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn markdown_path(&self, id: &SessionId) -> PathBuf {
        self.dir.join(format!("{id}.md"))
    }
}

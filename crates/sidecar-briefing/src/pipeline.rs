use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sidecar_capture::{
    capture_diff, reduce, ReducedTranscript, SaliencePolicy, SessionQuery, TranscriptLocator,
};
use sidecar_core::config::SidecarConfig;
use sidecar_core::error::SidecarError;
use sidecar_core::model::{Briefing, Session};
use sidecar_core::storage::{BriefingFilter, BriefingStore};

use crate::generator::BriefingGenerator;
use crate::provider::GenerationProvider;

/// Locate → reduce → capture diff → generate → store → rebuild insights.
pub struct BriefingPipeline {
    config: SidecarConfig,
    locator: TranscriptLocator,
    store: BriefingStore,
    generator: BriefingGenerator,
    policy: SaliencePolicy,
}

/// Counts reported by `sidecar status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub data_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub session_count: usize,
    pub briefing_count: usize,
    /// Distinct project paths across transcripts and briefings.
    pub projects: Vec<String>,
    pub recurring_patterns: usize,
    pub tracked_risks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_briefing_at: Option<DateTime<Utc>>,
}

impl BriefingPipeline {
    pub fn new(
        config: SidecarConfig,
        provider: Arc<dyn GenerationProvider>,
    ) -> Result<Self, SidecarError> {
        config.validate()?;
        let locator = TranscriptLocator::new(&config);
        let store = BriefingStore::open(&config)?;
        let generator = BriefingGenerator::new(provider, config.generation_timeout());
        let policy = SaliencePolicy::default().with_excerpt_cap(config.excerpt_cap_bytes);
        Ok(Self {
            config,
            locator,
            store,
            generator,
            policy,
        })
    }

    pub fn config(&self) -> &SidecarConfig {
        &self.config
    }

    pub fn store(&self) -> &BriefingStore {
        &self.store
    }

    pub fn locator(&self) -> &TranscriptLocator {
        &self.locator
    }

    pub fn generator(&self) -> &BriefingGenerator {
        &self.generator
    }

    /// Locate a session and reduce it with the configured budget.
    pub fn reduce(&self, query: &SessionQuery) -> Result<(Session, ReducedTranscript), SidecarError> {
        let session = self.locator.locate(query, &self.store)?;
        let reduced = reduce(&session, self.config.budget_bytes, &self.policy);
        Ok((session, reduced))
    }

    /// Run the whole pipeline for one session and persist the result.
    pub async fn analyze(&self, query: &SessionQuery) -> Result<Briefing, SidecarError> {
        let session = self.locator.locate(query, &self.store)?;
        self.analyze_session(&session).await
    }

    /// Generate, store and index a briefing for an already-loaded session.
    pub async fn analyze_session(&self, session: &Session) -> Result<Briefing, SidecarError> {
        let reduced = reduce(session, self.config.budget_bytes, &self.policy);
        if reduced.is_empty() {
            tracing::warn!(session = %session.id, "Session has no content, briefing will be sparse");
        }
        tracing::info!(
            session = %session.id,
            kept = reduced.excerpts.len(),
            bytes = reduced.excerpt_bytes(),
            "Reduced session"
        );

        let diff = capture_diff(
            session.project_path.as_deref().map(Path::new),
            session,
            self.config.diff_cap_bytes,
        );
        tracing::info!(
            source = ?diff.source,
            files = diff.files.len(),
            truncated = diff.truncated,
            "Captured code diff"
        );

        let briefing = self.generator.generate(&reduced, Some(&diff)).await?;
        self.store.upsert(&briefing)?;
        let insights = self.store.rebuild_insights()?;
        tracing::info!(
            session = %briefing.session_id,
            briefings = insights.briefing_count,
            "Briefing stored"
        );
        Ok(briefing)
    }

    pub fn status(&self) -> Result<PipelineStatus, SidecarError> {
        let sessions = self.locator.list_sessions(None)?;
        let briefings = self.store.list(&BriefingFilter::default())?;
        let insights = self.store.insights()?;

        let projects: BTreeSet<String> = sessions
            .iter()
            .filter_map(|s| s.project_path.clone())
            .chain(insights.projects.iter().cloned())
            .collect();

        Ok(PipelineStatus {
            data_dir: self.config.data_dir.clone(),
            projects_dir: self.config.projects_dir.clone(),
            session_count: sessions.len(),
            briefing_count: briefings.len(),
            projects: projects.into_iter().collect(),
            recurring_patterns: insights.recurring_patterns().count(),
            tracked_risks: insights.risks.len(),
            last_briefing_at: briefings.first().map(|b| b.generated_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;
    use sidecar_core::error::GenerationError;
    use tempfile::TempDir;

    use super::*;

    struct Unreachable;

    #[async_trait]
    impl GenerationProvider for Unreachable {
        async fn invoke(&self, _: &str, _: &Value) -> Result<String, GenerationError> {
            Err(GenerationError::Transport("offline".into()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    fn config(tmp: &TempDir) -> SidecarConfig {
        SidecarConfig {
            data_dir: tmp.path().join("data"),
            projects_dir: tmp.path().join("projects"),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let cfg = SidecarConfig {
            budget_bytes: 10,
            ..config(&tmp)
        };
        assert!(matches!(
            BriefingPipeline::new(cfg, Arc::new(Unreachable)),
            Err(SidecarError::Config(_))
        ));
    }

    #[test]
    fn test_status_of_empty_workspace() {
        let tmp = TempDir::new().unwrap();
        let pipeline = BriefingPipeline::new(config(&tmp), Arc::new(Unreachable)).unwrap();
        let status = pipeline.status().unwrap();
        assert_eq!(status.session_count, 0);
        assert_eq!(status.briefing_count, 0);
        assert!(status.projects.is_empty());
        assert!(status.last_briefing_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let pipeline = BriefingPipeline::new(config(&tmp), Arc::new(Unreachable)).unwrap();
        let err = pipeline.analyze(&SessionQuery::latest()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_transport_failure_stores_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        let dir = cfg.projects_dir.join("-work-api");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("sess-x.jsonl"),
            "{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":\"hello there\"}}\n",
        )
        .unwrap();

        let pipeline = BriefingPipeline::new(cfg, Arc::new(Unreachable)).unwrap();
        let err = pipeline.analyze(&SessionQuery::latest()).await.unwrap_err();
        assert!(matches!(
            err,
            SidecarError::Generation(GenerationError::Transport(_))
        ));
        assert_eq!(pipeline.store().count().unwrap(), 0);
    }
}

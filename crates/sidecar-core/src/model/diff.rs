use serde::{Deserialize, Serialize};

/// Code changes attributed to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CodeDiff {
    pub source: DiffSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileDiff>,
    pub total_additions: u32,
    pub total_deletions: u32,
    /// Set when patch text was cut to fit the configured cap.
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffSource {
    /// Working tree against HEAD.
    Git,
    /// Reconstructed from file-writing tool calls in the transcript.
    #[default]
    ToolCalls,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDiff {
    pub path: String,
    pub change_type: FileChangeType,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub patch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeType {
    Created,
    Modified,
    Deleted,
    Renamed { from: String },
}

impl CodeDiff {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Recompute the totals from the file list.
    pub fn recount(&mut self) {
        self.total_additions = self.files.iter().map(|f| f.additions).sum();
        self.total_deletions = self.files.iter().map(|f| f.deletions).sum();
    }

    /// Unified-diff style text handed to the model.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for f in &self.files {
            let label = match &f.change_type {
                FileChangeType::Created => "created".to_string(),
                FileChangeType::Modified => "modified".to_string(),
                FileChangeType::Deleted => "deleted".to_string(),
                FileChangeType::Renamed { from } => format!("renamed from {from}"),
            };
            out.push_str(&format!(
                "### {} ({label}, +{} -{})\n",
                f.path, f.additions, f.deletions
            ));
            if !f.patch.is_empty() {
                out.push_str(&f.patch);
                if !f.patch.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        if self.truncated {
            out.push_str("...[diff truncated]\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeDiff {
        let mut diff = CodeDiff {
            source: DiffSource::Git,
            files: vec![
                FileDiff {
                    path: "src/auth.rs".into(),
                    change_type: FileChangeType::Created,
                    additions: 50,
                    deletions: 0,
                    patch: "+fn login() {}".into(),
                },
                FileDiff {
                    path: "src/new_db.rs".into(),
                    change_type: FileChangeType::Renamed {
                        from: "src/db.rs".into(),
                    },
                    additions: 2,
                    deletions: 3,
                    patch: String::new(),
                },
            ],
            ..Default::default()
        };
        diff.recount();
        diff
    }

    #[test]
    fn test_recount_totals() {
        let diff = sample();
        assert_eq!(diff.total_additions, 52);
        assert_eq!(diff.total_deletions, 3);
    }

    #[test]
    fn test_render_headers_and_truncation_marker() {
        let mut diff = sample();
        diff.truncated = true;
        let text = diff.render();
        assert!(text.contains("### src/auth.rs (created, +50 -0)\n+fn login() {}\n"));
        assert!(text.contains("### src/new_db.rs (renamed from src/db.rs, +2 -3)"));
        assert!(text.ends_with("...[diff truncated]\n"));
    }

    #[test]
    fn test_rename_variant_serde() {
        let json = serde_json::to_string(&sample().files[1]).unwrap();
        assert!(json.contains("renamed"));
        let parsed: FileDiff = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample().files[1]);
    }
}

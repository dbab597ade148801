use std::path::Path;

use git2::{Delta, DiffFindOptions, DiffOptions, Patch, Repository};

use sidecar_core::model::{
    CodeDiff, DiffSource, EventKind, FileChangeType, FileDiff, Session, ToolKind,
};

use crate::reduce::truncate_text;

/// Code changes for a session: the project's working tree against HEAD, or,
/// when that is unavailable, the file writes recorded in the transcript.
pub fn capture_diff(project_path: Option<&Path>, session: &Session, max_bytes: usize) -> CodeDiff {
    if let Some(path) = project_path {
        match git_diff(path, max_bytes) {
            Ok(diff) if !diff.is_empty() => return diff,
            Ok(_) => tracing::debug!("Git working tree clean, using tool calls"),
            Err(e) => tracing::debug!("Git diff unavailable for {}: {e}", path.display()),
        }
    }
    tool_call_diff(session, max_bytes)
}

/// Working tree (index plus untracked files) against HEAD.
pub fn git_diff(project_path: &Path, max_bytes: usize) -> Result<CodeDiff, git2::Error> {
    let repo = Repository::discover(project_path)?;
    // An unborn HEAD diffs everything against the empty tree.
    let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    let mut diff = repo.diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

    let mut out = CodeDiff {
        source: DiffSource::Git,
        ..Default::default()
    };
    let mut budget = Budget::new(max_bytes);

    for (idx, delta) in diff.deltas().enumerate() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let change_type = match delta.status() {
            Delta::Added | Delta::Untracked => FileChangeType::Created,
            Delta::Deleted => FileChangeType::Deleted,
            Delta::Renamed => FileChangeType::Renamed {
                from: delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            },
            _ => FileChangeType::Modified,
        };

        let (mut additions, mut deletions, mut text) = (0, 0, String::new());
        if let Some(mut patch) = Patch::from_diff(&diff, idx)? {
            let (_, adds, dels) = patch.line_stats()?;
            additions = adds as u32;
            deletions = dels as u32;
            let buf = patch.to_buf()?;
            text = String::from_utf8_lossy(&buf).into_owned();
        }

        out.files.push(FileDiff {
            path,
            change_type,
            additions,
            deletions,
            patch: budget.take(&text),
        });
    }

    out.truncated = budget.truncated;
    out.recount();
    Ok(out)
}

/// File changes reconstructed from Write/Edit tool calls.
pub fn tool_call_diff(session: &Session, max_bytes: usize) -> CodeDiff {
    let mut out = CodeDiff::default();
    let mut budget = Budget::new(max_bytes);

    for event in &session.events {
        let EventKind::ToolCall {
            tool_name, input, ..
        } = &event.kind
        else {
            continue;
        };
        if ToolKind::classify(tool_name) != ToolKind::FileWrite {
            continue;
        }
        let Some(path) = event.kind.tool_file_path() else {
            continue;
        };

        let field = |key: &str| input.get(key).and_then(|v| v.as_str()).unwrap_or("");
        let added = [field("content"), field("new_string"), field("new_source")]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("");
        let removed = field("old_string");

        let mut patch = String::new();
        for line in removed.lines() {
            patch.push_str(&format!("-{line}\n"));
        }
        for line in added.lines() {
            patch.push_str(&format!("+{line}\n"));
        }
        let patch = budget.take(&patch);

        match out.files.iter_mut().find(|f| f.path == path) {
            Some(existing) => {
                if existing.change_type == FileChangeType::Deleted {
                    existing.change_type = FileChangeType::Modified;
                }
                existing.additions += added.lines().count() as u32;
                existing.deletions += removed.lines().count() as u32;
                existing.patch.push_str(&patch);
            }
            None => out.files.push(FileDiff {
                path: path.to_string(),
                change_type: if tool_name == "Write" {
                    FileChangeType::Created
                } else {
                    FileChangeType::Modified
                },
                additions: added.lines().count() as u32,
                deletions: removed.lines().count() as u32,
                patch,
            }),
        }
    }

    out.truncated = budget.truncated;
    out.recount();
    out
}

/// Shared byte allowance for patch text across files.
struct Budget {
    remaining: usize,
    truncated: bool,
}

impl Budget {
    fn new(max_bytes: usize) -> Self {
        Self {
            remaining: max_bytes,
            truncated: false,
        }
    }

    fn take(&mut self, text: &str) -> String {
        if text.len() <= self.remaining {
            self.remaining -= text.len();
            return text.to_string();
        }
        self.truncated = true;
        match truncate_text(text, self.remaining) {
            Some((cut, _)) => {
                self.remaining -= cut.len();
                cut
            }
            None => String::new(),
        }
    }
}

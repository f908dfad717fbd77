//! Shared state of the configuration index.
//!
//! `IndexState` owns both registries and the per-file status map, and
//! provides thread-safe access for concurrent queries and updates.

use crate::diagnostics::DiagnosticSink;
use crate::registry::{JobRegistry, ProjectTemplateRegistry};
use crate::types::ParseResult;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of one tracked file.
///
/// `Unknown -> Indexed -> Reindexing -> Indexed`, and back to `Unknown`
/// when the file is deleted. An untracked path is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileStatus {
    Unknown,
    Indexed,
    Reindexing,
}

/// The complete state of the index.
pub struct IndexState {
    /// Root path of the indexed workspace
    pub root_path: PathBuf,
    /// Jobs by name and by file
    pub jobs: RwLock<JobRegistry>,
    /// Project-templates by file
    pub templates: RwLock<ProjectTemplateRegistry>,
    /// Status per tracked file
    pub files: DashMap<PathBuf, FileStatus>,
    /// Timestamp of last completed index pass
    pub last_indexed: RwLock<Option<Instant>>,
}

impl IndexState {
    /// Create a new empty state for the given root path.
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            jobs: RwLock::new(JobRegistry::new()),
            templates: RwLock::new(ProjectTemplateRegistry::new()),
            files: DashMap::new(),
            last_indexed: RwLock::new(None),
        }
    }

    pub fn status(&self, path: &Path) -> FileStatus {
        self.files
            .get(path)
            .map(|s| *s)
            .unwrap_or(FileStatus::Unknown)
    }

    /// Mark a tracked file as being re-indexed. Untracked files stay `Unknown`.
    pub fn begin_reindex(&self, path: &Path) {
        if let Some(mut status) = self.files.get_mut(path) {
            *status = FileStatus::Reindexing;
        }
    }

    /// Drop every record of `path` and insert the freshly parsed set.
    ///
    /// Both write locks are held for the whole swap (jobs first, then
    /// templates) so no reader observes a half-replaced file.
    pub fn replace_file(&self, path: &Path, result: ParseResult, sink: &dyn DiagnosticSink) {
        {
            let mut jobs = self.jobs.write();
            let mut templates = self.templates.write();
            jobs.remove_all_for_file(path);
            templates.remove_all_for_file(path);
            for job in result.jobs {
                jobs.add(job, sink);
            }
            for template in result.project_templates {
                templates.add(template);
            }
        }
        self.files.insert(path.to_path_buf(), FileStatus::Indexed);
    }

    /// Remove every record of `path`. Returns how many records were dropped.
    pub fn clear_file(&self, path: &Path) -> usize {
        let removed = {
            let mut jobs = self.jobs.write();
            let mut templates = self.templates.write();
            jobs.remove_all_for_file(path) + templates.remove_all_for_file(path)
        };
        self.files.remove(path);
        removed
    }

    /// Tracked files, sorted.
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.files.iter().map(|e| e.key().clone()).collect();
        files.sort();
        files
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn mark_indexed_now(&self) {
        *self.last_indexed.write() = Some(Instant::now());
    }

    /// Get statistics about the index.
    pub fn stats(&self) -> IndexStats {
        let jobs = self.jobs.read();
        let templates = self.templates.read();
        IndexStats {
            file_count: self.files.len(),
            job_count: jobs.total_count(),
            template_count: templates.total_count(),
            reference_count: templates.iter().map(|t| t.job_references().len()).sum(),
        }
    }

    /// Comparable view of the registries, used to check idempotence.
    pub fn snapshot(&self) -> IndexSnapshot {
        let jobs = self.jobs.read();
        let templates = self.templates.read();

        let mut job_entries: Vec<(String, PathBuf)> = jobs
            .iter()
            .filter_map(|j| Some((j.name().ok()?.to_string(), j.source_file().to_path_buf())))
            .collect();
        job_entries.sort();

        let mut template_entries: Vec<(String, PathBuf, Vec<String>)> = templates
            .iter()
            .map(|t| {
                (
                    t.name().unwrap_or_default().to_string(),
                    t.source_file().to_path_buf(),
                    t.job_references().to_vec(),
                )
            })
            .collect();
        template_entries.sort();

        IndexSnapshot {
            jobs: job_entries,
            templates: template_entries,
            files: self.tracked_files(),
        }
    }

    /// Reset all state to empty.
    pub fn reset(&self) {
        {
            let mut jobs = self.jobs.write();
            let mut templates = self.templates.write();
            jobs.clear();
            templates.clear();
        }
        self.files.clear();
        *self.last_indexed.write() = None;
    }
}

/// Statistics about the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub file_count: usize,
    pub job_count: usize,
    pub template_count: usize,
    /// Job references summed over all templates.
    pub reference_count: usize,
}

/// Sorted registry contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub jobs: Vec<(String, PathBuf)>,
    pub templates: Vec<(String, PathBuf, Vec<String>)>,
    pub files: Vec<PathBuf>,
}

/// Thread-safe shared state handle.
pub type SharedState = Arc<IndexState>;

/// Create a new shared state.
pub fn create_state(root_path: PathBuf) -> SharedState {
    Arc::new(IndexState::new(root_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::types::{AttributeNode, Job};

    fn result(file: &str, names: &[&str]) -> ParseResult {
        ParseResult {
            source_file: PathBuf::from(file),
            jobs: names
                .iter()
                .map(|n| {
                    Job::new(
                        PathBuf::from(file),
                        vec![("name".into(), AttributeNode::Scalar(n.to_string()))],
                        Vec::new(),
                    )
                })
                .collect(),
            project_templates: Vec::new(),
        }
    }

    #[test]
    fn test_replace_file_swaps_records() {
        let state = IndexState::new(PathBuf::from("/ws"));
        let sink = CollectingSink::new();
        let path = Path::new("/ws/zuul.d/jobs.yaml");

        assert_eq!(state.status(path), FileStatus::Unknown);
        state.replace_file(path, result("/ws/zuul.d/jobs.yaml", &["a", "b"]), &sink);
        assert_eq!(state.status(path), FileStatus::Indexed);
        assert_eq!(state.stats().job_count, 2);

        state.begin_reindex(path);
        assert_eq!(state.status(path), FileStatus::Reindexing);
        state.replace_file(path, result("/ws/zuul.d/jobs.yaml", &["c"]), &sink);
        assert_eq!(state.status(path), FileStatus::Indexed);
        assert!(state.jobs.read().get_by_name("a").is_none());
        assert_eq!(state.stats().job_count, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_clear_file_returns_to_unknown() {
        let state = IndexState::new(PathBuf::from("/ws"));
        let sink = CollectingSink::new();
        let path = Path::new("/ws/a.yaml");
        state.replace_file(path, result("/ws/a.yaml", &["a"]), &sink);

        assert_eq!(state.clear_file(path), 1);
        assert_eq!(state.status(path), FileStatus::Unknown);
        assert_eq!(state.stats(), IndexStats::default());
    }

    #[test]
    fn test_begin_reindex_ignores_untracked() {
        let state = IndexState::new(PathBuf::from("/ws"));
        state.begin_reindex(Path::new("/ws/new.yaml"));
        assert!(!state.is_tracked(Path::new("/ws/new.yaml")));
    }

    #[test]
    fn test_empty_result_still_tracks_file() {
        let state = IndexState::new(PathBuf::from("/ws"));
        let sink = CollectingSink::new();
        let path = Path::new("/ws/broken.yaml");
        state.replace_file(path, ParseResult::empty(path.to_path_buf()), &sink);
        assert_eq!(state.status(path), FileStatus::Indexed);
        assert_eq!(state.stats().file_count, 1);
    }
}

//! Incremental indexing engine.
//!
//! `IndexController` is the composition root: it owns the shared state, the
//! parser, the optional parse cache and the diagnostic sink, and keeps the
//! registries consistent as files are created, changed and deleted.

use crate::cache::{ParseCache, mtime_millis};
use crate::config::IndexConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::discovery::FileDiscovery;
use crate::parsing::{DocumentParser, ParserConfig};
use crate::resolve::{AttributeInheritanceResolver, ResolvedAttributes};
use crate::state::{FileStatus, SharedState, create_state};
use crate::types::{JobError, ParseResult};
use crate::watch::{FileChangeKind, FileEvent};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Files read concurrently during a full pass.
const READ_CONCURRENCY: usize = 16;

/// Outcome of a full index pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub total_files: usize,
    /// Files run through the parser.
    pub parsed_files: usize,
    /// Files served from the cache.
    pub cached_files: usize,
    /// Files that could not be read.
    pub failed_files: usize,
    /// Previously tracked files that no longer exist.
    pub removed_files: usize,
}

struct Loaded {
    result: ParseResult,
    from_cache: bool,
}

/// Keeps the index in sync with the workspace.
pub struct IndexController {
    state: SharedState,
    config: IndexConfig,
    discovery: FileDiscovery,
    parser: DocumentParser,
    cache: Option<ParseCache>,
    sink: Arc<dyn DiagnosticSink>,
}

impl IndexController {
    /// Build a controller for `root`, logging diagnostics through `tracing`.
    pub fn new(root: &Path, config: IndexConfig) -> Result<Self> {
        Self::with_sink(root, config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        root: &Path,
        config: IndexConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self> {
        let discovery = FileDiscovery::new(root, &config)?;
        let parser = DocumentParser::with_config(ParserConfig {
            opaque_tags: config.opaque_tags.clone(),
        });
        let cache = config
            .use_cache
            .then(|| ParseCache::load(&config.cache_dir(root), sink.as_ref()));

        Ok(Self {
            state: create_state(root.to_path_buf()),
            config,
            discovery,
            parser,
            cache,
            sink,
        })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn discovery(&self) -> &FileDiscovery {
        &self.discovery
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn root(&self) -> &Path {
        &self.state.root_path
    }

    /// Index every matching file and drop files that vanished.
    ///
    /// Reads run concurrently; results are applied one file at a time in
    /// discovery order. Calling this again on an unchanged workspace leaves
    /// the registries unchanged.
    pub async fn index_all(&self) -> Result<IndexReport> {
        let start = Instant::now();
        tracing::info!("Starting full index of {}", self.root().display());

        let files = self.discovery.discover()?;
        let mut report = IndexReport {
            total_files: files.len(),
            ..IndexReport::default()
        };

        let loads: Vec<(PathBuf, io::Result<Loaded>)> = stream::iter(files.iter())
            .map(|path| async move { (path.clone(), self.load(path).await) })
            .buffered(READ_CONCURRENCY)
            .collect()
            .await;

        let discovered: HashSet<&Path> = files.iter().map(PathBuf::as_path).collect();
        for stale in self.state.tracked_files() {
            if !discovered.contains(stale.as_path()) {
                self.remove(&stale);
                report.removed_files += 1;
            }
        }
        // Files deleted while nothing was watching only show up in the cache.
        if let Some(cache) = &self.cache {
            let pruned = cache.retain(|path| discovered.contains(path));
            if pruned > 0 {
                tracing::debug!("Pruned {} stale cache entries", pruned);
            }
        }

        for (path, outcome) in loads {
            match outcome {
                Ok(loaded) => {
                    if loaded.from_cache {
                        report.cached_files += 1;
                    } else {
                        report.parsed_files += 1;
                    }
                    self.state.replace_file(&path, loaded.result, self.sink());
                }
                Err(e) => {
                    self.sink.report(Diagnostic::UnreadableFile {
                        file: path.clone(),
                        message: e.to_string(),
                    });
                    self.remove(&path);
                    report.failed_files += 1;
                }
            }
        }

        self.state.mark_indexed_now();
        self.persist_cache();

        let stats = self.state.stats();
        tracing::info!(
            "Index complete in {:?}: {} files, {} jobs, {} templates",
            start.elapsed(),
            stats.file_count,
            stats.job_count,
            stats.template_count
        );
        Ok(report)
    }

    /// Forget everything, including cached parses, and index from scratch.
    pub async fn rebuild(&self) -> Result<IndexReport> {
        self.state.reset();
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        self.index_all().await
    }

    /// Re-parse a changed file and swap its records.
    ///
    /// A file that disappeared in the meantime is treated as deleted.
    pub async fn on_file_changed(&self, path: &Path) {
        self.state.begin_reindex(path);
        match self.load(path).await {
            Ok(loaded) => self.state.replace_file(path, loaded.result, self.sink()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.on_file_deleted(path),
            Err(e) => {
                self.sink.report(Diagnostic::UnreadableFile {
                    file: path.to_path_buf(),
                    message: e.to_string(),
                });
                self.remove(path);
            }
        }
    }

    /// Parse and insert a new file.
    pub async fn on_file_created(&self, path: &Path) {
        match self.load(path).await {
            Ok(loaded) => self.state.replace_file(path, loaded.result, self.sink()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => self.sink.report(Diagnostic::UnreadableFile {
                file: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Drop every record of a deleted file.
    pub fn on_file_deleted(&self, path: &Path) {
        let removed = self.remove(path);
        tracing::debug!("Removed {} records of {}", removed, path.display());
    }

    pub async fn apply(&self, event: &FileEvent) {
        match event.kind {
            FileChangeKind::Created => self.on_file_created(&event.path).await,
            FileChangeKind::Modified => self.on_file_changed(&event.path).await,
            FileChangeKind::Deleted => self.on_file_deleted(&event.path),
        }
    }

    /// Classify a raw change notification and apply it.
    ///
    /// Notifications only carry a path, so the kind is derived from whether
    /// the file is tracked and whether it still exists. Returns the applied
    /// kind, or `None` for paths the index does not care about.
    pub async fn apply_path_change(&self, path: &Path) -> Option<FileChangeKind> {
        let tracked = self.state.status(path) != FileStatus::Unknown;
        if !tracked && !self.discovery.matches(path) {
            return None;
        }
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        let kind = match (tracked, exists) {
            (true, true) => FileChangeKind::Modified,
            (false, true) => FileChangeKind::Created,
            (true, false) => FileChangeKind::Deleted,
            (false, false) => return None,
        };
        self.apply(&FileEvent::new(path.to_path_buf(), kind)).await;
        Some(kind)
    }

    /// Resolve the effective attributes of the job named `name`.
    pub fn resolve(&self, name: &str) -> Result<Option<ResolvedAttributes>, JobError> {
        let jobs = self.state.jobs.read();
        AttributeInheritanceResolver::new(&jobs, self.sink()).resolve_by_name(name)
    }

    /// Persist the parse cache, when enabled.
    pub fn save_cache(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.save(&self.config.cache_dir(self.root()))?;
        }
        Ok(())
    }

    fn persist_cache(&self) {
        if let Err(e) = self.save_cache() {
            tracing::warn!("Failed to save parse cache: {:#}", e);
        }
    }

    fn remove(&self, path: &Path) -> usize {
        if let Some(cache) = &self.cache {
            cache.invalidate(path);
        }
        self.state.clear_file(path)
    }

    /// Read and parse `path`, going through the cache when possible.
    ///
    /// Only I/O can fail here; unparseable content yields an empty result.
    async fn load(&self, path: &Path) -> io::Result<Loaded> {
        let metadata = tokio::fs::metadata(path).await?;
        let mtime = metadata.modified().ok().map(mtime_millis);

        if let (Some(cache), Some(mtime)) = (&self.cache, mtime) {
            if let Some(result) = cache.lookup(path, mtime) {
                return Ok(Loaded {
                    result,
                    from_cache: true,
                });
            }
        }

        let bytes = tokio::fs::read(path).await?;
        let result = match String::from_utf8(bytes) {
            Ok(text) => self.parser.parse(&text, path, self.sink()),
            Err(e) => {
                self.sink.report(Diagnostic::UnparseableDocument {
                    file: path.to_path_buf(),
                    message: e.to_string(),
                });
                ParseResult::empty(path.to_path_buf())
            }
        };
        if let (Some(cache), Some(mtime)) = (&self.cache, mtime) {
            cache.store(path.to_path_buf(), mtime, result.clone());
        }
        Ok(Loaded {
            result,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const JOBS: &str = "\
- job:
    name: base
    timeout: 1800
- job:
    name: unit
    parent: base
";

    fn workspace(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (rel, text) in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        dir
    }

    fn controller(dir: &TempDir) -> (IndexController, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let config = IndexConfig {
            use_cache: false,
            ..IndexConfig::default()
        };
        let controller = IndexController::with_sink(dir.path(), config, sink.clone()).unwrap();
        (controller, sink)
    }

    #[tokio::test]
    async fn test_index_all_and_resolve() {
        let dir = workspace(&[("zuul.d/jobs.yaml", JOBS)]);
        let (controller, _) = controller(&dir);

        let report = controller.index_all().await.unwrap();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.parsed_files, 1);

        let resolved = controller.resolve("unit").unwrap().unwrap();
        assert_eq!(resolved.value("timeout"), Some("1800"));
        assert_eq!(resolved.get("timeout").unwrap().provenance, "base");
        assert!(controller.resolve("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_then_delete() {
        let dir = workspace(&[("zuul.d/jobs.yaml", JOBS)]);
        let (controller, _) = controller(&dir);
        controller.index_all().await.unwrap();

        let path = dir.path().join("zuul.d/jobs.yaml");
        fs::write(&path, "- job:\n    name: lint\n").unwrap();
        controller.on_file_changed(&path).await;
        {
            let jobs = controller.state().jobs.read();
            assert!(jobs.get_by_name("unit").is_none());
            assert!(jobs.get_by_name("lint").is_some());
        }
        assert_eq!(controller.state().status(&path), FileStatus::Indexed);

        fs::remove_file(&path).unwrap();
        assert_eq!(
            controller.apply_path_change(&path).await,
            Some(FileChangeKind::Deleted)
        );
        assert_eq!(controller.state().stats().job_count, 0);
        assert_eq!(controller.state().status(&path), FileStatus::Unknown);
    }

    #[tokio::test]
    async fn test_apply_path_change_classifies() {
        let dir = workspace(&[("zuul.d/jobs.yaml", JOBS)]);
        let (controller, _) = controller(&dir);
        controller.index_all().await.unwrap();

        let created = dir.path().join("zuul.d/new.yaml");
        fs::write(&created, "- job:\n    name: docs\n").unwrap();
        assert_eq!(
            controller.apply_path_change(&created).await,
            Some(FileChangeKind::Created)
        );
        assert_eq!(
            controller
                .apply_path_change(&dir.path().join("zuul.d/jobs.yaml"))
                .await,
            Some(FileChangeKind::Modified)
        );
        let unrelated = dir.path().join("README.md");
        fs::write(&unrelated, "hi").unwrap();
        assert_eq!(controller.apply_path_change(&unrelated).await, None);
        assert_eq!(
            controller
                .apply_path_change(&dir.path().join("zuul.d/never.yaml"))
                .await,
            None
        );
        assert_eq!(controller.state().stats().job_count, 3);
    }

    #[tokio::test]
    async fn test_index_all_is_idempotent_and_drops_vanished() {
        let dir = workspace(&[("zuul.d/a.yaml", JOBS), ("zuul.d/b.yaml", "- job:\n    name: x\n")]);
        let (controller, _) = controller(&dir);
        controller.index_all().await.unwrap();
        let first = controller.state().snapshot();
        controller.index_all().await.unwrap();
        assert_eq!(controller.state().snapshot(), first);

        fs::remove_file(dir.path().join("zuul.d/b.yaml")).unwrap();
        let report = controller.index_all().await.unwrap();
        assert_eq!(report.removed_files, 1);
        assert!(controller.state().jobs.read().get_by_name("x").is_none());
    }

    #[tokio::test]
    async fn test_unparseable_file_is_tracked_empty() {
        let dir = workspace(&[("zuul.d/bad.yaml", "- job: [unclosed\n")]);
        let (controller, sink) = controller(&dir);
        let report = controller.index_all().await.unwrap();
        assert_eq!(report.parsed_files, 1);
        assert_eq!(
            controller
                .state()
                .status(&dir.path().join("zuul.d/bad.yaml")),
            FileStatus::Indexed
        );
        assert!(sink
            .snapshot()
            .iter()
            .any(|d| matches!(d, Diagnostic::UnparseableDocument { .. })));
    }

    #[tokio::test]
    async fn test_cache_serves_unchanged_files() {
        let dir = workspace(&[("zuul.d/jobs.yaml", JOBS)]);
        let sink: Arc<dyn DiagnosticSink> = Arc::new(CollectingSink::new());

        let first = IndexController::with_sink(dir.path(), IndexConfig::default(), sink.clone())
            .unwrap();
        let report = first.index_all().await.unwrap();
        assert_eq!(report.parsed_files, 1);

        let second =
            IndexController::with_sink(dir.path(), IndexConfig::default(), sink).unwrap();
        let report = second.index_all().await.unwrap();
        assert_eq!(report.cached_files, 1);
        assert_eq!(report.parsed_files, 0);
        assert_eq!(second.state().stats().job_count, 2);
    }
}

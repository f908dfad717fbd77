//! In-memory store of indexed jobs.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::types::Job;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// All known jobs, keyed by name and by source file.
///
/// Registration is last-writer-wins per name. Displaced definitions are kept
/// behind the winner so that removing the winning file brings the previous
/// definition back.
#[derive(Debug, Default)]
pub struct JobRegistry {
    /// Name -> definitions, the active one last.
    by_name: HashMap<String, Vec<Job>>,
    /// File -> names it defines.
    by_file: HashMap<PathBuf, HashSet<String>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. Returns whether the job was stored.
    ///
    /// Jobs without a name cannot be keyed and are dropped; the parser has
    /// already reported them.
    pub fn add(&mut self, job: Job, sink: &dyn DiagnosticSink) -> bool {
        let Ok(name) = job.name().map(str::to_string) else {
            tracing::debug!("Skipping unnamed job from {}", job.source_file().display());
            return false;
        };

        let definitions = self.by_name.entry(name.clone()).or_default();
        if let Some(previous) = definitions.last() {
            sink.report(Diagnostic::DuplicateJob {
                name: name.clone(),
                previous_file: previous.source_file().to_path_buf(),
                file: job.source_file().to_path_buf(),
            });
        }
        self.by_file
            .entry(job.source_file().to_path_buf())
            .or_default()
            .insert(name);
        definitions.push(job);
        true
    }

    /// Remove every job defined in `file`. Returns how many were removed.
    pub fn remove_all_for_file(&mut self, file: &Path) -> usize {
        let Some(names) = self.by_file.remove(file) else {
            return 0;
        };
        let mut removed = 0;
        for name in names {
            if let Some(definitions) = self.by_name.get_mut(&name) {
                let before = definitions.len();
                definitions.retain(|job| job.source_file() != file);
                removed += before - definitions.len();
                if definitions.is_empty() {
                    self.by_name.remove(&name);
                }
            }
        }
        removed
    }

    /// The active definition of `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&Job> {
        self.by_name.get(name).and_then(|defs| defs.last())
    }

    /// Every job defined in `file`, shadowed ones included, in source order.
    pub fn get_all_for_file(&self, file: &Path) -> Vec<&Job> {
        let Some(names) = self.by_file.get(file) else {
            return Vec::new();
        };
        let mut jobs: Vec<&Job> = names
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .flat_map(|defs| defs.iter().filter(|job| job.source_file() == file))
            .collect();
        jobs.sort_by_key(|job| job.name_location().map(|l| l.start_byte).unwrap_or(usize::MAX));
        jobs
    }

    /// Active jobs whose `parent` is `parent_name`, ordered by name.
    pub fn children_of(&self, parent_name: &str) -> Vec<&Job> {
        let mut children: Vec<&Job> = self
            .iter()
            .filter(|job| job.parent() == Some(parent_name))
            .collect();
        children.sort_by(|a, b| a.name().ok().cmp(&b.name().ok()));
        children
    }

    /// Number of distinct job names.
    pub fn total_count(&self) -> usize {
        self.by_name.len()
    }

    /// The job in `file` with a location containing the point.
    pub fn find_at(&self, file: &Path, line: usize, col: usize) -> Option<&Job> {
        self.get_all_for_file(file)
            .into_iter()
            .find(|job| job.contains(line, col))
    }

    pub fn is_known_file(&self, file: &Path) -> bool {
        self.by_file.contains_key(file)
    }

    /// Active definitions.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.by_name.values().filter_map(|defs| defs.last())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.by_file.keys().map(PathBuf::as_path)
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_file.clear();
    }
}

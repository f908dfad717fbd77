//! File discovery module.
//!
//! Enumerates Zuul configuration files in a workspace while respecting
//! .gitignore rules.

use crate::config::IndexConfig;
use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

/// Discovers configuration files in a workspace.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    root: PathBuf,
    /// Patterns a file must match
    includes: GlobSet,
    /// Built-in and user excludes
    excludes: GlobSet,
    /// Max file size (bytes)
    max_file_size: u64,
}

impl FileDiscovery {
    /// Build from the configured patterns.
    pub fn new(root: &Path, config: &IndexConfig) -> Result<Self> {
        let cache_exclude = format!("**/{}/**", config.cache_dir.display());
        let excludes = default_exclude_patterns()
            .into_iter()
            .chain(std::iter::once(cache_exclude.as_str()))
            .chain(config.exclude_patterns.iter().map(String::as_str));

        Ok(Self {
            root: root.to_path_buf(),
            includes: build_globset(config.file_patterns.iter().map(String::as_str))?,
            excludes: build_globset(excludes)?,
            max_file_size: config.max_file_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover all matching files under the root, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        // Hidden entries are walked because `.zuul.yaml` and `.zuul.d/` are
        // valid locations; .git is filtered by the excludes.
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        let mut files = Vec::<PathBuf>::new();
        for entry in walker.filter_map(|e| e.ok()) {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let path = entry.path();
            if self.matches(path) && self.within_size_limit(path) {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        tracing::debug!("Discovered {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Whether `path` is a configuration file by pattern alone.
    ///
    /// Used for change events, so the file may no longer exist.
    pub fn matches(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.includes.is_match(rel) && !self.excludes.is_match(rel)
    }

    fn within_size_limit(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            return false;
        };
        if metadata.len() > self.max_file_size {
            tracing::debug!("Skipping large file {}", path.display());
            return false;
        }
        true
    }
}

fn default_exclude_patterns() -> Vec<&'static str> {
    vec![
        "**/.git/**",
        "**/target/**",
        "**/node_modules/**",
        "**/.tox/**",
        "**/.venv/**",
    ]
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

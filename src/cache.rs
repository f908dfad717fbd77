//! Parse-result cache keyed by file path and modification time.
//!
//! The cache is only an optimization. A hit requires the cached modification
//! time to be at least the file's current one; anything unreadable on disk
//! is discarded and reported, never trusted.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::types::ParseResult;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CACHE_FILE: &str = "parse-cache.bin";
/// Bumped whenever the serialized layout of [`ParseResult`] changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedParse {
    /// Source modification time, milliseconds since the Unix epoch.
    pub modification_time_ms: i64,
    pub result: ParseResult,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    schema_version: u32,
    tool_version: String,
    entries: Vec<(PathBuf, CachedParse)>,
}

/// In-memory cache, optionally persisted under a directory.
#[derive(Debug, Default)]
pub struct ParseCache {
    entries: DashMap<PathBuf, CachedParse>,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached result for `path` unless it is older than `mtime_ms`.
    pub fn lookup(&self, path: &Path, mtime_ms: i64) -> Option<ParseResult> {
        let entry = self.entries.get(path)?;
        if entry.modification_time_ms < mtime_ms {
            return None;
        }
        Some(entry.result.clone())
    }

    pub fn store(&self, path: PathBuf, mtime_ms: i64, result: ParseResult) {
        self.entries.insert(
            path,
            CachedParse {
                modification_time_ms: mtime_ms,
                result,
            },
        );
    }

    pub fn invalidate(&self, path: &Path) {
        self.entries.remove(path);
    }

    /// Drop entries whose path fails `keep`. Returns how many were dropped.
    pub fn retain(&self, keep: impl Fn(&Path) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| keep(path));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Load a persisted cache from `dir`.
    ///
    /// A missing file gives an empty cache. A corrupt file or a schema
    /// mismatch also gives an empty cache and a [`Diagnostic::CacheDiscarded`].
    pub fn load(dir: &Path, sink: &dyn DiagnosticSink) -> Self {
        let cache = Self::new();
        let path = cache_path(dir);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return cache,
            Err(e) => {
                sink.report(Diagnostic::CacheDiscarded {
                    reason: format!("{}: {e}", path.display()),
                });
                return cache;
            }
        };

        let file: CacheFile = match bincode::deserialize(&data) {
            Ok(file) => file,
            Err(e) => {
                sink.report(Diagnostic::CacheDiscarded {
                    reason: format!("{}: {e}", path.display()),
                });
                return cache;
            }
        };
        if file.schema_version != SCHEMA_VERSION {
            sink.report(Diagnostic::CacheDiscarded {
                reason: format!(
                    "schema version {} does not match {SCHEMA_VERSION}",
                    file.schema_version
                ),
            });
            return cache;
        }

        for (path, entry) in file.entries {
            cache.entries.insert(path, entry);
        }
        tracing::debug!("Loaded {} cached parse results", cache.len());
        cache
    }

    /// Persist the cache under `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        ensure_cache_dir(dir)?;
        let mut entries: Vec<(PathBuf, CachedParse)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let file = CacheFile {
            schema_version: SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            entries,
        };
        let data = bincode::serialize(&file).context("Failed to serialize parse cache")?;
        let path = cache_path(dir);
        fs::write(&path, data)
            .with_context(|| format!("Failed to write parse cache: {}", path.display()))?;
        Ok(())
    }
}

pub fn cache_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE)
}

pub fn ensure_cache_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create cache dir: {}", dir.display()))
}

pub fn clear_cache(dir: &Path) -> Result<()> {
    let path = cache_path(dir);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove parse cache: {}", path.display()))?;
    }
    Ok(())
}

/// Milliseconds since the Unix epoch, negative for earlier times.
pub fn mtime_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

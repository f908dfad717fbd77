//! Index configuration.
//!
//! Read from `<root>/.zuul-index/config.json` when present. Every field has a
//! default so an empty object is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CACHE_DIR: &str = ".zuul-index";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IndexConfig {
    /// Globs (relative to the root) a file must match to be indexed.
    pub file_patterns: Vec<String>,
    /// Extra globs to skip, on top of the built-in excludes.
    pub exclude_patterns: Vec<String>,
    /// YAML tags whose nodes are kept as opaque sequences.
    pub opaque_tags: Vec<String>,
    pub use_cache: bool,
    /// Cache directory, relative to the root unless absolute.
    pub cache_dir: PathBuf,
    pub max_file_size: u64,
    pub debounce_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            file_patterns: vec![
                "**/zuul.d/*.yaml".into(),
                "**/zuul.d/*.yml".into(),
                "**/zuul.yaml".into(),
                "**/.zuul.yaml".into(),
                "**/.zuul.d/*.yaml".into(),
            ],
            exclude_patterns: Vec::new(),
            opaque_tags: crate::parsing::DEFAULT_OPAQUE_TAGS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            use_cache: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_file_size: 2 * 1024 * 1024,
            debounce_ms: 200,
        }
    }
}

impl IndexConfig {
    /// Load from an explicit file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Load `<root>/.zuul-index/config.json`, or the defaults when absent.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(DEFAULT_CACHE_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        if self.cache_dir.is_absolute() {
            self.cache_dir.clone()
        } else {
            root.join(&self.cache_dir)
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

//! Core types for the Zuul configuration index.
//!
//! This module defines the data model shared by every layer:
//! - Source locations of scalar values
//! - The recursive attribute tree of a job or template
//! - Job and project-template records produced by the parser

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level key holding a job's name.
pub const NAME_KEY: &str = "name";
/// Top-level key holding a job's parent.
pub const PARENT_KEY: &str = "parent";

// ============================================================================
// Locations
// ============================================================================

/// Location of one scalar occurrence in a source file.
///
/// Lines and columns are zero-based. Columns count characters, byte offsets
/// are absolute within the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub value: String,
    pub file: PathBuf,
    pub line: usize,
    pub indentation: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Location {
    /// Whether the (line, column) point falls inside this location.
    ///
    /// The end column is inclusive so a cursor placed right after the
    /// value still counts, matching editor word-range behaviour.
    pub fn contains(&self, line: usize, col: usize) -> bool {
        self.line == line && self.start_col <= col && col <= self.end_col
    }

    /// Two locations describe the same occurrence when value, line and
    /// indentation agree.
    pub fn same_occurrence(&self, other: &Location) -> bool {
        self.value == other.value
            && self.line == other.line
            && self.indentation == other.indentation
    }
}

/// Collapse consecutive locations describing the same occurrence.
pub fn dedup_locations(locations: Vec<Location>) -> Vec<Location> {
    let mut out: Vec<Location> = Vec::with_capacity(locations.len());
    for loc in locations {
        if out.last().is_some_and(|prev| prev.same_occurrence(&loc)) {
            continue;
        }
        out.push(loc);
    }
    out
}

// ============================================================================
// Attributes
// ============================================================================

/// Attribute tree under a job or template.
///
/// Sequences are represented as groups keyed by item index ("0", "1", ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeNode {
    Scalar(String),
    Group(Vec<(String, AttributeNode)>),
}

impl AttributeNode {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&[(String, AttributeNode)]> {
        match self {
            Self::Scalar(_) => None,
            Self::Group(entries) => Some(entries),
        }
    }

    /// Look up a direct child by key.
    pub fn get(&self, key: &str) -> Option<&AttributeNode> {
        self.as_group()
            .and_then(|entries| entries.iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }

    /// Flatten into dotted-path leaves appended to `out`.
    pub fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        match self {
            Self::Scalar(value) => out.push((prefix.to_string(), value.clone())),
            Self::Group(entries) => flatten_entries(entries, prefix, out),
        }
    }
}

/// Flatten a group's entries into dotted-path leaves.
pub fn flatten_entries(
    entries: &[(String, AttributeNode)],
    prefix: &str,
    out: &mut Vec<(String, String)>,
) {
    for (key, node) in entries {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        node.flatten_into(&path, out);
    }
}

/// Whether a group key was produced from a sequence index.
pub fn is_index_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

fn top_level_scalar<'a>(entries: &'a [(String, AttributeNode)], key: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.as_scalar())
}

/// Location of `value` written right after `key` on the same line, falling
/// back to the first location carrying `value`.
fn keyed_location<'a>(locations: &'a [Location], key: &str, value: &str) -> Option<&'a Location> {
    locations
        .windows(2)
        .find(|pair| pair[0].value == key && pair[1].value == value && pair[0].line == pair[1].line)
        .map(|pair| &pair[1])
        .or_else(|| locations.iter().find(|loc| loc.value == value))
}

fn leaf_location_index(locations: &[Location], key: &str, value: &str) -> Option<usize> {
    if is_index_key(key) {
        return locations.iter().position(|loc| loc.value == value);
    }
    locations
        .windows(2)
        .position(|pair| pair[0].value == key && pair[1].value == value)
        .map(|i| i + 1)
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised when accessing required job data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job in {} is missing required attribute `{attribute}`", file.display())]
    MissingAttribute {
        attribute: &'static str,
        file: PathBuf,
    },
}

// ============================================================================
// Jobs
// ============================================================================

/// A job definition parsed from one `- job:` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    source_file: PathBuf,
    /// Root attribute group of the job mapping.
    attributes: Vec<(String, AttributeNode)>,
    locations: Vec<Location>,
}

impl Job {
    pub fn new(
        source_file: PathBuf,
        attributes: Vec<(String, AttributeNode)>,
        locations: Vec<Location>,
    ) -> Self {
        Self {
            source_file,
            attributes,
            locations,
        }
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// The job's `name`. Jobs without one are accepted by the parser and only
    /// fail here.
    pub fn name(&self) -> Result<&str, JobError> {
        top_level_scalar(&self.attributes, NAME_KEY).ok_or_else(|| JobError::MissingAttribute {
            attribute: NAME_KEY,
            file: self.source_file.clone(),
        })
    }

    pub fn parent(&self) -> Option<&str> {
        top_level_scalar(&self.attributes, PARENT_KEY)
    }

    pub fn attributes(&self) -> &[(String, AttributeNode)] {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeNode> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Leaf attributes keyed by dotted path, in document order.
    pub fn flattened(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        flatten_entries(&self.attributes, "", &mut out);
        out
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Leaf attributes with the location of each value.
    ///
    /// Leaves and locations are both in document order, so each leaf takes
    /// the next unused occurrence of its value written right after its key.
    /// Sequence items have no key and take the next occurrence of the value.
    pub fn located_leaves(&self) -> Vec<(String, String, Option<&Location>)> {
        let mut cursor = 0;
        self.flattened()
            .into_iter()
            .map(|(path, value)| {
                let key = path.rsplit('.').next().unwrap_or(&path);
                let location = leaf_location_index(&self.locations[cursor..], key, &value)
                    .map(|i| {
                        cursor += i + 1;
                        &self.locations[cursor - 1]
                    });
                (path, value, location)
            })
            .collect()
    }

    /// First location whose value is exactly `value`.
    pub fn location_of(&self, value: &str) -> Option<&Location> {
        self.locations.iter().find(|loc| loc.value == value)
    }

    pub fn name_location(&self) -> Option<&Location> {
        let name = self.name().ok()?;
        keyed_location(&self.locations, NAME_KEY, name)
    }

    pub fn parent_location(&self) -> Option<&Location> {
        let parent = self.parent()?;
        keyed_location(&self.locations, PARENT_KEY, parent)
    }

    /// Whether any of the job's locations contains the point.
    pub fn contains(&self, line: usize, col: usize) -> bool {
        self.locations.iter().any(|loc| loc.contains(line, col))
    }

    /// Replace the collected locations with a refreshed set.
    pub fn attach_locations(&mut self, locations: Vec<Location>) {
        self.locations = dedup_locations(locations);
    }
}

// ============================================================================
// Project templates
// ============================================================================

/// A project-template: a named set of jobs run per pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    source_file: PathBuf,
    attributes: Vec<(String, AttributeNode)>,
    job_references: Vec<String>,
    locations: Vec<Location>,
}

impl ProjectTemplate {
    pub fn new(
        source_file: PathBuf,
        attributes: Vec<(String, AttributeNode)>,
        locations: Vec<Location>,
    ) -> Self {
        let job_references = collect_job_references(&attributes);
        Self {
            source_file,
            attributes,
            job_references,
            locations,
        }
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn name(&self) -> Option<&str> {
        top_level_scalar(&self.attributes, NAME_KEY)
    }

    pub fn attributes(&self) -> &[(String, AttributeNode)] {
        &self.attributes
    }

    /// Every job name the template runs, deduplicated, in first-seen order.
    pub fn job_references(&self) -> &[String] {
        &self.job_references
    }

    pub fn references(&self, job_name: &str) -> bool {
        self.job_references.iter().any(|j| j == job_name)
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Located occurrences of a referenced job name.
    pub fn reference_locations(&self, job_name: &str) -> Vec<&Location> {
        if !self.references(job_name) {
            return Vec::new();
        }
        self.locations
            .iter()
            .filter(|loc| loc.value == job_name)
            .collect()
    }
}

/// Collect job names listed under `jobs` (pipeline) and `dependencies` groups
/// at any depth.
fn collect_job_references(entries: &[(String, AttributeNode)]) -> Vec<String> {
    let mut names = Vec::new();
    walk_for_job_lists(entries, &mut names);
    names
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !name.is_empty() && !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

fn walk_for_job_lists(entries: &[(String, AttributeNode)], names: &mut Vec<String>) {
    for (key, node) in entries {
        match (key.as_str(), node) {
            ("jobs" | "dependencies", AttributeNode::Scalar(name)) => push_unique(names, name),
            ("jobs" | "dependencies", AttributeNode::Group(items)) => {
                collect_job_list(items, names)
            }
            (_, AttributeNode::Group(children)) => walk_for_job_lists(children, names),
            _ => {}
        }
    }
}

/// Entries of a `jobs`/`dependencies` list: plain names, single-key mappings
/// `{job-name: {...}}`, or `{name: job-name, ...}` dependency objects.
fn collect_job_list(items: &[(String, AttributeNode)], names: &mut Vec<String>) {
    for (key, item) in items {
        if !is_index_key(key) {
            // Mapping form: `jobs: {job-a: {...}}`
            push_unique(names, key);
            if let AttributeNode::Group(config) = item {
                walk_for_job_lists(config, names);
            }
            continue;
        }
        match item {
            AttributeNode::Scalar(name) => push_unique(names, name),
            AttributeNode::Group(fields) => {
                if let Some(name) = top_level_scalar(fields, NAME_KEY) {
                    push_unique(names, name);
                    continue;
                }
                for (job_name, config) in fields {
                    push_unique(names, job_name);
                    if let AttributeNode::Group(config) = config {
                        walk_for_job_lists(config, names);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Parse results
// ============================================================================

/// Everything parsed out of one source document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub source_file: PathBuf,
    pub jobs: Vec<Job>,
    pub project_templates: Vec<ProjectTemplate>,
}

impl ParseResult {
    pub fn empty(source_file: PathBuf) -> Self {
        Self {
            source_file,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.project_templates.is_empty()
    }
}

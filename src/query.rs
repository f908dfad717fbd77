//! Editor-facing queries over the registries.
//!
//! Everything here is read-only and returns plain data: locations, text
//! edits and trees. Applying edits is up to the caller.

use crate::registry::{JobRegistry, ProjectTemplateRegistry};
use crate::types::{Job, Location};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Every place that refers to `name`: children's `parent:` values and job
/// occurrences inside project-templates. The definition itself is excluded.
pub fn find_references(
    jobs: &JobRegistry,
    templates: &ProjectTemplateRegistry,
    name: &str,
) -> Vec<Location> {
    let mut refs: Vec<Location> = jobs
        .children_of(name)
        .into_iter()
        .filter_map(|child| child.parent_location().cloned())
        .chain(templates.reference_locations(name).into_iter().cloned())
        .collect();
    sort_locations(&mut refs);
    refs.dedup();
    refs
}

/// Go-to-definition from a `parent:` value: the name location of the parent
/// job, when the point is on the `parent` line of a job in `file`.
pub fn definition_at(jobs: &JobRegistry, file: &Path, line: usize, col: usize) -> Option<Location> {
    let job = jobs.find_at(file, line, col)?;
    job.parent_location().filter(|loc| loc.line == line)?;
    let parent = jobs.get_by_name(job.parent()?)?;
    parent.name_location().cloned()
}

/// A job name and where it is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSymbol {
    pub name: String,
    pub location: Location,
}

/// Job definitions in `file`, or across the workspace when `file` is `None`.
///
/// Per file, every definition written there is listed, shadowed ones
/// included. Across the workspace only active definitions are listed.
/// Ordered by file, then position.
pub fn symbols(jobs: &JobRegistry, file: Option<&Path>) -> Vec<JobSymbol> {
    let candidates: Vec<&Job> = match file {
        Some(file) => jobs.get_all_for_file(file),
        None => jobs.iter().collect(),
    };
    let mut symbols: Vec<JobSymbol> = candidates
        .into_iter()
        .filter_map(|job| {
            Some(JobSymbol {
                name: job.name().ok()?.to_string(),
                location: job.name_location()?.clone(),
            })
        })
        .collect();
    symbols.sort_by(|a, b| {
        (&a.location.file, a.location.line).cmp(&(&b.location.file, b.location.line))
    });
    symbols
}

/// A replacement of one located span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub file: PathBuf,
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub new_text: String,
}

impl TextEdit {
    fn replacing(location: &Location, new_text: &str) -> Self {
        Self {
            file: location.file.clone(),
            line: location.line,
            start_col: location.start_col,
            end_col: location.end_col,
            start_byte: location.start_byte,
            end_byte: location.end_byte,
            new_text: new_text.to_string(),
        }
    }
}

/// Edits renaming job `old` to `new`: its definition, every child's
/// `parent:` value and every template occurrence.
///
/// Returns nothing when `old` is not indexed. Edits are ordered by file,
/// then position.
pub fn rename_edits(
    jobs: &JobRegistry,
    templates: &ProjectTemplateRegistry,
    old: &str,
    new: &str,
) -> Vec<TextEdit> {
    let Some(job) = jobs.get_by_name(old) else {
        return Vec::new();
    };
    let mut locations: Vec<Location> = job.name_location().cloned().into_iter().collect();
    locations.extend(find_references(jobs, templates, old));
    sort_locations(&mut locations);
    locations.dedup();
    locations
        .iter()
        .map(|loc| TextEdit::replacing(loc, new))
        .collect()
}

/// One job in a descendant tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    pub name: String,
    pub file: PathBuf,
    pub line: Option<usize>,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Number of nodes in the tree, the root included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::size).sum::<usize>()
    }
}

/// Descendants of `name` as a tree. A job already on the path is not
/// expanded again.
pub fn hierarchy(jobs: &JobRegistry, name: &str) -> Option<HierarchyNode> {
    let root = jobs.get_by_name(name)?;
    let mut on_path = HashSet::new();
    Some(build_node(jobs, root, name, &mut on_path))
}

fn build_node(
    jobs: &JobRegistry,
    job: &Job,
    name: &str,
    on_path: &mut HashSet<String>,
) -> HierarchyNode {
    on_path.insert(name.to_string());
    let children = jobs
        .children_of(name)
        .into_iter()
        .filter_map(|child| {
            let child_name = child.name().ok()?;
            if on_path.contains(child_name) {
                return None;
            }
            Some(build_node(jobs, child, child_name, on_path))
        })
        .collect();
    on_path.remove(name);

    HierarchyNode {
        name: name.to_string(),
        file: job.source_file().to_path_buf(),
        line: job.name_location().map(|l| l.line),
        children,
    }
}

/// A `{{ variable }}` reference inside a job's scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableToken {
    /// Variable expression, e.g. `zuul.project.src_dir`.
    pub name: String,
    /// Span of the expression inside the braces.
    pub location: Location,
}

fn variable_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(?:\|[^}]*)?\}\}").expect("valid regex")
    })
}

/// Locate every `{{ name }}` token in the job's located scalars. Values are
/// never substituted.
pub fn variable_tokens(job: &Job) -> Vec<VariableToken> {
    let re = variable_pattern();
    let mut tokens = Vec::new();
    for loc in job.locations() {
        if !loc.value.contains("{{") {
            continue;
        }
        for caps in re.captures_iter(&loc.value) {
            let Some(m) = caps.get(1) else { continue };
            let start_col = loc.start_col + loc.value[..m.start()].chars().count();
            tokens.push(VariableToken {
                name: m.as_str().to_string(),
                location: Location {
                    value: m.as_str().to_string(),
                    file: loc.file.clone(),
                    line: loc.line,
                    indentation: loc.indentation,
                    start_col,
                    end_col: start_col + m.as_str().chars().count(),
                    start_byte: loc.start_byte + m.start(),
                    end_byte: loc.start_byte + m.end(),
                },
            });
        }
    }
    tokens
}

fn sort_locations(locations: &mut [Location]) {
    locations.sort_by(|a, b| {
        (&a.file, a.line, a.start_col).cmp(&(&b.file, b.line, b.start_col))
    });
}

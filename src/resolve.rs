//! Attribute inheritance resolution.
//!
//! A job's effective attributes are never stored. They are computed on
//! demand by walking the parent chain to the root and applying each
//! ancestor's flattened attributes root-first, so the queried job wins every
//! conflict.

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::registry::JobRegistry;
use crate::types::{Job, JobError, Location};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One effective attribute and the job that contributed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAttribute {
    pub path: String,
    pub value: String,
    /// Name of the job the value comes from.
    pub provenance: String,
    /// Where the value is written, when it could be located.
    pub location: Option<Location>,
    /// Position of the contributing job in the root-first chain.
    #[serde(skip)]
    depth: usize,
}

impl ResolvedAttribute {
    /// Last dotted segment of the path.
    pub fn short_name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Ancestor chain of a job, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorChain<'a> {
    pub jobs: Vec<&'a Job>,
    /// Set when the walk stopped at a repeated name.
    pub cycle: Option<Vec<String>>,
    /// Set when the walk stopped at a parent that is not indexed.
    pub missing_parent: Option<String>,
}

impl AncestorChain<'_> {
    pub fn names(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter_map(|j| j.name().ok().map(str::to_string))
            .collect()
    }

    pub fn is_truncated(&self) -> bool {
        self.cycle.is_some()
    }
}

/// The merged, override-resolved attribute set of a job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedAttributes {
    pub job: String,
    /// Contributing jobs, root first.
    pub chain: Vec<String>,
    pub truncated: bool,
    entries: BTreeMap<String, ResolvedAttribute>,
}

impl ResolvedAttributes {
    /// Look up by dotted path, then by last path segment.
    ///
    /// When several nested keys share the segment, the one contributed
    /// closest to the queried job wins, ties broken by path order.
    pub fn get(&self, key: &str) -> Option<&ResolvedAttribute> {
        if let Some(attr) = self.entries.get(key) {
            return Some(attr);
        }
        self.entries
            .values()
            .filter(|attr| attr.short_name() == key)
            .fold(None, |best: Option<&ResolvedAttribute>, attr| match best {
                Some(b) if b.depth >= attr.depth => Some(b),
                _ => Some(attr),
            })
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.get(key).map(|a| a.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedAttribute> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves effective attributes against a registry.
pub struct AttributeInheritanceResolver<'a> {
    registry: &'a JobRegistry,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> AttributeInheritanceResolver<'a> {
    pub fn new(registry: &'a JobRegistry, sink: &'a dyn DiagnosticSink) -> Self {
        Self { registry, sink }
    }

    /// Walk `parent` links from `job` until a root, a missing parent or a
    /// repeated name. Bounded by the registry size.
    pub fn ancestors<'j>(&self, job: &'j Job) -> Result<AncestorChain<'j>, JobError>
    where
        'a: 'j,
    {
        let name = job.name()?;
        let mut chain = AncestorChain {
            jobs: vec![job],
            cycle: None,
            missing_parent: None,
        };
        let mut visited: HashSet<&str> = HashSet::from([name]);
        let mut order: Vec<&str> = vec![name];
        let max_hops = self.registry.total_count() + 1;

        let mut current = job;
        while let Some(parent_name) = current.parent() {
            if visited.contains(parent_name) || order.len() > max_hops {
                let mut cycle: Vec<String> = order.iter().map(|s| s.to_string()).collect();
                cycle.push(parent_name.to_string());
                self.sink.report(Diagnostic::ParentCycle {
                    job: name.to_string(),
                    cycle: cycle.clone(),
                });
                chain.cycle = Some(cycle);
                break;
            }
            let Some(parent) = self.registry.get_by_name(parent_name) else {
                self.sink.report(Diagnostic::UnknownParent {
                    job: current.name().unwrap_or(name).to_string(),
                    parent: parent_name.to_string(),
                });
                chain.missing_parent = Some(parent_name.to_string());
                break;
            };
            visited.insert(parent_name);
            order.push(parent_name);
            chain.jobs.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    /// Merge attributes root-first; later (closer) jobs overwrite.
    pub fn resolve(&self, job: &Job) -> Result<ResolvedAttributes, JobError> {
        let chain = self.ancestors(job)?;
        let mut resolved = ResolvedAttributes {
            job: job.name()?.to_string(),
            chain: chain.names().into_iter().rev().collect(),
            truncated: chain.is_truncated(),
            entries: BTreeMap::new(),
        };

        for (depth, ancestor) in chain.jobs.iter().rev().enumerate() {
            let provenance = ancestor.name()?.to_string();
            for (path, value, location) in ancestor.located_leaves() {
                let location = location.cloned();
                resolved.entries.insert(
                    path.clone(),
                    ResolvedAttribute {
                        path,
                        value,
                        provenance: provenance.clone(),
                        location,
                        depth,
                    },
                );
            }
        }
        Ok(resolved)
    }

    /// Resolve the job registered as `name`.
    pub fn resolve_by_name(&self, name: &str) -> Result<Option<ResolvedAttributes>, JobError> {
        match self.registry.get_by_name(name) {
            Some(job) => self.resolve(job).map(Some),
            None => Ok(None),
        }
    }
}

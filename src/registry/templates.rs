//! In-memory store of project-templates and the jobs they reference.

use crate::types::{Location, ProjectTemplate};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// All known project-templates, keyed by source file, with a reverse index
/// from job name to the files whose templates reference it.
#[derive(Debug, Default)]
pub struct ProjectTemplateRegistry {
    by_file: HashMap<PathBuf, Vec<ProjectTemplate>>,
    referenced_by: HashMap<String, BTreeSet<PathBuf>>,
}

impl ProjectTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, template: ProjectTemplate) {
        let file = template.source_file().to_path_buf();
        for job in template.job_references() {
            self.referenced_by
                .entry(job.clone())
                .or_default()
                .insert(file.clone());
        }
        self.by_file.entry(file).or_default().push(template);
    }

    /// Remove every template defined in `file`. Returns how many were removed.
    pub fn remove_all_for_file(&mut self, file: &Path) -> usize {
        let Some(templates) = self.by_file.remove(file) else {
            return 0;
        };
        for job in templates.iter().flat_map(|t| t.job_references()) {
            if let Some(files) = self.referenced_by.get_mut(job) {
                files.remove(file);
                if files.is_empty() {
                    self.referenced_by.remove(job);
                }
            }
        }
        templates.len()
    }

    pub fn get_all_for_file(&self, file: &Path) -> &[ProjectTemplate] {
        self.by_file.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ProjectTemplate> {
        self.iter().find(|t| t.name() == Some(name))
    }

    pub fn is_known_file(&self, file: &Path) -> bool {
        self.by_file.contains_key(file)
    }

    /// Templates that run `job_name`, in file order.
    pub fn templates_referencing(&self, job_name: &str) -> Vec<&ProjectTemplate> {
        let Some(files) = self.referenced_by.get(job_name) else {
            return Vec::new();
        };
        files
            .iter()
            .flat_map(|file| self.get_all_for_file(file))
            .filter(|t| t.references(job_name))
            .collect()
    }

    /// Every located occurrence of `job_name` inside templates.
    pub fn reference_locations(&self, job_name: &str) -> Vec<&Location> {
        self.templates_referencing(job_name)
            .into_iter()
            .flat_map(|t| t.reference_locations(job_name))
            .collect()
    }

    /// Number of located occurrences of `job_name` inside templates.
    pub fn reference_count(&self, job_name: &str) -> usize {
        self.reference_locations(job_name).len()
    }

    /// Distinct job names referenced by any template.
    pub fn referenced_jobs(&self) -> impl Iterator<Item = &str> {
        self.referenced_by.keys().map(String::as_str)
    }

    pub fn total_count(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectTemplate> {
        self.by_file.values().flatten()
    }

    pub fn clear(&mut self) {
        self.by_file.clear();
        self.referenced_by.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeNode;

    fn template(file: &str, name: &str, jobs: &[&str]) -> ProjectTemplate {
        let items = jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (i.to_string(), AttributeNode::Scalar(j.to_string())))
            .collect();
        let locations = jobs
            .iter()
            .enumerate()
            .map(|(i, j)| Location {
                value: j.to_string(),
                file: PathBuf::from(file),
                line: 4 + i,
                indentation: 8,
                start_col: 10,
                end_col: 10 + j.len(),
                start_byte: 0,
                end_byte: 0,
            })
            .collect();
        ProjectTemplate::new(
            PathBuf::from(file),
            vec![
                ("name".into(), AttributeNode::Scalar(name.into())),
                (
                    "check".into(),
                    AttributeNode::Group(vec![("jobs".into(), AttributeNode::Group(items))]),
                ),
            ],
            locations,
        )
    }

    #[test]
    fn test_reference_queries() {
        let mut reg = ProjectTemplateRegistry::new();
        reg.add(template("a.yaml", "py", &["unit", "lint"]));
        reg.add(template("b.yaml", "docs", &["docs-build", "unit"]));

        assert_eq!(reg.total_count(), 2);
        assert_eq!(reg.templates_referencing("unit").len(), 2);
        assert_eq!(reg.reference_count("unit"), 2);
        assert_eq!(reg.reference_count("lint"), 1);
        assert_eq!(reg.get_by_name("docs").unwrap().source_file(), Path::new("b.yaml"));
    }

    #[test]
    fn test_remove_drops_reverse_index() {
        let mut reg = ProjectTemplateRegistry::new();
        reg.add(template("a.yaml", "py", &["unit", "lint"]));
        reg.add(template("b.yaml", "docs", &["unit"]));

        assert_eq!(reg.remove_all_for_file(Path::new("a.yaml")), 1);
        assert!(!reg.is_known_file(Path::new("a.yaml")));
        assert!(reg.templates_referencing("lint").is_empty());
        assert_eq!(reg.templates_referencing("unit").len(), 1);
        let mut jobs: Vec<_> = reg.referenced_jobs().collect();
        jobs.sort();
        assert_eq!(jobs, vec!["unit"]);
    }
}

//! Parsing module for extracting jobs and project-templates from YAML.
//!
//! The parser streams a document through [`events::stream_events`] and keeps
//! a running list of scalar locations. A `job` or `project-template` key at
//! the top level starts a new record; the record's mapping closing turns the
//! accumulated locations into a [`Job`] or [`ProjectTemplate`].

pub mod events;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::types::*;
use events::{ClosedNode, NodeKind, ParseEvent, YamlValue};
use std::path::{Path, PathBuf};

/// Top-level key introducing a job.
pub const JOB_KEY: &str = "job";
/// Top-level key introducing a project-template.
pub const PROJECT_TEMPLATE_KEY: &str = "project-template";

/// Tags treated as opaque sequences unless configured otherwise.
pub const DEFAULT_OPAQUE_TAGS: &[&str] = &["!encrypted/pkcs1-oaep"];

/// Parser configuration.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// YAML tags whose nodes are kept as opaque sequences.
    pub opaque_tags: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            opaque_tags: DEFAULT_OPAQUE_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Converts one source document into job and template records.
#[derive(Debug, Clone, Default)]
pub struct DocumentParser {
    config: ParserConfig,
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse `text` read from `source_file`.
    ///
    /// Never fails: a document the YAML scanner rejects yields an empty
    /// result and an [`Diagnostic::UnparseableDocument`].
    pub fn parse(&self, text: &str, source_file: &Path, sink: &dyn DiagnosticSink) -> ParseResult {
        let mut state = ParseState::new(text, source_file, sink);
        let outcome = events::stream_events(text, &self.config.opaque_tags, |event| {
            state.on_event(event)
        });

        match outcome {
            Ok(()) => state.finish(),
            Err(e) => {
                sink.report(Diagnostic::UnparseableDocument {
                    file: source_file.to_path_buf(),
                    message: e.to_string(),
                });
                ParseResult::empty(source_file.to_path_buf())
            }
        }
    }
}

/// Per-document parsing state driven by close events.
struct ParseState<'a> {
    source_file: PathBuf,
    lines: Vec<LineInfo<'a>>,
    sink: &'a dyn DiagnosticSink,
    current_locations: Vec<Location>,
    result: ParseResult,
}

struct LineInfo<'a> {
    text: &'a str,
    start_byte: usize,
}

fn split_lines(text: &str) -> Vec<LineInfo<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in text.split_inclusive('\n') {
        let content = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push(LineInfo {
            text: content,
            start_byte: start,
        });
        start += raw.len();
    }
    lines
}

/// A record mapping is an item of the document's root sequence.
fn is_record_level(node: &ClosedNode<'_>) -> bool {
    node.depth == 1 && node.parent == Some(NodeKind::Sequence)
}

/// A record key is a key of a record mapping.
fn is_record_key(node: &ClosedNode<'_>) -> bool {
    node.depth == 2 && node.is_key && node.parent == Some(NodeKind::Mapping)
}

impl<'a> ParseState<'a> {
    fn new(text: &'a str, source_file: &Path, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            source_file: source_file.to_path_buf(),
            lines: split_lines(text),
            sink,
            current_locations: Vec::new(),
            result: ParseResult::empty(source_file.to_path_buf()),
        }
    }

    fn on_event(&mut self, event: ParseEvent<'_>) {
        match event {
            ParseEvent::ScalarClosed(node) if is_record_key(&node) => {
                match node.value.as_str() {
                    Some(JOB_KEY | PROJECT_TEMPLATE_KEY) => self.current_locations.clear(),
                    Some(value) if !value.is_empty() => self.try_locate(value, &node),
                    _ => {}
                }
            }
            ParseEvent::ScalarClosed(node) => {
                if let Some(value) = node.value.as_str().filter(|v| !v.is_empty()) {
                    self.try_locate(value, &node);
                }
            }
            ParseEvent::MappingClosed(node) if is_record_level(&node) => {
                self.close_record(node.value);
            }
            ParseEvent::MappingClosed(_) | ParseEvent::SequenceClosed(_) => {}
        }
    }

    fn close_record(&mut self, record: &YamlValue) {
        if let Some(body) = record.get(JOB_KEY) {
            let locations = dedup_locations(std::mem::take(&mut self.current_locations));
            let job = Job::new(self.source_file.clone(), to_attributes(body), locations);
            if job.name().is_err() {
                self.sink.report(Diagnostic::MissingJobName {
                    file: self.source_file.clone(),
                });
            }
            self.result.jobs.push(job);
        } else if let Some(body) = record.get(PROJECT_TEMPLATE_KEY) {
            let locations = dedup_locations(std::mem::take(&mut self.current_locations));
            self.result.project_templates.push(ProjectTemplate::new(
                self.source_file.clone(),
                to_attributes(body),
                locations,
            ));
        }
    }

    /// Re-find `value` verbatim on its reported line and record a location.
    fn try_locate(&mut self, value: &str, node: &ClosedNode<'_>) {
        if value.contains('\n') {
            self.sink.report(Diagnostic::UnlocatedScalar {
                file: self.source_file.clone(),
                line: node.line,
                value: value.to_string(),
            });
            return;
        }
        let Some(line) = self.lines.get(node.line) else {
            return;
        };
        let column_byte = line
            .text
            .char_indices()
            .nth(node.column)
            .map(|(i, _)| i)
            .unwrap_or(line.text.len());

        // Prefer the occurrence at or after the node's own column.
        let found = line.text[column_byte..]
            .find(value)
            .map(|i| i + column_byte)
            .or_else(|| line.text.find(value));

        let Some(byte_idx) = found else {
            // Escaped or folded scalars do not appear verbatim.
            return;
        };
        let start_col = line.text[..byte_idx].chars().count();
        self.current_locations.push(Location {
            value: value.to_string(),
            file: self.source_file.clone(),
            line: node.line,
            indentation: node.indent,
            start_col,
            end_col: start_col + value.chars().count(),
            start_byte: line.start_byte + byte_idx,
            end_byte: line.start_byte + byte_idx + value.len(),
        });
    }

    fn finish(self) -> ParseResult {
        self.result
    }
}

/// Convert a job or template body into its root attribute group.
fn to_attributes(value: &YamlValue) -> Vec<(String, AttributeNode)> {
    match to_node(value) {
        Some(AttributeNode::Group(entries)) => entries,
        _ => Vec::new(),
    }
}

fn to_node(value: &YamlValue) -> Option<AttributeNode> {
    match value {
        YamlValue::Null => None,
        YamlValue::Scalar(s) => Some(AttributeNode::Scalar(s.clone())),
        YamlValue::Sequence(items) => Some(AttributeNode::Group(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| to_node(item).map(|node| (i.to_string(), node)))
                .collect(),
        )),
        YamlValue::Mapping(entries) => Some(AttributeNode::Group(
            entries
                .iter()
                .filter_map(|(k, v)| to_node(v).map(|node| (k.clone(), node)))
                .collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;

    const JOBS: &str = r#"- job:
    name: base
    description: Root of everything
    nodeset: ubuntu-jammy

- job:
    name: unit
    parent: base
    vars:
      tox_envlist: py3
      message: "run {{ tox_envlist }} now"

- project-template:
    name: python-jobs
    check:
      jobs:
        - unit
        - lint:
            dependencies:
              - unit
"#;

    fn parse(text: &str) -> (ParseResult, CollectingSink) {
        let sink = CollectingSink::new();
        let result = DocumentParser::new().parse(text, Path::new("zuul.d/jobs.yaml"), &sink);
        (result, sink)
    }

    #[test]
    fn test_parses_jobs_and_templates() {
        let (result, _) = parse(JOBS);
        assert_eq!(result.jobs.len(), 2);
        assert_eq!(result.project_templates.len(), 1);

        let unit = &result.jobs[1];
        assert_eq!(unit.name().unwrap(), "unit");
        assert_eq!(unit.parent(), Some("base"));
        assert_eq!(
            unit.attribute("vars").and_then(|v| v.get("tox_envlist")),
            Some(&AttributeNode::Scalar("py3".into()))
        );

        let template = &result.project_templates[0];
        assert_eq!(template.name(), Some("python-jobs"));
        assert_eq!(template.job_references(), &["unit".to_string(), "lint".to_string()]);
    }

    #[test]
    fn test_locations_are_scoped_per_record() {
        let (result, _) = parse(JOBS);
        let base = &result.jobs[0];
        assert!(base.locations().iter().all(|l| l.line < 5));
        assert!(base.location_of("unit").is_none());

        let unit = &result.jobs[1];
        let name = unit.name_location().unwrap();
        assert_eq!(name.line, 6);
        assert_eq!(name.indentation, 4);
        assert_eq!(name.start_col, 10);
        assert_eq!(name.end_col, 14);
        assert_eq!(&JOBS[name.start_byte..name.end_byte], "unit");

        let parent = unit.parent_location().unwrap();
        assert_eq!(parent.line, 7);
        assert_eq!(parent.start_col, 12);
    }

    #[test]
    fn test_quoted_values_locate_inside_quotes() {
        let (result, _) = parse(JOBS);
        let unit = &result.jobs[1];
        let message = unit.location_of("run {{ tox_envlist }} now").unwrap();
        assert_eq!(message.line, 10);
        assert_eq!(message.start_col, 16);
    }

    #[test]
    fn test_template_reference_locations() {
        let (result, _) = parse(JOBS);
        let template = &result.project_templates[0];
        let lines: Vec<_> = template.reference_locations("unit").iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![16, 19]);
    }

    #[test]
    fn test_missing_name_is_accepted_and_reported() {
        let (result, sink) = parse("- job:\n    parent: base\n");
        assert_eq!(result.jobs.len(), 1);
        assert!(result.jobs[0].name().is_err());
        assert!(
            sink.snapshot()
                .iter()
                .any(|d| matches!(d, Diagnostic::MissingJobName { .. }))
        );
    }

    #[test]
    fn test_block_scalar_is_skipped_without_error() {
        let text = "- job:\n    name: docs\n    description: |\n      Multi line\n      text\n";
        let (result, sink) = parse(text);
        let job = &result.jobs[0];
        assert_eq!(job.name().unwrap(), "docs");
        assert!(job.location_of("Multi line\ntext\n").is_none());
        assert!(
            sink.snapshot()
                .iter()
                .any(|d| matches!(d, Diagnostic::UnlocatedScalar { .. }))
        );
    }

    #[test]
    fn test_unparseable_document_yields_empty_result() {
        let (result, sink) = parse("- job:\n    name: [broken\n");
        assert!(result.is_empty());
        assert!(
            sink.snapshot()
                .iter()
                .any(|d| matches!(d, Diagnostic::UnparseableDocument { .. }))
        );
    }

    #[test]
    fn test_encrypted_secret_does_not_break_document() {
        let text = "- secret:\n    name: creds\n    data:\n      token: !encrypted/pkcs1-oaep\n        - abcdef\n- job:\n    name: publish\n    secrets:\n      - creds\n";
        let (result, _) = parse(text);
        assert_eq!(result.jobs.len(), 1);
        let job = &result.jobs[0];
        assert_eq!(job.name().unwrap(), "publish");
        assert!(job.location_of("abcdef").is_none());
        assert_eq!(job.location_of("creds").map(|l| l.line), Some(8));
    }

    #[test]
    fn test_no_duplicate_occurrences() {
        let (result, _) = parse(JOBS);
        for job in &result.jobs {
            for pair in job.locations().windows(2) {
                assert!(!pair[0].same_occurrence(&pair[1]));
            }
        }
    }

    #[test]
    fn test_every_document_in_a_stream_is_scanned() {
        let text = "- job:\n    name: a\n---\n- job:\n    name: b\n    parent: a\n";
        let (result, sink) = parse(text);
        assert_eq!(result.jobs.len(), 2);
        assert_eq!(result.jobs[0].name_location().map(|l| l.line), Some(1));
        let b = &result.jobs[1];
        assert_eq!(b.name().unwrap(), "b");
        assert_eq!(b.name_location().map(|l| l.line), Some(4));
        assert!(b.locations().iter().all(|l| l.line >= 3));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = "- job:\r\n    name: base\r\n- job:\r\n    name: child\r\n    parent: base\r\n";
        let (result, _) = parse(text);
        let child = &result.jobs[1];
        let loc = child.parent_location().unwrap();
        assert_eq!(loc.line, 4);
        assert_eq!(&text[loc.start_byte..loc.end_byte], "base");
    }
}

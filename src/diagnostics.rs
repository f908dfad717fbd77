//! Diagnostics raised while indexing.
//!
//! Nothing inside the indexing boundary panics or returns an error for
//! problems local to one file, job or scalar. Those are reported as a
//! [`Diagnostic`] to a [`DiagnosticSink`] that the caller injects.

use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;

/// Severity used when forwarding to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Warning,
}

/// A non-fatal condition observed while indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A scalar's text could not be re-found on its source line.
    UnlocatedScalar {
        file: PathBuf,
        line: usize,
        value: String,
    },
    /// A job mapping has no `name`.
    MissingJobName { file: PathBuf },
    /// A job name was registered twice; the later definition wins.
    DuplicateJob {
        name: String,
        previous_file: PathBuf,
        file: PathBuf,
    },
    /// The parent chain loops back on itself.
    ParentCycle { job: String, cycle: Vec<String> },
    /// A `parent` names a job that is not indexed.
    UnknownParent { job: String, parent: String },
    /// The YAML scanner rejected the document.
    UnparseableDocument { file: PathBuf, message: String },
    /// The file could not be read.
    UnreadableFile { file: PathBuf, message: String },
    /// The persisted parse cache was ignored.
    CacheDiscarded { reason: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnlocatedScalar { .. } => Severity::Debug,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnlocatedScalar { file, line, value } => write!(
                f,
                "unable to locate value {value:?} on line {} of {}",
                line + 1,
                file.display()
            ),
            Self::MissingJobName { file } => {
                write!(f, "job without a name in {}", file.display())
            }
            Self::DuplicateJob {
                name,
                previous_file,
                file,
            } => write!(
                f,
                "duplicate job `{name}`: {} replaces definition from {}",
                file.display(),
                previous_file.display()
            ),
            Self::ParentCycle { job, cycle } => {
                write!(f, "parent cycle while resolving `{job}`: {}", cycle.join(" -> "))
            }
            Self::UnknownParent { job, parent } => {
                write!(f, "job `{job}` has unknown parent `{parent}`")
            }
            Self::UnparseableDocument { file, message } => {
                write!(f, "failed to parse {}: {message}", file.display())
            }
            Self::UnreadableFile { file, message } => {
                write!(f, "failed to read {}: {message}", file.display())
            }
            Self::CacheDiscarded { reason } => write!(f, "parse cache discarded: {reason}"),
        }
    }
}

/// Receiver of diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Debug => tracing::debug!("{}", diagnostic),
            Severity::Warning => tracing::warn!("{}", diagnostic),
        }
    }
}

/// Keeps every diagnostic in memory, also forwarding it to `tracing`.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock())
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        TracingSink.report(diagnostic.clone());
        self.diagnostics.lock().push(diagnostic);
    }
}

//! Zuul configuration index
//!
//! An incremental index over a workspace of Zuul-style CI configuration:
//! jobs with a `parent` inheritance hierarchy, and project-templates that
//! reference jobs.
//!
//! # Architecture
//!
//! 1. **Parsing**: [`DocumentParser`] streams YAML close events and turns each
//!    `- job:` / `- project-template:` record into a [`Job`] or
//!    [`ProjectTemplate`] carrying the exact [`Location`] of every scalar.
//!
//! 2. **Registries**: [`JobRegistry`] and [`ProjectTemplateRegistry`] store
//!    records per source file so a file can be swapped as a unit.
//!
//! 3. **Resolution**: [`AttributeInheritanceResolver`] walks the parent chain
//!    and merges attributes child-wins, with provenance.
//!
//! 4. **Incremental indexing**: [`IndexController`] re-parses files on change
//!    events, optionally through a modification-time keyed [`ParseCache`].
//!
//! # Usage
//!
//! ```ignore
//! use zuul_index::{IndexConfig, IndexController};
//!
//! let controller = IndexController::new("/path/to/repo".as_ref(), IndexConfig::default())?;
//! controller.index_all().await?;
//!
//! let resolved = controller.resolve("tox-py311")?;
//! ```

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod incremental;
pub mod parsing;
pub mod query;
pub mod registry;
pub mod resolve;
pub mod state;
pub mod types;
pub mod watch;

// Re-exports
pub use cache::ParseCache;
pub use config::IndexConfig;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use discovery::FileDiscovery;
pub use incremental::{IndexController, IndexReport};
pub use parsing::{DocumentParser, ParserConfig};
pub use registry::{JobRegistry, ProjectTemplateRegistry};
pub use resolve::{AttributeInheritanceResolver, ResolvedAttribute, ResolvedAttributes};
pub use state::{FileStatus, IndexState, IndexStats, SharedState, create_state};
pub use types::*;
pub use watch::{FileChangeKind, FileEvent};

//! Registries holding the indexed records.
//!
//! Both registries are file-scoped: every entry remembers its source file so
//! a file's records can be dropped as a unit before it is re-indexed.

pub mod jobs;
pub mod templates;

pub use jobs::JobRegistry;
pub use templates::ProjectTemplateRegistry;

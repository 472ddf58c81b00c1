//! High-level operations.
//!
//! This module contains the implementation of prefetch commands.

pub mod output;
pub mod repository;
pub mod resolve;
pub mod rewrite;

pub use output::{apply_configs, write_output, ConfigFileEntry};
pub use repository::{build_repository, mirror_contents, LocalRepository, MirrorEntry};
pub use resolve::{resolve_request, ResolveOptions};
pub use rewrite::rewrite_requirements_file;

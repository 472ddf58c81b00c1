//! Core data structures.
//!
//! This module contains the foundational types used throughout prefetch:
//! - Package specs (what to prefetch)
//! - Resolution outputs (what was prefetched)
//! - The uniqueness model both are validated with
//! - The pip requirements file grammar

pub mod errors;
pub mod requirements;
pub mod resolved;
pub mod spec;
pub mod unique;

pub use errors::PrefetchError;
pub use requirements::{Requirement, RequirementsFile};
pub use resolved::{ConfigFile, EnvVar, ResolvedDependency, ResolvedPackage, ResolvedRequest};
pub use spec::{PackageSpec, PackageType};
pub use unique::{reduce_to_unique, Unique};

//! prefetch - offline dependency mirrors for hermetic builds
//!
//! This crate provides the library functionality behind the `prefetch` CLI:
//! fetching package dependencies, collecting them into a local mirror, and
//! rewriting requirement manifests to point at that mirror.

pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test doubles for the fetch and index collaborators.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests.
#[cfg(test)]
pub mod test_support;

pub use core::{
    errors::PrefetchError,
    resolved::{ResolvedPackage, ResolvedRequest},
    spec::{PackageSpec, PackageType},
};

pub use util::context::GlobalContext;

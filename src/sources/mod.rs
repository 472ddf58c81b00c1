//! External collaborators.
//!
//! Fetching artifacts and generating index pages are done by external tools;
//! this module wraps them behind traits so the orchestration can be driven
//! by fakes in tests.

pub mod fetch;
pub mod index;

pub use fetch::{CommandFetcher, FetchedPackage, Fetcher};
pub use index::{CommandIndexer, Indexer};

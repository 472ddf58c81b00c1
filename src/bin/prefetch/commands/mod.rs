//! Command implementations

pub mod apply_configs;
pub mod fetch_deps;

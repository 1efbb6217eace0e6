//! Core library for the diagnostic probe engine and tool orchestration core.
//!
//! Every probe, the registry that catalogs them, the batch runner that
//! parallelizes multi-target sweeps, the session manager, the LLM
//! orchestrator adapter, and the external protocol server live here. The
//! binary crate (`netprobe`) is a thin dispatcher over this library.

pub mod batch;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod orchestrator;
pub mod parsers;
pub mod primitives;
pub mod probes;
pub mod registry;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod startup;

/// Builds a fully populated registry: every probe module's `register`
/// function, called in the fixed order `probes::register_all` lists.
/// This is the one canonical construction path the CLI, the startup
/// sequence, and the external protocol server all build on.
pub fn build_default_registry() -> registry::ToolRegistry {
    let mut registry = registry::ToolRegistry::new();
    probes::register_all(&mut registry);
    registry
}

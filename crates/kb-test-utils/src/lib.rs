//! Shared test utilities for the KB command registry workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`workspace`]: [`TestWorkspace`](workspace::TestWorkspace) builder for
//!   monorepo layouts with plugin packages, installed dependencies, and
//!   plugin state

pub mod workspace;

pub use workspace::TestWorkspace;

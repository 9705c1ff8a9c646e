// ABOUTME: Main library module for the cntr service template renderer
// ABOUTME: Exports all core modules and provides the public API

pub mod catalog;
pub mod cli;
pub mod engine;
pub mod output;
pub mod template;

// Re-export commonly used types
pub use catalog::{Catalog, ServiceDefinition};
pub use cli::{App, Args, Config};
pub use engine::{RenderEngine, RenderedArtifact};
pub use output::{ArtifactWriter, WrittenArtifact};
pub use template::{PathOps, TemplateEngine, VariableResolver, VariableSet};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ABOUTME: Catalog module for the service templates shipped on disk
// ABOUTME: Exports service definitions, catalog lookup and dependency ordering

pub mod dependency;
pub mod error;
pub mod registry;
pub mod service;

pub use dependency::DependencyGraph;
pub use error::{CatalogError, Result};
pub use registry::Catalog;
pub use service::{ServiceDefinition, VariableDecl, DEFAULT_TEMPLATE, MANIFEST_FILE};

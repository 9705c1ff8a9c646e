// ABOUTME: Error types for catalog discovery and service lookup
// ABOUTME: Defines specific error types for manifests, assets and dependency ordering

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Unknown service '{name}'. Available services: {}", available.join(", "))]
    UnknownService { name: String, available: Vec<String> },

    #[error("Invalid service manifest {}: {source}", path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid declaration of variable '{variable}' in service '{service}': {reason}")]
    InvalidVariable {
        service: String,
        variable: String,
        reason: String,
    },

    #[error("Template for service '{service}' not found at {}", path.display())]
    MissingTemplate { service: String, path: PathBuf },

    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    #[error("Circular dependency detected between services: {services:?}")]
    CircularDependency { services: Vec<String> },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk catalog directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

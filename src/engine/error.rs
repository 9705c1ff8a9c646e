// ABOUTME: Error types for the render pipeline
// ABOUTME: Wraps catalog, template and output failures into one error for callers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] crate::catalog::CatalogError),

    #[error(transparent)]
    Template(#[from] crate::template::TemplateError),

    #[error(transparent)]
    Output(#[from] crate::output::OutputError),

    #[error("Rendered document for service '{service}' is not valid YAML: {source}")]
    InvalidDocument {
        service: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Render task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

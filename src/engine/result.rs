// ABOUTME: Result types produced by the render pipeline
// ABOUTME: A rendered artifact is the final document plus the assets that ship with it

use std::path::PathBuf;

use super::error::{EngineError, Result};

/// The rendered document and static assets for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub service: String,
    /// Name the document is written under, e.g. `compose.yml`.
    pub file_name: PathBuf,
    pub document: String,
    /// Directory the asset paths are relative to.
    pub source_root: PathBuf,
    pub assets: Vec<PathBuf>,
}

impl RenderedArtifact {
    /// Parse the document as YAML.
    pub fn validate_yaml(&self) -> Result<serde_yaml::Value> {
        serde_yaml::from_str(&self.document).map_err(|source| EngineError::InvalidDocument {
            service: self.service.clone(),
            source,
        })
    }
}

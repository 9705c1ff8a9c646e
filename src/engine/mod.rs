// ABOUTME: The render engine ties the catalog, the resolver and the renderer together
// ABOUTME: Produces rendered artifacts in memory or writes them to an output directory

pub mod error;
pub mod pipeline;
pub mod result;

pub use error::{EngineError, Result};
pub use pipeline::RenderEngine;
pub use result::RenderedArtifact;

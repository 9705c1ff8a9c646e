// ABOUTME: Output module for persisting rendered services
// ABOUTME: Handles atomic document writes and static asset copies

pub mod error;
pub mod writer;

pub use error::{OutputError, Result};
pub use writer::{write_atomic, ArtifactWriter, WrittenArtifact};

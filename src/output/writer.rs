// ABOUTME: Writes rendered Compose documents and their static assets to disk
// ABOUTME: The document goes through a temporary file and is moved into place only on success

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::{OutputError, Result};
use crate::engine::RenderedArtifact;

/// Write `contents` to `path` so readers see either the old file or the
/// complete new one, never a partial write.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let io_error = |source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(io_error)?;
    temp.write_all(contents).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(io_error)?;
    }

    temp.persist(path).map_err(|source| OutputError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Files produced for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenArtifact {
    pub service: String,
    pub document: PathBuf,
    pub assets: Vec<PathBuf>,
}

/// Lays artifacts out as `<root>/<service>/...`.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.root.join(service)
    }

    /// Copy the assets, then move the document into place last so a
    /// document on disk always comes with its assets.
    pub fn write(&self, artifact: &RenderedArtifact) -> Result<WrittenArtifact> {
        let dir = self.service_dir(&artifact.service);
        fs::create_dir_all(&dir).map_err(|source| OutputError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut assets = Vec::with_capacity(artifact.assets.len());
        for relative in &artifact.assets {
            let source_path = artifact.source_root.join(relative);
            let target = dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| OutputError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::copy(&source_path, &target).map_err(|source| OutputError::Io {
                path: target.clone(),
                source,
            })?;
            debug!("Copied {} -> {}", source_path.display(), target.display());
            assets.push(target);
        }

        let document = dir.join(&artifact.file_name);
        write_atomic(&document, artifact.document.as_bytes())?;
        info!(
            "Rendered {} to {} ({} bytes, {} assets)",
            artifact.service,
            document.display(),
            artifact.document.len(),
            assets.len()
        );

        Ok(WrittenArtifact {
            service: artifact.service.clone(),
            document,
            assets,
        })
    }
}

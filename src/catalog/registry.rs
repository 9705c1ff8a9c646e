// ABOUTME: The service catalog: every service definition found under one root directory
// ABOUTME: Built once at startup and passed explicitly to whoever needs lookups

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{CatalogError, Result};
use super::service::{ServiceDefinition, MANIFEST_FILE};
use crate::template::resolver::BUILTINS;

#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    services: BTreeMap<String, ServiceDefinition>,
}

impl Catalog {
    /// Scan `root` for sub-directories holding a service manifest.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let entries = std::fs::read_dir(root).map_err(|source| CatalogError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut services = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if !path.join(MANIFEST_FILE).is_file() {
                debug!("Skipping {}: no {}", path.display(), MANIFEST_FILE);
                continue;
            }

            let service = ServiceDefinition::load(&path)?;
            debug!(
                "Loaded service {} ({} variables, {} assets)",
                service.name,
                service.variables.len(),
                service.assets.len()
            );
            services.insert(service.name.clone(), service);
        }

        info!("Loaded {} services from {}", services.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            services,
        })
    }

    /// Build a catalog from already constructed definitions.
    pub fn from_services(
        root: impl Into<PathBuf>,
        services: impl IntoIterator<Item = ServiceDefinition>,
    ) -> Self {
        Self {
            root: root.into(),
            services: services
                .into_iter()
                .map(|service| (service.name.clone(), service))
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Result<&ServiceDefinition> {
        self.services
            .get(name)
            .ok_or_else(|| CatalogError::UnknownService {
                name: name.to_string(),
                available: self.names().iter().map(|s| s.to_string()).collect(),
            })
    }

    /// Service names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    /// Services ordered by `(order, name)`.
    pub fn list(&self) -> Vec<&ServiceDefinition> {
        let mut services: Vec<&ServiceDefinition> = self.services.values().collect();
        services.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        services
    }

    /// Every variable name any service accepts, built-ins included.
    pub fn known_variables(&self) -> BTreeSet<&str> {
        let mut known: BTreeSet<&str> = BUILTINS.iter().map(|(name, _)| *name).collect();
        for service in self.services.values() {
            known.extend(service.variables.keys().map(String::as_str));
        }
        known
    }
}
